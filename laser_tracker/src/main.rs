/*!
# Laser Tracker

Camera-guided laser path tracker. Laser detections arrive from the vision
subsystem over UDP; corrective errors go to the motor controller over a
framed serial link, which also carries its commands back.

## Usage

### Track (default config file)
```bash
laser_tracker run
```

### Offline simulation
```bash
laser_tracker simulate --profile detect --gain 0.4
```

### Send a tagged message to the controller
```bash
laser_tracker send C:0x01
```

### Generate a configuration file
```bash
laser_tracker config --output laser_tracker.toml
```
*/

use clap::{Parser, Subcommand};
use laser_core::TaggedMessage;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn, Level};

mod config;
mod control;
mod simulate;
mod transport;
mod vision;

use config::AppConfig;
use simulate::{SimOptions, SimProfile};

#[derive(Parser)]
#[command(name = "laser_tracker")]
#[command(about = "Camera-guided laser path tracking over a framed serial link")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "laser_tracker.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tracking loop against the serial port and vision feed
    Run {
        /// Override the configured serial port
        #[arg(short, long)]
        port: Option<String>,
    },

    /// Trace a path offline with a simulated laser and motor controller
    Simulate {
        /// Path command to simulate
        #[arg(long, value_enum, default_value = "path")]
        profile: SimProfile,

        /// Fraction of the error the laser moves per frame
        #[arg(long, default_value = "0.5")]
        gain: f64,

        /// Simulated frame period in milliseconds
        #[arg(long, default_value = "20")]
        frame_ms: u64,

        /// Give up after this many frames
        #[arg(long, default_value = "20000")]
        max_ticks: u64,

        /// Drop every n-th detection (0 = never)
        #[arg(long, default_value = "0")]
        dropout_every: u64,
    },

    /// Send one tagged message (C:0xNN, T:0xNN or N:<int>) to the controller
    Send {
        message: String,
    },

    /// Generate configuration file
    Config {
        /// Output path for configuration file
        #[arg(short, long, default_value = "laser_tracker.toml")]
        output: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays free for piping
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    match cli.command {
        Commands::Run { port } => run_tracker(cli.config, port),
        Commands::Simulate {
            profile,
            gain,
            frame_ms,
            max_ticks,
            dropout_every,
        } => {
            let options = SimOptions {
                profile,
                gain,
                frame_ms,
                max_ticks,
                dropout_every,
            };
            run_simulation(cli.config, options)
        }
        Commands::Send { message } => send_message(cli.config, &message),
        Commands::Config { output } => generate_config_file(output),
    }
}

/// Load the config file, falling back to defaults when it does not exist
fn load_config(config_path: &Path) -> Result<AppConfig, Box<dyn std::error::Error>> {
    if config_path.exists() {
        Ok(AppConfig::load_from_file(config_path)?)
    } else {
        warn!("⚠️ Config file {} not found, using defaults", config_path.display());
        Ok(AppConfig::new())
    }
}

/// Run the live tracking loop
fn run_tracker(config_path: PathBuf, port: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(&config_path)?;
    if let Some(port) = port {
        config.serial.port = port;
    }

    info!("🚀 Starting laser tracker");
    info!("🔌 Serial port: {} @ {} baud", config.serial.port, config.serial.baud_rate);
    info!("📷 Vision feed: {}:{}", config.vision.udp_bind_addr, config.vision.udp_port);

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("🛑 Received Ctrl+C, shutting down gracefully...");
        handler_flag.store(false, Ordering::SeqCst);
    })?;

    control::run(&config, running)?;

    info!("✅ Laser tracker stopped");
    Ok(())
}

/// Run the offline simulator
fn run_simulation(config_path: PathBuf, options: SimOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&config_path)?;
    let report = simulate::run_simulation(&config, &options)?;

    if !report.completed {
        return Err(format!(
            "Path not completed after {} frames ({} waypoints, laser at {})",
            report.ticks, report.waypoints, report.final_position
        )
        .into());
    }
    Ok(())
}

/// Send one tagged message and exit
fn send_message(config_path: PathBuf, text: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&config_path)?;
    let message = TaggedMessage::parse(text.as_bytes())?;
    control::send_once(&config, message)?;
    Ok(())
}

/// Generate a default configuration file
fn generate_config_file(output_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::new();
    config.save_to_file(&output_path)?;

    info!("✅ Generated configuration file: {}", output_path.display());
    info!("📝 Edit the file to customize settings, then run:");
    info!("   laser_tracker --config {} run", output_path.display());

    Ok(())
}
