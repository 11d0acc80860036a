/*!
Configuration management for the laser tracker application.
*/

use anyhow::{bail, Context, Result};
use laser_core::{ErrorFormat, Profiles, Quadrilateral};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub serial: SerialConfig,
    pub vision: VisionConfig,
    pub tracking: TrackingConfig,
    pub profiles: Profiles,
}

impl AppConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self {
            serial: SerialConfig::default(),
            vision: VisionConfig::default(),
            tracking: TrackingConfig::default(),
            profiles: Profiles::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse config file as TOML")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make every path command fail at runtime
    pub fn validate(&self) -> Result<()> {
        for (name, profile) in [("path", &self.profiles.path), ("auto", &self.profiles.auto)] {
            if !(profile.step.is_finite() && profile.step > 0.0) {
                bail!("profiles.{}.step must be a finite number > 0, got {}", name, profile.step);
            }
        }
        laser_core::generate_rectangle_points(&self.tracking.default_quad, self.profiles.path.step)
            .context("profiles.path.step cannot trace tracking.default_quad")?;
        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize config to TOML")?;

        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Profiles with the global corner tolerance and precision timeout applied
    pub fn session_profiles(&self) -> Profiles {
        let mut profiles = self.profiles;
        for profile in [&mut profiles.path, &mut profiles.auto] {
            profile.thresholds.corner_tolerance = self.tracking.corner_tolerance;
            profile.thresholds.precision_timeout_ms = self.tracking.precision_timeout_ms;
        }
        profiles
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Serial link to the motor controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Serial device path
    pub port: String,

    pub baud_rate: u32,

    /// Read timeout; an expired read counts as "no data"
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115200,
            read_timeout_ms: 5,
        }
    }
}

/// UDP feed of detections from the vision subsystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// UDP bind address
    pub udp_bind_addr: String,

    /// UDP port to listen on
    pub udp_port: u16,

    /// Detections buffered between the receiver and the control loop
    pub channel_buffer_size: usize,

    /// Socket receive buffer in bytes
    pub recv_buffer_bytes: usize,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            udp_bind_addr: "127.0.0.1".to_string(),
            udp_port: 5600,
            channel_buffer_size: 64,
            recv_buffer_bytes: 256 * 1024,
        }
    }
}

/// Control loop settings shared by all profiles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Longest wait for a camera frame before the serial link is polled anyway
    pub poll_interval_ms: u64,

    /// Payload shape of the outbound error
    pub error_format: ErrorFormat,

    /// Distance (px) from a quadrilateral corner that classifies a waypoint as a corner
    pub corner_tolerance: f64,

    /// Optional time fallback for precision mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision_timeout_ms: Option<u64>,

    /// Calibration quadrilateral used until corners are marked
    pub default_quad: Quadrilateral,

    /// Statistics reporting interval in seconds
    pub stats_interval_seconds: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 20,
            error_format: ErrorFormat::Json,
            corner_tolerance: laser_core::tracking::DEFAULT_CORNER_TOLERANCE,
            precision_timeout_ms: None,
            default_quad: Quadrilateral::default(),
            stats_interval_seconds: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use laser_core::AdvanceMode;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_roundtrip() {
        let original_config = AppConfig::new();

        let temp_file = NamedTempFile::new().unwrap();
        let temp_path = temp_file.path();

        // Save and load
        original_config.save_to_file(temp_path).unwrap();
        let loaded_config = AppConfig::load_from_file(temp_path).unwrap();

        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn test_roundtrip_with_timeout() {
        let mut config = AppConfig::new();
        config.tracking.precision_timeout_ms = Some(1500);
        config.tracking.error_format = ErrorFormat::PackedI16;

        let temp_file = NamedTempFile::new().unwrap();
        config.save_to_file(temp_file.path()).unwrap();
        let loaded = AppConfig::load_from_file(temp_file.path()).unwrap();

        assert_eq!(loaded.tracking.precision_timeout_ms, Some(1500));
        assert_eq!(loaded.tracking.error_format, ErrorFormat::PackedI16);
    }

    #[test]
    fn test_default_values() {
        let config = AppConfig::new();

        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.vision.udp_port, 5600);
        assert_eq!(config.tracking.poll_interval_ms, 20);
        assert_eq!(config.tracking.default_quad, Quadrilateral::default());

        assert_eq!(config.profiles.path.mode, AdvanceMode::Mixed);
        assert_eq!(config.profiles.path.step, 20.0);
        assert_eq!(config.profiles.auto.mode, AdvanceMode::Precision);
        assert_eq!(config.profiles.auto.step, 1.0);
    }

    #[test]
    fn test_invalid_step_is_rejected_on_load() {
        for step in ["0.0", "-3.5", "nan", "1e-12"] {
            let temp_file = NamedTempFile::new().unwrap();
            std::fs::write(temp_file.path(), format!("[profiles.path]\nmode = \"MIXED\"\nstep = {}\n", step)).unwrap();
            assert!(AppConfig::load_from_file(temp_file.path()).is_err(), "step {} accepted", step);
        }

        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "[profiles.path]\nmode = \"MIXED\"\nstep = 5.0\n").unwrap();
        assert_eq!(AppConfig::load_from_file(temp_file.path()).unwrap().profiles.path.step, 5.0);

        let mut config = AppConfig::new();
        config.profiles.auto.step = f64::INFINITY;
        assert!(config.validate().is_err());
        assert!(AppConfig::new().validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [serial]
            port = "/dev/ttyACM1"

            [tracking]
            corner_tolerance = 5.0
            precision_timeout_ms = 800
            "#,
        )
        .unwrap();

        assert_eq!(config.serial.port, "/dev/ttyACM1");
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.vision, VisionConfig::default());

        let profiles = config.session_profiles();
        assert_eq!(profiles.path.thresholds.corner_tolerance, 5.0);
        assert_eq!(profiles.auto.thresholds.precision_timeout_ms, Some(800));
        assert_eq!(profiles.path.thresholds.edge_time_ms, 300);
    }
}
