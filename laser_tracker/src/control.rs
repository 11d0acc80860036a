/*!
Control loop: joins the vision feed, the tracking session and the serial
link to the motor controller.
*/

use crate::config::AppConfig;
use crate::transport::{SerialTransport, Transport};
use crate::vision::{self, VisionMessage};
use anyhow::Context;
use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use laser_core::{
    ErrorFormat, FrameEncoder, InboundMessage, Point, Quadrilateral, ReceiverState, Result, SessionOutput,
    TaggedMessage, TrackerSession,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Counters for the serial side of the loop
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    pub errors_sent: u64,
    pub commands: u64,
    pub tagged: u64,
    pub unknown: u64,
    /// Commands the session refused; the loop keeps running
    pub rejected: u64,
}

/// Reads per `poll_serial` call, so a chattering peer cannot starve the vision side
const MAX_READS_PER_POLL: usize = 8;

/// One serial link driving one tracking session
pub struct ControlLoop<T: Transport> {
    session: TrackerSession,
    transport: T,
    encoder: FrameEncoder,
    receiver: ReceiverState,
    error_format: ErrorFormat,
    payload: Vec<u8>,
    read_buf: [u8; 256],
    latest_quad: Option<Quadrilateral>,
    stats: LoopStats,
}

impl<T: Transport> ControlLoop<T> {
    pub fn new(session: TrackerSession, transport: T, error_format: ErrorFormat) -> Self {
        Self {
            session,
            transport,
            encoder: FrameEncoder::new(),
            receiver: ReceiverState::new(),
            error_format,
            payload: Vec::with_capacity(64),
            read_buf: [0u8; 256],
            latest_quad: None,
            stats: LoopStats::default(),
        }
    }

    pub fn session(&self) -> &TrackerSession {
        &self.session
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Remember the most recent quadrilateral from the vision feed
    pub fn observe_quad(&mut self, quad: Quadrilateral) {
        debug!("Quadrilateral observed: {:?}", quad.corners());
        self.latest_quad = Some(quad);
    }

    /// Read what the serial peer has sent, up to a fixed number of reads,
    /// and act on each frame. Leftover bytes wait for the next call.
    ///
    /// Returns the number of frames handled. Only transport failures are errors.
    pub fn poll_serial(&mut self, now_ms: u64) -> Result<usize> {
        let mut handled = 0;
        for _ in 0..MAX_READS_PER_POLL {
            let n = self.transport.read(&mut self.read_buf)?;
            if n == 0 {
                break;
            }
            for frame in self.receiver.feed(&self.read_buf[..n]) {
                self.dispatch(frame, now_ms);
                handled += 1;
            }
        }
        Ok(handled)
    }

    fn dispatch(&mut self, frame: Bytes, now_ms: u64) {
        match InboundMessage::from_frame(frame) {
            InboundMessage::Command(command) => {
                self.stats.commands += 1;
                if let Err(e) = self.session.apply(command, self.latest_quad, now_ms) {
                    self.stats.rejected += 1;
                    error!("❌ Command {} rejected: {}", command, e);
                }
            }
            InboundMessage::Tagged(message) => {
                self.stats.tagged += 1;
                info!("📩 Tagged message from controller: {}", message);
            }
            InboundMessage::Unknown(payload) => {
                self.stats.unknown += 1;
                warn!("⚠️ Unknown message from controller: {}", payload);
            }
        }
    }

    /// Run one session step for a camera frame and send the resulting error
    pub fn tick(&mut self, detected: Option<Point>, now_ms: u64) -> Result<SessionOutput> {
        self.stats.ticks += 1;
        let output = self.session.step(detected, now_ms);
        if let SessionOutput::Error { error, .. } = output {
            self.error_format.write(&error, &mut self.payload)?;
            let frame = self.encoder.encode(&self.payload)?;
            self.transport.write_all(frame)?;
            self.transport.flush()?;
            self.stats.errors_sent += 1;
        }
        Ok(output)
    }

    /// Frame and send a tagged message
    pub fn send_tagged(&mut self, message: TaggedMessage) -> Result<()> {
        let frame = self.encoder.encode(message.encode().as_bytes())?;
        self.transport.write_all(frame)?;
        self.transport.flush()?;
        debug!("Sent {} ({} bytes framed)", message, frame.len());
        Ok(())
    }

    pub fn log_stats(&self) {
        let decoder = self.receiver.stats();
        info!(
            "📊 Ticks: {}, errors sent: {}, commands: {} ({} rejected), tagged: {}, unknown: {}",
            self.stats.ticks,
            self.stats.errors_sent,
            self.stats.commands,
            self.stats.rejected,
            self.stats.tagged,
            self.stats.unknown
        );
        info!(
            "📊 Frames decoded: {}, dropped: {}, noise bytes: {}",
            decoder.frames_decoded, decoder.frames_dropped, decoder.noise_bytes
        );
    }
}

/// Run the tracker against the configured serial port and vision feed
pub fn run(config: &AppConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let transport = SerialTransport::open(
        &config.serial.port,
        config.serial.baud_rate,
        Duration::from_millis(config.serial.read_timeout_ms),
    )?;

    let session = TrackerSession::new(config.tracking.default_quad, config.session_profiles());
    let mut control = ControlLoop::new(session, transport, config.tracking.error_format);

    let (vision_tx, vision_rx) = bounded::<VisionMessage>(config.vision.channel_buffer_size);
    let vision_handle = vision::spawn_receiver(config.vision.clone(), vision_tx, Arc::clone(&running));

    info!("🚀 Tracking loop started");
    let result = drive(&mut control, &vision_rx, config, &running);

    running.store(false, Ordering::SeqCst);
    drop(vision_rx);
    match vision_handle.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Vision receiver ended with error: {:#}", e),
        Err(_) => error!("Vision receiver thread panicked"),
    }

    control.log_stats();
    result
}

fn drive<T: Transport>(
    control: &mut ControlLoop<T>,
    vision_rx: &Receiver<VisionMessage>,
    config: &AppConfig,
    running: &AtomicBool,
) -> anyhow::Result<()> {
    let poll_interval = Duration::from_millis(config.tracking.poll_interval_ms);
    let stats_interval = Duration::from_secs(config.tracking.stats_interval_seconds);
    let start_time = Instant::now();
    let now_ms = || start_time.elapsed().as_millis() as u64;
    let mut last_stats = Instant::now();

    while running.load(Ordering::SeqCst) {
        match vision_rx.recv_timeout(poll_interval) {
            Ok(message) => {
                if let Some(quad) = message.quadrilateral() {
                    control.observe_quad(quad);
                }
                if let Some(detected) = message.detection() {
                    control.tick(detected, now_ms()).context("Failed to send error frame")?;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Vision receiver has stopped");
                break;
            }
        }

        control.poll_serial(now_ms()).context("Serial read failed")?;

        if last_stats.elapsed() >= stats_interval {
            control.log_stats();
            last_stats = Instant::now();
        }
    }
    Ok(())
}

/// Send one tagged message over the configured serial port
pub fn send_once(config: &AppConfig, message: TaggedMessage) -> anyhow::Result<()> {
    let transport = SerialTransport::open(
        &config.serial.port,
        config.serial.baud_rate,
        Duration::from_millis(config.serial.read_timeout_ms),
    )?;
    let mut control = ControlLoop::new(TrackerSession::default(), transport, config.tracking.error_format);
    control.send_tagged(message)?;
    info!("✅ Sent {}", message);
    Ok(())
}
