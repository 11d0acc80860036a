/*!
Vision feed receiver.

The camera process publishes one JSON datagram per frame:

```text
{"kind":"point","x":212,"y":87}          laser found
{"kind":"none"}                          laser not found
{"kind":"quad","corners":[[x,y],...]}    quadrilateral detected (4 corners, any order)
```

Datagrams are received on a dedicated thread with a small tokio runtime
and handed to the control loop over a bounded channel.
*/

use crate::config::VisionConfig;
use crossbeam_channel::{Sender, TrySendError};
use laser_core::{Point, Quadrilateral};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tracing::{debug, error, info, warn};

/// One message from the vision subsystem
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VisionMessage {
    Point { x: i32, y: i32 },
    None,
    Quad { corners: [[i32; 2]; 4] },
}

impl VisionMessage {
    /// Laser detection carried by this message, if it is a per-frame report
    pub fn detection(&self) -> Option<Option<Point>> {
        match *self {
            VisionMessage::Point { x, y } => Some(Some(Point::new(x, y))),
            VisionMessage::None => Some(None),
            VisionMessage::Quad { .. } => None,
        }
    }

    /// Detected quadrilateral with its corners put in clockwise order
    pub fn quadrilateral(&self) -> Option<Quadrilateral> {
        match *self {
            VisionMessage::Quad { corners } => Some(Quadrilateral::from_unordered(corners.map(|[x, y]| Point::new(x, y)))),
            _ => None,
        }
    }
}

/// Receiver counters reported at shutdown
#[derive(Debug, Default, Clone, Copy)]
struct ReceiverStats {
    datagrams: u64,
    malformed: u64,
    dropped: u64,
}

/// Start the receiver thread.
///
/// The thread exits when `running` goes false or the control loop drops
/// its end of the channel.
pub fn spawn_receiver(
    config: VisionConfig,
    tx: Sender<VisionMessage>,
    running: Arc<AtomicBool>,
) -> JoinHandle<anyhow::Result<()>> {
    thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let result = rt.block_on(receive_loop(config, tx, running));
        match &result {
            Ok(()) => info!("Vision receiver finished"),
            Err(e) => error!("Vision receiver failed: {:#}", e),
        }
        result
    })
}

async fn receive_loop(config: VisionConfig, tx: Sender<VisionMessage>, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let socket_addr = format!("{}:{}", config.udp_bind_addr, config.udp_port);
    info!("📷 Binding vision socket to {}", socket_addr);

    let socket = UdpSocket::bind(&socket_addr).await?;
    let sock_ref = socket2::SockRef::from(&socket);
    sock_ref.set_recv_buffer_size(config.recv_buffer_bytes)?;
    info!("✅ Vision socket bound, receive buffer {} KB", config.recv_buffer_bytes / 1024);

    let mut buffer = vec![0u8; 2048];
    let mut stats = ReceiverStats::default();
    let start_time = Instant::now();

    while running.load(Ordering::SeqCst) {
        // Short timeout so the running flag is checked regularly
        let timeout = Duration::from_millis(100);

        let len = match tokio::time::timeout(timeout, socket.recv(&mut buffer)).await {
            Ok(Ok(len)) => len,
            Ok(Err(e)) => {
                error!("Vision receive error: {}", e);
                continue;
            }
            Err(_) => continue,
        };
        stats.datagrams += 1;

        let message = match serde_json::from_slice::<VisionMessage>(&buffer[..len]) {
            Ok(message) => message,
            Err(e) => {
                stats.malformed += 1;
                warn!("⚠️ Malformed vision datagram ({} bytes): {}", len, e);
                continue;
            }
        };

        match tx.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                stats.dropped += 1;
                debug!("Detection channel full, dropping {:?}", message);
            }
            Err(TrySendError::Disconnected(_)) => {
                info!("Control loop has stopped, closing vision receiver");
                break;
            }
        }
    }

    info!("📈 Vision receiver final stats:");
    info!("   Datagrams: {}", stats.datagrams);
    info!("   Malformed: {}", stats.malformed);
    info!("   Dropped: {}", stats.dropped);
    info!("   Duration: {:.1}s", start_time.elapsed().as_secs_f64());

    Ok(())
}
