//! Listener side: keeps a local media element in step with the server timeline.

pub mod frames;
pub mod media;
pub mod reconnect;
pub mod sync;

use std::{future::Future, time::Duration};

use tokio::sync::mpsc;
use tracing::{debug, info};

pub use frames::{FrameDecoder, SseFrame};
pub use media::{MediaElement, VirtualElement};
pub use reconnect::{ChannelEvent, Reconnector};
pub use sync::{classify_drift, Correction, SyncController, SyncPhase, SyncSample, TickResult};

/// Feed push-channel events and correction ticks into `controller` until the
/// channel closes or `shutdown` resolves.
///
/// Events and ticks are handled on this one task, so they never run
/// concurrently against the element.
pub async fn drive<E, F>(
    controller: &mut SyncController<E>,
    mut events: mpsc::Receiver<ChannelEvent>,
    tick: Duration,
    shutdown: F,
) where
    E: MediaElement,
    F: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            ev = events.recv() => match ev {
                Some(ChannelEvent::Timeline(state)) => controller.on_timeline(state),
                Some(ChannelEvent::Connected) => debug!("push channel up"),
                Some(ChannelEvent::Disconnected { reason }) => {
                    info!("push channel down: {reason}");
                    controller.on_disconnected();
                }
                None => break,
            },
            _ = interval.tick() => {
                if let TickResult::Corrected { sample, correction } = controller.on_tick() {
                    debug!(
                        target = sample.target_position,
                        actual = sample.actual_position,
                        drift_ms = sample.drift_ms,
                        ?correction,
                        "sync tick"
                    );
                }
            }
        }
    }
}
