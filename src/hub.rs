// --- Broadcast hub ----------------------------------------------------------
//
// Owns the single current TimelineState and the set of connected listener
// channels. Each listener gets its own bounded queue; the HTTP layer drains it
// into the push-channel response.
//
// Ordering: `register` snapshots the state and inserts the channel under the
// state read lock, `broadcast` replaces the state and fans out under the write
// lock. A listener therefore either gets the new state from the fan-out or as
// its initial frame, never neither.
//
// This is process memory. Running more than one engine instance behind a load
// balancer would give listeners on different instances different timelines.

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::timeline::TimelineState;

/// Per-listener queue depth. A listener that falls this far behind is
/// disconnected; on reconnect its first frame is the current state.
pub const CHANNEL_CAPACITY: usize = 32;

/// One message on a listener's push channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// JSON-encoded [`TimelineState`].
    State(Arc<str>),
    KeepAlive,
}

impl Frame {
    fn state(state: &TimelineState) -> Option<Self> {
        match serde_json::to_string(state) {
            Ok(json) => Some(Frame::State(json.into())),
            Err(e) => {
                warn!("failed to encode timeline state: {e}");
                None
            }
        }
    }
}

pub struct BroadcastHub {
    state: RwLock<TimelineState>,
    channels: DashMap<Uuid, mpsc::Sender<Frame>>,
}

impl BroadcastHub {
    pub fn new(initial: TimelineState) -> Self {
        Self {
            state: RwLock::new(initial),
            channels: DashMap::new(),
        }
    }

    /// Add an existing channel and immediately queue the current state on it.
    pub async fn attach(&self, tx: mpsc::Sender<Frame>) -> Uuid {
        let id = Uuid::new_v4();
        let state = self.state.read().await;
        if let Some(frame) = Frame::state(&state) {
            if tx.try_send(frame).is_err() {
                warn!(listener = %id, "could not queue initial state");
            }
        }
        self.channels.insert(id, tx);
        drop(state);

        info!(listener = %id, listeners = self.channels.len(), "listener connected");
        id
    }

    /// Open a new listener channel. Dropping the returned [`Subscription`] unregisters it.
    pub async fn register(self: &Arc<Self>) -> Subscription {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let id = self.attach(tx).await;
        Subscription {
            id,
            rx,
            hub: Arc::clone(self),
        }
    }

    pub fn unregister(&self, id: Uuid) {
        if self.channels.remove(&id).is_some() {
            info!(listener = %id, listeners = self.channels.len(), "listener disconnected");
        }
    }

    /// Drop every channel; listeners see their stream end and reconnect elsewhere.
    pub fn disconnect_all(&self) {
        let n = self.channels.len();
        self.channels.clear();
        info!(listeners = n, "all listeners disconnected");
    }

    /// Replace the current state and push it to every listener.
    ///
    /// Channels that can no longer be written are removed in the same pass.
    /// Returns how many listeners the frame was queued for.
    pub async fn broadcast(&self, next: TimelineState) -> usize {
        let mut state = self.state.write().await;
        *state = next;
        let Some(frame) = Frame::state(&state) else {
            return 0;
        };
        let delivered = self.fan_out(&frame);
        drop(state);

        debug!(delivered, "broadcast timeline state");
        delivered
    }

    /// Update the position sample without notifying anyone.
    ///
    /// Newly connecting listeners see the fresh sample; existing ones keep
    /// extrapolating from the last broadcast.
    pub async fn refresh_sample(&self, position: f64, captured_at_ms: i64) {
        let mut state = self.state.write().await;
        state.position = position;
        state.captured_at_ms = captured_at_ms;
    }

    pub async fn current(&self) -> TimelineState {
        self.state.read().await.clone()
    }

    pub fn listener_count(&self) -> usize {
        self.channels.len()
    }

    /// Queue a keep-alive comment on every channel, dropping dead ones.
    pub fn keep_alive(&self) -> usize {
        self.fan_out(&Frame::KeepAlive)
    }

    /// Run [`BroadcastHub::keep_alive`] on a fixed period until the hub is dropped.
    pub fn spawn_keepalive(self: &Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        let hub = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick fires immediately; listeners just got their initial state.
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(hub) = hub.upgrade() else { break };
                hub.keep_alive();
            }
        })
    }

    fn fan_out(&self, frame: &Frame) -> usize {
        let mut delivered = 0;
        self.channels.retain(|id, tx| match tx.try_send(frame.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            // Queued frames are stale by now. Closing the channel ends the
            // stream and the listener reconnects onto the current state.
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(listener = %id, "listener queue full, disconnecting");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                info!(listener = %id, "listener channel closed, removing");
                false
            }
        });
        delivered
    }
}

/// Receiving side of one listener channel.
pub struct Subscription {
    id: Uuid,
    rx: mpsc::Receiver<Frame>,
    hub: Arc<BroadcastHub>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    /// Next queued frame, if any, without waiting.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playing(seq: &str, file: &str, position: f64, at: i64) -> TimelineState {
        TimelineState {
            is_playing: true,
            current_sequence: Some(seq.into()),
            audio_file: Some(file.into()),
            position,
            captured_at_ms: at,
        }
    }

    fn decode(frame: Frame) -> TimelineState {
        match frame {
            Frame::State(json) => serde_json::from_str(&json).unwrap(),
            Frame::KeepAlive => panic!("expected a state frame"),
        }
    }

    #[tokio::test]
    async fn register_sends_current_state_immediately() {
        let hub = Arc::new(BroadcastHub::new(TimelineState::idle(0)));
        hub.broadcast(playing("Carol.seq", "carol.mp3", 12.0, 1_000)).await;
        hub.refresh_sample(14.0, 3_000).await;

        let mut sub = hub.register().await;
        let first = decode(sub.recv().await.unwrap());
        assert_eq!(first.audio_file.as_deref(), Some("carol.mp3"));
        assert_eq!(first.position, 14.0);
        assert_eq!(first.captured_at_ms, 3_000);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_listener() {
        let hub = Arc::new(BroadcastHub::new(TimelineState::idle(0)));
        let mut a = hub.register().await;
        let mut b = hub.register().await;
        a.recv().await.unwrap();
        b.recv().await.unwrap();

        assert_eq!(hub.broadcast(playing("A", "a.mp3", 1.0, 10)).await, 2);
        assert_eq!(decode(a.recv().await.unwrap()).current_sequence.as_deref(), Some("A"));
        assert_eq!(decode(b.recv().await.unwrap()).current_sequence.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn dead_channels_are_removed_during_broadcast() {
        let hub = Arc::new(BroadcastHub::new(TimelineState::idle(0)));
        let (tx, rx) = mpsc::channel(4);
        hub.attach(tx).await;
        let _live = hub.register().await;
        assert_eq!(hub.listener_count(), 2);

        drop(rx);
        assert_eq!(hub.broadcast(playing("A", "a.mp3", 0.0, 0)).await, 1);
        assert_eq!(hub.listener_count(), 1);
    }

    #[tokio::test]
    async fn keep_alive_prunes_closed_channels() {
        let hub = Arc::new(BroadcastHub::new(TimelineState::idle(0)));
        let (tx, rx) = mpsc::channel(4);
        hub.attach(tx).await;
        drop(rx);
        let mut live = hub.register().await;
        live.recv().await.unwrap();

        assert_eq!(hub.keep_alive(), 1);
        assert_eq!(hub.listener_count(), 1);
        assert_eq!(live.recv().await, Some(Frame::KeepAlive));
    }

    #[tokio::test]
    async fn lagging_listener_is_disconnected() {
        let hub = Arc::new(BroadcastHub::new(TimelineState::idle(0)));
        let (tx, mut rx) = mpsc::channel(1);
        hub.attach(tx).await;
        let mut live = hub.register().await;
        live.recv().await.unwrap();

        // The initial state still fills the slow queue.
        assert_eq!(hub.broadcast(playing("A", "a.mp3", 0.0, 0)).await, 1);
        assert_eq!(hub.listener_count(), 1);

        assert!(decode(rx.recv().await.unwrap()).current_sequence.is_none());
        assert_eq!(rx.recv().await, None);

        // Reconnecting starts from the latest state, not the backlog.
        let mut again = hub.register().await;
        assert_eq!(decode(again.recv().await.unwrap()).current_sequence.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn dropping_subscription_unregisters() {
        let hub = Arc::new(BroadcastHub::new(TimelineState::idle(0)));
        let sub = hub.register().await;
        assert_eq!(hub.listener_count(), 1);
        drop(sub);
        assert_eq!(hub.listener_count(), 0);
    }

    #[tokio::test]
    async fn disconnect_all_ends_streams() {
        let hub = Arc::new(BroadcastHub::new(TimelineState::idle(0)));
        let mut sub = hub.register().await;
        sub.recv().await.unwrap();

        hub.disconnect_all();
        assert_eq!(sub.recv().await, None);
        assert_eq!(hub.listener_count(), 0);
    }

    #[tokio::test]
    async fn refresh_sample_does_not_notify() {
        let hub = Arc::new(BroadcastHub::new(TimelineState::idle(0)));
        let mut sub = hub.register().await;
        sub.recv().await.unwrap();

        hub.refresh_sample(5.0, 5_000).await;
        assert!(sub.try_recv().is_none());
        assert_eq!(hub.current().await.position, 5.0);
    }
}
