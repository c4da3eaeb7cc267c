// --- Status poller ----------------------------------------------------------
//
// Polls the show-control device on a fixed period, resolves the audio asset
// and decides whether listeners need a fresh broadcast. A failed poll skips
// the tick: the last known state stays authoritative and nothing is sent.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    hub::BroadcastHub,
    resolver::AudioResolver,
    show_control::{DeviceStatus, StatusSource},
    timeline::{Clock, TimelineState},
};

/// Result of one poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Device unreachable or returned garbage; state untouched.
    Skipped,
    /// State changed or the heartbeat was due; pushed to listeners.
    Broadcast { delivered: usize },
    /// Nothing listeners need to hear about; position sample refreshed silently.
    Refreshed,
}

/// Poll health exposed on the status endpoint.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollHealth {
    pub last_success_ms: Option<i64>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

/// Whether a candidate state must be pushed to connected listeners.
///
/// Any change of play state, sequence or audio file broadcasts. While playing,
/// a broadcast is also due once `heartbeat` has passed since the last one so
/// listeners re-anchor against the server clock.
pub fn should_broadcast(
    previous: &TimelineState,
    candidate: &TimelineState,
    last_broadcast_ms: Option<i64>,
    now_ms: i64,
    heartbeat: Duration,
) -> bool {
    if previous.identity() != candidate.identity() {
        return true;
    }
    if !candidate.is_playing {
        return false;
    }
    match last_broadcast_ms {
        None => true,
        Some(at) => now_ms - at > heartbeat.as_millis() as i64,
    }
}

pub struct Poller {
    source: Arc<dyn StatusSource>,
    resolver: Arc<AudioResolver>,
    hub: Arc<BroadcastHub>,
    clock: Arc<dyn Clock>,
    heartbeat: Duration,
    last_broadcast_ms: Option<i64>,
    health: Arc<Mutex<PollHealth>>,
}

impl Poller {
    pub fn new(
        source: Arc<dyn StatusSource>,
        resolver: Arc<AudioResolver>,
        hub: Arc<BroadcastHub>,
        clock: Arc<dyn Clock>,
        heartbeat: Duration,
    ) -> Self {
        Self {
            source,
            resolver,
            hub,
            clock,
            heartbeat,
            last_broadcast_ms: None,
            health: Arc::new(Mutex::new(PollHealth::default())),
        }
    }

    pub fn health(&self) -> Arc<Mutex<PollHealth>> {
        Arc::clone(&self.health)
    }

    /// Run one poll cycle.
    pub async fn tick(&mut self) -> TickOutcome {
        let status = match self.source.fetch_status().await {
            Ok(s) => s,
            Err(e) => {
                let mut h = self.health.lock();
                h.consecutive_failures = h.consecutive_failures.saturating_add(1);
                h.last_error = Some(e.to_string());
                warn!(failures = h.consecutive_failures, "show-control poll failed: {e}");
                return TickOutcome::Skipped;
            }
        };

        let now_ms = self.clock.now_ms();
        {
            let mut h = self.health.lock();
            h.consecutive_failures = 0;
            h.last_error = None;
            h.last_success_ms = Some(now_ms);
        }

        let candidate = self.candidate(status, now_ms);
        let previous = self.hub.current().await;

        if should_broadcast(
            &previous,
            &candidate,
            self.last_broadcast_ms,
            now_ms,
            self.heartbeat,
        ) {
            if previous.identity() != candidate.identity() {
                tracing::info!(
                    playing = candidate.is_playing,
                    sequence = ?candidate.current_sequence,
                    audio = ?candidate.audio_file,
                    "timeline changed"
                );
            }
            let delivered = self.hub.broadcast(candidate).await;
            self.last_broadcast_ms = Some(now_ms);
            TickOutcome::Broadcast { delivered }
        } else {
            self.hub
                .refresh_sample(candidate.position, candidate.captured_at_ms)
                .await;
            TickOutcome::Refreshed
        }
    }

    fn candidate(&self, status: DeviceStatus, now_ms: i64) -> TimelineState {
        let audio_file = status.current_sequence.as_deref().and_then(|seq| {
            self.resolver.resolve(seq, status.media_filename.as_deref())
        });
        // The device may report media without a sequence (media-only playlist entry).
        let audio_file = audio_file.or_else(|| {
            status
                .media_filename
                .as_deref()
                .and_then(|m| self.resolver.resolve("", Some(m)))
        });
        if status.current_sequence.is_some() && audio_file.is_none() {
            debug!(sequence = ?status.current_sequence, "no audio resolved");
        }

        TimelineState {
            is_playing: status.is_playing,
            current_sequence: status.current_sequence,
            audio_file,
            position: 0.0,
            captured_at_ms: 0,
        }
        .with_sample(status.seconds_played, now_ms)
    }

    /// Poll forever on `period`. Never returns; cancel by aborting the task.
    pub async fn run(mut self, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }
}
