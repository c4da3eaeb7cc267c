use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// "What is playing and where", as last observed from the show-control device.
///
/// `position` and `captured_at_ms` are sampled in the same poll cycle and are
/// only ever written together (see [`TimelineState::with_sample`]). The
/// authoritative position at a later instant is derived with
/// [`TimelineState::target_position`], never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineState {
    pub is_playing: bool,
    pub current_sequence: Option<String>,
    pub audio_file: Option<String>,
    /// Seconds into the track when the sample was taken.
    pub position: f64,
    /// Server wall-clock time of the sample, unix epoch milliseconds.
    #[serde(rename = "capturedAt")]
    pub captured_at_ms: i64,
}

impl TimelineState {
    /// All-idle state used at process start.
    pub fn idle(now_ms: i64) -> Self {
        Self {
            is_playing: false,
            current_sequence: None,
            audio_file: None,
            position: 0.0,
            captured_at_ms: now_ms,
        }
    }

    /// Replace the position sample atomically.
    pub fn with_sample(mut self, position: f64, captured_at_ms: i64) -> Self {
        self.position = position;
        self.captured_at_ms = captured_at_ms;
        self
    }

    /// Authoritative playback position (seconds) at wall-clock `now_ms`.
    ///
    /// Only advances while playing; a stopped timeline stays where it was sampled.
    pub fn target_position(&self, now_ms: i64) -> f64 {
        if !self.is_playing {
            return self.position;
        }
        let elapsed = (now_ms - self.captured_at_ms) as f64 / 1000.0;
        (self.position + elapsed).max(0.0)
    }

    /// The fields whose change forces an immediate broadcast.
    pub fn identity(&self) -> (bool, Option<&str>, Option<&str>) {
        (
            self.is_playing,
            self.current_sequence.as_deref(),
            self.audio_file.as_deref(),
        )
    }
}

/// Wall-clock source, injectable so timing logic can be tested deterministically.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        unix_millis(OffsetDateTime::now_utc())
    }
}

pub fn unix_millis(t: OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000_000) as i64
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_position_adds_elapsed_time() {
        // Sampled at 12.0s on the device, listener asks three seconds later.
        let t = 1_700_000_000_000;
        let state = TimelineState {
            is_playing: true,
            current_sequence: Some("Carol.seq".into()),
            audio_file: Some("carol.mp3".into()),
            position: 12.0,
            captured_at_ms: t,
        };
        assert!((state.target_position(t + 3000) - 15.0).abs() < 1e-9);
    }

    #[test]
    fn stopped_timeline_does_not_advance() {
        let state = TimelineState::idle(0).with_sample(42.0, 0);
        assert_eq!(state.target_position(60_000), 42.0);
    }

    #[test]
    fn wire_format_uses_camel_case() {
        let state = TimelineState::idle(5).with_sample(1.5, 10);
        let v = serde_json::to_value(&state).unwrap();
        assert_eq!(v["isPlaying"], false);
        assert_eq!(v["currentSequence"], serde_json::Value::Null);
        assert_eq!(v["audioFile"], serde_json::Value::Null);
        assert_eq!(v["position"], 1.5);
        assert_eq!(v["capturedAt"], 10);
    }
}
