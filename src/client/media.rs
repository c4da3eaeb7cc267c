use std::sync::Arc;

use crate::{error::PlaybackError, timeline::Clock};

/// The local audio element a listener drives.
///
/// Mirrors the handful of media-element operations the sync controller needs.
/// Implementations are used from one task only.
pub trait MediaElement {
    /// Currently loaded source URL.
    fn source(&self) -> Option<&str>;
    /// Start loading a new source. Playback stops; position resets to zero.
    fn load(&mut self, src: &str);
    /// Whether the loaded source can start playing.
    fn is_ready(&self) -> bool;
    fn current_time(&self) -> f64;
    fn seek(&mut self, seconds: f64);
    fn playback_rate(&self) -> f64;
    fn set_playback_rate(&mut self, rate: f64);
    fn is_paused(&self) -> bool;
    fn play(&mut self) -> Result<(), PlaybackError>;
    fn pause(&mut self);
}

/// A clock-driven playhead with no audio output.
///
/// Used by the headless listener (to measure how well a listener would track
/// the show) and by tests.
pub struct VirtualElement {
    clock: Arc<dyn Clock>,
    source: Option<String>,
    ready: bool,
    hold_loads: bool,
    paused: bool,
    rate: f64,
    anchor_position: f64,
    anchor_ms: i64,
    blocked: Option<PlaybackError>,
}

impl VirtualElement {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_ms();
        Self {
            clock,
            source: None,
            ready: false,
            hold_loads: false,
            paused: true,
            rate: 1.0,
            anchor_position: 0.0,
            anchor_ms: now,
            blocked: None,
        }
    }

    /// Make the next `play()` calls fail, as a browser does before a user gesture.
    pub fn block_playback(&mut self, err: PlaybackError) {
        self.blocked = Some(err);
    }

    pub fn allow_playback(&mut self) {
        self.blocked = None;
    }

    /// Loads complete instantly unless held back; a held load waits for `set_ready`.
    pub fn hold_loads(&mut self, hold: bool) {
        self.hold_loads = hold;
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    fn reanchor(&mut self) {
        let now = self.clock.now_ms();
        self.anchor_position = self.position_at(now);
        self.anchor_ms = now;
    }

    fn position_at(&self, now_ms: i64) -> f64 {
        if self.paused {
            return self.anchor_position;
        }
        let elapsed = (now_ms - self.anchor_ms) as f64 / 1000.0;
        self.anchor_position + elapsed * self.rate
    }
}

impl MediaElement for VirtualElement {
    fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    fn load(&mut self, src: &str) {
        self.source = Some(src.to_string());
        self.ready = !self.hold_loads;
        self.paused = true;
        self.anchor_position = 0.0;
        self.anchor_ms = self.clock.now_ms();
    }

    fn is_ready(&self) -> bool {
        self.source.is_some() && self.ready
    }

    fn current_time(&self) -> f64 {
        self.position_at(self.clock.now_ms())
    }

    fn seek(&mut self, seconds: f64) {
        self.anchor_position = seconds.max(0.0);
        self.anchor_ms = self.clock.now_ms();
    }

    fn playback_rate(&self) -> f64 {
        self.rate
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.reanchor();
        self.rate = rate;
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn play(&mut self) -> Result<(), PlaybackError> {
        if let Some(err) = &self.blocked {
            return Err(err.clone());
        }
        if !self.is_ready() {
            return Err(PlaybackError::Decode("no playable source loaded".into()));
        }
        if self.paused {
            self.anchor_ms = self.clock.now_ms();
            self.paused = false;
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.reanchor();
        self.paused = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::test_clock::ManualClock;

    #[test]
    fn playhead_follows_clock_and_rate() {
        let clock = ManualClock::at(0);
        let mut el = VirtualElement::new(Arc::new(clock.clone()));
        el.load("http://x/audio/a.mp3");
        el.seek(10.0);
        el.play().unwrap();

        clock.advance(1000);
        assert!((el.current_time() - 11.0).abs() < 1e-9);

        el.set_playback_rate(0.5);
        clock.advance(1000);
        assert!((el.current_time() - 11.5).abs() < 1e-9);

        el.pause();
        clock.advance(5000);
        assert!((el.current_time() - 11.5).abs() < 1e-9);
    }

    #[test]
    fn blocked_play_leaves_element_paused() {
        let mut el = VirtualElement::new(Arc::new(ManualClock::at(0)));
        el.load("a.mp3");
        el.block_playback(PlaybackError::NotAllowed("no gesture".into()));
        assert!(el.play().is_err());
        assert!(el.is_paused());
    }
}
