// --- Listener sync controller -----------------------------------------------
//
// Keeps one local media element aligned with the server timeline.
//
//   Idle ──timeline+source──▶ Loading ──ready & allowed──▶ Syncing
//     ▲                          │                           │  ▲
//     └──────not allowed─────────┘           user pause/stop ▼  │ user play
//                                                     ManuallyPaused
//
// Every transition runs on the listener's single task and owns the element,
// so "seek then play" cannot interleave with a correction tick.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::media::MediaElement;
use crate::timeline::{Clock, TimelineState};

pub const IN_SYNC_MS: f64 = 100.0;
pub const SOFT_LIMIT_MS: f64 = 500.0;
pub const HARD_LIMIT_MS: f64 = 2000.0;

pub const SOFT_SLOW_RATE: f64 = 0.97;
pub const SOFT_FAST_RATE: f64 = 1.03;
pub const STRONG_SLOW_RATE: f64 = 0.93;
pub const STRONG_FAST_RATE: f64 = 1.07;

/// Corrections are suspended this long after a hard seek.
pub const SEEK_COOLDOWN_MS: i64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Loading,
    Syncing,
    ManuallyPaused,
}

/// What a correction tick decided to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correction {
    /// Within tolerance; play at normal speed.
    InSync,
    /// Adjust playback rate to close the gap gradually.
    Nudge { rate: f64 },
    /// Too far off to nudge; jump to the target.
    Seek,
}

/// Pick the correction for a signed drift (positive = local is ahead).
pub fn classify_drift(drift_ms: f64) -> Correction {
    let magnitude = drift_ms.abs();
    let ahead = drift_ms > 0.0;
    if magnitude < IN_SYNC_MS {
        Correction::InSync
    } else if magnitude < SOFT_LIMIT_MS {
        Correction::Nudge {
            rate: if ahead { SOFT_SLOW_RATE } else { SOFT_FAST_RATE },
        }
    } else if magnitude < HARD_LIMIT_MS {
        Correction::Nudge {
            rate: if ahead { STRONG_SLOW_RATE } else { STRONG_FAST_RATE },
        }
    } else {
        Correction::Seek
    }
}

/// One drift measurement. Recomputed every tick, never stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncSample {
    pub target_position: f64,
    pub actual_position: f64,
    pub drift_ms: f64,
}

impl SyncSample {
    pub fn measure(target_position: f64, actual_position: f64) -> Self {
        Self {
            target_position,
            actual_position,
            drift_ms: (actual_position - target_position) * 1000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickResult {
    /// Not playing, paused by the user, loading or disconnected.
    Inactive,
    /// A recent hard seek is still settling.
    CoolingDown,
    Corrected {
        sample: SyncSample,
        correction: Correction,
    },
}

pub struct SyncController<E: MediaElement> {
    element: E,
    clock: Arc<dyn Clock>,
    /// Base URL the audio file names are served under, e.g. `http://host/audio`.
    media_base: String,
    timeline: Option<TimelineState>,
    phase: SyncPhase,
    /// The user has pressed play at least once; browsers refuse autoplay before that.
    unlocked: bool,
    connected: bool,
    cooldown_until_ms: Option<i64>,
}

impl<E: MediaElement> SyncController<E> {
    pub fn new(element: E, clock: Arc<dyn Clock>, media_base: impl Into<String>) -> Self {
        Self {
            element,
            clock,
            media_base: media_base.into().trim_end_matches('/').to_string(),
            timeline: None,
            phase: SyncPhase::Idle,
            unlocked: false,
            connected: false,
            cooldown_until_ms: None,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn element(&self) -> &E {
        &self.element
    }

    pub fn element_mut(&mut self) -> &mut E {
        &mut self.element
    }

    pub fn timeline(&self) -> Option<&TimelineState> {
        self.timeline.as_ref()
    }

    /// Apply a timeline update from the push channel. The most recent one wins.
    pub fn on_timeline(&mut self, state: TimelineState) {
        self.connected = true;
        let wanted = match (&state.audio_file, state.is_playing) {
            (Some(file), true) => Some(source_url(&self.media_base, file)),
            _ => None,
        };
        self.timeline = Some(state);

        let Some(wanted) = wanted else {
            if !self.element.is_paused() {
                debug!("timeline stopped, pausing");
                self.element.pause();
            }
            self.element.set_playback_rate(1.0);
            // A load still in flight stays Loading so readiness is picked up later.
            if !matches!(self.phase, SyncPhase::ManuallyPaused | SyncPhase::Loading) {
                self.phase = SyncPhase::Idle;
            }
            return;
        };

        if !same_source(self.element.source(), &wanted) {
            self.load(&wanted);
            if self.element.is_ready() {
                self.on_ready();
            }
            return;
        }

        if !self.element.is_ready() {
            if self.phase != SyncPhase::ManuallyPaused {
                self.phase = SyncPhase::Loading;
            }
            return;
        }
        if self.phase == SyncPhase::Loading {
            self.on_ready();
            return;
        }
        if self.can_autoplay() && self.element.is_paused() {
            self.start_at_target();
        }
    }

    /// The element reports the loaded source can play.
    pub fn on_ready(&mut self) {
        if self.phase != SyncPhase::Loading {
            return;
        }
        if self.can_autoplay() && self.timeline_wants_playback() {
            self.start_at_target();
        } else {
            self.phase = SyncPhase::Idle;
        }
    }

    /// Periodic drift check.
    pub fn on_tick(&mut self) -> TickResult {
        if self.phase == SyncPhase::Loading && self.element.is_ready() {
            self.on_ready();
        }

        let active = self.connected
            && self.phase == SyncPhase::Syncing
            && self.timeline_wants_playback()
            && !self.element.is_paused();
        if !active {
            return TickResult::Inactive;
        }

        let now = self.clock.now_ms();
        if let Some(until) = self.cooldown_until_ms {
            if now < until {
                return TickResult::CoolingDown;
            }
            self.cooldown_until_ms = None;
        }

        let Some(timeline) = &self.timeline else {
            return TickResult::Inactive;
        };
        let sample = SyncSample::measure(timeline.target_position(now), self.element.current_time());
        let correction = classify_drift(sample.drift_ms);

        match correction {
            Correction::InSync => {
                if self.element.playback_rate() != 1.0 {
                    self.element.set_playback_rate(1.0);
                }
            }
            Correction::Nudge { rate } => {
                if self.element.playback_rate() != rate {
                    debug!(drift_ms = sample.drift_ms, rate, "nudging playback rate");
                    self.element.set_playback_rate(rate);
                }
            }
            Correction::Seek => {
                info!(
                    drift_ms = sample.drift_ms,
                    target = sample.target_position,
                    "hard seek"
                );
                self.element.set_playback_rate(1.0);
                self.element.seek(sample.target_position);
                self.cooldown_until_ms = Some(now + SEEK_COOLDOWN_MS);
            }
        }

        TickResult::Corrected { sample, correction }
    }

    /// The user pressed play. Unlocks autoplay and rejoins the timeline.
    pub fn user_play(&mut self) {
        self.unlocked = true;
        if self.phase == SyncPhase::ManuallyPaused {
            self.phase = SyncPhase::Idle;
        }

        let Some(file) = self.playing_file() else {
            return;
        };
        let wanted = source_url(&self.media_base, &file);
        if !same_source(self.element.source(), &wanted) {
            self.load(&wanted);
        } else if !self.element.is_ready() {
            self.phase = SyncPhase::Loading;
        }

        if self.element.is_ready() {
            self.phase = SyncPhase::Loading;
            self.on_ready();
        }
    }

    pub fn user_pause(&mut self) {
        self.element.pause();
        self.element.set_playback_rate(1.0);
        self.cooldown_until_ms = None;
        self.phase = SyncPhase::ManuallyPaused;
    }

    pub fn user_stop(&mut self) {
        self.user_pause();
        self.element.seek(0.0);
    }

    /// The push channel dropped. Local playback continues uncorrected until
    /// the next timeline update arrives.
    pub fn on_disconnected(&mut self) {
        self.connected = false;
        self.cooldown_until_ms = None;
        if self.element.playback_rate() != 1.0 {
            self.element.set_playback_rate(1.0);
        }
    }

    fn load(&mut self, src: &str) {
        info!(src, "loading source");
        self.element.load(src);
        self.element.set_playback_rate(1.0);
        self.cooldown_until_ms = None;
        if self.phase != SyncPhase::ManuallyPaused {
            self.phase = SyncPhase::Loading;
        }
    }

    /// Seek to the current target and start playback as one step.
    fn start_at_target(&mut self) {
        let Some(timeline) = &self.timeline else {
            return;
        };
        let target = timeline.target_position(self.clock.now_ms());
        self.element.set_playback_rate(1.0);
        self.element.seek(target);
        match self.element.play() {
            Ok(()) => {
                debug!(target, "playback started");
                self.phase = SyncPhase::Syncing;
            }
            Err(e) => {
                // Waiting for the next user gesture; retrying would fail the same way.
                warn!("playback rejected: {e}");
                self.unlocked = false;
                self.phase = SyncPhase::Idle;
            }
        }
    }

    fn can_autoplay(&self) -> bool {
        self.unlocked && self.phase != SyncPhase::ManuallyPaused
    }

    fn timeline_wants_playback(&self) -> bool {
        self.timeline
            .as_ref()
            .is_some_and(|t| t.is_playing && t.audio_file.is_some())
    }

    fn playing_file(&self) -> Option<String> {
        self.timeline
            .as_ref()
            .filter(|t| t.is_playing)
            .and_then(|t| t.audio_file.clone())
    }
}

/// URL of an audio asset under `media_base`, each path segment percent-encoded.
pub fn source_url(media_base: &str, audio_file: &str) -> String {
    let path = audio_file
        .split('/')
        .map(|seg| urlencoding::encode(seg).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!("{}/{}", media_base.trim_end_matches('/'), path)
}

/// Decoded asset path of a source URL: the part after `/audio/`, without query.
pub fn media_path(src: &str) -> String {
    let src = src.split(['?', '#']).next().unwrap_or(src);
    let path = match src.rfind("/audio/") {
        Some(i) => &src[i + "/audio/".len()..],
        None => src.rsplit('/').next().unwrap_or(src),
    };
    urlencoding::decode(path)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| path.to_string())
}

fn same_source(current: Option<&str>, wanted: &str) -> bool {
    current.is_some_and(|c| media_path(c) == media_path(wanted))
}
