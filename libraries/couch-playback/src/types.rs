//! Core types for session management

use crate::error::{PlaybackError, Result};
use couch_core::{ContentId, MediaSource};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Monotonic counter identifying one `open()` (or retry) of a session
///
/// Async results carry the generation they were started for; anything
/// tagged with an older generation is discarded.
pub type Generation = u64;

/// Session state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// No source requested
    Idle,

    /// Source requested, resume point and metadata being fetched
    Resolving,

    /// Engine loading at the target position
    Buffering,

    /// Currently playing
    Playing,

    /// Paused mid-title
    Paused,

    /// Drag gesture in progress, display driven by the preview position
    Scrubbing {
        /// Playback intent to return to when the gesture ends
        resume: PlayIntent,
    },

    /// Fatal failure, waiting for retry or close
    Error {
        /// User-visible message
        message: String,
    },

    /// Session closed
    Closed,
}

impl SessionState {
    /// Short lowercase name, used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Resolving => "resolving",
            Self::Buffering => "buffering",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Scrubbing { .. } => "scrubbing",
            Self::Error { .. } => "error",
            Self::Closed => "closed",
        }
    }

    /// Playing or paused with media loaded
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }

    /// Play intent implied by the state, if any
    pub fn intent(&self) -> Option<PlayIntent> {
        match self {
            Self::Playing => Some(PlayIntent::Play),
            Self::Paused => Some(PlayIntent::Pause),
            Self::Scrubbing { resume } => Some(*resume),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether playback should run or hold once media is ready
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayIntent {
    /// Start/keep playing
    Play,
    /// Hold at the current position
    Pause,
}

impl PlayIntent {
    /// Steady state this intent settles into
    pub fn state(self) -> SessionState {
        match self {
            Self::Play => SessionState::Playing,
            Self::Pause => SessionState::Paused,
        }
    }
}

/// Direction of a relative seek
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeekDirection {
    /// Towards the start
    Backward,
    /// Towards the end
    Forward,
}

/// A request to start a new session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRequest {
    /// Version to play
    pub source: MediaSource,

    /// Explicit start position, skips the resume lookup when set
    pub start_position: Option<Duration>,

    /// Hold at the start position instead of playing
    pub start_paused: bool,
}

impl OpenRequest {
    /// Open `source` at its resume point, playing
    pub fn new(source: MediaSource) -> Self {
        Self {
            source,
            start_position: None,
            start_paused: false,
        }
    }

    /// Start at an explicit position
    #[must_use]
    pub fn at(mut self, position: Duration) -> Self {
        self.start_position = Some(position);
        self
    }

    /// Start paused
    #[must_use]
    pub fn paused(mut self) -> Self {
        self.start_paused = true;
        self
    }

    /// Play intent once buffered
    pub fn intent(&self) -> PlayIntent {
        if self.start_paused {
            PlayIntent::Pause
        } else {
            PlayIntent::Play
        }
    }
}

/// The single active playback session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSession {
    /// Fresh per `open()`, unchanged across a version switch
    pub session_id: Uuid,

    /// Generation that created (or last retried) the session
    pub generation: Generation,

    /// Version currently bound to the engine
    pub source: MediaSource,

    /// Mirrors the controller state
    pub state: SessionState,

    /// Last known position
    pub position: Duration,

    /// Unknown until the engine reports it
    pub duration: Option<Duration>,

    /// Always 1.0; rate changes are not supported
    pub playback_rate: f32,

    /// Favorite flag of the canonical content id
    pub is_favorite: bool,
}

impl PlaybackSession {
    /// Create a session in `Resolving` for a source
    pub fn new(generation: Generation, source: MediaSource, position: Option<Duration>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            generation,
            source,
            state: SessionState::Resolving,
            position: position.unwrap_or_default(),
            duration: None,
            playback_rate: 1.0,
            is_favorite: false,
        }
    }

    /// Canonical content id of the playing title
    pub fn content_id(&self) -> &ContentId {
        &self.source.content_id
    }

    /// Clamp a position into `[0, duration]` (no upper bound when unknown)
    pub fn clamp(&self, position: Duration) -> Duration {
        match self.duration {
            Some(duration) => position.min(duration),
            None => position,
        }
    }
}

/// Configuration for the session controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Position tick cadence in milliseconds (default: 1000, at most 1 Hz)
    pub tick_interval_ms: u64,

    /// Relative seek step for directional keys (default: 10s)
    pub seek_step_secs: u64,

    /// Time allowed for the engine to become ready (default: 30s)
    pub buffering_timeout_secs: u64,

    /// Multiplier applied to scrub deltas (default: 1.0)
    pub scrub_sensitivity: f64,

    /// Offer the next unit near the end (default: true)
    pub autoplay_enabled: bool,

    /// Trailing window that arms autoplay (default: 30s)
    pub autoplay_window_secs: u64,

    /// Countdown length (default: 10s)
    pub autoplay_countdown_secs: u32,

    /// Saved positions below this are ignored (default: 5s)
    pub resume_min_secs: u64,

    /// Saved positions at or past this fraction of the duration are ignored (default: 0.95)
    pub resume_max_fraction: f64,

    /// Save the resume point every N ticks while playing (default: 10)
    pub resume_save_every_ticks: u32,

    /// Largest accepted audio/subtitle delay magnitude (default: 10000ms)
    pub max_delay_ms: i32,

    /// Attempts per persistence write (default: 5)
    pub persistence_max_attempts: u32,

    /// First retry delay for persistence writes (default: 100ms)
    pub persistence_initial_backoff_ms: u64,

    /// Retry delay cap for persistence writes (default: 5000ms)
    pub persistence_max_backoff_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            seek_step_secs: 10,
            buffering_timeout_secs: 30,
            scrub_sensitivity: 1.0,
            autoplay_enabled: true,
            autoplay_window_secs: 30,
            autoplay_countdown_secs: 10,
            resume_min_secs: 5,
            resume_max_fraction: 0.95,
            resume_save_every_ticks: 10,
            max_delay_ms: 10_000,
            persistence_max_attempts: 5,
            persistence_initial_backoff_ms: 100,
            persistence_max_backoff_ms: 5_000,
        }
    }
}

impl PlaybackConfig {
    /// Position tick cadence
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Relative seek step
    pub fn seek_step(&self) -> Duration {
        Duration::from_secs(self.seek_step_secs)
    }

    /// Buffering timeout
    pub fn buffering_timeout(&self) -> Duration {
        Duration::from_secs(self.buffering_timeout_secs)
    }

    /// Autoplay trailing window
    pub fn autoplay_window(&self) -> Duration {
        Duration::from_secs(self.autoplay_window_secs)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms < 1000 {
            return Err(PlaybackError::InvalidOperation(format!(
                "tick_interval_ms must be at least 1000, got {}",
                self.tick_interval_ms
            )));
        }

        if !(self.scrub_sensitivity.is_finite() && self.scrub_sensitivity > 0.0) {
            return Err(PlaybackError::InvalidOperation(
                "scrub_sensitivity must be a positive number".to_string(),
            ));
        }

        if !(self.resume_max_fraction > 0.0 && self.resume_max_fraction <= 1.0) {
            return Err(PlaybackError::InvalidOperation(
                "resume_max_fraction must be in (0, 1]".to_string(),
            ));
        }

        if self.autoplay_countdown_secs == 0 {
            return Err(PlaybackError::InvalidOperation(
                "autoplay_countdown_secs must be at least 1".to_string(),
            ));
        }

        if self.max_delay_ms < 0 {
            return Err(PlaybackError::InvalidOperation(
                "max_delay_ms cannot be negative".to_string(),
            ));
        }

        if self.persistence_max_attempts == 0 {
            return Err(PlaybackError::InvalidOperation(
                "persistence_max_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use couch_core::ContentId;

    #[test]
    fn default_config() {
        let config = PlaybackConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.autoplay_window(), Duration::from_secs(30));
        assert_eq!(config.autoplay_countdown_secs, 10);
        assert_eq!(config.max_delay_ms, 10_000);
        assert!(config.autoplay_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn ticks_faster_than_one_hertz_are_rejected() {
        let config = PlaybackConfig {
            tick_interval_ms: 250,
            ..PlaybackConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn session_starts_resolving_at_requested_position() {
        let source = MediaSource::new("a-hd", ContentId::new("a"), "file:///a.mkv");
        let session = PlaybackSession::new(3, source, Some(Duration::from_secs(12)));

        assert_eq!(session.state, SessionState::Resolving);
        assert_eq!(session.position, Duration::from_secs(12));
        assert_eq!(session.playback_rate, 1.0);
        assert_eq!(session.content_id().as_str(), "a");
    }

    #[test]
    fn scrubbing_state_remembers_intent() {
        let state = SessionState::Scrubbing {
            resume: PlayIntent::Pause,
        };
        assert_eq!(state.intent(), Some(PlayIntent::Pause));
        assert_eq!(state.to_string(), "scrubbing");
        assert!(!state.is_active());
    }

    #[test]
    fn open_request_builders() {
        let source = MediaSource::new("a-hd", ContentId::new("a"), "file:///a.mkv");
        let request = OpenRequest::new(source).at(Duration::from_secs(60)).paused();
        assert_eq!(request.start_position, Some(Duration::from_secs(60)));
        assert_eq!(request.intent(), PlayIntent::Pause);
    }
}
