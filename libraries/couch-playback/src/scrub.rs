//! Scrub-to-seek translation
//!
//! Converts a horizontal drag into a preview position without touching the
//! engine. Only `commit` produces a seek target.

use crate::error::{PlaybackError, Result};
use std::time::Duration;

/// What a touch-surface drag should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureIntent {
    /// Horizontal drag, enter scrubbing
    Scrub,
    /// Vertical (or diagonal tie) drag, open the transport overlay
    OpenOverlay,
}

/// In-progress drag
#[derive(Debug, Clone, PartialEq)]
pub struct ScrubGesture {
    /// Position when the drag began
    pub origin: Duration,

    /// Total duration the drag is scaled against
    pub duration: Duration,

    /// Cumulative horizontal translation since the drag began
    pub raw_delta_pixels: f64,

    /// Width of the touch surface
    pub screen_width: f64,

    /// Position the display shows while dragging
    pub preview: Duration,
}

/// Scrub state for the active session
#[derive(Debug, Clone)]
pub struct ScrubController {
    sensitivity: f64,
    gesture: Option<ScrubGesture>,
}

impl ScrubController {
    /// Create a controller with the given delta multiplier
    pub fn new(sensitivity: f64) -> Self {
        Self {
            sensitivity,
            gesture: None,
        }
    }

    /// Decide whether a drag is a scrub
    ///
    /// Horizontal must strictly dominate; a tie opens the overlay.
    pub fn classify(dx: f64, dy: f64) -> GestureIntent {
        if dx.abs() > dy.abs() {
            GestureIntent::Scrub
        } else {
            GestureIntent::OpenOverlay
        }
    }

    /// Start a gesture at `origin`
    ///
    /// Returns the initial preview (the origin clamped to the duration).
    pub fn begin(&mut self, origin: Duration, duration: Duration) -> Duration {
        let origin = origin.min(duration);
        self.gesture = Some(ScrubGesture {
            origin,
            duration,
            raw_delta_pixels: 0.0,
            screen_width: 0.0,
            preview: origin,
        });
        origin
    }

    /// Update the preview from the cumulative drag
    ///
    /// `delta_pixels / screen_width` of the surface maps to the same fraction
    /// of the duration (times sensitivity), clamped to `[0, duration]`.
    pub fn update(&mut self, delta_pixels: f64, screen_width: f64) -> Result<Duration> {
        if !(screen_width.is_finite() && screen_width > 0.0) {
            return Err(PlaybackError::InvalidOperation(format!(
                "screen width must be positive, got {}",
                screen_width
            )));
        }
        if !delta_pixels.is_finite() {
            return Err(PlaybackError::InvalidOperation(
                "scrub delta must be finite".to_string(),
            ));
        }

        let sensitivity = self.sensitivity;
        let gesture = self
            .gesture
            .as_mut()
            .ok_or_else(|| PlaybackError::InvalidOperation("no scrub in progress".to_string()))?;

        let total = gesture.duration.as_secs_f64();
        let offset = delta_pixels / screen_width * total * sensitivity;
        let target = (gesture.origin.as_secs_f64() + offset).clamp(0.0, total);

        gesture.raw_delta_pixels = delta_pixels;
        gesture.screen_width = screen_width;
        gesture.preview = Duration::from_secs_f64(target).min(gesture.duration);

        Ok(gesture.preview)
    }

    /// Finish the gesture, returning the single seek target
    pub fn commit(&mut self) -> Option<Duration> {
        self.gesture.take().map(|g| g.preview)
    }

    /// Drop the gesture without seeking
    ///
    /// Returns `true` if a gesture was in progress.
    pub fn discard(&mut self) -> bool {
        self.gesture.take().is_some()
    }

    /// Current preview position
    pub fn preview(&self) -> Option<Duration> {
        self.gesture.as_ref().map(|g| g.preview)
    }

    /// The in-progress gesture
    pub fn gesture(&self) -> Option<&ScrubGesture> {
        self.gesture.as_ref()
    }

    /// Whether a drag is in progress
    pub fn is_active(&self) -> bool {
        self.gesture.is_some()
    }
}
