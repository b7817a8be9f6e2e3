/// Resume point types
use super::ids::ContentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Last saved playback position for a title
///
/// Keyed by canonical content id, never by version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumePoint {
    /// Content this position belongs to
    pub content_id: ContentId,

    /// Saved position, never beyond `duration` when the duration was known
    pub position: Duration,

    /// Duration known at capture time
    pub duration: Option<Duration>,

    /// When the position was captured
    pub captured_at: DateTime<Utc>,
}

impl ResumePoint {
    /// Capture a resume point now
    ///
    /// The position is clamped to `duration` when a duration is known.
    pub fn capture(content_id: ContentId, position: Duration, duration: Option<Duration>) -> Self {
        let position = match duration {
            Some(duration) => position.min(duration),
            None => position,
        };

        Self {
            content_id,
            position,
            duration,
            captured_at: Utc::now(),
        }
    }

    /// Fraction of the title already watched, if the duration is known
    pub fn progress(&self) -> Option<f64> {
        self.duration
            .filter(|d| !d.is_zero())
            .map(|d| self.position.as_secs_f64() / d.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_clamps_to_duration() {
        let point = ResumePoint::capture(
            ContentId::new("pilot"),
            Duration::from_secs(4000),
            Some(Duration::from_secs(3600)),
        );
        assert_eq!(point.position, Duration::from_secs(3600));
    }

    #[test]
    fn capture_without_duration_keeps_position() {
        let point = ResumePoint::capture(ContentId::new("live"), Duration::from_secs(42), None);
        assert_eq!(point.position, Duration::from_secs(42));
        assert_eq!(point.progress(), None);
    }

    #[test]
    fn progress_is_fraction_of_duration() {
        let point = ResumePoint::capture(
            ContentId::new("pilot"),
            Duration::from_secs(900),
            Some(Duration::from_secs(3600)),
        );
        let progress = point.progress().unwrap();
        assert!((progress - 0.25).abs() < 1e-9);
    }
}
