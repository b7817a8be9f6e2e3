//! Resume point resolution
//!
//! Decides where a title starts when no explicit position was requested.

use crate::types::PlaybackConfig;
use couch_core::{ContentId, ResumePoint, ResumeStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Reads saved positions and applies the resume rules
///
/// A saved position is used only if it is at least `min_position` and
/// below `max_fraction` of the duration known at capture time. Anything
/// else starts from the beginning.
#[derive(Clone)]
pub struct ResumeResolver {
    store: Arc<dyn ResumeStore>,
    min_position: Duration,
    max_fraction: f64,
}

impl ResumeResolver {
    /// Create a resolver over a store
    pub fn new(store: Arc<dyn ResumeStore>, config: &PlaybackConfig) -> Self {
        Self {
            store,
            min_position: Duration::from_secs(config.resume_min_secs),
            max_fraction: config.resume_max_fraction,
        }
    }

    /// Position to start `content_id` at, `None` meaning the beginning
    ///
    /// Lookup failures are logged and treated as "no resume point".
    pub async fn resolve(&self, content_id: &ContentId) -> Option<Duration> {
        match self.store.get_resume_point(content_id).await {
            Ok(Some(point)) => {
                let position = self.evaluate(&point);
                debug!(%content_id, saved = ?point.position, ?position, "Resume point evaluated");
                position
            }
            Ok(None) => None,
            Err(e) => {
                warn!(%content_id, "Resume lookup failed: {}", e);
                None
            }
        }
    }

    /// Apply the resume rules to a saved point
    pub fn evaluate(&self, point: &ResumePoint) -> Option<Duration> {
        if point.position < self.min_position {
            return None;
        }

        if let Some(progress) = point.progress() {
            if progress >= self.max_fraction {
                return None;
            }
        }

        Some(point.position)
    }

    /// Capture the current position of a title
    pub fn capture(
        &self,
        content_id: &ContentId,
        position: Duration,
        duration: Option<Duration>,
    ) -> ResumePoint {
        ResumePoint::capture(content_id.clone(), position, duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use couch_core::MemoryResumeStore;

    const HOUR: Duration = Duration::from_secs(3600);

    fn resolver(store: Arc<MemoryResumeStore>) -> ResumeResolver {
        ResumeResolver::new(store, &PlaybackConfig::default())
    }

    #[tokio::test]
    async fn uses_saved_position_mid_title() {
        let store = Arc::new(MemoryResumeStore::new());
        store.insert(ResumePoint::capture(
            ContentId::new("a"),
            Duration::from_secs(1200),
            Some(HOUR),
        ));

        let start = resolver(store).resolve(&ContentId::new("a")).await;
        assert_eq!(start, Some(Duration::from_secs(1200)));
    }

    #[tokio::test]
    async fn missing_point_starts_at_beginning() {
        let store = Arc::new(MemoryResumeStore::new());
        assert_eq!(resolver(store).resolve(&ContentId::new("a")).await, None);
    }

    #[test]
    fn ignores_positions_near_start_or_end() {
        let resolver = resolver(Arc::new(MemoryResumeStore::new()));
        let id = ContentId::new("a");

        let early = ResumePoint::capture(id.clone(), Duration::from_secs(3), Some(HOUR));
        assert_eq!(resolver.evaluate(&early), None);

        let finished = ResumePoint::capture(id.clone(), Duration::from_secs(3500), Some(HOUR));
        assert_eq!(resolver.evaluate(&finished), None);

        let unknown_length = ResumePoint::capture(id, Duration::from_secs(3500), None);
        assert_eq!(resolver.evaluate(&unknown_length), Some(Duration::from_secs(3500)));
    }
}
