//! Background persistence
//!
//! Resume points and favorite flags are written by a single task, in the
//! order they were submitted. Failed writes are retried with exponential
//! backoff and finally dropped with a warning; they never reach the session.

use crate::types::PlaybackConfig;
use couch_core::{ContentId, FavoriteStore, ResumePoint, ResumeStore};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Retry schedule for persistence writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per write, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Build the policy from controller config
    pub fn from_config(config: &PlaybackConfig) -> Self {
        Self {
            max_attempts: config.persistence_max_attempts.max(1),
            initial_delay: Duration::from_millis(config.persistence_initial_backoff_ms),
            max_delay: Duration::from_millis(config.persistence_max_backoff_ms),
        }
    }

    /// Delay after the given failed attempt (1-based), before jitter
    ///
    /// Doubles from `initial_delay` and is capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Backoff plus up to 10% random jitter
    fn jittered(&self, attempt: u32) -> Duration {
        let base = self.backoff(attempt);
        let spread = (base.as_millis() / 10) as u64;
        let jitter = if spread == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=spread)
        };
        base + Duration::from_millis(jitter)
    }
}

#[derive(Debug)]
enum WriteJob {
    Resume(ResumePoint),
    Favorite {
        content_id: ContentId,
        favorite: bool,
    },
}

impl WriteJob {
    fn describe(&self) -> String {
        match self {
            Self::Resume(point) => format!("resume point for {}", point.content_id),
            Self::Favorite { content_id, .. } => format!("favorite for {}", content_id),
        }
    }
}

/// Ordered writer for resume points and favorites
#[derive(Debug)]
pub struct BackgroundWriter {
    tx: mpsc::UnboundedSender<WriteJob>,
    handle: JoinHandle<()>,
}

impl BackgroundWriter {
    /// Spawn the writer task
    ///
    /// The task drains outstanding writes and exits once the writer is dropped.
    pub fn spawn(
        resume: Arc<dyn ResumeStore>,
        favorites: Arc<dyn FavoriteStore>,
        policy: RetryPolicy,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<WriteJob>();

        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                write_with_retry(resume.as_ref(), favorites.as_ref(), &policy, job).await;
            }
            debug!("Background writer stopped");
        });

        Self { tx, handle }
    }

    /// Queue a resume point write
    pub fn save_resume(&self, point: ResumePoint) {
        self.submit(WriteJob::Resume(point));
    }

    /// Queue a favorite write
    pub fn set_favorite(&self, content_id: ContentId, favorite: bool) {
        self.submit(WriteJob::Favorite {
            content_id,
            favorite,
        });
    }

    /// Whether the writer task has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    fn submit(&self, job: WriteJob) {
        if let Err(e) = self.tx.send(job) {
            warn!("Background writer is gone, dropping {}", e.0.describe());
        }
    }
}

async fn write_with_retry(
    resume: &dyn ResumeStore,
    favorites: &dyn FavoriteStore,
    policy: &RetryPolicy,
    job: WriteJob,
) {
    for attempt in 1..=policy.max_attempts {
        let result = match &job {
            WriteJob::Resume(point) => resume.save_resume_point(point.clone()).await,
            WriteJob::Favorite {
                content_id,
                favorite,
            } => favorites.set_favorite(content_id, *favorite).await,
        };

        match result {
            Ok(()) => {
                debug!(attempt, "Persisted {}", job.describe());
                return;
            }
            Err(e) if attempt < policy.max_attempts => {
                let delay = policy.jittered(attempt);
                warn!(
                    attempt,
                    "Failed to persist {}: {}. Retrying in {:?}",
                    job.describe(),
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                warn!(
                    attempt,
                    "Giving up on {} after {} attempts: {}",
                    job.describe(),
                    policy.max_attempts,
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use couch_core::{MemoryFavoriteStore, MemoryResumeStore};

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(4), Duration::from_millis(800));
        assert_eq!(policy.backoff(10), Duration::from_secs(5));
        assert_eq!(policy.backoff(40), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        let policy = RetryPolicy::default();
        for attempt in 1..8 {
            let base = policy.backoff(attempt);
            let delay = policy.jittered(attempt);
            assert!(delay >= base);
            assert!(delay <= base + base / 10);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_writes_are_retried_until_they_succeed() {
        let resume = Arc::new(MemoryResumeStore::new());
        let favorites = Arc::new(MemoryFavoriteStore::new());
        resume.fail_next_writes(2);

        let writer = BackgroundWriter::spawn(resume.clone(), favorites, RetryPolicy::default());
        writer.save_resume(ResumePoint::capture(
            ContentId::new("pilot"),
            Duration::from_secs(90),
            None,
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(resume.write_count(), 1);
        let point = resume.get(&ContentId::new("pilot")).unwrap();
        assert_eq!(point.position, Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn writes_apply_in_submission_order() {
        let resume = Arc::new(MemoryResumeStore::new());
        let favorites = Arc::new(MemoryFavoriteStore::new());
        favorites.fail_next_writes(1);

        let writer = BackgroundWriter::spawn(resume, favorites.clone(), RetryPolicy::default());
        let id = ContentId::new("pilot");
        writer.set_favorite(id.clone(), true);
        writer.set_favorite(id.clone(), false);

        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(favorites.write_count(), 2);
        assert!(!favorites.contains(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let resume = Arc::new(MemoryResumeStore::new());
        let favorites = Arc::new(MemoryFavoriteStore::new());
        resume.fail_next_writes(10);

        let policy = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        };
        let writer = BackgroundWriter::spawn(resume.clone(), favorites, policy);
        writer.save_resume(ResumePoint::capture(ContentId::new("a"), Duration::from_secs(9), None));

        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(resume.write_count(), 0);
        assert!(!writer.is_finished());
    }
}
