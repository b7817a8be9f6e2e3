//! Simulated media engine
//!
//! Stands in for a platform player: buffering takes a configurable delay,
//! and the position advances with the tokio clock while playing.

use async_trait::async_trait;
use couch_core::{CouchError, LoadedMedia, MediaEngine, MediaSource, Result, SourceId, TrackKind};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

struct Bound {
    source: SourceId,
    media: LoadedMedia,
    /// Position when the clock was last anchored
    base: Duration,
    /// Set while playing
    anchor: Option<Instant>,
}

impl Bound {
    fn position(&self) -> Duration {
        let position = match self.anchor {
            Some(anchor) => self.base + anchor.elapsed(),
            None => self.base,
        };
        self.clamp(position)
    }

    fn clamp(&self, position: Duration) -> Duration {
        match self.media.duration {
            Some(duration) => position.min(duration),
            None => position,
        }
    }
}

pub struct SimulatedEngine {
    library: HashMap<SourceId, LoadedMedia>,
    load_delay: Duration,
    bound: Mutex<Option<Bound>>,
}

impl SimulatedEngine {
    pub fn new(library: HashMap<SourceId, LoadedMedia>, load_delay: Duration) -> Self {
        Self {
            library,
            load_delay,
            bound: Mutex::new(None),
        }
    }

    /// Id of the source currently loaded, if any
    pub fn loaded_source(&self) -> Option<SourceId> {
        self.lock().as_ref().map(|b| b.source.clone())
    }

    /// Whether the simulated clock is running
    pub fn is_playing(&self) -> bool {
        self.lock().as_ref().is_some_and(|b| b.anchor.is_some())
    }

    fn lock(&self) -> MutexGuard<'_, Option<Bound>> {
        self.bound.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_bound<T>(&self, f: impl FnOnce(&mut Bound) -> Result<T>) -> Result<T> {
        let mut guard = self.lock();
        match guard.as_mut() {
            Some(bound) => f(bound),
            None => Err(CouchError::engine("no media loaded")),
        }
    }
}

#[async_trait]
impl MediaEngine for SimulatedEngine {
    async fn load(&self, source: &MediaSource, start: Duration) -> Result<LoadedMedia> {
        tokio::time::sleep(self.load_delay).await;

        let media = self
            .library
            .get(&source.id)
            .cloned()
            .ok_or_else(|| CouchError::not_found("source", source.id.as_str()))?;

        let mut bound = Bound {
            source: source.id.clone(),
            media: media.clone(),
            base: Duration::ZERO,
            anchor: None,
        };
        bound.base = bound.clamp(start);

        tracing::debug!("Loaded {} at {:?}", source.id, bound.base);
        *self.lock() = Some(bound);
        Ok(media)
    }

    async fn unload(&self) -> Result<()> {
        if let Some(bound) = self.lock().take() {
            tracing::debug!("Unloaded {}", bound.source);
        }
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        self.with_bound(|bound| {
            if bound.anchor.is_none() {
                bound.anchor = Some(Instant::now());
            }
            Ok(())
        })
    }

    async fn pause(&self) -> Result<()> {
        self.with_bound(|bound| {
            bound.base = bound.position();
            bound.anchor = None;
            Ok(())
        })
    }

    async fn seek(&self, position: Duration) -> Result<()> {
        self.with_bound(|bound| {
            bound.base = bound.clamp(position);
            if bound.anchor.is_some() {
                bound.anchor = Some(Instant::now());
            }
            Ok(())
        })
    }

    async fn set_track(&self, kind: TrackKind, index: Option<usize>) -> Result<()> {
        self.with_bound(|bound| {
            let count = bound.media.tracks(kind).len();
            match index {
                Some(i) if i >= count => Err(CouchError::engine(format!(
                    "{} track {} out of range ({} available)",
                    kind, i, count
                ))),
                None if kind == TrackKind::Audio => {
                    Err(CouchError::engine("audio cannot be disabled"))
                }
                _ => Ok(()),
            }
        })
    }

    async fn set_delay(&self, _kind: TrackKind, _delay_ms: i32) -> Result<()> {
        self.with_bound(|_| Ok(()))
    }

    async fn position(&self) -> Result<Duration> {
        self.with_bound(|bound| Ok(bound.position()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use couch_core::{ContentId, TrackDescriptor};

    fn engine() -> (SimulatedEngine, MediaSource) {
        let source = MediaSource::new("film-hd", ContentId::new("film"), "file:///film.mkv");
        let media = LoadedMedia {
            duration: Some(Duration::from_secs(100)),
            audio_tracks: TrackDescriptor::list(TrackKind::Audio, &["English"]),
            subtitle_tracks: Vec::new(),
        };
        let library = HashMap::from([(source.id.clone(), media)]);
        (
            SimulatedEngine::new(library, Duration::from_millis(200)),
            source,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_advances_only_while_playing() {
        let (engine, source) = engine();
        engine.load(&source, Duration::from_secs(10)).await.unwrap();
        assert_eq!(engine.loaded_source(), Some(source.id.clone()));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(engine.position().await.unwrap(), Duration::from_secs(10));

        engine.play().await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(engine.position().await.unwrap(), Duration::from_secs(15));

        engine.pause().await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(engine.position().await.unwrap(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_position_stops_at_duration() {
        let (engine, source) = engine();
        engine.load(&source, Duration::from_secs(95)).await.unwrap();
        engine.play().await.unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(engine.position().await.unwrap(), Duration::from_secs(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_source_fails_to_load() {
        let (engine, _) = engine();
        let other = MediaSource::new("other", ContentId::new("other"), "file:///other.mkv");
        assert!(matches!(
            engine.load(&other, Duration::ZERO).await,
            Err(CouchError::NotFound { .. })
        ));
        assert!(engine.play().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_range_is_checked() {
        let (engine, source) = engine();
        engine.load(&source, Duration::ZERO).await.unwrap();

        assert!(engine.set_track(TrackKind::Audio, Some(0)).await.is_ok());
        assert!(engine.set_track(TrackKind::Audio, Some(1)).await.is_err());
        assert!(engine.set_track(TrackKind::Audio, None).await.is_err());
        assert!(engine.set_track(TrackKind::Subtitle, None).await.is_ok());
    }
}
