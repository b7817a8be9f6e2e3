/// Collaborator traits for Couch Player
///
/// The playback controller never talks to storage, catalogs, or the media
/// engine directly; it goes through these traits so that platforms (and
/// tests) can plug in their own implementations.
use crate::error::Result;
use crate::types::{ContentId, MediaSource, ResumePoint, TrackDescriptor, TrackKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Persisted playback positions, keyed by canonical content id
#[async_trait]
pub trait ResumeStore: Send + Sync {
    /// Get the last saved position for a title
    async fn get_resume_point(&self, content_id: &ContentId) -> Result<Option<ResumePoint>>;

    /// Save (replace) the position for a title
    ///
    /// # Errors
    /// Returns an error if the point could not be persisted. Callers are
    /// expected to retry; a failed write never affects playback.
    async fn save_resume_point(&self, point: ResumePoint) -> Result<()>;
}

/// Persisted favorite flags, keyed by canonical content id
#[async_trait]
pub trait FavoriteStore: Send + Sync {
    /// Whether the title is marked as favorite
    async fn is_favorite(&self, content_id: &ContentId) -> Result<bool>;

    /// Mark or unmark the title as favorite
    async fn set_favorite(&self, content_id: &ContentId, favorite: bool) -> Result<()>;
}

/// Catalog lookups needed during playback
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Resolve the unit that plays after `current` (next episode, next item)
    ///
    /// Returns `None` when `current` is the last unit.
    async fn next_unit(&self, current: &ContentId) -> Result<Option<MediaSource>>;

    /// All playable versions of a title
    ///
    /// Catalogs without version information return an empty list.
    async fn versions(&self, content_id: &ContentId) -> Result<Vec<MediaSource>> {
        let _ = content_id;
        Ok(Vec::new())
    }
}

/// What the engine reports once a source is ready to play
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadedMedia {
    /// Total duration, `None` for live or unknown-length media
    pub duration: Option<Duration>,

    /// Available audio tracks
    pub audio_tracks: Vec<TrackDescriptor>,

    /// Available subtitle tracks
    pub subtitle_tracks: Vec<TrackDescriptor>,
}

impl LoadedMedia {
    /// Tracks of the given kind
    pub fn tracks(&self, kind: TrackKind) -> &[TrackDescriptor] {
        match kind {
            TrackKind::Audio => &self.audio_tracks,
            TrackKind::Subtitle => &self.subtitle_tracks,
        }
    }
}

/// Media engine binding
///
/// The engine owns decoding and rendering. The controller drives it through
/// these primitives and polls `position()` at its tick cadence. Exactly one
/// source is bound at a time; `load` replaces the current binding.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Load a source and prepare it at `start`
    ///
    /// Resolves once the engine is ready to play. The engine stays paused
    /// after loading.
    ///
    /// # Errors
    /// Returns an error if the source cannot be opened.
    async fn load(&self, source: &MediaSource, start: Duration) -> Result<LoadedMedia>;

    /// Release the current binding
    async fn unload(&self) -> Result<()>;

    /// Start or resume playback
    async fn play(&self) -> Result<()>;

    /// Pause playback
    async fn pause(&self) -> Result<()>;

    /// Seek to an absolute position
    async fn seek(&self, position: Duration) -> Result<()>;

    /// Select a track of the given kind (`None` disables subtitles)
    async fn set_track(&self, kind: TrackKind, index: Option<usize>) -> Result<()>;

    /// Apply a delay offset to the given kind, in milliseconds
    async fn set_delay(&self, kind: TrackKind, delay_ms: i32) -> Result<()>;

    /// Current playback position
    async fn position(&self) -> Result<Duration>;
}
