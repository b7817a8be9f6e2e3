//! Playable sources and their tracks

use super::ids::{ContentId, SourceId};
use serde::{Deserialize, Serialize};

/// A playable version of a title
///
/// Several sources can share one `content_id` (e.g. 720p/1080p, dubbed/original).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSource {
    /// Version identifier
    pub id: SourceId,

    /// Canonical content this version belongs to
    pub content_id: ContentId,

    /// URL or absolute path the engine loads
    pub locator: String,

    /// Display title
    #[serde(default)]
    pub title: String,

    /// Quality label ("1080p", "4K HDR", ...)
    #[serde(default)]
    pub quality: Option<String>,

    /// Language label ("en", "de", ...)
    #[serde(default)]
    pub language: Option<String>,
}

impl MediaSource {
    /// Create a source with no quality/language labels
    pub fn new(id: impl Into<String>, content_id: ContentId, locator: impl Into<String>) -> Self {
        Self {
            id: SourceId::new(id),
            content_id,
            locator: locator.into(),
            title: String::new(),
            quality: None,
            language: None,
        }
    }

    /// Set the display title
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the quality label
    #[must_use]
    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = Some(quality.into());
        self
    }

    /// Set the language label
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Whether both sources are versions of the same title
    pub fn is_version_of(&self, other: &MediaSource) -> bool {
        self.content_id == other.content_id
    }

    /// Human-readable version label, e.g. "1080p / en"
    pub fn version_label(&self) -> String {
        match (&self.quality, &self.language) {
            (Some(q), Some(l)) => format!("{} / {}", q, l),
            (Some(q), None) => q.clone(),
            (None, Some(l)) => l.clone(),
            (None, None) => self.id.to_string(),
        }
    }
}

/// Kind of a selectable track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    /// Audio track
    Audio,
    /// Subtitle track
    Subtitle,
}

impl TrackKind {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Subtitle => "subtitle",
        }
    }
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audio or subtitle track reported by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    /// Display label ("English 5.1", "Deutsch (SDH)")
    pub label: String,

    /// Audio or subtitle
    pub kind: TrackKind,

    /// Index within tracks of the same kind
    pub index: usize,

    /// Delay offset applied to this kind, in milliseconds
    #[serde(default)]
    pub delay_ms: i32,
}

impl TrackDescriptor {
    /// Create a track with zero delay
    pub fn new(kind: TrackKind, index: usize, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind,
            index,
            delay_ms: 0,
        }
    }

    /// Build an indexed track list from labels
    pub fn list<S: AsRef<str>>(kind: TrackKind, labels: &[S]) -> Vec<Self> {
        labels
            .iter()
            .enumerate()
            .map(|(index, label)| Self::new(kind, index, label.as_ref()))
            .collect()
    }
}
