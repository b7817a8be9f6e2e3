//! Media library for the TV front end
//!
//! A library file is a JSON array of titles. Each title carries the catalog
//! fields plus what the simulated engine reports once a version is loaded:
//!
//! ```json
//! [
//!   {
//!     "content_id": "s01e01",
//!     "title": "Pilot",
//!     "versions": [
//!       {"id": "s01e01-hd", "content_id": "s01e01", "locator": "file:///media/s01e01-hd.mkv", "quality": "1080p"}
//!     ],
//!     "next": "s01e02",
//!     "duration_secs": 1500,
//!     "audio": ["English"],
//!     "subtitles": ["English", "Spanish"]
//!   }
//! ]
//! ```

use crate::error::{Result, TvError};
use couch_core::{
    CatalogEntry, ContentId, LoadedMedia, MediaSource, MemoryCatalog, SourceId, TrackDescriptor,
    TrackKind,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryTitle {
    #[serde(flatten)]
    pub entry: CatalogEntry,

    /// Running time; unknown when absent
    #[serde(default)]
    pub duration_secs: Option<u64>,

    #[serde(default)]
    pub audio: Vec<String>,

    #[serde(default)]
    pub subtitles: Vec<String>,
}

impl LibraryTitle {
    fn media(&self) -> LoadedMedia {
        LoadedMedia {
            duration: self.duration_secs.map(Duration::from_secs),
            audio_tracks: TrackDescriptor::list(TrackKind::Audio, &self.audio),
            subtitle_tracks: TrackDescriptor::list(TrackKind::Subtitle, &self.subtitles),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Library {
    titles: Vec<LibraryTitle>,
}

impl Library {
    /// Read a library file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let titles: Vec<LibraryTitle> = serde_json::from_str(json)?;
        Self::new(titles)
    }

    pub fn new(titles: Vec<LibraryTitle>) -> Result<Self> {
        for title in &titles {
            let id = &title.entry.content_id;
            if title.entry.versions.is_empty() {
                return Err(TvError::Config(format!(
                    "title {} has no playable versions",
                    id
                )));
            }
            if let Some(stray) = title.entry.versions.iter().find(|v| &v.content_id != id) {
                return Err(TvError::Config(format!(
                    "version {} is listed under {} but belongs to {}",
                    stray.id, id, stray.content_id
                )));
            }
        }
        Ok(Self { titles })
    }

    /// Built-in two-episode series used when no library file is configured
    pub fn demo() -> Self {
        let pilot = ContentId::new("s01e01");
        let second = ContentId::new("s01e02");
        let languages = vec!["English".to_string(), "Spanish".to_string()];

        let titles = vec![
            LibraryTitle {
                entry: CatalogEntry {
                    content_id: pilot.clone(),
                    title: "Pilot".to_string(),
                    versions: vec![
                        MediaSource::new("s01e01-hd", pilot.clone(), "file:///media/s01e01-hd.mkv")
                            .with_title("Pilot")
                            .with_quality("1080p"),
                        MediaSource::new("s01e01-sd", pilot, "file:///media/s01e01-sd.mkv")
                            .with_title("Pilot")
                            .with_quality("480p"),
                    ],
                    next: Some(second.clone()),
                },
                duration_secs: Some(22 * 60),
                audio: languages.clone(),
                subtitles: languages.clone(),
            },
            LibraryTitle {
                entry: CatalogEntry {
                    content_id: second.clone(),
                    title: "The Second One".to_string(),
                    versions: vec![MediaSource::new(
                        "s01e02-hd",
                        second,
                        "file:///media/s01e02-hd.mkv",
                    )
                    .with_title("The Second One")
                    .with_quality("1080p")],
                    next: None,
                },
                duration_secs: Some(21 * 60),
                audio: languages.clone(),
                subtitles: languages,
            },
        ];

        Self { titles }
    }

    pub fn titles(&self) -> &[LibraryTitle] {
        &self.titles
    }

    /// Look up a title by content id or by one of its version ids
    pub fn find(&self, id: &str) -> Option<&MediaSource> {
        let content = ContentId::new(id);
        let source = SourceId::new(id);
        self.titles.iter().find_map(|t| {
            if t.entry.content_id == content {
                t.entry.default_source()
            } else {
                t.entry.versions.iter().find(|v| v.id == source)
            }
        })
    }

    /// Catalog for next-unit and version lookups
    pub fn catalog(&self) -> MemoryCatalog {
        MemoryCatalog::new(self.titles.iter().map(|t| t.entry.clone()).collect())
    }

    /// What the engine reports per version once loaded
    pub fn media(&self) -> HashMap<SourceId, LoadedMedia> {
        self.titles
            .iter()
            .flat_map(|t| {
                let media = t.media();
                t.entry
                    .versions
                    .iter()
                    .map(move |v| (v.id.clone(), media.clone()))
            })
            .collect()
    }
}
