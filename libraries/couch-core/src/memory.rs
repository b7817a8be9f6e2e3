//! In-memory collaborator implementations
//!
//! Used by the TV application's offline mode and by tests. The stores can be
//! told to fail a number of upcoming writes so retry paths can be exercised.

use crate::error::{CouchError, Result};
use crate::traits::{Catalog, FavoriteStore, ResumeStore};
use crate::types::{ContentId, MediaSource, ResumePoint, SourceId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Consume one pending failure, if any
fn take_failure(pending: &AtomicUsize) -> bool {
    pending
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Resume points kept in a map
#[derive(Debug, Default)]
pub struct MemoryResumeStore {
    points: Mutex<HashMap<ContentId, ResumePoint>>,
    failing_writes: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryResumeStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a resume point
    pub fn insert(&self, point: ResumePoint) {
        lock(&self.points).insert(point.content_id.clone(), point);
    }

    /// Read a point without going through the async trait
    pub fn get(&self, content_id: &ContentId) -> Option<ResumePoint> {
        lock(&self.points).get(content_id).cloned()
    }

    /// Make the next `count` writes fail
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResumeStore for MemoryResumeStore {
    async fn get_resume_point(&self, content_id: &ContentId) -> Result<Option<ResumePoint>> {
        Ok(self.get(content_id))
    }

    async fn save_resume_point(&self, point: ResumePoint) -> Result<()> {
        if take_failure(&self.failing_writes) {
            return Err(CouchError::storage(format!(
                "resume write rejected for {}",
                point.content_id
            )));
        }

        self.insert(point);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Favorite flags kept in a set
#[derive(Debug, Default)]
pub struct MemoryFavoriteStore {
    favorites: Mutex<HashSet<ContentId>>,
    failing_writes: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryFavoriteStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the title is currently stored as favorite
    pub fn contains(&self, content_id: &ContentId) -> bool {
        lock(&self.favorites).contains(content_id)
    }

    /// Make the next `count` writes fail
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FavoriteStore for MemoryFavoriteStore {
    async fn is_favorite(&self, content_id: &ContentId) -> Result<bool> {
        Ok(self.contains(content_id))
    }

    async fn set_favorite(&self, content_id: &ContentId, favorite: bool) -> Result<()> {
        if take_failure(&self.failing_writes) {
            return Err(CouchError::storage(format!(
                "favorite write rejected for {}",
                content_id
            )));
        }

        let mut favorites = lock(&self.favorites);
        if favorite {
            favorites.insert(content_id.clone());
        } else {
            favorites.remove(content_id);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// One title in a [`MemoryCatalog`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Canonical content id
    pub content_id: ContentId,

    /// Display title
    pub title: String,

    /// Playable versions, the first one is the default
    pub versions: Vec<MediaSource>,

    /// Unit that plays after this one
    #[serde(default)]
    pub next: Option<ContentId>,
}

impl CatalogEntry {
    /// Default version of the title
    pub fn default_source(&self) -> Option<&MediaSource> {
        self.versions.first()
    }
}

/// Catalog backed by a list of entries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryCatalog {
    entries: Vec<CatalogEntry>,
}

impl MemoryCatalog {
    /// Create a catalog from entries
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// Parse a catalog from a JSON array of entries
    ///
    /// # Errors
    /// Returns an error if the JSON is malformed or an entry has no versions.
    pub fn from_json(json: &str) -> Result<Self> {
        let catalog: Self = serde_json::from_str(json)?;
        if let Some(empty) = catalog.entries.iter().find(|e| e.versions.is_empty()) {
            return Err(CouchError::invalid_input(format!(
                "title {} has no playable versions",
                empty.content_id
            )));
        }
        Ok(catalog)
    }

    /// All entries, in catalog order
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Look up a title
    pub fn entry(&self, content_id: &ContentId) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| &e.content_id == content_id)
    }

    /// Look up a version by its source id
    pub fn source(&self, source_id: &SourceId) -> Option<&MediaSource> {
        self.entries
            .iter()
            .flat_map(|e| e.versions.iter())
            .find(|s| &s.id == source_id)
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn next_unit(&self, current: &ContentId) -> Result<Option<MediaSource>> {
        let next = self
            .entry(current)
            .and_then(|e| e.next.as_ref())
            .and_then(|next| self.entry(next))
            .and_then(CatalogEntry::default_source)
            .cloned();
        Ok(next)
    }

    async fn versions(&self, content_id: &ContentId) -> Result<Vec<MediaSource>> {
        Ok(self
            .entry(content_id)
            .map(|e| e.versions.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn series() -> MemoryCatalog {
        let ep1 = ContentId::new("s01e01");
        let ep2 = ContentId::new("s01e02");
        MemoryCatalog::new(vec![
            CatalogEntry {
                content_id: ep1.clone(),
                title: "Pilot".to_string(),
                versions: vec![
                    MediaSource::new("s01e01-hd", ep1.clone(), "file:///media/s01e01-hd.mkv"),
                    MediaSource::new("s01e01-sd", ep1, "file:///media/s01e01-sd.mkv"),
                ],
                next: Some(ep2.clone()),
            },
            CatalogEntry {
                content_id: ep2.clone(),
                title: "Second".to_string(),
                versions: vec![MediaSource::new("s01e02-hd", ep2, "file:///media/s01e02-hd.mkv")],
                next: None,
            },
        ])
    }

    #[tokio::test]
    async fn next_unit_returns_default_version_of_next_entry() {
        let catalog = series();
        let next = catalog.next_unit(&ContentId::new("s01e01")).await.unwrap();
        assert_eq!(next.unwrap().id.as_str(), "s01e02-hd");

        let last = catalog.next_unit(&ContentId::new("s01e02")).await.unwrap();
        assert!(last.is_none());
    }

    #[tokio::test]
    async fn versions_lists_all_sources_of_title() {
        let catalog = series();
        let versions = catalog.versions(&ContentId::new("s01e01")).await.unwrap();
        assert_eq!(versions.len(), 2);

        let unknown = catalog.versions(&ContentId::new("nope")).await.unwrap();
        assert!(unknown.is_empty());
    }

    #[test]
    fn from_json_rejects_titles_without_versions() {
        let json = r#"[{"content_id": "x", "title": "X", "versions": []}]"#;
        assert!(matches!(
            MemoryCatalog::from_json(json),
            Err(CouchError::InvalidInput(_))
        ));
    }

    #[test]
    fn from_json_parses_entries() {
        let json = r#"[
            {
                "content_id": "movie",
                "title": "Movie",
                "versions": [
                    {"id": "movie-4k", "content_id": "movie", "locator": "https://cdn.example.com/movie.m3u8", "quality": "4K"}
                ]
            }
        ]"#;
        let catalog = MemoryCatalog::from_json(json).unwrap();
        let source = catalog.source(&SourceId::new("movie-4k")).unwrap();
        assert_eq!(source.quality.as_deref(), Some("4K"));
        assert!(catalog.entries()[0].next.is_none());
    }

    #[tokio::test]
    async fn resume_store_fails_requested_writes_then_recovers() {
        let store = MemoryResumeStore::new();
        store.fail_next_writes(1);
        let point = ResumePoint::capture(ContentId::new("a"), Duration::from_secs(30), None);

        assert!(store.save_resume_point(point.clone()).await.is_err());
        assert!(store.save_resume_point(point).await.is_ok());
        assert_eq!(store.write_count(), 1);

        let stored = store.get_resume_point(&ContentId::new("a")).await.unwrap();
        assert_eq!(stored.unwrap().position, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn favorite_store_toggles() {
        let store = MemoryFavoriteStore::new();
        let id = ContentId::new("a");
        assert!(!store.is_favorite(&id).await.unwrap());

        store.set_favorite(&id, true).await.unwrap();
        assert!(store.is_favorite(&id).await.unwrap());

        store.set_favorite(&id, false).await.unwrap();
        assert!(!store.contains(&id));
    }
}
