//! Shared helpers for session controller integration tests
//!
//! Tests run with a paused tokio clock; `Fixture::advance` moves time one
//! tick at a time and applies everything the controller's tasks produced.

#![allow(dead_code)]

use async_trait::async_trait;
use couch_core::{
    CatalogEntry, ContentId, CouchError, LoadedMedia, MediaEngine, MediaSource, MemoryCatalog,
    MemoryFavoriteStore, MemoryResumeStore, TrackDescriptor, TrackKind,
};
use couch_playback::{
    NetworkMonitor, PlaybackConfig, SessionController, SessionEvent, Services, SessionState,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

pub const HOUR: Duration = Duration::from_secs(3600);

// ===== Mock Engine =====

/// Calls received by the mock engine, in order
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Load { source: String, start: Duration },
    Unload,
    Play,
    Pause,
    Seek(Duration),
    SetTrack(TrackKind, Option<usize>),
    SetDelay(TrackKind, i32),
}

#[derive(Default)]
struct EngineState {
    media: HashMap<String, LoadedMedia>,
    failing: HashSet<String>,
    gates: HashMap<String, Arc<Notify>>,
    rejected_kinds: Vec<TrackKind>,
    rejected_tracks: Vec<(TrackKind, Option<usize>)>,
    calls: Vec<EngineCall>,
    position: Duration,
}

/// Media engine whose clock only moves when the test says so
#[derive(Default)]
pub struct MockEngine {
    state: Mutex<EngineState>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Media reported when `source_id` loads (otherwise `standard_media()`)
    pub fn set_media(&self, source_id: &str, media: LoadedMedia) {
        self.state().media.insert(source_id.to_string(), media);
    }

    /// Make every load of `source_id` fail
    pub fn fail_source(&self, source_id: &str) {
        self.state().failing.insert(source_id.to_string());
    }

    /// Hold the next load of `source_id` until `release` is called
    pub fn gate(&self, source_id: &str) {
        self.state()
            .gates
            .insert(source_id.to_string(), Arc::new(Notify::new()));
    }

    /// Let a gated load finish
    pub fn release(&self, source_id: &str) {
        if let Some(gate) = self.state().gates.get(source_id) {
            gate.notify_one();
        }
    }

    /// Reject track selections of `kind`
    pub fn reject_tracks(&self, kind: TrackKind) {
        self.state().rejected_kinds.push(kind);
    }

    /// Reject selecting one particular track
    pub fn reject_track(&self, kind: TrackKind, index: Option<usize>) {
        self.state().rejected_tracks.push((kind, index));
    }

    /// Move the playhead
    pub fn set_position(&self, position: Duration) {
        self.state().position = position;
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn seeks(&self) -> Vec<Duration> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::Seek(position) => Some(position),
                _ => None,
            })
            .collect()
    }

    pub fn loads(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::Load { source, .. } => Some(source),
                _ => None,
            })
            .collect()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, EngineState> {
        self.state.lock().unwrap()
    }

    fn record(&self, call: EngineCall) {
        self.state().calls.push(call);
    }
}

#[async_trait]
impl MediaEngine for MockEngine {
    async fn load(&self, source: &MediaSource, start: Duration) -> couch_core::Result<LoadedMedia> {
        let id = source.id.as_str().to_string();
        self.record(EngineCall::Load {
            source: id.clone(),
            start,
        });

        let gate = self.state().gates.get(&id).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
            self.state().gates.remove(&id);
        }

        let mut state = self.state();
        if state.failing.contains(&id) {
            return Err(CouchError::engine(format!("cannot open {}", id)));
        }
        state.position = start;
        Ok(state.media.get(&id).cloned().unwrap_or_else(standard_media))
    }

    async fn unload(&self) -> couch_core::Result<()> {
        self.record(EngineCall::Unload);
        Ok(())
    }

    async fn play(&self) -> couch_core::Result<()> {
        self.record(EngineCall::Play);
        Ok(())
    }

    async fn pause(&self) -> couch_core::Result<()> {
        self.record(EngineCall::Pause);
        Ok(())
    }

    async fn seek(&self, position: Duration) -> couch_core::Result<()> {
        self.record(EngineCall::Seek(position));
        self.state().position = position;
        Ok(())
    }

    async fn set_track(&self, kind: TrackKind, index: Option<usize>) -> couch_core::Result<()> {
        self.record(EngineCall::SetTrack(kind, index));
        let state = self.state();
        if state.rejected_kinds.contains(&kind) || state.rejected_tracks.contains(&(kind, index)) {
            return Err(CouchError::engine(format!("{} track switch failed", kind)));
        }
        Ok(())
    }

    async fn set_delay(&self, kind: TrackKind, delay_ms: i32) -> couch_core::Result<()> {
        self.record(EngineCall::SetDelay(kind, delay_ms));
        Ok(())
    }

    async fn position(&self) -> couch_core::Result<Duration> {
        Ok(self.state().position)
    }
}

/// One hour, two audio tracks, three subtitle tracks
pub fn standard_media() -> LoadedMedia {
    LoadedMedia {
        duration: Some(HOUR),
        audio_tracks: TrackDescriptor::list(TrackKind::Audio, &["English", "French"]),
        subtitle_tracks: TrackDescriptor::list(TrackKind::Subtitle, &["English", "French", "German"]),
    }
}

// ===== Catalog =====

pub fn episode(number: u32, quality: &str) -> MediaSource {
    let content = format!("s01e{:02}", number);
    MediaSource::new(
        format!("{}-{}", content, quality),
        ContentId::new(content.clone()),
        format!("file:///media/{}-{}.mkv", content, quality),
    )
    .with_title(format!("Episode {}", number))
    .with_quality(quality)
}

/// Two episodes; the first has an HD and an SD version and leads to the second
pub fn series() -> MemoryCatalog {
    MemoryCatalog::new(vec![
        CatalogEntry {
            content_id: ContentId::new("s01e01"),
            title: "Episode 1".to_string(),
            versions: vec![episode(1, "hd"), episode(1, "sd")],
            next: Some(ContentId::new("s01e02")),
        },
        CatalogEntry {
            content_id: ContentId::new("s01e02"),
            title: "Episode 2".to_string(),
            versions: vec![episode(2, "hd")],
            next: None,
        },
    ])
}

// ===== Fixture =====

pub struct Fixture {
    pub controller: SessionController,
    pub engine: Arc<MockEngine>,
    pub resume: Arc<MemoryResumeStore>,
    pub favorites: Arc<MemoryFavoriteStore>,
    pub network: NetworkMonitor,
    pub events: broadcast::Receiver<SessionEvent>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(PlaybackConfig::default())
    }

    pub fn with_config(config: PlaybackConfig) -> Self {
        let engine = Arc::new(MockEngine::new());
        let resume = Arc::new(MemoryResumeStore::new());
        let favorites = Arc::new(MemoryFavoriteStore::new());
        let network = NetworkMonitor::new();
        network.start();

        let services = Services::new(
            resume.clone(),
            favorites.clone(),
            Arc::new(series()),
            network.clone(),
        );
        let controller = SessionController::new(config, services, engine.clone()).unwrap();
        let events = controller.subscribe();

        Self {
            controller,
            engine,
            resume,
            favorites,
            network,
            events,
        }
    }

    /// Run spawned tasks until the controller inbox stays empty
    pub async fn settle(&mut self) {
        settle(&mut self.controller).await;
    }

    /// Advance the paused clock one second at a time
    pub async fn advance(&mut self, secs: u64) {
        for _ in 0..secs {
            tokio::time::advance(Duration::from_secs(1)).await;
            self.settle().await;
        }
    }

    /// Open `source` at `start` and wait until it plays
    pub async fn open_playing(&mut self, source: MediaSource, start: Duration) {
        self.controller.open(source, Some(start));
        self.settle().await;
        assert_eq!(*self.controller.state(), SessionState::Playing);
    }

    /// Events received since the last drain
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => events.push(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        events
    }

    /// States entered since the last drain, tagged with their generation
    pub fn drain_states(&mut self) -> Vec<(u64, SessionState)> {
        self.drain_events()
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::StateChanged { generation, to, .. } => Some((generation, to)),
                _ => None,
            })
            .collect()
    }
}

pub async fn settle(controller: &mut SessionController) {
    loop {
        for _ in 0..32 {
            tokio::task::yield_now().await;
        }
        if controller.process_pending() == 0 {
            break;
        }
    }
}
