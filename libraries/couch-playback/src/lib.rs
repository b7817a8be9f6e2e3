//! Couch Player - Playback Session Control
//!
//! Remote-driven playback session controller for Couch Player.
//!
//! This crate provides:
//! - A single-session controller with generation-guarded async results
//! - Resume point resolution (skip near start and near end)
//! - Audio/subtitle track selection with delay offsets
//! - Version (quality/language) switching that preserves position and intent
//! - Relative scrubbing with a preview independent of the engine clock
//! - Autoplay-to-next with a cancellable countdown
//! - Remote key and gesture routing with a single focus owner
//!
//! # Architecture
//!
//! `couch-playback` is platform-agnostic:
//! - The media engine, stores and catalog are `couch-core` traits
//! - One driver task owns every engine call, so engine access is serialized
//! - Resume points and favorites are written by a background writer with retry
//! - Observers read `SessionSnapshot`s and `SessionEvent`s, never shared fields
//!
//! # Example: Open a Session
//!
//! ```rust,no_run
//! use couch_core::{ContentId, MediaEngine, MediaSource, MemoryCatalog};
//! use couch_core::{MemoryFavoriteStore, MemoryResumeStore};
//! use couch_playback::{NetworkMonitor, OpenRequest, PlaybackConfig, Services};
//! use couch_playback::{SessionController, SessionRuntime};
//! use std::sync::Arc;
//!
//! # async fn example(engine: Arc<dyn MediaEngine>) -> couch_playback::Result<()> {
//! let network = NetworkMonitor::new();
//! network.start();
//!
//! let services = Services::new(
//!     Arc::new(MemoryResumeStore::new()),
//!     Arc::new(MemoryFavoriteStore::new()),
//!     Arc::new(MemoryCatalog::default()),
//!     network,
//! );
//!
//! let controller = SessionController::new(PlaybackConfig::default(), services, engine)?;
//! let (session, _task) = SessionRuntime::spawn(controller);
//!
//! let pilot = MediaSource::new("pilot-hd", ContentId::new("pilot"), "file:///media/pilot.mkv");
//! let snapshot = session.open_and_wait(OpenRequest::new(pilot)).await?;
//! println!("{}", snapshot.state);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod autoplay;
mod controller;
mod engine;
mod error;
pub mod events;
mod persistence;
pub mod remote;
mod resume;
mod runtime;
mod scrub;
mod services;
mod tracks;
pub mod types;
mod versions;

// Public exports
pub use autoplay::{AutoplayDecision, AutoplayScheduler, AutoplayStatus, CountdownStep};
pub use controller::SessionController;
pub use engine::LoadTicket;
pub use error::{PlaybackError, Result};
pub use events::{Notice, SessionEvent, SessionSnapshot};
pub use persistence::{BackgroundWriter, RetryPolicy};
pub use remote::{FocusOwner, Navigation, Overlay, RemoteAction, RemoteKey, RemoteRouter};
pub use resume::ResumeResolver;
pub use runtime::{SessionHandle, SessionRuntime};
pub use scrub::{GestureIntent, ScrubController, ScrubGesture};
pub use services::{NetworkMonitor, NetworkStatus, Services};
pub use tracks::{TrackManager, TrackSelection};
pub use types::{
    Generation, OpenRequest, PlayIntent, PlaybackConfig, PlaybackSession, SeekDirection,
    SessionState,
};
pub use versions::{PendingSwitch, SwitchPhase, VersionSwitcher};
