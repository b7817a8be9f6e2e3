//! Couch Player Core
//!
//! Platform-agnostic domain types, collaborator traits, and error handling
//! shared by the playback session controller and the applications built on it.
//!
//! # Architecture
//!
//! The core crate defines:
//! - **Domain Types**: `MediaSource`, `TrackDescriptor`, `ResumePoint`, ids
//! - **Collaborator Traits**: `ResumeStore`, `FavoriteStore`, `Catalog`, `MediaEngine`
//! - **Error Handling**: Unified `CouchError` and `Result` types
//! - **In-memory collaborators** for tests and the reference application
//!
//! # Example
//!
//! ```rust
//! use couch_core::types::{ContentId, MediaSource};
//!
//! let source = MediaSource::new(
//!     "pilot-1080p",
//!     ContentId::new("pilot"),
//!     "https://media.example.com/pilot/1080p.m3u8",
//! )
//! .with_quality("1080p")
//! .with_language("en");
//!
//! assert_eq!(source.content_id.as_str(), "pilot");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod memory;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use error::{CouchError, Result};
pub use memory::{CatalogEntry, MemoryCatalog, MemoryFavoriteStore, MemoryResumeStore};
pub use traits::{Catalog, FavoriteStore, LoadedMedia, MediaEngine, ResumeStore};
pub use types::{ContentId, MediaSource, ResumePoint, SourceId, TrackDescriptor, TrackKind};
