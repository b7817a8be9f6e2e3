//! Session Events
//!
//! Transition objects broadcast to observers. Observers never mutate the
//! session; they react to events and read `SessionSnapshot`s.
//!
//! Events are emitted at key points:
//! - State changes
//! - Session open/close and resume
//! - Position ticks, seeks and scrub previews
//! - Track, favorite, version and autoplay changes
//! - Non-fatal failures (as notices) and fatal errors

use crate::autoplay::AutoplayDecision;
use crate::tracks::TrackSelection;
use crate::types::{Generation, PlaybackSession, SessionState};
use couch_core::{ContentId, MediaSource, SourceId, TrackDescriptor, TrackKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Events emitted by the session controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Controller state changed
    StateChanged {
        /// Generation the transition belongs to
        generation: Generation,
        /// Previous state
        from: SessionState,
        /// New state
        to: SessionState,
    },

    /// A new session was accepted
    SessionOpened {
        /// Session identifier
        session_id: Uuid,
        /// Generation of the open
        generation: Generation,
        /// Requested version
        source_id: SourceId,
        /// Canonical content id
        content_id: ContentId,
    },

    /// The session was closed or replaced
    SessionClosed {
        /// Session identifier
        session_id: Uuid,
        /// Canonical content id
        content_id: ContentId,
        /// Last known position
        position: Duration,
    },

    /// A saved resume point is being used as the start position
    Resumed {
        /// Canonical content id
        content_id: ContentId,
        /// Start position
        position: Duration,
    },

    /// Position update (once per tick)
    PositionChanged {
        /// Current position
        position: Duration,
        /// Total duration, if known
        duration: Option<Duration>,
    },

    /// A seek was issued to the engine
    Seeked {
        /// Target position
        position: Duration,
    },

    /// Scrub preview moved
    ScrubPreview {
        /// Preview position
        position: Duration,
    },

    /// Track lists or selection changed
    TracksChanged {
        /// New selection
        selection: TrackSelection,
    },

    /// Favorite flag changed (persisted in the background)
    FavoriteChanged {
        /// Canonical content id
        content_id: ContentId,
        /// New flag
        is_favorite: bool,
    },

    /// The session continues on another version
    VersionSwitched {
        /// Version that was playing
        from: SourceId,
        /// Version now playing
        to: SourceId,
        /// Position the new version started at
        position: Duration,
    },

    /// Autoplay prompt appeared, counted down, or went away
    AutoplayChanged {
        /// Current decision, `None` when hidden
        decision: Option<AutoplayDecision>,
    },

    /// Playback reached the end of the title
    ReachedEnd {
        /// Canonical content id
        content_id: ContentId,
    },

    /// Non-fatal failure the UI may show briefly
    Notice(Notice),

    /// Fatal failure, the session is in the `Error` state
    Error {
        /// Error message
        message: String,
    },
}

/// Transient, non-fatal notices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notice {
    /// The engine refused a track selection; the selection falls back to
    /// what the engine holds unless a newer one is on its way
    TrackRejected {
        /// Track kind
        kind: TrackKind,
        /// Engine message
        message: String,
    },

    /// The engine refused a delay offset; handled like `TrackRejected`
    DelayRejected {
        /// Track kind
        kind: TrackKind,
        /// Engine message
        message: String,
    },

    /// A version switch failed; the previous version stays active
    VersionSwitchFailed {
        /// Requested version
        target: SourceId,
        /// Failure reason
        message: String,
    },

    /// A seek failed; playback continues where it was
    SeekFailed {
        /// Engine message
        message: String,
    },
}

/// Read-only view of the controller, published after every transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Latest generation
    pub generation: Generation,

    /// Controller state
    pub state: SessionState,

    /// Active session, if any
    pub session: Option<PlaybackSession>,

    /// Scrub preview while a drag is in progress
    pub preview_position: Option<Duration>,

    /// Audio tracks of the current source
    pub audio_tracks: Vec<TrackDescriptor>,

    /// Subtitle tracks of the current source
    pub subtitle_tracks: Vec<TrackDescriptor>,

    /// Selected tracks and delays
    pub selection: TrackSelection,

    /// Autoplay prompt, if shown
    pub autoplay: Option<AutoplayDecision>,

    /// Versions of the current title
    pub versions: Vec<MediaSource>,

    /// Target of a version switch in flight
    pub switching_to: Option<SourceId>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            generation: 0,
            state: SessionState::Idle,
            session: None,
            preview_position: None,
            audio_tracks: Vec::new(),
            subtitle_tracks: Vec::new(),
            selection: TrackSelection::default(),
            autoplay: None,
            versions: Vec::new(),
            switching_to: None,
        }
    }
}

impl SessionSnapshot {
    /// Position the display should show (preview while scrubbing)
    pub fn display_position(&self) -> Option<Duration> {
        self.preview_position
            .or_else(|| self.session.as_ref().map(|s| s.position))
    }

    /// Id of the bound version
    pub fn source_id(&self) -> Option<&SourceId> {
        self.session.as_ref().map(|s| &s.source.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_snapshot_is_idle() {
        let snapshot = SessionSnapshot::default();
        assert_eq!(snapshot.state, SessionState::Idle);
        assert_eq!(snapshot.display_position(), None);
        assert!(snapshot.source_id().is_none());
    }

    #[test]
    fn events_serialize_for_remote_observers() {
        let event = SessionEvent::StateChanged {
            generation: 2,
            from: SessionState::Buffering,
            to: SessionState::Error {
                message: "boom".to_string(),
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["StateChanged"]["to"]["state"], "error");
        assert_eq!(json["StateChanged"]["to"]["message"], "boom");

        let back: SessionEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
