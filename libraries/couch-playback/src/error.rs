//! Error types for the playback session controller

use couch_core::CouchError;
use thiserror::Error;

/// Playback errors
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The requested source cannot be resolved or loaded
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// Track or delay request rejected (out of range, unknown kind)
    #[error("Track unavailable: {0}")]
    TrackUnavailable(String),

    /// Persisting a resume point or favorite failed
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// Operation not valid in the current session state
    #[error("{operation} not allowed while {state}")]
    NotAllowed {
        /// Requested operation
        operation: &'static str,
        /// Session state at the time of the request
        state: String,
    },

    /// Invalid operation
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// No session is active
    #[error("No active session")]
    NoSession,

    /// The controller task has stopped
    #[error("Session controller is gone")]
    ControllerGone,
}

impl PlaybackError {
    /// Whether the error ends the session in the `Error` state
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SourceUnavailable(_))
    }
}

impl From<CouchError> for PlaybackError {
    fn from(err: CouchError) -> Self {
        match err {
            CouchError::Storage(msg) => Self::Persistence(msg),
            CouchError::Engine(msg) | CouchError::Network(msg) => Self::SourceUnavailable(msg),
            not_found @ CouchError::NotFound { .. } => Self::SourceUnavailable(not_found.to_string()),
            CouchError::InvalidInput(msg) => Self::InvalidOperation(msg),
            other => Self::InvalidOperation(other.to_string()),
        }
    }
}

/// Result type for playback operations
pub type Result<T> = std::result::Result<T, PlaybackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_onto_taxonomy() {
        let err: PlaybackError = CouchError::storage("disk full").into();
        assert!(matches!(err, PlaybackError::Persistence(_)));

        let err: PlaybackError = CouchError::engine("codec").into();
        assert!(err.is_fatal());

        let err: PlaybackError = CouchError::not_found("Title", "x").into();
        assert_eq!(err.to_string(), "Source unavailable: Title not found: x");
    }

    #[test]
    fn not_allowed_names_operation_and_state() {
        let err = PlaybackError::NotAllowed {
            operation: "toggle_play_pause",
            state: "resolving".to_string(),
        };
        assert_eq!(err.to_string(), "toggle_play_pause not allowed while resolving");
        assert!(!err.is_fatal());
    }
}
