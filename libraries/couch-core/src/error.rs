/// Core error types for Couch Player
use thiserror::Error;

/// Result type alias using `CouchError`
pub type Result<T> = std::result::Result<T, CouchError>;

/// Core error type for Couch Player collaborators
#[derive(Error, Debug)]
pub enum CouchError {
    /// Persistence-related errors (resume points, favorites)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Media engine errors (load, play, seek, track selection)
    #[error("Engine error: {0}")]
    Engine(String),

    /// Network errors
    #[error("Network error: {0}")]
    Network(String),

    /// Entity not found
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity that was looked up
        entity: String,
        /// Identifier that was not found
        id: String,
    },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl CouchError {
    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an engine error
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a not found error
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_entity() {
        let err = CouchError::not_found("Title", "pilot");
        assert_eq!(err.to_string(), "Title not found: pilot");
    }

    #[test]
    fn serde_errors_convert() {
        let parse: std::result::Result<u32, _> = serde_json::from_str("not json");
        let err: CouchError = parse.unwrap_err().into();
        assert!(matches!(err, CouchError::Serialization(_)));
    }
}
