/// TV application error types
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TvError>;

#[derive(Debug, Error)]
pub enum TvError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Catalog error: {0}")]
    Catalog(#[from] couch_core::CouchError),

    #[error("Playback error: {0}")]
    Playback(#[from] couch_playback::PlaybackError),

    #[error("Unknown title: {0}")]
    UnknownTitle(String),

    #[error("Invalid input: {0}")]
    Input(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<config::ConfigError> for TvError {
    fn from(err: config::ConfigError) -> Self {
        TvError::Config(err.to_string())
    }
}
