//! Couch Player TV Library
//!
//! Reference TV front end: a console remote driving one playback session
//! over a simulated media engine.
//!
//! This library exposes the player components for testing purposes.

pub mod app;
pub mod catalog;
pub mod config;
pub mod error;
pub mod input;
pub mod sim_engine;
pub mod state;

// Re-export commonly used types for convenience
pub use app::{App, Flow};
pub use catalog::Library;
pub use config::TvConfig;
pub use error::{Result, TvError};
pub use sim_engine::SimulatedEngine;
pub use state::PlayerState;
