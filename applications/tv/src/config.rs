/// TV application configuration
use crate::error::{Result, TvError};
use couch_playback::PlaybackConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TvConfig {
    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default = "default_library")]
    pub library: LibrarySettings,

    #[serde(default = "default_display")]
    pub display: DisplaySettings,

    #[serde(default = "default_engine")]
    pub engine: EngineSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LibrarySettings {
    /// JSON library file; the built-in demo series is used when unset
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Start without network; remote locators are refused
    #[serde(default)]
    pub offline: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DisplaySettings {
    /// Width of the touch surface in pixels
    #[serde(default = "default_screen_width")]
    pub screen_width: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineSettings {
    /// Simulated time to buffer a source
    #[serde(default = "default_load_delay_ms")]
    pub load_delay_ms: u64,
}

impl TvConfig {
    /// Load configuration from an optional TOML file and the environment
    ///
    /// Environment variables use the `COUCH_` prefix with `__` between
    /// sections, e.g. `COUCH_PLAYBACK__SEEK_STEP_SECS=30`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(TvError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            settings = settings.add_source(config::File::from(path));
        } else {
            let default_path = PathBuf::from("couch.toml");
            if default_path.exists() {
                settings = settings.add_source(config::File::from(default_path));
            }
        }

        settings = settings.add_source(
            config::Environment::with_prefix("COUCH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = settings.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.playback
            .validate()
            .map_err(|e| TvError::Config(e.to_string()))?;

        if !(self.display.screen_width.is_finite() && self.display.screen_width > 0.0) {
            return Err(TvError::Config(format!(
                "display.screen_width must be positive, got {}",
                self.display.screen_width
            )));
        }

        if let Some(path) = &self.library.path {
            if !path.exists() {
                return Err(TvError::Config(format!(
                    "library file not found: {}",
                    path.display()
                )));
            }
        }

        Ok(())
    }
}

// Default values
fn default_library() -> LibrarySettings {
    LibrarySettings {
        path: None,
        offline: false,
    }
}

fn default_display() -> DisplaySettings {
    DisplaySettings {
        screen_width: default_screen_width(),
    }
}

fn default_screen_width() -> f64 {
    1920.0
}

fn default_engine() -> EngineSettings {
    EngineSettings {
        load_delay_ms: default_load_delay_ms(),
    }
}

fn default_load_delay_ms() -> u64 {
    250
}

impl Default for TvConfig {
    fn default() -> Self {
        Self {
            playback: PlaybackConfig::default(),
            library: default_library(),
            display: default_display(),
            engine: default_engine(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TvConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.display.screen_width, 1920.0);
        assert_eq!(config.playback, PlaybackConfig::default());
    }

    #[test]
    fn test_zero_width_is_rejected() {
        let mut config = TvConfig::default();
        config.display.screen_width = 0.0;
        assert!(matches!(config.validate(), Err(TvError::Config(_))));
    }
}
