// Engine configuration, read from TOML
//
// Every key is optional; missing keys keep their defaults.
//
// [scheduler]
// heartbeat_ms = 10
// lookahead_ms = 50
// preroll_ms = 10
//
// [song]
// undo_capacity = 100
// note_limit = 10000
//
// [output]
// trigger_channel_capacity = 512

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::messaging::{TriggerConsumer, TriggerProducer, create_trigger_channel};
use crate::song::{DEFAULT_NOTE_LIMIT, SongOptions};
use crate::undo::DEFAULT_MAX_HISTORY;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub heartbeat_ms: u64,
    pub lookahead_ms: u64,
    pub preroll_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            heartbeat_ms: 10,
            lookahead_ms: 50,
            preroll_ms: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SongConfig {
    pub undo_capacity: usize,
    pub note_limit: usize,
}

impl Default for SongConfig {
    fn default() -> Self {
        Self {
            undo_capacity: DEFAULT_MAX_HISTORY,
            note_limit: DEFAULT_NOTE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub trigger_channel_capacity: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            trigger_channel_capacity: 512,
        }
    }
}

impl OutputConfig {
    /// One instrument's trigger channel at the configured capacity
    pub fn trigger_channel(&self) -> (TriggerProducer, TriggerConsumer) {
        create_trigger_channel(self.trigger_channel_capacity)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub song: SongConfig,
    pub output: OutputConfig,
}

impl EngineConfig {
    /// `<config dir>/score_engine/engine.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("score_engine").join("engine.toml"))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Load the user config if there is one; fall back to defaults otherwise
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => {
                log::info!(target: "config", "loaded {}", path.display());
                config
            }
            Err(e) => {
                log::warn!(target: "config", "ignoring config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.scheduler;
        if s.heartbeat_ms == 0 {
            return Err(ConfigError::Invalid("heartbeat_ms must be positive".into()));
        }
        if s.lookahead_ms <= s.heartbeat_ms {
            return Err(ConfigError::Invalid(format!(
                "lookahead_ms ({}) must exceed heartbeat_ms ({})",
                s.lookahead_ms, s.heartbeat_ms
            )));
        }
        if self.song.undo_capacity == 0 {
            return Err(ConfigError::Invalid("undo_capacity must be positive".into()));
        }
        if self.song.note_limit == 0 {
            return Err(ConfigError::Invalid("note_limit must be positive".into()));
        }
        if self.output.trigger_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "trigger_channel_capacity must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_millis(self.scheduler.heartbeat_ms)
    }

    pub fn lookahead_seconds(&self) -> f64 {
        self.scheduler.lookahead_ms as f64 / 1000.0
    }

    pub fn preroll_seconds(&self) -> f64 {
        self.scheduler.preroll_ms as f64 / 1000.0
    }

    /// Song options carrying the configured limits; backends stay at their defaults
    pub fn song_options(&self) -> SongOptions {
        SongOptions {
            note_limit: self.song.note_limit,
            undo_capacity: self.song.undo_capacity,
            ..SongOptions::default()
        }
    }
}
