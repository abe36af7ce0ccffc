//! Engine configuration loaded from ~/.lookahead/config.yaml.

use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::transport::{DEFAULT_TEMPO, MAX_TEMPO, MIN_TEMPO, SIXTEENTH_BEATS};

/// Scheduling and timing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How far ahead of the transport events are scheduled, in seconds.
    #[serde(default = "default_schedule_ahead")]
    pub schedule_ahead_seconds: f64,
    /// Poll rate of the timing controller.
    #[serde(default = "default_ui_rate")]
    pub ui_rate_hz: f64,
    #[serde(default = "default_tempo")]
    pub initial_tempo: f64,
    /// Resolution of sampled automation curves.
    #[serde(default = "default_curve_samples")]
    pub curve_samples_per_second: f64,
    /// Sub-window length in pattern mode, in beats.
    #[serde(default = "default_step_beats")]
    pub pattern_step_beats: f64,
}

fn default_schedule_ahead() -> f64 {
    0.1
}

fn default_ui_rate() -> f64 {
    60.0
}

fn default_tempo() -> f64 {
    DEFAULT_TEMPO
}

fn default_curve_samples() -> f64 {
    100.0
}

fn default_step_beats() -> f64 {
    SIXTEENTH_BEATS
}

/// Standard config path (~/.lookahead/config.yaml).
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".lookahead").join("config.yaml"))
}

impl EngineConfig {
    /// Load from the standard path, falling back to defaults when the file is
    /// missing or invalid.
    pub fn load() -> Self {
        let Some(path) = config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("ignoring {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Load and validate a config file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as YAML, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.schedule_ahead_seconds > 0.0 && self.schedule_ahead_seconds <= 1.0) {
            return Err(invalid(
                "schedule_ahead_seconds",
                format!("{} is outside (0, 1]", self.schedule_ahead_seconds),
            ));
        }
        if !(self.ui_rate_hz >= 1.0 && self.ui_rate_hz <= 1000.0) {
            return Err(invalid("ui_rate_hz", format!("{} is outside 1..=1000", self.ui_rate_hz)));
        }
        if !(MIN_TEMPO..=MAX_TEMPO).contains(&self.initial_tempo) {
            return Err(invalid(
                "initial_tempo",
                format!("{} is outside {MIN_TEMPO}..={MAX_TEMPO}", self.initial_tempo),
            ));
        }
        if !(self.curve_samples_per_second >= 1.0) {
            return Err(invalid(
                "curve_samples_per_second",
                format!("{} must be at least 1", self.curve_samples_per_second),
            ));
        }
        if !(self.pattern_step_beats > 0.0 && self.pattern_step_beats <= 4.0) {
            return Err(invalid(
                "pattern_step_beats",
                format!("{} is outside (0, 4]", self.pattern_step_beats),
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, detail: String) -> ConfigError {
    ConfigError::Invalid { field, detail }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schedule_ahead_seconds: default_schedule_ahead(),
            ui_rate_hz: default_ui_rate(),
            initial_tempo: default_tempo(),
            curve_samples_per_second: default_curve_samples(),
            pattern_step_beats: default_step_beats(),
        }
    }
}
