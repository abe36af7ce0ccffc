//! Error types for transport, scheduling and playback control.

use thiserror::Error;

/// Errors raised by the clock, the schedulers and the playback controller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulerError {
    /// A tempo, time signature, swing, loop point or seek position outside its domain.
    #[error("invalid {what}: {detail}")]
    InvalidRange { what: &'static str, detail: String },

    #[error("pattern mode requires an active pattern")]
    NoActivePattern,

    #[error("playlist mode requires at least one pattern instance")]
    EmptyPlaylist,

    /// An instrument, effect, mixer parameter or pattern that could not be resolved.
    #[error("missing {kind} target: {id}")]
    MissingTarget { kind: &'static str, id: String },

    /// Internal invariant violation: a time range was scheduled twice.
    #[error("scheduling conflict: [{start:.6}, {end:.6}) overlaps a range already scheduled up to {scheduled_end:.6}")]
    SchedulingConflict {
        start: f64,
        end: f64,
        scheduled_end: f64,
    },
}

impl SchedulerError {
    pub fn invalid(what: &'static str, detail: impl Into<String>) -> Self {
        Self::InvalidRange {
            what,
            detail: detail.into(),
        }
    }

    pub fn missing(kind: &'static str, id: impl Into<String>) -> Self {
        Self::MissingTarget {
            kind,
            id: id.into(),
        }
    }
}

/// Errors raised while loading or validating [`crate::config::EngineConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid config value for {field}: {detail}")]
    Invalid { field: &'static str, detail: String },
}
