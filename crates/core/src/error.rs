//! Error taxonomy.
//!
//! Each fallible subsystem gets its own `thiserror` enum rather than one flat
//! error type, matching how the adaptive-engine tier boundary in the teacher
//! crate gives `Violation` its own enum. `ShieldDecision` and `RiskDecision`
//! are plain value types, never `Result` — a veto or an abstain is a
//! decision, not an error.

use thiserror::Error;

/// Failures loading or validating a [`crate::config::SystemConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("engine tag {0:?} must start with \"mujoco-\" or an equivalent engine tag")]
    BadEngineTag(String),
    #[error("range {field} has lo > hi ({lo} > {hi})")]
    RangeOrder { field: String, lo: f64, hi: f64 },
    #[error("range {field} must be > 0, got lo={lo} hi={hi}")]
    RangeNotPositive { field: String, lo: f64, hi: f64 },
    #[error("range {field} is not a number or \"lo-hi\" string: {value:?}")]
    RangeUnparseable { field: String, value: String },
    #[error("seeds.physics_hash mismatch: configured={configured} computed={computed}")]
    HashMismatch { configured: String, computed: String },
    #[error("strict mode: seeds.physics_hash is still the bootstrap sentinel \"<FILL_ME>\"")]
    StrictSentinel,
}

/// Failures standing up an [`crate::env::Environment`].
#[derive(Debug, Error)]
pub enum EnvLoadError {
    #[error("engine-backed environment asset not found: {0}")]
    MissingAsset(String),
    #[error("engine-backed environment library unavailable: {0}")]
    MissingEngineLibrary(String),
}

/// [`crate::metrics::cvar`] on an empty slice.
#[derive(Debug, Error)]
#[error("cvar requires a non-empty input")]
pub struct EmptyInput;

/// Violated internal invariant, only ever raised in debug builds.
#[derive(Debug, Error)]
#[error("invariant violated: {0}")]
pub struct InvariantViolation(pub String);

/// An [`crate::adapter::AdapterDelta`] refused at `apply` time because its
/// payload exceeds the configured magnitude bound.
#[derive(Debug, Error, PartialEq)]
#[error("adapter delta rejected: {param} delta {delta} exceeds bound {bound}")]
pub struct AdapterRejected {
    pub param: String,
    pub delta: f64,
    pub bound: f64,
}
