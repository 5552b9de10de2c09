//! Error types for the pieces of the core that can fail at configuration or
//! I/O boundaries. Per-particle solver math stays on panicking assertions
//! (see `crate::particles::ParticleStore::append`): those failures indicate
//! a capacity or parameter choice made before any parallel work started,
//! not a recoverable runtime condition, matching how `ThisError` is used in
//! `splashsurf_lib` for reconstruction-time failures while array bounds
//! remain `assert!`s.

use thiserror::Error;

/// Errors that can occur while loading or deriving [`crate::parameters::Parameters`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("section [{section}] is missing mandatory key `{key}`")]
    MissingKey { section: String, key: String },
    #[error("key `{key}` in section [{section}] is not a valid number: `{value}`")]
    MalformedScalar {
        section: String,
        key: String,
        value: String,
    },
    #[error("vector key `{key}` in section [{section}] needs {expected} components, found `{value}`")]
    MalformedVector {
        section: String,
        key: String,
        value: String,
        expected: usize,
    },
}

/// Errors surfaced by the snapshot sink.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to write snapshot to {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot consumer rank received a malformed gather (expected {expected} particles, got {actual})")]
    GatherLengthMismatch { expected: usize, actual: usize },
}

/// Top-level error for the two binaries (`hydrosweep-compute`,
/// `hydrosweep-snapshot`); each variant maps to a distinct fatal
/// condition reported before any parallel work begins.
#[derive(Debug, Error)]
pub enum HydrosweepError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

pub type Result<T> = std::result::Result<T, HydrosweepError>;
