use std::path::PathBuf;
use thiserror::Error;

/// Error types covering startup, configuration, and pipeline failures.
#[derive(Debug, Error)]
pub enum HwtsError {
    /// Configuration or initialization error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A socket setup step failed. `op` names the step (e.g. `bind`).
    #[error("{op}: {source}")]
    Socket {
        /// The setup step that failed.
        op: &'static str,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The output log could not be created or written.
    #[error("output file {path}: {source}")]
    Output {
        /// Path of the output file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Channel capacity must be a power of two and at least 2.
    #[error("invalid channel capacity {0}: must be a power of two >= 2")]
    InvalidCapacity(usize),

    /// A kernel timespec that does not describe a valid point in time.
    #[error("invalid timestamp: {seconds}s {nanoseconds}ns")]
    InvalidTimestamp {
        /// Seconds field as reported.
        seconds: i64,
        /// Nanoseconds field as reported.
        nanoseconds: i64,
    },

    /// Invalid state transition attempted.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Source state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// A worker thread could not be spawned or panicked.
    #[error("worker thread error: {0}")]
    Thread(String),
}

/// Convenience type alias for hw-timestamper operations.
pub type HwtsResult<T> = Result<T, HwtsError>;
