//! Error types for the scan driver.
//!
//! Errors are split by who can recover from them:
//!
//! - **Recoverable**: [`SampleError::Transient`] and [`SampleError::Timeout`] skip
//!   one scan cycle; the loop carries on.
//! - **Fatal to the session**: [`SessionError`] stops the scan loop and detaches.
//! - **Fatal at attach**: [`ConfigError`] and [`AttachError`], raised before any
//!   session state exists.

use std::path::PathBuf;

use keyscan_keymap::{MappingError, OutOfRange};
use thiserror::Error;

use crate::session::LifecycleState;

/// Invalid configuration. Never leaves a partially initialized session.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{field} must be a positive integer")]
    NotPositive { field: &'static str },

    #[error("{field} is {value}, at most {max} is supported")]
    TooLarge {
        field: &'static str,
        value: u64,
        max: u64,
    },

    #[error("no keyMapping given and no built-in layout for a {rows}x{columns} matrix")]
    NoMapping { rows: usize, columns: usize },

    #[error("invalid keyMapping: {0}")]
    Mapping(#[from] MappingError),

    #[error("failed to read config {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Failure of one matrix sample.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SampleError {
    /// Recoverable I/O hiccup; the cycle is skipped.
    #[error("transient sampler error: {0}")]
    Transient(String),

    /// The sampler did not answer within `sampleTimeoutMillis`; the cycle is skipped.
    #[error("sampler did not respond within {millis} ms")]
    Timeout { millis: u64 },

    /// The device is gone.
    #[error("sampler failed: {0}")]
    Fatal(String),
}

impl SampleError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }
}

/// The event sink refused delivery.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("event sink unavailable: {0}")]
    Unavailable(String),
}

/// Errors that end a running session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("sampler failed: {0}")]
    SamplerFatal(String),

    #[error(transparent)]
    SinkUnavailable(#[from] SinkError),

    /// The sample grid and mapping disagree in size.
    #[error("sample does not match the key mapping: {0}")]
    OutOfRange(#[from] OutOfRange),

    #[error("sample is {found_rows}x{found_columns}, matrix is {rows}x{columns}")]
    SampleShape {
        rows: usize,
        columns: usize,
        found_rows: usize,
        found_columns: usize,
    },
}

/// Why a scan cycle produced no transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CycleError {
    /// Recoverable sampler failure; nothing changed.
    #[error("cycle skipped: {0}")]
    Skipped(SampleError),

    #[error(transparent)]
    Fatal(#[from] SessionError),
}

impl From<SampleError> for CycleError {
    fn from(err: SampleError) -> Self {
        match err {
            SampleError::Fatal(message) => Self::Fatal(SessionError::SamplerFatal(message)),
            recoverable => Self::Skipped(recoverable),
        }
    }
}

/// Operations that are illegal in the current lifecycle state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("session is not running (state: {0:?})")]
    NotRunning(LifecycleState),

    #[error("illegal lifecycle transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },
}

/// `attach` failed; no session was created.
#[derive(Error, Debug)]
pub enum AttachError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("failed to spawn scan thread")]
    Spawn(#[source] std::io::Error),
}

/// Result of a manual scan on a session handle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Session(#[from] SessionError),
}
