//! Matrix keyboard scan driver.
//!
//! Turns periodic, noisy samples of a rows×columns switch matrix into an
//! ordered stream of debounced press/release events:
//!
//! - [`matrix`]: sample grids and the [`MatrixSampler`] seam to the hardware
//! - [`debounce`]: per-intersection debounce state machine
//! - [`scan`]: scan cycles, snapshot diffing, transitions
//! - [`report`]: event sink contract, sync barriers
//! - [`session`]: attach/detach lifecycle and the scan loop
//! - [`config`]: TOML configuration

pub mod config;
pub mod debounce;
pub mod error;
pub mod matrix;
pub mod report;
pub mod scan;
pub mod session;

pub use config::Config;
pub use error::{
    AttachError, ConfigError, CycleError, LifecycleError, SampleError, ScanError, SessionError,
    SinkError,
};
pub use matrix::{MatrixSample, MatrixSampler, ScriptedSampler, StableSnapshot, TimedSampler};
pub use report::{ChannelSink, EventSink, KeyEvent, SyncPolicy, VecSink};
pub use scan::{Direction, Transition};
pub use session::{
    attach, attach_with, detach, AttachOptions, CycleOutcome, Diagnostic, LifecycleState, Session,
    SessionHandle,
};

pub use keyscan_keymap::{KeyMapping, Keycode, Position};
