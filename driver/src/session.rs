//! Sessions and their attach/detach lifecycle.
//!
//! ```text
//! Detached -> Attaching -> Running -> Detaching -> Detached
//!                 |                                   ^
//!                 +------------ (attach failed) ------+
//! ```
//!
//! A [`Session`] is the whole per-device state: mapping, debounce grid,
//! snapshots, sequence counter, sampler and sink. [`attach`] builds one and
//! hands it to a dedicated scan thread that runs one cycle every
//! `scanIntervalMillis`. Only one cycle is ever in flight: the loop and
//! [`SessionHandle::scan_now`] both go through the same session mutex.
//!
//! Backpressure: event delivery happens inside the cycle, so a sink that
//! blocks delays the next cycle. Under a persistently slow sink input latency
//! grows, memory does not.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use keyscan_keymap::KeyMapping;
use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{AttachError, CycleError, LifecycleError, SampleError, ScanError, SessionError};
use crate::matrix::{MatrixSampler, StableSnapshot, TimedSampler};
use crate::report::{Emitter, EventSink};
use crate::scan::{Scanner, Transition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Detached,
    Attaching,
    Running,
    Detaching,
}

impl LifecycleState {
    fn can_become(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Detached, Attaching)
                | (Attaching, Running)
                | (Attaching, Detached)
                | (Running, Detaching)
                | (Detaching, Detached)
        )
    }
}

struct Lifecycle {
    state: Mutex<LifecycleState>,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            state: Mutex::new(LifecycleState::Detached),
        }
    }

    fn get(&self) -> LifecycleState {
        *self.state.lock()
    }

    fn advance(&self, to: LifecycleState) -> Result<(), LifecycleError> {
        let mut state = self.state.lock();
        if !state.can_become(to) {
            return Err(LifecycleError::InvalidTransition { from: *state, to });
        }
        tracing::trace!(from = ?*state, ?to, "lifecycle transition");
        *state = to;
        Ok(())
    }
}

/// Result of one scan cycle that did not end the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed {
        cycle: u64,
        transitions: Vec<Transition>,
        synced: bool,
    },
    /// The sampler failed recoverably; nothing was emitted.
    Skipped(SampleError),
}

/// Recoverable events, reported to the optional diagnostics callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    CycleSkipped(SampleError),
    /// A cycle took longer than the scan interval, usually a slow sink.
    Overrun { cycle: u64, elapsed: Duration },
}

type DiagnosticFn = Arc<dyn Fn(&Diagnostic) + Send + Sync>;

#[derive(Default, Clone)]
pub struct AttachOptions {
    diagnostics: Option<DiagnosticFn>,
}

impl AttachOptions {
    pub fn diagnostics(
        mut self,
        callback: impl Fn(&Diagnostic) + Send + Sync + 'static,
    ) -> Self {
        self.diagnostics = Some(Arc::new(callback));
        self
    }

    fn report(&self, diagnostic: Diagnostic) {
        if let Some(callback) = &self.diagnostics {
            callback(&diagnostic);
        }
    }
}

pub struct Session {
    mapping: KeyMapping,
    scanner: Scanner,
    emitter: Emitter<Box<dyn EventSink>>,
    sampler: Box<dyn MatrixSampler>,
    cycles: u64,
}

impl Session {
    /// Validate `config` and build a fresh session: every position released,
    /// sequence counter at zero.
    pub fn new<S, K>(config: &Config, sampler: S, sink: K) -> Result<Self, AttachError>
    where
        S: MatrixSampler + 'static,
        K: EventSink + 'static,
    {
        let mapping = config.validate()?;

        let sampler: Box<dyn MatrixSampler> = match config.sample_timeout() {
            Some(timeout) => {
                Box::new(TimedSampler::spawn(sampler, timeout).map_err(AttachError::Spawn)?)
            }
            None => Box::new(sampler),
        };

        Ok(Self {
            scanner: Scanner::new(mapping.rows(), mapping.columns(), config.threshold()),
            mapping,
            emitter: Emitter::new(Box::new(sink), config.sync_policy),
            sampler,
            cycles: 0,
        })
    }

    /// One full sample, debounce, diff and emit pass.
    pub fn run_cycle(&mut self) -> Result<CycleOutcome, SessionError> {
        match self.scanner.scan_once(&mut self.sampler, &self.mapping) {
            Ok(transitions) => {
                self.cycles += 1;
                let synced = self.emitter.emit_frame(self.cycles, &transitions)?;
                tracing::trace!(
                    cycle = self.cycles,
                    transitions = transitions.len(),
                    synced,
                    "scan cycle"
                );
                Ok(CycleOutcome::Completed {
                    cycle: self.cycles,
                    transitions,
                    synced,
                })
            }
            Err(CycleError::Skipped(err)) => {
                tracing::warn!(%err, "scan cycle skipped");
                Ok(CycleOutcome::Skipped(err))
            }
            Err(CycleError::Fatal(err)) => Err(err),
        }
    }

    pub fn snapshot(&self) -> &StableSnapshot {
        self.scanner.snapshot()
    }

    /// Completed cycles so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Last sequence number handed out.
    pub fn sequence(&self) -> u64 {
        self.scanner.sequence()
    }
}

struct Shared {
    lifecycle: Lifecycle,
    session: Mutex<Option<Session>>,
    fault: Mutex<Option<SessionError>>,
    stop: Mutex<Option<Sender<()>>>,
}

impl Shared {
    /// Ask the loop to stop after the current cycle. Idempotent.
    fn request_stop(&self) {
        if self.lifecycle.get() == LifecycleState::Running {
            // Loses the race harmlessly if the loop is already detaching.
            let _ = self.lifecycle.advance(LifecycleState::Detaching);
        }
        self.stop.lock().take();
    }

    fn fail(&self, err: SessionError) {
        tracing::error!(%err, "session failed, detaching");
        self.fault.lock().get_or_insert(err);
        self.request_stop();
    }

    /// Release the session and settle in `Detached`.
    fn finish_detach(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            tracing::info!(
                cycles = session.cycles(),
                sequence = session.sequence(),
                "session detached"
            );
        }
        if self.lifecycle.get() == LifecycleState::Detaching {
            let _ = self.lifecycle.advance(LifecycleState::Detached);
        }
    }
}

/// Owner's handle to a running session. Dropping it detaches.
pub struct SessionHandle {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// Attach a session with default options.
pub fn attach<S, K>(config: &Config, sampler: S, sink: K) -> Result<SessionHandle, AttachError>
where
    S: MatrixSampler + 'static,
    K: EventSink + 'static,
{
    attach_with(config, sampler, sink, AttachOptions::default())
}

pub fn attach_with<S, K>(
    config: &Config,
    sampler: S,
    sink: K,
    options: AttachOptions,
) -> Result<SessionHandle, AttachError>
where
    S: MatrixSampler + 'static,
    K: EventSink + 'static,
{
    let lifecycle = Lifecycle::new();
    lifecycle.advance(LifecycleState::Attaching)?;

    let session = match Session::new(config, sampler, sink) {
        Ok(session) => session,
        Err(err) => {
            tracing::error!(%err, "attach failed");
            lifecycle.advance(LifecycleState::Detached)?;
            return Err(err);
        }
    };

    let (stop_tx, stop_rx) = mpsc::channel();
    let shared = Arc::new(Shared {
        lifecycle,
        session: Mutex::new(Some(session)),
        fault: Mutex::new(None),
        stop: Mutex::new(Some(stop_tx)),
    });
    shared.lifecycle.advance(LifecycleState::Running)?;

    let interval = config.scan_interval();
    let loop_shared = Arc::clone(&shared);
    let spawned = thread::Builder::new()
        .name("keyscan-scan".into())
        .spawn(move || scan_loop(&loop_shared, &stop_rx, interval, &options));

    let thread = match spawned {
        Ok(thread) => thread,
        Err(err) => {
            shared.request_stop();
            shared.finish_detach();
            return Err(AttachError::Spawn(err));
        }
    };

    tracing::info!(
        rows = config.rows,
        columns = config.columns,
        threshold = config.debounce_threshold,
        interval_ms = config.scan_interval_millis,
        "session attached"
    );

    Ok(SessionHandle {
        shared,
        thread: Mutex::new(Some(thread)),
    })
}

/// Stop scanning and release the session.
pub fn detach(handle: &SessionHandle) {
    handle.detach();
}

fn scan_loop(
    shared: &Shared,
    stop: &Receiver<()>,
    interval: Duration,
    options: &AttachOptions,
) {
    loop {
        let started = Instant::now();
        let outcome = {
            // The state is checked under the session lock: a manual scan may
            // have requested the stop while this thread was waiting for it.
            let mut guard = shared.session.lock();
            if shared.lifecycle.get() != LifecycleState::Running {
                break;
            }
            match guard.as_mut() {
                Some(session) => session.run_cycle(),
                None => break,
            }
        };
        match outcome {
            Ok(CycleOutcome::Completed { cycle, .. }) => {
                let elapsed = started.elapsed();
                if elapsed > interval {
                    options.report(Diagnostic::Overrun { cycle, elapsed });
                }
            }
            Ok(CycleOutcome::Skipped(err)) => options.report(Diagnostic::CycleSkipped(err)),
            Err(err) => {
                shared.fail(err);
                break;
            }
        }

        match stop.recv_timeout(interval.saturating_sub(started.elapsed())) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    shared.finish_detach();
}

impl SessionHandle {
    pub fn state(&self) -> LifecycleState {
        self.shared.lifecycle.get()
    }

    /// Run one cycle now, serialized with the scan loop.
    pub fn scan_now(&self) -> Result<CycleOutcome, ScanError> {
        let mut guard = self.shared.session.lock();
        let state = self.shared.lifecycle.get();
        let session = match guard.as_mut() {
            Some(session) if state == LifecycleState::Running => session,
            _ => return Err(LifecycleError::NotRunning(state).into()),
        };

        match session.run_cycle() {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                // Still holding the session, so the loop cannot slip in
                // another cycle before it sees the stop.
                self.shared.fail(err.clone());
                drop(guard);
                Err(err.into())
            }
        }
    }

    /// Stop the scan loop between cycles and wait for it to release the
    /// session. Safe to call more than once.
    pub fn detach(&self) {
        self.shared.request_stop();
        self.join();
    }

    /// Block until the scan loop ends on its own, returning the error that
    /// ended it.
    pub fn wait(&self) -> Option<SessionError> {
        self.join();
        self.shared.fault.lock().clone()
    }

    /// The error that ended the session, if any.
    pub fn take_fault(&self) -> Option<SessionError> {
        self.shared.fault.lock().take()
    }

    fn join(&self) {
        let thread = self.thread.lock().take();
        if let Some(thread) = thread {
            if thread.join().is_err() {
                tracing::error!("scan thread panicked");
                self.shared.request_stop();
                self.shared.finish_detach();
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{Exhausted, ScriptedSampler};
    use crate::report::{KeyEvent, SyncPolicy, VecSink};
    use keyscan_keymap::Position;

    #[test]
    fn test_lifecycle_refuses_skips() {
        let lifecycle = Lifecycle::new();
        assert!(matches!(
            lifecycle.advance(LifecycleState::Running),
            Err(LifecycleError::InvalidTransition { .. })
        ));
        lifecycle.advance(LifecycleState::Attaching).unwrap();
        lifecycle.advance(LifecycleState::Running).unwrap();
        assert!(lifecycle.advance(LifecycleState::Detached).is_err());
        lifecycle.advance(LifecycleState::Detaching).unwrap();
        lifecycle.advance(LifecycleState::Detached).unwrap();
        assert_eq!(lifecycle.get(), LifecycleState::Detached);
    }

    #[test]
    fn test_session_cycle_emits_press_then_sync() {
        let mut config = Config::new(4, 5);
        config.debounce_threshold = 2;
        let sampler = ScriptedSampler::single_key(4, 5, Position::new(1, 2), &[0, 0, 1, 1]);
        let mut session = Session::new(&config, sampler, VecSink::default()).unwrap();

        let outcomes: Vec<CycleOutcome> = (0..4).map(|_| session.run_cycle().unwrap()).collect();
        match &outcomes[3] {
            CycleOutcome::Completed {
                cycle,
                transitions,
                synced,
            } => {
                assert_eq!((*cycle, transitions.len(), *synced), (4, 1, true));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(session.sequence(), 1);
        assert_eq!(session.snapshot().count_pressed(), 1);
    }

    #[test]
    fn test_session_rejects_bad_config() {
        let config = Config::new(3, 3);
        let result = Session::new(&config, ScriptedSampler::new(vec![]), VecSink::default());
        assert!(matches!(result, Err(AttachError::Config(_))));
    }

    #[test]
    fn test_per_cycle_policy_syncs_idle_cycles() {
        let mut config = Config::new(4, 5);
        config.sync_policy = SyncPolicy::PerCycle;
        let sampler = ScriptedSampler::single_key(4, 5, Position::new(0, 0), &[0])
            .on_exhausted(Exhausted::HoldLast);
        let mut session = Session::new(&config, sampler, VecSink::default()).unwrap();
        for _ in 0..3 {
            let outcome = session.run_cycle().unwrap();
            assert!(matches!(outcome, CycleOutcome::Completed { synced: true, .. }));
        }
    }

    #[test]
    fn test_sink_events_follow_scan_order() {
        let mut config = Config::new(4, 5);
        config.debounce_threshold = 1;
        let mut frame = crate::matrix::Grid::filled(4, 5, false);
        frame.set(Position::new(2, 1), true);
        frame.set(Position::new(0, 3), true);
        let sampler = ScriptedSampler::new(vec![frame]);

        let sink = Arc::new(Mutex::new(Vec::new()));
        struct SharedSink(Arc<Mutex<Vec<KeyEvent>>>);
        impl EventSink for SharedSink {
            fn push(&mut self, event: KeyEvent) -> Result<(), crate::error::SinkError> {
                self.0.lock().push(event);
                Ok(())
            }
        }

        let mut session = Session::new(&config, sampler, SharedSink(Arc::clone(&sink))).unwrap();
        session.run_cycle().unwrap();

        let events = sink.lock().clone();
        let positions: Vec<Option<Position>> = events
            .iter()
            .map(|e| match e {
                KeyEvent::Key(t) => Some(t.position),
                KeyEvent::Sync { .. } => None,
            })
            .collect();
        assert_eq!(
            positions,
            vec![Some(Position::new(0, 3)), Some(Position::new(2, 1)), None]
        );
    }
}
