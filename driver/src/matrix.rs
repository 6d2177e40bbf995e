//! Matrix samples and the sampler seam.
//!
//! Reading electrical line state is someone else's job. The driver sees it as
//! one capability, [`MatrixSampler::sample`]: "sample all lines now", returning
//! a rows×columns grid where `true` means the switch at that intersection is
//! closed. Active-low wiring, strobing order and settling delays all live
//! behind that call.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use keyscan_keymap::Position;

use crate::error::SampleError;

/// Row-major rows×columns storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grid<T> {
    rows: usize,
    columns: usize,
    cells: Vec<T>,
}

/// One instant's raw reading: `true` = switch closed.
pub type MatrixSample = Grid<bool>;

/// The debounced matrix as of the end of a scan cycle.
pub type StableSnapshot = Grid<bool>;

impl<T: Copy> Grid<T> {
    pub fn filled(rows: usize, columns: usize, value: T) -> Self {
        Self {
            rows,
            columns,
            cells: vec![value; rows * columns],
        }
    }

    /// Build from nested rows. Returns `None` for an empty or ragged table.
    pub fn from_rows(table: Vec<Vec<T>>) -> Option<Self> {
        let rows = table.len();
        let columns = table.first().map_or(0, Vec::len);
        if rows == 0 || columns == 0 || table.iter().any(|r| r.len() != columns) {
            return None;
        }
        Some(Self {
            rows,
            columns,
            cells: table.into_iter().flatten().collect(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn get(&self, position: Position) -> Option<T> {
        self.index(position).map(|i| self.cells[i])
    }

    /// Returns `false` if the position is out of bounds.
    pub fn set(&mut self, position: Position, value: T) -> bool {
        match self.index(position) {
            Some(i) => {
                self.cells[i] = value;
                true
            }
            None => false,
        }
    }

    /// Cells with their positions, row-major ascending.
    pub fn iter(&self) -> impl Iterator<Item = (Position, T)> + '_ {
        let columns = self.columns;
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, &v)| (Position::new(i / columns, i % columns), v))
    }

    fn index(&self, position: Position) -> Option<usize> {
        (position.row < self.rows && position.col < self.columns)
            .then(|| position.row * self.columns + position.col)
    }
}

impl Grid<bool> {
    /// Number of closed switches.
    pub fn count_pressed(&self) -> usize {
        self.cells.iter().filter(|&&v| v).count()
    }
}

/// Samples every intersection of the matrix at once.
///
/// May block on physical I/O. A [`SampleError::Transient`] skips the current
/// cycle; a [`SampleError::Fatal`] ends the session.
pub trait MatrixSampler: Send {
    fn sample(&mut self) -> Result<MatrixSample, SampleError>;
}

impl<S: MatrixSampler + ?Sized> MatrixSampler for Box<S> {
    fn sample(&mut self) -> Result<MatrixSample, SampleError> {
        (**self).sample()
    }
}

/// What a [`ScriptedSampler`] does once every scripted frame was returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Exhausted {
    /// Report a fatal error, as if the device went away.
    #[default]
    Fatal,
    /// Keep returning the final frame.
    HoldLast,
}

/// Replays a fixed sequence of samples (and injected errors).
#[derive(Debug, Clone)]
pub struct ScriptedSampler {
    script: VecDeque<Result<MatrixSample, SampleError>>,
    last: Option<MatrixSample>,
    exhausted: Exhausted,
}

impl ScriptedSampler {
    pub fn new(frames: impl IntoIterator<Item = MatrixSample>) -> Self {
        Self::from_results(frames.into_iter().map(Ok))
    }

    pub fn from_results(
        results: impl IntoIterator<Item = Result<MatrixSample, SampleError>>,
    ) -> Self {
        Self {
            script: results.into_iter().collect(),
            last: None,
            exhausted: Exhausted::default(),
        }
    }

    /// One frame per entry in `levels`; only `position` is ever closed.
    pub fn single_key(rows: usize, columns: usize, position: Position, levels: &[u8]) -> Self {
        Self::new(levels.iter().map(|&level| {
            let mut frame = Grid::filled(rows, columns, false);
            frame.set(position, level != 0);
            frame
        }))
    }

    pub fn on_exhausted(mut self, exhausted: Exhausted) -> Self {
        self.exhausted = exhausted;
        self
    }

    /// Frames (and errors) not yet returned.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl MatrixSampler for ScriptedSampler {
    fn sample(&mut self) -> Result<MatrixSample, SampleError> {
        match self.script.pop_front() {
            Some(Ok(frame)) => {
                self.last = Some(frame.clone());
                Ok(frame)
            }
            Some(Err(err)) => Err(err),
            None => match (self.exhausted, &self.last) {
                (Exhausted::HoldLast, Some(frame)) => Ok(frame.clone()),
                _ => Err(SampleError::fatal("sample script exhausted")),
            },
        }
    }
}

type Reply = (u64, Result<MatrixSample, SampleError>);

/// Bounds how long a stuck sampler can stall the scan loop.
///
/// The wrapped sampler runs on its own thread. A call that does not answer
/// within the timeout fails with [`SampleError::Timeout`]; its late reply is
/// discarded. Only one request is ever outstanding: the next call first waits
/// (within its own timeout) for the abandoned one to finish.
pub struct TimedSampler {
    requests: Sender<u64>,
    replies: Receiver<Reply>,
    timeout: Duration,
    next_id: u64,
    pending: Option<u64>,
}

impl TimedSampler {
    pub fn spawn<S: MatrixSampler + 'static>(
        mut sampler: S,
        timeout: Duration,
    ) -> std::io::Result<Self> {
        let (requests, request_rx) = mpsc::channel::<u64>();
        let (reply_tx, replies) = mpsc::channel::<Reply>();

        thread::Builder::new()
            .name("keyscan-sampler".into())
            .spawn(move || {
                for id in request_rx {
                    if reply_tx.send((id, sampler.sample())).is_err() {
                        break;
                    }
                }
            })?;

        Ok(Self {
            requests,
            replies,
            timeout,
            next_id: 0,
            pending: None,
        })
    }

    fn await_reply(
        &self,
        id: u64,
        deadline: Instant,
    ) -> Option<Result<MatrixSample, SampleError>> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.replies.recv_timeout(remaining) {
                Ok((reply_id, result)) if reply_id == id => return Some(result),
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) => return None,
                Err(RecvTimeoutError::Disconnected) => {
                    return Some(Err(SampleError::fatal("sampler thread exited")))
                }
            }
        }
    }

    fn timeout_error(&self) -> SampleError {
        SampleError::Timeout {
            millis: self.timeout.as_millis() as u64,
        }
    }
}

impl MatrixSampler for TimedSampler {
    fn sample(&mut self) -> Result<MatrixSample, SampleError> {
        let deadline = Instant::now() + self.timeout;

        if let Some(stale) = self.pending {
            if self.await_reply(stale, deadline).is_none() {
                tracing::debug!(request = stale, "sampler still stuck on abandoned request");
                return Err(self.timeout_error());
            }
            self.pending = None;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.requests
            .send(id)
            .map_err(|_| SampleError::fatal("sampler thread exited"))?;

        match self.await_reply(id, deadline) {
            Some(result) => result,
            None => {
                self.pending = Some(id);
                Err(self.timeout_error())
            }
        }
    }
}
