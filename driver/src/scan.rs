//! Scan coordination: sample, debounce, diff.
//!
//! One call to [`Scanner::scan_once`] is one scan cycle. The scanner keeps the
//! previous stable snapshot and turns position-wise differences into
//! [`Transition`]s in row-major order, numbering them from a counter that only
//! ever goes up.
//!
//! Latency trade-off: a press is only reported after `debounceThreshold`
//! consecutive agreeing samples taken `scanIntervalMillis` apart, so presses
//! shorter than roughly `scanIntervalMillis × debounceThreshold` may be missed.
//! Shorter intervals tighten that bound at the cost of more sampler load.

use std::fmt;
use std::time::Instant;

use keyscan_keymap::{KeyMapping, Keycode, OutOfRange, Position};

use crate::debounce::Debouncer;
use crate::error::{CycleError, SessionError};
use crate::matrix::{Grid, MatrixSampler, StableSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Press,
    Release,
}

impl Direction {
    fn from_level(pressed: bool) -> Self {
        if pressed {
            Self::Press
        } else {
            Self::Release
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Press => "press",
            Self::Release => "release",
        })
    }
}

/// A debounced key state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub position: Position,
    pub symbol: Keycode,
    pub direction: Direction,
    /// Strictly increasing within a session, starting at 1.
    pub sequence: u64,
}

/// Compare two snapshots and emit one transition per differing position,
/// row-major ascending. `sequence` is advanced once per transition.
pub fn diff(
    previous: &StableSnapshot,
    current: &StableSnapshot,
    mapping: &KeyMapping,
    sequence: &mut u64,
) -> Result<Vec<Transition>, OutOfRange> {
    let mut transitions = Vec::new();
    for ((position, before), (_, after)) in previous.iter().zip(current.iter()) {
        if before == after {
            continue;
        }
        let symbol = mapping.resolve(position)?;
        *sequence += 1;
        transitions.push(Transition {
            position,
            symbol,
            direction: Direction::from_level(after),
            sequence: *sequence,
        });
    }
    Ok(transitions)
}

pub struct Scanner {
    debouncer: Debouncer,
    previous: StableSnapshot,
    sequence: u64,
}

impl Scanner {
    pub fn new(rows: usize, columns: usize, threshold: u8) -> Self {
        Self {
            debouncer: Debouncer::new(rows, columns, threshold),
            previous: Grid::filled(rows, columns, false),
            sequence: 0,
        }
    }

    /// Run one scan cycle and return its transitions in emission order.
    pub fn scan_once<S: MatrixSampler + ?Sized>(
        &mut self,
        sampler: &mut S,
        mapping: &KeyMapping,
    ) -> Result<Vec<Transition>, CycleError> {
        let sample = sampler.sample()?;
        if sample.rows() != self.previous.rows() || sample.columns() != self.previous.columns() {
            return Err(SessionError::SampleShape {
                rows: self.previous.rows(),
                columns: self.previous.columns(),
                found_rows: sample.rows(),
                found_columns: sample.columns(),
            }
            .into());
        }

        let now = Instant::now();
        for (position, raw) in sample.iter() {
            self.debouncer
                .update(position, raw, now)
                .map_err(SessionError::from)?;
        }

        let current = self.debouncer.stable_snapshot();
        let transitions = diff(&self.previous, &current, mapping, &mut self.sequence)
            .map_err(SessionError::from)?;
        self.previous = current;

        Ok(transitions)
    }

    /// Last sequence number handed out (0 before the first transition).
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// The stable snapshot as of the last completed cycle.
    pub fn snapshot(&self) -> &StableSnapshot {
        &self.previous
    }
}
