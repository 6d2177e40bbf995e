//! Per-key debounce logic.
//!
//! Each intersection tracks a candidate level and how many consecutive raw
//! samples agreed with it. The stable level only moves once the candidate has
//! been seen `threshold` samples in a row, so contact bounce and single-sample
//! glitches never reach the stable snapshot. A switch that flips on every
//! sample never stabilizes and therefore never reports a transition.

use std::time::Instant;

use keyscan_keymap::{OutOfRange, Position};

use crate::matrix::{Grid, StableSnapshot};

/// Number of consecutive agreeing samples required to change a stable level.
/// At the default 5 ms scan interval this is ~15 ms of debounce.
pub const DEFAULT_THRESHOLD: u8 = 3;

/// Debounce state for one matrix position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntersectionState {
    /// Level reported downstream.
    pub stable: bool,
    /// Most recent raw level.
    pub candidate: bool,
    /// Consecutive samples equal to `candidate`, clamped at the threshold.
    pub agreement: u8,
    /// When the raw level last changed.
    pub last_change: Option<Instant>,
}

impl IntersectionState {
    /// Released, with no samples seen yet.
    pub const RELEASED: Self = Self {
        stable: false,
        candidate: false,
        agreement: 0,
        last_change: None,
    };

    fn step(&mut self, raw: bool, now: Instant, threshold: u8) -> bool {
        if raw == self.candidate {
            self.agreement = self.agreement.saturating_add(1).min(threshold);
        } else {
            self.candidate = raw;
            self.agreement = 1;
            self.last_change = Some(now);
        }

        if self.agreement >= threshold {
            self.stable = self.candidate;
        }
        self.stable
    }
}

pub struct Debouncer {
    threshold: u8,
    states: Grid<IntersectionState>,
}

impl Debouncer {
    /// All positions start released. A `threshold` of 0 is treated as 1.
    pub fn new(rows: usize, columns: usize, threshold: u8) -> Self {
        Self {
            threshold: threshold.max(1),
            states: Grid::filled(rows, columns, IntersectionState::RELEASED),
        }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Feed one raw sample for `position`. Returns the (possibly unchanged)
    /// stable level.
    pub fn update(
        &mut self,
        position: Position,
        raw: bool,
        now: Instant,
    ) -> Result<bool, OutOfRange> {
        let mut state = self.state(position)?;
        let stable = state.step(raw, now, self.threshold);
        self.states.set(position, state);
        Ok(stable)
    }

    pub fn state(&self, position: Position) -> Result<IntersectionState, OutOfRange> {
        self.states.get(position).ok_or(OutOfRange {
            position,
            rows: self.states.rows(),
            columns: self.states.columns(),
        })
    }

    /// Current stable level of every position.
    pub fn stable_snapshot(&self) -> StableSnapshot {
        let mut snapshot = Grid::filled(self.states.rows(), self.states.columns(), false);
        for (position, state) in self.states.iter() {
            snapshot.set(position, state.stable);
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const P: Position = Position::new(0, 0);

    /// Stable level after each raw sample.
    fn run(threshold: u8, raw: &[u8]) -> Vec<bool> {
        let mut debouncer = Debouncer::new(1, 1, threshold);
        let now = Instant::now();
        raw.iter()
            .map(|&level| debouncer.update(P, level != 0, now).unwrap())
            .collect()
    }

    #[test]
    fn test_clean_press_after_threshold() {
        let levels = run(2, &[0, 0, 1, 1]);
        assert_eq!(levels, vec![false, false, false, true]);
    }

    #[test]
    fn test_bounce_rejected() {
        let levels = run(3, &[0, 1, 0, 1, 0, 1, 1, 1]);
        assert_eq!(
            levels,
            vec![false, false, false, false, false, false, false, true]
        );
    }

    #[test]
    fn test_release_needs_threshold_too() {
        let levels = run(3, &[1, 1, 1, 0, 0, 1, 0, 0, 0]);
        assert_eq!(
            levels,
            vec![false, false, true, true, true, true, true, true, false]
        );
    }

    #[test]
    fn test_threshold_one_follows_raw() {
        assert_eq!(run(1, &[1, 0, 1]), vec![true, false, true]);
        assert_eq!(Debouncer::new(1, 1, 0).threshold(), 1);
    }

    #[test]
    fn test_agreement_is_clamped() {
        let mut debouncer = Debouncer::new(1, 1, 4);
        let now = Instant::now();
        for _ in 0..1000 {
            debouncer.update(P, true, now).unwrap();
        }
        let state = debouncer.state(P).unwrap();
        assert_eq!(state.agreement, 4);
        assert!(state.stable);
    }

    #[test]
    fn test_last_change_tracks_raw_edges() {
        let mut debouncer = Debouncer::new(1, 1, 2);
        let t0 = Instant::now();
        let t1 = t0 + std::time::Duration::from_millis(5);
        debouncer.update(P, true, t0).unwrap();
        debouncer.update(P, true, t1).unwrap();
        assert_eq!(debouncer.state(P).unwrap().last_change, Some(t0));
    }

    #[test]
    fn test_out_of_range_position() {
        let mut debouncer = Debouncer::new(2, 2, 2);
        assert!(debouncer
            .update(Position::new(2, 0), true, Instant::now())
            .is_err());
    }

    proptest! {
        #[test]
        fn prop_agreeing_tail_decides_level(
            threshold in 1u8..6,
            noise in proptest::collection::vec(any::<bool>(), 0..40),
            tail in any::<bool>(),
        ) {
            let mut raw: Vec<u8> = noise.iter().map(|&b| b as u8).collect();
            raw.extend(std::iter::repeat(tail as u8).take(threshold as usize));
            let levels = run(threshold, &raw);
            prop_assert_eq!(*levels.last().unwrap(), tail);
        }

        #[test]
        fn prop_toggling_never_changes_level(
            threshold in 2u8..6,
            start in any::<bool>(),
            len in 1usize..200,
        ) {
            let raw: Vec<u8> = (0..len).map(|i| ((i % 2 == 0) == start) as u8).collect();
            let levels = run(threshold, &raw);
            prop_assert!(levels.iter().all(|&l| !l));
        }
    }
}
