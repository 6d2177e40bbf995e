//! Event reporting: key transitions and sync barriers to an external sink.
//!
//! The sink sees a flat, ordered stream of [`KeyEvent`]s. Within a cycle the
//! transitions arrive in the order the scanner produced them; a
//! [`KeyEvent::Sync`] closes the frame. Delivery is synchronous, so a sink
//! that blocks holds up the next scan cycle instead of buffering without
//! bound.

use std::sync::mpsc::{self, Receiver, SyncSender};

use serde::{Deserialize, Serialize};

use crate::error::SinkError;
use crate::scan::Transition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    Key(Transition),
    /// Everything since the previous sync forms one coherent frame.
    Sync { cycle: u64 },
}

/// When a sync barrier is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncPolicy {
    /// After every completed scan cycle, even one with no transitions.
    /// Doubles as a liveness signal.
    PerCycle,
    /// Only after cycles that produced at least one transition.
    #[default]
    OnChange,
}

/// Receives events in order. `push` may block to apply backpressure.
pub trait EventSink: Send {
    fn push(&mut self, event: KeyEvent) -> Result<(), SinkError>;
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn push(&mut self, event: KeyEvent) -> Result<(), SinkError> {
        (**self).push(event)
    }
}

pub struct Emitter<K> {
    sink: K,
    policy: SyncPolicy,
}

impl<K: EventSink> Emitter<K> {
    pub fn new(sink: K, policy: SyncPolicy) -> Self {
        Self { sink, policy }
    }

    pub fn emit(&mut self, transition: Transition) -> Result<(), SinkError> {
        tracing::debug!(
            seq = transition.sequence,
            position = %transition.position,
            symbol = %transition.symbol,
            direction = %transition.direction,
            "key transition"
        );
        self.sink.push(KeyEvent::Key(transition))
    }

    pub fn emit_sync(&mut self, cycle: u64) -> Result<(), SinkError> {
        self.sink.push(KeyEvent::Sync { cycle })
    }

    /// Emit one cycle's transitions followed by a sync barrier as the policy
    /// dictates. Returns whether a sync was sent. Stops at the first sink
    /// error.
    pub fn emit_frame(
        &mut self,
        cycle: u64,
        transitions: &[Transition],
    ) -> Result<bool, SinkError> {
        for &transition in transitions {
            self.emit(transition)?;
        }

        let sync = match self.policy {
            SyncPolicy::PerCycle => true,
            SyncPolicy::OnChange => !transitions.is_empty(),
        };
        if sync {
            self.emit_sync(cycle)?;
        }
        Ok(sync)
    }

    pub fn into_sink(self) -> K {
        self.sink
    }
}

/// Bounded channel sink. A full channel blocks the scan loop until the
/// receiver catches up; a dropped receiver makes the sink unavailable.
pub struct ChannelSink {
    tx: SyncSender<KeyEvent>,
}

impl ChannelSink {
    pub fn bounded(capacity: usize) -> (Self, Receiver<KeyEvent>) {
        let (tx, rx) = mpsc::sync_channel(capacity);
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn push(&mut self, event: KeyEvent) -> Result<(), SinkError> {
        self.tx
            .send(event)
            .map_err(|_| SinkError::Unavailable("event receiver dropped".into()))
    }
}

/// Records events in memory.
#[derive(Debug, Default, Clone)]
pub struct VecSink {
    pub events: Vec<KeyEvent>,
}

impl EventSink for VecSink {
    fn push(&mut self, event: KeyEvent) -> Result<(), SinkError> {
        self.events.push(event);
        Ok(())
    }
}
