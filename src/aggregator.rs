//! Per-connection protocol state.
//!
//! The aggregator owns the two pieces of mutable state a connection
//! accumulates between cycle boundaries: the grow-only drone name
//! directory and the buffer of pending measurements. Applying a
//! `*TIME:` sentence packages both into an immutable [`Message`] and
//! resets the buffer.

use std::collections::HashMap;
use std::mem;

use uuid::Uuid;

use crate::message::{MeasuredValue, Message};
use crate::sentence::Sentence;

/// Accumulates sentences into batched messages.
///
/// One aggregator exists per server connection. It is owned by the
/// connection's read loop and never shared, so no locking is involved.
#[derive(Debug, Default)]
pub struct Aggregator {
    /// Every drone seen on this connection. Grow-only; a repeated
    /// `*SOURCE:` sentence for the same UUID overwrites the name.
    drone_names: HashMap<Uuid, String>,

    /// Measurements received since the last cycle boundary, in
    /// reception order.
    pending: Vec<MeasuredValue>,
}

impl Aggregator {
    /// Create an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one sentence to the connection state.
    ///
    /// Measurements and drone sources mutate the internal state and
    /// return `None`. A cycle boundary returns the completed [`Message`]
    /// carrying a snapshot of the full name directory and ownership of
    /// the pending measurements; the pending buffer is empty afterwards.
    /// Ignored sentences change nothing.
    pub fn apply(&mut self, sentence: Sentence) -> Option<Message> {
        match sentence {
            Sentence::Measurement(value) => {
                self.pending.push(value);
                None
            }
            Sentence::DroneSource { drone_id, name } => {
                self.drone_names.insert(drone_id, name);
                None
            }
            Sentence::Time { timestamp } => Some(Message {
                drone_names: self.drone_names.clone(),
                measured_values: mem::take(&mut self.pending),
                timestamp,
            }),
            Sentence::Ignored => None,
        }
    }
}
