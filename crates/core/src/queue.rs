//! Outbound Queue
//!
//! Holds user messages that could not be written to the connection yet and
//! replays them, oldest first, once the connection is ready again.

use crate::transport::TransportError;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::debug;

/// A message waiting for the connection to become ready.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSend {
    /// The conversation log entry this payload was produced from.
    pub entry_id: u64,
    /// The encoded outbound frame.
    pub payload: String,
    pub enqueued_at: DateTime<Utc>,
}

/// Result of a [`OutboundQueue::drain`] pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainReport {
    /// Entry ids whose payload was accepted by the transport, in send order.
    pub sent: Vec<u64>,
    /// Number of payloads still queued after the pass.
    pub remaining: usize,
}

/// FIFO queue of unsent payloads. Unbounded.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    pending: VecDeque<PendingSend>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, entry_id: u64, payload: String) {
        self.pending.push_back(PendingSend {
            entry_id,
            payload,
            enqueued_at: Utc::now(),
        });
    }

    /// Transmits queued payloads in FIFO order through `send`.
    ///
    /// A payload is removed only after `send` accepted it. The pass stops at the
    /// first failure and leaves that payload and everything behind it queued.
    pub fn drain<F>(&mut self, mut send: F) -> DrainReport
    where
        F: FnMut(&str) -> Result<(), TransportError>,
    {
        let mut report = DrainReport::default();
        while let Some(next) = self.pending.front() {
            if let Err(e) = send(&next.payload) {
                debug!(error = %e, entry_id = next.entry_id, "Drain interrupted; keeping the rest queued.");
                break;
            }
            if let Some(done) = self.pending.pop_front() {
                report.sent.push(done.entry_id);
            }
        }
        report.remaining = self.pending.len();
        report
    }

    /// Removes and returns every queued payload, oldest first.
    pub fn take_all(&mut self) -> Vec<PendingSend> {
        self.pending.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingSend> {
        self.pending.iter()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
