//! Outbound retry queue
//!
//! Holds messages whose send failed, in creation order, until the next
//! successful connection. Flushing walks the queue front to back and stops at
//! the first entry that still cannot be sent, so older content never ends up
//! behind newer content.

use crate::protocol::{Message, MessageStatus};
use crate::transport::TransportError;
use std::collections::VecDeque;

/// Outcome of a flush attempt
#[derive(Debug, Default)]
pub struct FlushReport {
    /// Ids delivered during this flush, in send order
    pub sent: Vec<String>,
    /// Error that stopped the flush, if any
    pub error: Option<TransportError>,
    /// Entries still queued afterwards
    pub remaining: usize,
}

#[derive(Debug, Clone)]
pub struct OutboundQueue {
    pending: VecDeque<Message>,
    capacity: usize,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Queue a failed message; a message already queued is not queued twice.
    /// Returns the message back when the queue is full.
    pub fn enqueue(&mut self, mut message: Message) -> Result<(), Message> {
        if self.contains(&message.id) {
            return Ok(());
        }
        if self.pending.len() >= self.capacity {
            return Err(message);
        }
        message.status = MessageStatus::Failed;
        self.pending.push_back(message);
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pending.iter().any(|m| m.id == id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.pending.iter()
    }

    pub fn to_vec(&self) -> Vec<Message> {
        self.pending.iter().cloned().collect()
    }

    /// Resend queued messages in FIFO order through `send`.
    /// Delivered entries leave the queue; the first failure stops the flush.
    pub fn flush<F>(&mut self, mut send: F) -> FlushReport
    where
        F: FnMut(&Message) -> Result<(), TransportError>,
    {
        let mut report = FlushReport::default();
        while let Some(front) = self.pending.front() {
            match send(front) {
                Ok(()) => {
                    if let Some(mut delivered) = self.pending.pop_front() {
                        delivered.status = MessageStatus::Sent;
                        report.sent.push(delivered.id);
                    }
                }
                Err(e) => {
                    report.error = Some(e);
                    break;
                }
            }
        }
        report.remaining = self.pending.len();
        report
    }
}
