//! Bounded conversation history
//!
//! A ring buffer of messages capped at `messageHistoryLimit`; appending past
//! the cap evicts the oldest entry.

use crate::protocol::{Message, MessageStatus};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct MessageHistory {
    entries: VecDeque<Message>,
    limit: usize,
}

impl MessageHistory {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            entries: VecDeque::with_capacity(limit.min(1024)),
            limit,
        }
    }

    /// Append a message, returning the entry evicted to make room
    pub fn push(&mut self, message: Message) -> Option<Message> {
        let evicted = if self.entries.len() >= self.limit {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(message);
        evicted
    }

    /// Update the status of a message still in history
    pub fn set_status(&mut self, id: &str, status: MessageStatus) -> bool {
        match self.entries.iter_mut().rev().find(|m| m.id == id) {
            Some(message) => {
                message.status = status;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.entries.iter().rev().find(|m| m.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<Message> {
        self.entries.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
