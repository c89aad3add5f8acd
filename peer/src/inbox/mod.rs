//! Received message history and outstanding delivery confirmations

use chrono::{DateTime, Local};
use ipmsg::MessageRecord;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub from: String,
    pub key: String,
    pub sequence: u64,
    pub body: String,
    pub received_at: DateTime<Local>,
}

#[derive(Debug)]
pub struct Inbox {
    messages: Mutex<VecDeque<InboundMessage>>,
    /// `(sequence, destination)`, oldest first
    pending: Mutex<VecDeque<(u64, SocketAddr)>>,
    limit: usize,
}

impl Inbox {
    pub fn new(limit: usize) -> Self {
        Self {
            messages: Mutex::new(VecDeque::new()),
            pending: Mutex::new(VecDeque::new()),
            limit: limit.max(1),
        }
    }

    /// Store a delivered message, dropping the oldest past the limit
    pub fn push(&self, record: &MessageRecord) -> InboundMessage {
        let message = InboundMessage {
            from: record.display_name(),
            key: record.identity_key().unwrap_or_default(),
            sequence: record.sequence,
            body: record.option.clone(),
            received_at: record.received_at.unwrap_or_else(Local::now),
        };

        let mut messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        messages.push_back(message.clone());
        while messages.len() > self.limit {
            messages.pop_front();
        }

        message
    }

    /// Newest `n` messages, oldest first
    pub fn recent(&self, n: usize) -> Vec<InboundMessage> {
        let messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = messages.len().saturating_sub(n);
        messages.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Remember a message sent with a confirmation request.
    ///
    /// Confirmations may never arrive; past the history limit the oldest
    /// outstanding entry is forgotten.
    pub fn track(&self, sequence: u64, dest: SocketAddr) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.push_back((sequence, dest));
        while pending.len() > self.limit {
            pending.pop_front();
        }
    }

    /// Resolve a confirmation for `sequence` sent back by `from`.
    ///
    /// Only the peer the message went to can confirm it.
    pub fn confirm(&self, sequence: u64, from: SocketAddr) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        match pending.iter().position(|&(seq, dest)| seq == sequence && dest == from) {
            Some(index) => {
                pending.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
