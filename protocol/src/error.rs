//! Engine error types

use crate::record::MessageRecord;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to send to {dest}: {source}")]
    Transport {
        dest: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Record has no destination")]
    NoDestination,

    #[error("Receive failed: {0}")]
    Receive(#[source] std::io::Error),

    #[error("Failed to read local address: {0}")]
    LocalAddr(#[source] std::io::Error),

    #[error("Socket closed")]
    Closed,

    #[error("Socket is not open")]
    NotOpen,

    /// A dispatch handler failed; the datagram itself parsed fine
    #[error("Handler for {} failed: {source}", .record.command.mode())]
    Handler {
        record: Box<MessageRecord>,
        #[source]
        source: anyhow::Error,
    },
}

impl EngineError {
    /// Record that was received before a handler failed
    pub fn record(&self) -> Option<&MessageRecord> {
        match self {
            EngineError::Handler { record, .. } => Some(record.as_ref()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
