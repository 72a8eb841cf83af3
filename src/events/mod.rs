//! Post-commit event notifications
//!
//! Components publish an event only after the store transaction committed.
//! Delivery is best-effort: a failed notification is logged by the caller
//! and never rolls back ledger state.

use crate::error::{ChainError, Result};
use std::sync::mpsc::Sender;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    /// A transaction was accepted into the pool.
    TransactionAccepted { hash: String },
    /// A pooled or coinbase transaction was confirmed by a block.
    TransactionConfirmed { hash: String },
    /// A block was validated and committed to the chain.
    BlockAccepted { hash: String },
}

pub trait EventSink: Send + Sync {
    fn notify(&self, event: ChainEvent) -> Result<()>;
}

/// Forwards events over an mpsc channel, typically to a logging thread.
pub struct ChannelSink {
    sender: Sender<ChainEvent>,
}

impl ChannelSink {
    pub fn new(sender: Sender<ChainEvent>) -> ChannelSink {
        ChannelSink { sender }
    }
}

impl EventSink for ChannelSink {
    fn notify(&self, event: ChainEvent) -> Result<()> {
        self.sender
            .send(event)
            .map_err(|e| ChainError::Internal(format!("Event receiver gone: {e}")))
    }
}

/// Discards every event. Used by tests and one-shot CLI commands.
pub struct NullSink;

impl EventSink for NullSink {
    fn notify(&self, _event: ChainEvent) -> Result<()> {
        Ok(())
    }
}
