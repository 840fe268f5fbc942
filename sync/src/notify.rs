//! Change notification bus.
//!
//! Every successful cart write is announced on a process-wide broadcast
//! channel shared by all engine instances (one per tab). Each event carries a
//! unique token; the writer remembers its recent tokens and ignores its own
//! events, so a write never triggers a reread-and-rewrite loop in the same
//! instance while writes from other instances still propagate.

use std::collections::VecDeque;

use cart_engine::Scope;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

const DEFAULT_CAPACITY: usize = 64;

/// Tokens remembered per instance.
pub const TOKEN_HISTORY: usize = 32;

/// Announcement of a write to a cart partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// Instance that wrote
    pub source: String,
    /// Unique per write
    pub token: String,
    /// Partition written
    pub scope: Scope,
    /// Storage key written
    pub key: String,
}

/// Process-wide broadcast of [`ChangeEvent`]s.
#[derive(Debug, Clone)]
pub struct ChangeBus {
    tx: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ChangeBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Returns how many listeners received it.
    pub fn emit(&self, event: ChangeEvent) -> usize {
        trace!(token = %event.token, scope = %event.scope, "Change emitted");
        // No listeners is not an error.
        self.tx.send(event).unwrap_or(0)
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Bounded memory of tokens this instance emitted.
#[derive(Debug, Clone)]
pub struct TokenLedger {
    recent: VecDeque<String>,
    capacity: usize,
}

impl Default for TokenLedger {
    fn default() -> Self {
        Self::new(TOKEN_HISTORY)
    }
}

impl TokenLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            recent: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, token: impl Into<String>) {
        if self.recent.len() == self.capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(token.into());
    }

    pub fn contains(&self, token: &str) -> bool {
        self.recent.iter().any(|t| t == token)
    }

    pub fn len(&self) -> usize {
        self.recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }
}

/// A fresh write token.
pub fn new_token() -> String {
    uuid::Uuid::new_v4().to_string()
}
