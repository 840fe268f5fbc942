//! Outbound sync planning.
//!
//! # Algorithm
//!
//! 1. Serialize the stabilized cart into the canonical wire payload
//! 2. Fingerprint it; an empty cart's fingerprint is the delete marker
//! 3. Same scope and fingerprint as the last successful call: skip
//! 4. Otherwise replace (non-empty) or delete (empty)
//!
//! The memo is only updated after the call succeeds, so a failed push is
//! retried by the next cycle. A scope transition resets it, so the first
//! write after a transition is never skipped as a false duplicate.

use cart_engine::{stabilize, to_wire, CartLine, Scope, WirePayload};

/// Fingerprint recorded for a deleted (empty) remote cart.
pub const DELETE_MARKER: &str = "delete";

/// What the next sync cycle should do.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncPlan {
    /// Remote already matches
    Skip,
    Replace {
        payload: WirePayload,
        fingerprint: String,
    },
    Delete,
}

impl SyncPlan {
    /// The memo value to record once the call succeeds.
    pub fn fingerprint(&self) -> Option<&str> {
        match self {
            SyncPlan::Skip => None,
            SyncPlan::Replace { fingerprint, .. } => Some(fingerprint.as_str()),
            SyncPlan::Delete => Some(DELETE_MARKER),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct SyncScheduler {
    last_sent: Option<(Scope, String)>,
}

impl SyncScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan(&self, scope: &Scope, lines: &[CartLine]) -> cart_engine::Result<SyncPlan> {
        let payload = to_wire(lines);
        let fingerprint = if payload.is_empty() {
            DELETE_MARKER.to_string()
        } else {
            payload.fingerprint()?
        };

        if self.matches(scope, &fingerprint) {
            return Ok(SyncPlan::Skip);
        }
        Ok(if payload.is_empty() {
            SyncPlan::Delete
        } else {
            SyncPlan::Replace {
                payload,
                fingerprint,
            }
        })
    }

    fn matches(&self, scope: &Scope, fingerprint: &str) -> bool {
        self.last_sent
            .as_ref()
            .is_some_and(|(s, f)| s == scope && f == fingerprint)
    }

    /// Record a successful call.
    pub fn mark_sent(&mut self, scope: Scope, fingerprint: impl Into<String>) {
        self.last_sent = Some((scope, fingerprint.into()));
    }

    /// Record what the remote was just observed to hold.
    pub fn observe_remote(&mut self, scope: Scope, remote: &[CartLine]) -> cart_engine::Result<()> {
        let payload = to_wire(&stabilize(remote.iter().cloned()));
        let fingerprint = if payload.is_empty() {
            DELETE_MARKER.to_string()
        } else {
            payload.fingerprint()?
        };
        self.mark_sent(scope, fingerprint);
        Ok(())
    }

    pub fn reset(&mut self) {
        self.last_sent = None;
    }

    pub fn last_sent(&self) -> Option<&(Scope, String)> {
        self.last_sent.as_ref()
    }
}
