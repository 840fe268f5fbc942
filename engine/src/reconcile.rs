//! Reconciliation of the local cart with the order service's copy.
//!
//! The remote snapshot is eventually-consistent input, never sole truth.
//!
//! # Algorithm
//!
//! 1. Remote empty, local non-empty: local wins unchanged (an empty remote
//!    usually means "not yet synced", never "clear the cart")
//! 2. For each remote line, find its local counterpart by identity or line id
//! 3. Counterpart found: merge remote into local (stable local fields survive,
//!    remote refreshes price, quantity, stock)
//! 4. No counterpart: adopt the remote line
//! 5. Local-only lines are preserved
//! 6. Stabilize the result
//!
//! A remote quantity refresh is clamped to the headroom the other lines leave
//! under the variant's stock cap, so a refreshed line does not push a local
//! sibling out of the cart. A line can still be capped out when the remote
//! reports a lower cap; such lines are listed in [`ReconcileResult::dropped`].

use crate::identity::{same_identity, shares_variant};
use crate::merge::merge;
use crate::stabilize::stabilize;
use crate::stock::{cap_for, clamp_to_headroom};
use crate::CartLine;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How a line ended up in the reconciled cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LineSource {
    /// Local line with no remote counterpart
    LocalOnly,
    /// Local line refreshed from its remote counterpart
    Merged,
    /// Remote line with no local counterpart
    Adopted,
}

/// Result of reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResult {
    /// The reconciled, stabilized lines
    pub lines: Vec<CartLine>,
    /// Line ids preserved from local only
    pub local_only: Vec<String>,
    /// Line ids merged with a remote counterpart
    pub merged: Vec<String>,
    /// Line ids adopted from remote
    pub adopted: Vec<String>,
    /// Local line ids removed because their variant had no stock headroom left
    pub dropped: Vec<String>,
    /// True when the remote snapshot was empty and local was kept verbatim
    pub kept_local: bool,
}

impl ReconcileResult {
    /// Whether reconciliation changed anything relative to `local`.
    pub fn changed_from(&self, local: &[CartLine]) -> bool {
        self.lines.as_slice() != local
    }
}

/// Reconcile local lines with remote lines, returning only the lines.
pub fn reconcile(local: &[CartLine], remote: &[CartLine]) -> Vec<CartLine> {
    Reconciler::new(local).reconcile(remote).lines
}

/// Reconciles one local snapshot against a remote one.
pub struct Reconciler<'a> {
    local: &'a [CartLine],
}

impl<'a> Reconciler<'a> {
    pub fn new(local: &'a [CartLine]) -> Self {
        Self { local }
    }

    pub fn reconcile(self, remote: &[CartLine]) -> ReconcileResult {
        if remote.is_empty() {
            return ReconcileResult {
                lines: self.local.to_vec(),
                local_only: self.local.iter().map(|l| l.line_id.clone()).collect(),
                merged: Vec::new(),
                adopted: Vec::new(),
                dropped: Vec::new(),
                kept_local: !self.local.is_empty(),
            };
        }

        let mut lines: Vec<CartLine> = self.local.to_vec();
        let mut sources: Vec<LineSource> = vec![LineSource::LocalOnly; lines.len()];

        for incoming in remote {
            let mut incoming = incoming.clone();
            incoming.normalize();
            match lines
                .iter()
                .position(|existing| is_counterpart(existing, &incoming))
            {
                Some(index) => {
                    let mut merged = merge(&lines[index], &incoming);
                    merged.quantity = refreshed_quantity(&lines, index, &merged);
                    lines[index] = merged;
                    sources[index] = LineSource::Merged;
                }
                None => {
                    lines.push(incoming);
                    sources.push(LineSource::Adopted);
                }
            }
        }

        let stabilized = stabilize(lines.iter().cloned());
        let present: HashSet<&str> = stabilized.iter().map(|l| l.line_id.as_str()).collect();

        let mut result = ReconcileResult {
            lines: Vec::new(),
            local_only: Vec::new(),
            merged: Vec::new(),
            adopted: Vec::new(),
            dropped: Vec::new(),
            kept_local: false,
        };
        for (line, source) in lines.iter().zip(&sources) {
            let id = line.line_id.clone();
            match source {
                _ if !present.contains(id.as_str()) => {
                    if *source != LineSource::Adopted {
                        result.dropped.push(id);
                    }
                }
                LineSource::LocalOnly => result.local_only.push(id),
                LineSource::Merged => result.merged.push(id),
                LineSource::Adopted => result.adopted.push(id),
            }
        }
        result.lines = stabilized;
        result
    }
}

/// The merged quantity, clamped to what the other lines sharing the variant
/// leave free. Without headroom the local quantity stands.
fn refreshed_quantity(lines: &[CartLine], index: usize, merged: &CartLine) -> u32 {
    let others: Vec<&CartLine> = lines
        .iter()
        .enumerate()
        .filter(|(i, l)| *i != index && shares_variant(l, merged))
        .map(|(_, l)| l)
        .collect();
    let used = others.iter().fold(0u32, |sum, l| sum.saturating_add(l.quantity));
    let cap = cap_for(others.iter().copied().chain(std::iter::once(merged)));
    clamp_to_headroom(merged.quantity, cap, used).unwrap_or(lines[index].quantity)
}

fn is_counterpart(local: &CartLine, remote: &CartLine) -> bool {
    same_identity(local, remote) || (!local.line_id.is_empty() && local.line_id == remote.line_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;

    fn line(value: serde_json::Value) -> CartLine {
        CartLine::from_value(&value).unwrap()
    }

    #[test]
    fn empty_remote_keeps_local_verbatim() {
        let local = vec![
            line(json!({"productId": "p1", "variantId": "v1", "quantity": 2})),
            line(json!({"productId": "p2", "variantId": "v2"})),
        ];

        let result = Reconciler::new(&local).reconcile(&[]);
        assert!(result.kept_local);
        assert_eq!(result.lines, local);
        assert!(!result.changed_from(&local));
    }

    #[test]
    fn both_empty() {
        let result = Reconciler::new(&[]).reconcile(&[]);
        assert!(result.lines.is_empty());
        assert!(!result.kept_local);
    }

    #[test]
    fn remote_refreshes_price_but_not_display() {
        let local = vec![line(json!({
            "productId": "p1", "variantId": "v1", "title": "Linen Shirt",
            "thumbnail": "https://cdn/local.jpg", "price": "49.00",
        }))];
        let remote = vec![line(json!({
            "productId": "p1", "variantId": "v1", "title": "LINEN SHIRT (SS24)",
            "thumbnail": "https://cdn/remote.jpg", "price": "39.00", "quantity": 2,
        }))];

        let result = Reconciler::new(&local).reconcile(&remote);
        assert_eq!(result.lines.len(), 1);
        let merged = &result.lines[0];
        assert_eq!(merged.title, "Linen Shirt");
        assert_eq!(merged.thumbnail, "https://cdn/local.jpg");
        assert_eq!(merged.price, Some(Decimal::new(3900, 2)));
        assert_eq!(merged.quantity, 2);
        assert_eq!(merged.line_id, local[0].line_id);
        assert_eq!(result.merged, vec![local[0].line_id.clone()]);
    }

    #[test]
    fn remote_only_lines_are_adopted_and_local_only_preserved() {
        let local = vec![line(json!({"productId": "p1", "variantId": "v1"}))];
        let remote = vec![line(json!({"productId": "p2", "variantId": "v2", "quantity": 3}))];

        let result = Reconciler::new(&local).reconcile(&remote);
        assert_eq!(result.lines.len(), 2);
        assert_eq!(result.local_only, vec![local[0].line_id.clone()]);
        assert_eq!(result.adopted, vec![remote[0].line_id.clone()]);
        assert_eq!(result.lines[1].quantity, 3);
    }

    #[test]
    fn counterpart_found_by_line_id() {
        let local = vec![line(json!({"lineId": "abc", "quantity": 1}))];
        let remote = vec![line(json!({"lineId": "abc", "quantity": 4, "title": "Scarf"}))];

        let lines = reconcile(&local, &remote);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 4);
        assert_eq!(lines[0].title, "Scarf");
    }

    #[test]
    fn reconcile_is_deterministic() {
        let local = vec![line(json!({"productId": "p1", "variantId": "v1", "quantity": 2}))];
        let remote = vec![
            line(json!({"productId": "p1", "variantId": "v1", "quantity": 1})),
            line(json!({"productId": "p3", "variantId": "v3"})),
        ];

        assert_eq!(reconcile(&local, &remote), reconcile(&local, &remote));
    }

    #[test]
    fn remote_refresh_leaves_room_for_local_siblings() {
        let local = vec![
            line(json!({"productId": "p1", "variantId": "v1", "selectedSize": "S",
                        "inventoryRowId": "r1", "quantity": 1, "maxAvailable": 3})),
            line(json!({"productId": "p1", "variantId": "v1", "selectedSize": "M",
                        "inventoryRowId": "r1", "quantity": 2})),
        ];
        let remote = vec![line(json!({"productId": "p1", "variantId": "v1",
                                      "selectedSize": "S", "inventoryRowId": "r1", "quantity": 3}))];

        let result = Reconciler::new(&local).reconcile(&remote);
        assert_eq!(result.lines.len(), 2);
        assert_eq!(result.lines[0].quantity, 1);
        assert_eq!(result.lines[1].quantity, 2);
        assert!(result.dropped.is_empty());
    }

    #[test]
    fn lower_remote_cap_reports_dropped_sibling() {
        let local = vec![
            line(json!({"productId": "p1", "variantId": "v1", "selectedColor": "red",
                        "inventoryRowId": "r1", "quantity": 1})),
            line(json!({"productId": "p1", "variantId": "v1", "selectedColor": "ruby",
                        "inventoryRowId": "r1", "quantity": 1})),
        ];
        let remote = vec![line(json!({"productId": "p1", "variantId": "v1",
                                      "selectedColor": "red", "inventoryRowId": "r1",
                                      "quantity": 1, "maxAvailable": 1}))];

        let result = Reconciler::new(&local).reconcile(&remote);
        assert_eq!(result.lines.len(), 1);
        assert_eq!(result.dropped, vec![local[1].line_id.clone()]);
    }
}
