//! Line stabilization: normalize, backfill and deduplicate.
//!
//! The output is canonical and render-stable:
//! - at most one line per identity
//! - `lineId` unchanged across repeated passes over the same logical content
//! - summed quantity per shared variant never above its stock cap
//!
//! `stabilize(stabilize(x)) == stabilize(x)` for every input.

use crate::identity::{same_identity, shares_variant, Identity};
use crate::line::derive_line_id;
use crate::merge::merge;
use crate::stock::{clamp_to_headroom, effective_max_available};
use crate::CartLine;
use serde_json::Value;
use std::collections::HashSet;

/// Stabilize a collection of lines.
pub fn stabilize(lines: impl IntoIterator<Item = CartLine>) -> Vec<CartLine> {
    let mut out: Vec<CartLine> = Vec::new();

    for mut line in lines {
        line.normalize();
        match out.iter().position(|existing| is_duplicate(existing, &line)) {
            Some(index) => {
                let existing = &out[index];
                let cap = effective_max_available(existing, Some(&line));
                let summed = existing.quantity.saturating_add(line.quantity);
                let mut merged = merge(existing, &line);
                merged.quantity = match cap {
                    Some(cap) => summed.min(cap).max(1),
                    None => summed,
                };
                out[index] = merged;
            }
            None => out.push(line),
        }
    }

    let mut out = enforce_variant_caps(out);
    dedupe_line_ids(&mut out);
    out
}

/// Stabilize raw line objects. Non-object entries are skipped.
pub fn stabilize_values(raw: &[Value]) -> Vec<CartLine> {
    stabilize(raw.iter().filter_map(CartLine::from_value))
}

/// Identity keys decide whenever both sides carry comparable keys; the line id
/// is the last resort for lines nothing else identifies.
fn is_duplicate(a: &CartLine, b: &CartLine) -> bool {
    let strict_known = !a.strict_key.is_empty() && !b.strict_key.is_empty();
    let loose_known = !a.loose_key.is_empty() && !b.loose_key.is_empty();
    if strict_known || loose_known {
        same_identity(a, b)
    } else {
        !a.line_id.is_empty() && a.line_id == b.line_id
    }
}

/// Give every line a unique id. A later line whose id is taken gets one
/// derived from its own identity, or a fresh one.
fn dedupe_line_ids(lines: &mut [CartLine]) {
    let mut seen = HashSet::new();
    for line in lines.iter_mut() {
        if !seen.contains(&line.line_id) {
            seen.insert(line.line_id.clone());
            continue;
        }
        let derived = derive_line_id(&line.identity());
        line.line_id = if seen.contains(&derived) {
            derive_line_id(&Identity::default())
        } else {
            derived
        };
        seen.insert(line.line_id.clone());
    }
}

/// Clamp each line to its cap, and distinct lines sharing a variant so their
/// sum stays within it. Earlier lines keep their quantity; a later line with
/// no headroom left is dropped.
fn enforce_variant_caps(lines: Vec<CartLine>) -> Vec<CartLine> {
    let mut kept: Vec<CartLine> = Vec::with_capacity(lines.len());

    for mut line in lines {
        let siblings: Vec<&CartLine> = kept.iter().filter(|k| shares_variant(k, &line)).collect();
        let used = siblings.iter().fold(0u32, |sum, s| sum.saturating_add(s.quantity));
        let cap = siblings
            .iter()
            .fold(effective_max_available(&line, None), |cap, sibling| {
                cap.max(effective_max_available(sibling, None))
            });
        if let Some(quantity) = clamp_to_headroom(line.quantity, cap, used) {
            line.quantity = quantity;
            kept.push(line);
        }
    }

    kept
}
