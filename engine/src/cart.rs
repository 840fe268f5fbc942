//! Cart - the in-memory line collection and its mutation operations.
//!
//! All mutations are synchronous and total. Stock caps are enforced per
//! shared variant: the summed quantity of every line drawing from the same
//! stock never exceeds the best known cap.

use crate::identity::{same_identity, shares_variant, LineMatcher};
use crate::merge::merge;
use crate::stabilize::stabilize;
use crate::stock::{cap_for, clamp_to_headroom};
use crate::CartLine;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Result of [`Cart::add`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AddOutcome {
    /// A new line was appended
    Added {
        line_id: String,
        quantity: u32,
        clamped: bool,
    },
    /// The request merged into an existing line
    Merged {
        line_id: String,
        quantity: u32,
        clamped: bool,
    },
    /// No headroom left for the variant; nothing changed
    StockExhausted,
}

impl AddOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, AddOutcome::StockExhausted)
    }
}

/// Result of [`Cart::update_quantity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateOutcome {
    /// Quantity set, possibly clamped to headroom
    Updated {
        line_id: String,
        quantity: u32,
        clamped: bool,
    },
    /// Zero requested; the line was removed
    Removed { line_id: String },
    /// Siblings already exhaust the stock; prior quantity retained
    Dropped { line_id: String, quantity: u32 },
    /// No line matched
    NotFound,
}

impl UpdateOutcome {
    pub fn changed(&self) -> bool {
        matches!(
            self,
            UpdateOutcome::Updated { .. } | UpdateOutcome::Removed { .. }
        )
    }
}

/// Ordered collection of cart lines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    /// Create an empty cart.
    pub fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Build a cart from lines, stabilizing them.
    pub fn from_lines(lines: impl IntoIterator<Item = CartLine>) -> Self {
        Self {
            lines: stabilize(lines),
        }
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<CartLine> {
        self.lines
    }

    /// Replace every line, stabilizing the new set.
    pub fn replace(&mut self, lines: impl IntoIterator<Item = CartLine>) {
        self.lines = stabilize(lines);
    }

    pub fn get(&self, line_id: &str) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.line_id == line_id)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total quantity across all lines.
    pub fn item_count(&self) -> u32 {
        self.lines
            .iter()
            .fold(0u32, |sum, l| sum.saturating_add(l.quantity))
    }

    /// Sum of `price * quantity` across all lines, saturating at `Decimal::MAX`.
    pub fn subtotal(&self) -> Decimal {
        self.lines
            .iter()
            .map(CartLine::line_total)
            .fold(Decimal::ZERO, |sum, total| {
                sum.checked_add(total).unwrap_or(Decimal::MAX)
            })
    }

    /// Add a line, merging into an identity match and respecting the variant cap.
    ///
    /// Headroom counts every line drawing from the incoming line's stock or
    /// from the stock of the line it merges into.
    pub fn add(&mut self, incoming: CartLine) -> AddOutcome {
        let mut incoming = incoming;
        incoming.normalize();

        let target = self.lines.iter().position(|l| same_identity(l, &incoming));
        let matched = target.map(|index| &self.lines[index]);
        let siblings: Vec<&CartLine> = self
            .lines
            .iter()
            .enumerate()
            .filter(|(i, l)| {
                Some(*i) != target
                    && (shares_variant(l, &incoming)
                        || matched.is_some_and(|m| shares_variant(l, m)))
            })
            .map(|(_, l)| l)
            .collect();
        let used = siblings
            .iter()
            .copied()
            .chain(matched)
            .fold(0u32, |sum, l| sum.saturating_add(l.quantity));
        let cap = cap_for(
            siblings
                .iter()
                .copied()
                .chain(matched)
                .chain(std::iter::once(&incoming)),
        );

        let allowed = match clamp_to_headroom(incoming.quantity, cap, used) {
            Some(allowed) => allowed,
            None => return AddOutcome::StockExhausted,
        };
        let clamped = allowed < incoming.quantity;

        match target {
            Some(index) => {
                let existing = &self.lines[index];
                let quantity = existing.quantity.saturating_add(allowed);
                let mut merged = merge(existing, &incoming);
                merged.quantity = quantity;
                let line_id = merged.line_id.clone();
                self.lines[index] = merged;
                AddOutcome::Merged {
                    line_id,
                    quantity,
                    clamped,
                }
            }
            None => {
                incoming.quantity = allowed;
                let fallback_id = incoming.line_id.clone();
                let before: HashMap<String, u32> = self
                    .lines
                    .iter()
                    .map(|l| (l.line_id.clone(), l.quantity))
                    .collect();
                self.lines.push(incoming);
                // Keep ids unique even when a caller reused one; a reused id
                // folds the new line into the line already holding it.
                self.lines = stabilize(std::mem::take(&mut self.lines));

                let changed = self
                    .lines
                    .iter()
                    .find(|l| before.get(&l.line_id) != Some(&l.quantity));
                match changed {
                    Some(line) if before.contains_key(&line.line_id) => AddOutcome::Merged {
                        line_id: line.line_id.clone(),
                        quantity: line.quantity,
                        clamped,
                    },
                    Some(line) => AddOutcome::Added {
                        line_id: line.line_id.clone(),
                        quantity: line.quantity,
                        clamped,
                    },
                    None => AddOutcome::Added {
                        line_id: fallback_id,
                        quantity: allowed,
                        clamped,
                    },
                }
            }
        }
    }

    /// Remove every line matching `matcher`. Returns how many were removed.
    pub fn remove(&mut self, matcher: &LineMatcher) -> usize {
        let before = self.lines.len();
        self.lines.retain(|l| !matcher.matches(l));
        before - self.lines.len()
    }

    /// Set the quantity of the first line matching `matcher`.
    ///
    /// Headroom is computed from every other line sharing the target's
    /// variant. A zero quantity removes the line.
    pub fn update_quantity(&mut self, matcher: &LineMatcher, quantity: u32) -> UpdateOutcome {
        let Some(index) = self.lines.iter().position(|l| matcher.matches(l)) else {
            return UpdateOutcome::NotFound;
        };
        let target = &self.lines[index];
        let line_id = target.line_id.clone();

        if quantity == 0 {
            self.lines.remove(index);
            return UpdateOutcome::Removed { line_id };
        }

        let siblings: Vec<&CartLine> = self
            .lines
            .iter()
            .enumerate()
            .filter(|(i, l)| *i != index && shares_variant(l, target))
            .map(|(_, l)| l)
            .collect();
        let used = siblings.iter().fold(0u32, |sum, l| sum.saturating_add(l.quantity));
        let cap = cap_for(siblings.iter().copied().chain(std::iter::once(target)));

        match clamp_to_headroom(quantity, cap, used) {
            Some(allowed) => {
                self.lines[index].quantity = allowed;
                UpdateOutcome::Updated {
                    line_id,
                    quantity: allowed,
                    clamped: allowed < quantity,
                }
            }
            None => UpdateOutcome::Dropped {
                line_id,
                quantity: target.quantity,
            },
        }
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::derive_identity;
    use serde_json::json;
    use std::str::FromStr;

    fn line(value: serde_json::Value) -> CartLine {
        CartLine::from_value(&value).unwrap()
    }

    #[test]
    fn empty_cart() {
        let cart = Cart::new();
        assert!(cart.is_empty());
        assert_eq!(cart.item_count(), 0);
        assert_eq!(cart.subtotal(), Decimal::ZERO);
    }

    #[test]
    fn aggregates() {
        let mut cart = Cart::new();
        cart.add(line(json!({"productId": "p1", "variantId": "v1", "price": "10.00", "quantity": 2})));
        cart.add(line(json!({"productId": "p2", "variantId": "v2", "price": "2.50", "quantity": 3})));
        cart.add(line(json!({"productId": "p3", "variantId": "v3", "quantity": 1})));

        assert_eq!(cart.len(), 3);
        assert_eq!(cart.item_count(), 6);
        assert_eq!(cart.subtotal(), Decimal::from_str("27.50").unwrap());
    }

    #[test]
    fn add_merges_identity_match() {
        let mut cart = Cart::new();
        let first = cart.add(line(json!({"productId": "p1", "variantId": "v1", "quantity": 1})));
        let second = cart.add(line(json!({"productId": "p1", "variantId": "v1", "quantity": 2})));

        let AddOutcome::Added { line_id, .. } = first else {
            panic!("expected Added, got {first:?}");
        };
        assert_eq!(
            second,
            AddOutcome::Merged {
                line_id,
                quantity: 3,
                clamped: false
            }
        );
        assert_eq!(cart.len(), 1);
    }

    #[test]
    fn add_clamps_to_headroom() {
        let mut cart = Cart::new();
        cart.add(line(json!({"productId": "p1", "variantId": "v1", "quantity": 2, "maxAvailable": 3})));
        let outcome = cart.add(line(json!({"productId": "p1", "variantId": "v1", "quantity": 5})));

        assert!(matches!(
            outcome,
            AddOutcome::Merged {
                quantity: 3,
                clamped: true,
                ..
            }
        ));
    }

    #[test]
    fn add_without_headroom_is_noop() {
        let mut cart = Cart::new();
        cart.add(line(json!({"productId": "p1", "variantId": "v1", "quantity": 3, "maxAvailable": 3})));
        let before = cart.clone();

        let outcome = cart.add(line(json!({"productId": "p1", "variantId": "v1", "quantity": 2})));
        assert_eq!(outcome, AddOutcome::StockExhausted);
        assert!(!outcome.changed());
        assert_eq!(cart, before);
    }

    #[test]
    fn shared_inventory_row_shares_headroom() {
        let mut cart = Cart::new();
        cart.add(line(json!({"productId": "p1", "variantId": "v1", "selectedColor": "navy",
                             "inventoryRowId": "r1", "quantity": 3, "maxAvailable": 4})));
        let outcome = cart.add(line(json!({"productId": "p1", "variantId": "v1",
                                           "selectedColor": "midnight", "inventoryRowId": "r1",
                                           "quantity": 3})));

        assert!(matches!(
            outcome,
            AddOutcome::Added {
                quantity: 1,
                clamped: true,
                ..
            }
        ));
        assert_eq!(cart.len(), 2);
        assert_eq!(cart.item_count(), 4);
    }

    #[test]
    fn loose_match_counts_siblings_on_matched_row() {
        let mut cart = Cart::new();
        cart.add(line(json!({"productId": "p", "variantId": "v", "selectedColor": "red",
                             "inventoryRowId": "r1", "quantity": 3, "maxAvailable": 5})));
        cart.add(line(json!({"productId": "p", "variantId": "v", "selectedColor": "crimson",
                             "inventoryRowId": "r1", "quantity": 2})));
        assert_eq!(cart.item_count(), 5);

        // No row id: loose-matches the crimson line, which shares r1 with red.
        let outcome = cart.add(line(json!({"productId": "p", "variantId": "v",
                                           "selectedColor": "crimson", "quantity": 3})));
        assert_eq!(outcome, AddOutcome::StockExhausted);
        assert_eq!(cart.item_count(), 5);
    }

    #[test]
    fn loose_match_clamps_to_matched_row_headroom() {
        let mut cart = Cart::new();
        cart.add(line(json!({"productId": "p", "variantId": "v", "selectedColor": "red",
                             "inventoryRowId": "r1", "quantity": 2, "maxAvailable": 5})));
        cart.add(line(json!({"productId": "p", "variantId": "v", "selectedColor": "crimson",
                             "inventoryRowId": "r1", "quantity": 1})));

        let outcome = cart.add(line(json!({"productId": "p", "variantId": "v",
                                           "selectedColor": "crimson", "quantity": 4})));
        assert!(matches!(
            outcome,
            AddOutcome::Merged {
                quantity: 3,
                clamped: true,
                ..
            }
        ));
        assert_eq!(cart.item_count(), 5);
    }

    #[test]
    fn reused_line_id_reports_the_line_it_folded_into() {
        let mut cart = Cart::from_lines(vec![
            line(json!({"lineId": "x", "title": "Gift box"})),
            line(json!({"productId": "p", "variantId": "v"})),
        ]);

        let outcome = cart.add(line(json!({"lineId": "x", "title": "Gift box", "quantity": 2})));
        let folded = cart.get("x").unwrap();
        assert_eq!(folded.quantity, 3);
        assert_eq!(
            outcome,
            AddOutcome::Merged {
                line_id: "x".into(),
                quantity: 3,
                clamped: false
            }
        );
        assert_eq!(cart.len(), 2);
    }

    #[test]
    fn subtotal_saturates() {
        let huge = Decimal::from_str("100000000000000000000").unwrap();
        let cart = Cart::from_lines(vec![
            CartLine::new("p1", "v1", u32::MAX).with_price(huge),
            CartLine::new("p2", "v2", 1).with_price(Decimal::ONE),
        ]);
        assert_eq!(cart.subtotal(), Decimal::MAX);
    }

    #[test]
    fn remove_by_line_id_and_identity() {
        let mut cart = Cart::new();
        cart.add(line(json!({"productId": "p1", "variantId": "v1"})));
        cart.add(line(json!({"productId": "p2", "variantId": "v2"})));
        let first_id = cart.lines()[0].line_id.clone();

        assert_eq!(cart.remove(&LineMatcher::line_id(&first_id)), 1);
        assert_eq!(cart.len(), 1);

        let identity = derive_identity(&line(json!({"product": {"id": "p2"}, "variantId": "v2"})));
        assert_eq!(cart.remove(&LineMatcher::identity(&identity)), 1);
        assert!(cart.is_empty());
        assert_eq!(cart.remove(&LineMatcher::line_id("missing")), 0);
    }

    #[test]
    fn update_quantity_clamps_to_sibling_headroom() {
        let mut cart = Cart::new();
        cart.add(line(json!({"productId": "p1", "variantId": "v1", "selectedSize": "S",
                             "inventoryRowId": "r1", "quantity": 2, "maxAvailable": 5})));
        cart.add(line(json!({"productId": "p1", "variantId": "v1", "selectedSize": "small",
                             "inventoryRowId": "r1", "quantity": 1})));
        let target = cart.lines()[1].line_id.clone();

        let outcome = cart.update_quantity(&LineMatcher::line_id(&target), 10);
        assert_eq!(
            outcome,
            UpdateOutcome::Updated {
                line_id: target.clone(),
                quantity: 3,
                clamped: true
            }
        );
        assert_eq!(cart.item_count(), 5);
    }

    #[test]
    fn update_quantity_dropped_when_siblings_exhaust_stock() {
        let mut cart = Cart::new();
        cart.add(line(json!({"productId": "p1", "variantId": "v1", "selectedColor": "red",
                             "inventoryRowId": "r1", "quantity": 2, "maxAvailable": 3})));
        cart.add(line(json!({"productId": "p1", "variantId": "v1", "selectedColor": "scarlet",
                             "inventoryRowId": "r1", "quantity": 1})));
        let first = cart.lines()[0].line_id.clone();
        let second = cart.lines()[1].line_id.clone();
        assert_eq!(
            cart.update_quantity(&LineMatcher::line_id(&first), 3),
            UpdateOutcome::Updated {
                line_id: first.clone(),
                quantity: 2,
                clamped: true
            }
        );
        cart.lines[0].quantity = 3;

        let outcome = cart.update_quantity(&LineMatcher::line_id(&second), 2);
        assert_eq!(
            outcome,
            UpdateOutcome::Dropped {
                line_id: second,
                quantity: 1
            }
        );
        assert_eq!(cart.get(&first).unwrap().quantity, 3);
    }

    #[test]
    fn update_quantity_zero_removes() {
        let mut cart = Cart::new();
        cart.add(line(json!({"productId": "p1", "variantId": "v1", "quantity": 2})));
        let id = cart.lines()[0].line_id.clone();

        assert_eq!(
            cart.update_quantity(&LineMatcher::line_id(&id), 0),
            UpdateOutcome::Removed { line_id: id }
        );
        assert!(cart.is_empty());
    }

    #[test]
    fn update_quantity_not_found() {
        let mut cart = Cart::new();
        assert_eq!(
            cart.update_quantity(&LineMatcher::line_id("nope"), 2),
            UpdateOutcome::NotFound
        );
    }

    #[test]
    fn clear_empties() {
        let mut cart = Cart::from_lines(vec![CartLine::new("p1", "v1", 2)]);
        assert_eq!(cart.item_count(), 2);
        cart.clear();
        assert!(cart.is_empty());
    }
}
