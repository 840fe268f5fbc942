//! Stock cap resolution.
//!
//! Available stock arrives in many representations: an explicit
//! `maxAvailable`, a raw `stock` descriptor, inventory counts nested in the
//! submitted `variant` or `inventory` objects. The effective cap is the
//! largest positive candidate across every representation on both inputs.

use crate::fields::as_number;
use crate::CartLine;
use serde_json::{Map, Value};

/// Keys that carry an available-stock count.
const STOCK_KEYS: &[&str] = &[
    "maxAvailable",
    "available",
    "availableQuantity",
    "quantityAvailable",
    "inventoryQuantity",
    "inventory_quantity",
    "stockQuantity",
    "stockCount",
    "countInStock",
    "stock",
    "inStock",
];

/// Nested objects that may hold stock descriptors.
const STOCK_CONTAINERS: &[&str] = &["stock", "inventory", "availability", "variant"];

const MAX_DEPTH: usize = 2;

/// Interpret a value as a positive whole count.
pub fn positive_count(value: &Value) -> Option<u32> {
    let n = as_number(value)?;
    if !n.is_finite() || n < 1.0 {
        return None;
    }
    Some(if n >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        n.floor() as u32
    })
}

/// The effective stock cap across one or two lines, or `None` if unknown.
pub fn effective_max_available(a: &CartLine, b: Option<&CartLine>) -> Option<u32> {
    let mut candidates = Vec::new();
    collect_line(a, &mut candidates);
    if let Some(b) = b {
        collect_line(b, &mut candidates);
    }
    candidates.into_iter().max()
}

/// The effective stock cap across any number of lines.
pub fn cap_for<'a>(lines: impl IntoIterator<Item = &'a CartLine>) -> Option<u32> {
    let mut candidates = Vec::new();
    for line in lines {
        collect_line(line, &mut candidates);
    }
    candidates.into_iter().max()
}

fn collect_line(line: &CartLine, out: &mut Vec<u32>) {
    if let Some(max) = line.max_available.filter(|m| *m > 0) {
        out.push(max);
    }
    collect_object(&line.stock, 0, true, out);
    collect_object(&line.metadata, 0, false, out);
}

fn collect_object(map: &Map<String, Value>, depth: usize, inside: bool, out: &mut Vec<u32>) {
    for (key, value) in map {
        let key = key.as_str();
        match value {
            Value::Object(nested) => {
                if depth < MAX_DEPTH && STOCK_CONTAINERS.contains(&key) {
                    collect_object(nested, depth + 1, key != "variant", out);
                }
            }
            // At the top of the metadata bag only unambiguous keys count;
            // inside a stock container, a bare quantity does too.
            _ if STOCK_KEYS.contains(&key) || (inside && key == "quantity") => {
                out.extend(positive_count(value));
            }
            _ => {}
        }
    }
}

/// Clamp a requested quantity to the headroom left under `cap`.
///
/// `used` is the quantity already held by other lines sharing the variant.
/// Returns `None` when no headroom remains.
pub fn clamp_to_headroom(requested: u32, cap: Option<u32>, used: u32) -> Option<u32> {
    match cap {
        None => Some(requested.max(1)),
        Some(cap) => {
            let headroom = cap.saturating_sub(used);
            if headroom == 0 {
                None
            } else {
                Some(requested.clamp(1, headroom))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn line(value: Value) -> CartLine {
        CartLine::from_value(&value).unwrap()
    }

    #[test]
    fn no_signals_means_unknown() {
        let a = line(json!({"productId": "p1"}));
        assert_eq!(effective_max_available(&a, None), None);
    }

    #[test]
    fn takes_maximum_across_representations() {
        let a = line(json!({"productId": "p1", "maxAvailable": 3}));
        let b = line(json!({
            "productId": "p1",
            "variant": {"inventoryQuantity": 7},
            "stock": {"available": "5"},
        }));

        assert_eq!(effective_max_available(&a, None), Some(3));
        assert_eq!(effective_max_available(&b, None), Some(7));
        assert_eq!(effective_max_available(&a, Some(&b)), Some(7));
        assert_eq!(cap_for([&a, &b]), Some(7));
    }

    #[test]
    fn non_positive_signals_are_ignored() {
        let a = line(json!({"productId": "p1", "stock": {"available": 0, "stockQuantity": -2}}));
        assert_eq!(effective_max_available(&a, None), None);
    }

    #[test]
    fn top_level_quantity_is_not_stock() {
        let a = line(json!({"productId": "p1", "metadata": {"quantity": 9}}));
        assert_eq!(effective_max_available(&a, None), None);

        let b = line(json!({"productId": "p1", "inventory": {"quantity": 9}}));
        assert_eq!(effective_max_available(&b, None), Some(9));
    }

    #[test]
    fn clamp_behaviour() {
        assert_eq!(clamp_to_headroom(5, None, 100), Some(5));
        assert_eq!(clamp_to_headroom(5, Some(10), 2), Some(5));
        assert_eq!(clamp_to_headroom(5, Some(4), 2), Some(2));
        assert_eq!(clamp_to_headroom(5, Some(4), 4), None);
        assert_eq!(clamp_to_headroom(5, Some(4), 9), None);
    }
}
