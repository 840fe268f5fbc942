//! Non-destructive field merging.
//!
//! The same logical line is resubmitted from many places with partial data.
//! Merging never lets a sparser submission degrade what is already known:
//!
//! - Stable fields are write-once: a non-empty base value always survives
//! - Other fields are overwritten only by non-empty incoming values
//! - Placeholder titles count as empty
//! - Nested objects in the metadata bag merge recursively under the same rules

use crate::fields::is_empty_value;
use crate::CartLine;
use serde_json::{Map, Value};

/// Fields that are write-once once they hold a non-empty value.
pub const STABLE_FIELDS: &[&str] = &[
    "lineId",
    "productId",
    "slug",
    "variantId",
    "inventoryRowId",
    "selectedSize",
    "selectedColor",
    "title",
    "thumbnail",
    "variantTitle",
    "fit",
    "currency",
    "originalPrice",
];

/// Fields whose generic values count as missing.
const TITLE_LIKE_FIELDS: &[&str] = &["title", "variantTitle", "name", "productTitle"];

const PLACEHOLDER_TITLES: &[&str] = &["item", "product", "untitled product"];

pub fn is_stable_field(name: &str) -> bool {
    STABLE_FIELDS.contains(&name)
}

/// Whether a title-like value is a generic placeholder.
pub fn is_placeholder(title: &str) -> bool {
    let title = title.trim();
    PLACEHOLDER_TITLES
        .iter()
        .any(|placeholder| title.eq_ignore_ascii_case(placeholder))
}

/// Merge `incoming` into `base`, returning the merged line.
///
/// Quantity is taken from `incoming`; callers that sum quantities overwrite it.
pub fn merge(base: &CartLine, incoming: &CartLine) -> CartLine {
    let mut out = base.clone();

    keep(&mut out.line_id, &incoming.line_id);
    keep(&mut out.product_id, &incoming.product_id);
    keep(&mut out.slug, &incoming.slug);
    keep(&mut out.variant_id, &incoming.variant_id);
    keep(&mut out.inventory_row_id, &incoming.inventory_row_id);
    keep(&mut out.selected_size, &incoming.selected_size);
    keep(&mut out.selected_color, &incoming.selected_color);
    keep_title(&mut out.title, &incoming.title);
    keep_title(&mut out.variant_title, &incoming.variant_title);
    keep(&mut out.thumbnail, &incoming.thumbnail);
    keep(&mut out.fit, &incoming.fit);
    keep(&mut out.currency, &incoming.currency);
    if out.original_price.is_none() {
        out.original_price = incoming.original_price;
    }

    if incoming.price.is_some() {
        out.price = incoming.price;
    }
    if incoming.max_available.is_some() {
        out.max_available = incoming.max_available;
    }
    out.quantity = incoming.quantity.max(1);
    merge_objects(&mut out.stock, &incoming.stock);
    merge_objects(&mut out.metadata, &incoming.metadata);

    out.normalize();
    out
}

fn keep(base: &mut String, incoming: &str) {
    if base.trim().is_empty() && !incoming.trim().is_empty() {
        *base = incoming.trim().to_string();
    }
}

fn keep_title(base: &mut String, incoming: &str) {
    let base_known = !base.trim().is_empty() && !is_placeholder(base);
    if !base_known && !incoming.trim().is_empty() && !is_placeholder(incoming) {
        *base = incoming.trim().to_string();
    }
}

/// Merge a JSON object into another under the same rules as line fields.
pub fn merge_objects(base: &mut Map<String, Value>, incoming: &Map<String, Value>) {
    for (key, value) in incoming {
        if is_empty_incoming(key, value) {
            continue;
        }
        if let (Some(Value::Object(existing)), Value::Object(nested)) = (base.get_mut(key), value)
        {
            merge_objects(existing, nested);
            continue;
        }
        let keep_existing = base
            .get(key)
            .is_some_and(|existing| is_stable_field(key) && !is_empty_incoming(key, existing));
        if !keep_existing {
            base.insert(key.clone(), value.clone());
        }
    }
}

fn is_empty_incoming(key: &str, value: &Value) -> bool {
    if is_empty_value(value) {
        return true;
    }
    TITLE_LIKE_FIELDS.contains(&key) && value.as_str().is_some_and(is_placeholder)
}
