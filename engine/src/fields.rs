//! Candidate source paths for logical line fields.
//!
//! Storefront pages submit lines in many shapes: a product page sends a nested
//! `product`/`variant` pair, a quick-add button sends flat fields, the order
//! service sends its own names. Every logical field therefore has an ordered
//! list of paths into the metadata bag, resolved once at ingestion.
//!
//! A path is a list of object keys; a segment that parses as an integer
//! indexes into an array.

use serde_json::{Map, Value};

/// An ordered path into a JSON object.
pub type Path = &'static [&'static str];

pub const LINE_ID: &[Path] = &[&["lineId"], &["line_id"], &["cartLineId"]];

pub const PRODUCT_ID: &[Path] = &[
    &["productId"],
    &["product_id"],
    &["product", "id"],
    &["product", "_id"],
    &["variant", "productId"],
    &["variant", "product", "id"],
    &["product"],
];

pub const SLUG: &[Path] = &[
    &["slug"],
    &["handle"],
    &["product", "slug"],
    &["product", "handle"],
    &["variant", "product", "slug"],
];

pub const VARIANT_ID: &[Path] = &[
    &["variantId"],
    &["variant_id"],
    &["variant", "id"],
    &["variant", "_id"],
    &["merchandiseId"],
    &["variant"],
];

pub const INVENTORY_ROW_ID: &[Path] = &[
    &["inventoryRowId"],
    &["inventory_row_id"],
    &["inventoryId"],
    &["inventoryItemId"],
    &["inventory", "id"],
    &["variant", "inventoryItemId"],
    &["variant", "inventoryId"],
    &["stock", "id"],
];

pub const SIZE: &[Path] = &[
    &["selectedSize"],
    &["size"],
    &["variant", "size"],
    &["variant", "selectedSize"],
    &["options", "size"],
    &["options", "Size"],
];

pub const COLOR: &[Path] = &[
    &["selectedColor"],
    &["color"],
    &["colour"],
    &["variant", "color"],
    &["variant", "selectedColor"],
    &["options", "color"],
    &["options", "Color"],
];

pub const TITLE: &[Path] = &[
    &["title"],
    &["name"],
    &["productTitle"],
    &["product", "title"],
    &["product", "name"],
    &["variant", "product", "title"],
];

pub const THUMBNAIL: &[Path] = &[
    &["thumbnail"],
    &["thumbnailUrl"],
    &["imageUrl"],
    &["image"],
    &["image", "url"],
    &["image", "src"],
    &["product", "thumbnail"],
    &["product", "image"],
    &["product", "image", "url"],
    &["product", "images", "0"],
    &["product", "images", "0", "url"],
    &["variant", "image", "url"],
];

pub const VARIANT_TITLE: &[Path] = &[
    &["variantTitle"],
    &["variant_title"],
    &["variant", "title"],
    &["variant", "name"],
];

pub const FIT: &[Path] = &[&["fit"], &["variant", "fit"], &["product", "fit"]];

pub const CURRENCY: &[Path] = &[
    &["currency"],
    &["currencyCode"],
    &["price", "currencyCode"],
    &["variant", "price", "currencyCode"],
    &["product", "currency"],
];

pub const PRICE: &[Path] = &[
    &["unitPrice"],
    &["price"],
    &["price", "amount"],
    &["variant", "price"],
    &["variant", "price", "amount"],
    &["product", "price"],
];

/// Follow `path` through `root`.
pub fn lookup<'a>(root: &'a Map<String, Value>, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = root.get(*first)?;
    for segment in rest {
        current = match current {
            Value::Object(map) => map.get(*segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Render a scalar as trimmed text. Objects, arrays, booleans and null are empty.
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

/// First non-empty scalar found along `paths`.
pub fn first_text(root: &Map<String, Value>, paths: &[Path]) -> String {
    paths
        .iter()
        .filter_map(|path| lookup(root, path))
        .map(scalar_text)
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

/// First non-empty value along `paths` accepted by `accept`.
pub fn first_where(
    root: &Map<String, Value>,
    paths: &[Path],
    accept: impl Fn(&str) -> bool,
) -> String {
    paths
        .iter()
        .filter_map(|path| lookup(root, path))
        .map(scalar_text)
        .find(|text| !text.is_empty() && accept(text))
        .unwrap_or_default()
}

/// Numeric view of a JSON value: numbers and numeric strings.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Whether a JSON value carries no information.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
