//! The canonical cart line and its ingestion from heterogeneous input.

use crate::fields::{self, Path};
use crate::identity::{self, Identity};
use crate::merge::is_placeholder;
use crate::stock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// Keys read directly into typed fields at ingestion.
const DIRECT_KEYS: &[&str] = &[
    "lineId",
    "productId",
    "slug",
    "variantId",
    "inventoryRowId",
    "selectedSize",
    "selectedColor",
    "quantity",
    "price",
    "originalPrice",
    "currency",
    "title",
    "thumbnail",
    "variantTitle",
    "fit",
    "maxAvailable",
    "stock",
];

/// Keys recomputed on every normalization and never carried in metadata.
const DERIVED_KEYS: &[&str] = &["looseKey", "strictKey", "metadata"];

/// One purchasable entry in the cart.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CartLine {
    /// Stable once assigned; used as the UI list key
    pub line_id: String,
    pub product_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub slug: String,
    pub variant_id: String,
    /// Precise inventory row backing this line, when known
    #[serde(skip_serializing_if = "String::is_empty")]
    pub inventory_row_id: String,
    pub selected_size: String,
    pub selected_color: String,
    /// Always at least 1
    pub quantity: u32,
    /// Unit price
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    /// Unit price when the line was first added
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_price: Option<Decimal>,
    pub currency: String,
    pub title: String,
    pub thumbnail: String,
    pub variant_title: String,
    pub fit: String,
    /// Best known stock cap for this line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_available: Option<u32>,
    /// Raw stock descriptor as submitted
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub stock: Map<String, Value>,
    pub loose_key: String,
    pub strict_key: String,
    /// Everything else the submitter sent
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl CartLine {
    /// Build a line from explicit identity fields.
    pub fn new(
        product_id: impl Into<String>,
        variant_id: impl Into<String>,
        quantity: u32,
    ) -> Self {
        let mut line = Self {
            product_id: product_id.into(),
            variant_id: variant_id.into(),
            quantity,
            ..Self::default()
        };
        line.normalize();
        line
    }

    pub fn with_size(self, size: impl Into<String>) -> Self {
        let size = size.into();
        self.reidentify(|line| line.selected_size = size)
    }

    pub fn with_color(self, color: impl Into<String>) -> Self {
        let color = color.into();
        self.reidentify(|line| line.selected_color = color)
    }

    pub fn with_inventory_row(self, row_id: impl Into<String>) -> Self {
        let row_id = row_id.into();
        self.reidentify(|line| line.inventory_row_id = row_id)
    }

    /// Change an identity field; a line id derived from the old identity is
    /// re-derived from the new one.
    fn reidentify(mut self, change: impl FnOnce(&mut Self)) -> Self {
        let derived = derive_line_id(&self.identity()) == self.line_id;
        change(&mut self);
        if derived {
            self.line_id.clear();
        }
        self.normalize();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail = url.into();
        self
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self.original_price.get_or_insert(price);
        self
    }

    pub fn with_max_available(mut self, max: u32) -> Self {
        self.max_available = (max > 0).then_some(max);
        self
    }

    /// Ingest a raw line object of any supported shape.
    ///
    /// Returns `None` for non-objects. The result is normalized.
    pub fn from_value(raw: &Value) -> Option<Self> {
        let obj = raw.as_object()?;
        let mut line = Self::default();
        let mut metadata = Map::new();

        for (key, value) in obj {
            if DERIVED_KEYS.contains(&key.as_str()) || fields::is_empty_value(value) {
                continue;
            }
            if !DIRECT_KEYS.contains(&key.as_str()) || !line.take_direct(key, value) {
                metadata.insert(key.clone(), value.clone());
            }
        }
        if let Some(Value::Object(bag)) = obj.get("metadata") {
            for (key, value) in bag {
                if !fields::is_empty_value(value) {
                    metadata.insert(key.clone(), value.clone());
                }
            }
        }
        line.metadata = metadata;
        line.normalize();
        Some(line)
    }

    /// Read a direct key into its typed field. Returns false when the value
    /// does not fit, leaving it to the metadata bag.
    fn take_direct(&mut self, key: &str, value: &Value) -> bool {
        let text = || fields::scalar_text(value);
        match key {
            "lineId" => set_text(&mut self.line_id, text()),
            "productId" => set_text(&mut self.product_id, text()),
            "slug" => set_text(&mut self.slug, text()),
            "variantId" => set_text(&mut self.variant_id, text()),
            "inventoryRowId" => set_text(&mut self.inventory_row_id, text()),
            "selectedSize" => set_text(&mut self.selected_size, text()),
            "selectedColor" => set_text(&mut self.selected_color, text()),
            "currency" => set_text(&mut self.currency, text()),
            "title" => set_text(&mut self.title, text()),
            "thumbnail" => set_text(&mut self.thumbnail, text()),
            "variantTitle" => set_text(&mut self.variant_title, text()),
            "fit" => set_text(&mut self.fit, text()),
            "quantity" => match fields::as_number(value) {
                Some(q) => {
                    self.quantity = clamp_quantity(q);
                    true
                }
                None => false,
            },
            "price" => parse_decimal(value).map(|p| self.price = Some(p)).is_some(),
            "originalPrice" => parse_decimal(value)
                .map(|p| self.original_price = Some(p))
                .is_some(),
            "maxAvailable" => match stock::positive_count(value) {
                Some(max) => {
                    self.max_available = Some(max);
                    true
                }
                None => false,
            },
            "stock" => match value {
                Value::Object(map) => {
                    self.stock = map.clone();
                    true
                }
                other if fields::as_number(other).is_some() => {
                    self.stock.insert("available".into(), other.clone());
                    true
                }
                _ => false,
            },
            _ => false,
        }
    }

    /// Resolve identity, backfill display fields, assign `lineId` and keys.
    ///
    /// Idempotent: normalizing a normalized line changes nothing.
    pub fn normalize(&mut self) {
        let identity = identity::derive_identity(self);
        self.apply_identity(&identity);

        let meta = &self.metadata;
        let title = backfill_title(&self.title, meta, fields::TITLE);
        let variant_title = backfill_title(&self.variant_title, meta, fields::VARIANT_TITLE);
        let thumbnail = backfill(&self.thumbnail, meta, fields::THUMBNAIL);
        let fit = backfill(&self.fit, meta, fields::FIT);
        let currency = backfill(&self.currency, meta, fields::CURRENCY).to_uppercase();
        let price = self.price.or_else(|| {
            fields::PRICE
                .iter()
                .filter_map(|path| fields::lookup(meta, path))
                .find_map(parse_decimal)
        });
        self.title = title;
        self.variant_title = variant_title;
        self.thumbnail = thumbnail;
        self.fit = fit;
        self.currency = currency;
        self.price = price;
        if self.original_price.is_none() {
            self.original_price = self.price;
        }

        self.quantity = self.quantity.max(1);
        if self.max_available.is_none() {
            self.max_available = stock::effective_max_available(self, None);
        }

        if self.line_id.is_empty() {
            self.line_id = fields::first_text(&self.metadata, fields::LINE_ID);
        }
        if self.line_id.is_empty() {
            self.line_id = derive_line_id(&identity);
        }
    }

    fn apply_identity(&mut self, identity: &Identity) {
        self.product_id = identity.product_id.clone();
        self.slug = identity.slug.clone();
        self.variant_id = identity.variant_id.clone();
        self.inventory_row_id = identity.inventory_row_id.clone();
        self.selected_size = identity.selected_size.clone();
        self.selected_color = identity.selected_color.clone();
        self.loose_key = identity.loose_key();
        self.strict_key = identity.strict_key();
    }

    /// The identity this line currently carries.
    pub fn identity(&self) -> Identity {
        Identity {
            product_id: self.product_id.clone(),
            slug: self.slug.clone(),
            variant_id: self.variant_id.clone(),
            inventory_row_id: self.inventory_row_id.clone(),
            selected_size: self.selected_size.clone(),
            selected_color: self.selected_color.clone(),
        }
    }

    /// Strict key if known, else loose key, else the line id.
    pub fn group_key(&self) -> &str {
        if !self.strict_key.is_empty() {
            &self.strict_key
        } else if !self.loose_key.is_empty() {
            &self.loose_key
        } else {
            &self.line_id
        }
    }

    /// `price * quantity`, zero when the price is unknown.
    pub fn line_total(&self) -> Decimal {
        self.price
            .unwrap_or_default()
            .checked_mul(Decimal::from(self.quantity))
            .unwrap_or(Decimal::MAX)
    }
}

fn set_text(field: &mut String, text: String) -> bool {
    if text.is_empty() {
        return false;
    }
    *field = text;
    true
}

fn backfill(current: &str, meta: &Map<String, Value>, paths: &[Path]) -> String {
    if !current.trim().is_empty() {
        return current.trim().to_string();
    }
    fields::first_text(meta, paths)
}

fn backfill_title(current: &str, meta: &Map<String, Value>, paths: &[Path]) -> String {
    if !current.trim().is_empty() && !is_placeholder(current) {
        return current.trim().to_string();
    }
    let found = fields::first_where(meta, paths, |text| !is_placeholder(text));
    if found.is_empty() {
        current.trim().to_string()
    } else {
        found
    }
}

fn clamp_quantity(q: f64) -> u32 {
    if q.is_nan() || q < 1.0 {
        1
    } else if q >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        q.floor() as u32
    }
}

/// Parse a price from a number or numeric string.
pub fn parse_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Decimal::from(i))
            } else {
                Decimal::from_str(&n.to_string())
                    .ok()
                    .or_else(|| n.as_f64().and_then(|f| Decimal::try_from(f).ok()))
            }
        }
        _ => None,
    }
}

/// Deterministic line id from the identity keys; random only when nothing
/// identifies the line.
///
/// The strict key is preferred so that two lines told apart only by their
/// inventory row never share an id.
pub fn derive_line_id(identity: &Identity) -> String {
    let key = identity.strict_key();
    let key = if key.is_empty() {
        identity.loose_key()
    } else {
        key
    };
    if key.is_empty() {
        return format!("line_{}", uuid::Uuid::new_v4().simple());
    }
    let digest = blake3::hash(key.as_bytes()).to_hex();
    format!("line_{}", &digest.as_str()[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ingest_product_page_shape() {
        let line = CartLine::from_value(&json!({
            "product": {"id": "p1", "title": "Linen Shirt", "images": ["https://cdn/p1.jpg"]},
            "variant": {"id": "v1", "title": "Navy / M", "size": "m", "color": "Navy",
                        "price": {"amount": "49.50", "currencyCode": "eur"}},
            "quantity": 2,
        }))
        .unwrap();

        assert_eq!(line.product_id, "p1");
        assert_eq!(line.variant_id, "v1");
        assert_eq!(line.selected_size, "M");
        assert_eq!(line.selected_color, "navy");
        assert_eq!(line.title, "Linen Shirt");
        assert_eq!(line.thumbnail, "https://cdn/p1.jpg");
        assert_eq!(line.variant_title, "Navy / M");
        assert_eq!(line.price, Some(Decimal::from_str("49.50").unwrap()));
        assert_eq!(line.currency, "EUR");
        assert_eq!(line.quantity, 2);
        assert!(line.line_id.starts_with("line_"));
    }

    #[test]
    fn line_id_is_deterministic_for_identity() {
        let a = CartLine::from_value(&json!({"productId": "p1", "variantId": "v1"})).unwrap();
        let b = CartLine::from_value(&json!({"product": {"id": "p1"}, "variant": {"id": "v1"}}))
            .unwrap();
        assert_eq!(a.line_id, b.line_id);
    }

    #[test]
    fn existing_line_id_is_kept() {
        let line = CartLine::from_value(&json!({"lineId": "keep-me", "productId": "p1"})).unwrap();
        assert_eq!(line.line_id, "keep-me");

        let from_meta =
            CartLine::from_value(&json!({"metadata": {"lineId": "from-meta"}, "productId": "p1"}))
                .unwrap();
        assert_eq!(from_meta.line_id, "from-meta");
    }

    #[test]
    fn indeterminate_line_gets_random_id() {
        let a = CartLine::from_value(&json!({"quantity": 1})).unwrap();
        let b = CartLine::from_value(&json!({"quantity": 1})).unwrap();
        assert!(a.line_id.starts_with("line_"));
        assert_ne!(a.line_id, b.line_id);
    }

    #[test]
    fn quantity_never_below_one() {
        let line = CartLine::from_value(&json!({"productId": "p1", "quantity": 0})).unwrap();
        assert_eq!(line.quantity, 1);
        let line = CartLine::from_value(&json!({"productId": "p1", "quantity": "3"})).unwrap();
        assert_eq!(line.quantity, 3);
        let line = CartLine::from_value(&json!({"productId": "p1"})).unwrap();
        assert_eq!(line.quantity, 1);
    }

    #[test]
    fn placeholder_title_is_backfilled() {
        let line = CartLine::from_value(&json!({
            "productId": "p1", "title": "Product", "product": {"title": "Wool Coat"},
        }))
        .unwrap();
        assert_eq!(line.title, "Wool Coat");
    }

    #[test]
    fn unparseable_direct_values_stay_in_metadata() {
        let line = CartLine::from_value(&json!({
            "productId": "p1", "price": {"amount": 12}, "stock": 4,
        }))
        .unwrap();
        assert_eq!(line.price, Some(Decimal::from(12)));
        assert!(line.metadata.contains_key("price"));
        assert_eq!(line.max_available, Some(4));
    }

    #[test]
    fn normalize_is_idempotent() {
        let mut line = CartLine::from_value(&json!({
            "handle": "coat", "variant": {"id": "v2", "size": "l"}, "image": {"url": "c.jpg"},
        }))
        .unwrap();
        let before = line.clone();
        line.normalize();
        assert_eq!(line, before);
    }

    #[test]
    fn serialized_line_reingests_unchanged() {
        let line = CartLine::from_value(&json!({
            "productId": "p1", "variantId": "v1", "inventoryRowId": "r1",
            "price": "19.99", "title": "Tee", "extra": {"gift": true},
        }))
        .unwrap();
        let value = serde_json::to_value(&line).unwrap();
        assert_eq!(CartLine::from_value(&value).unwrap(), line);
    }

    #[test]
    fn non_objects_are_rejected() {
        assert!(CartLine::from_value(&json!([1, 2])).is_none());
        assert!(CartLine::from_value(&json!(null)).is_none());
    }

    #[test]
    fn line_total_multiplies() {
        let line = CartLine::new("p1", "v1", 3).with_price(Decimal::from_str("2.50").unwrap());
        assert_eq!(line.line_total(), Decimal::from_str("7.50").unwrap());
    }

    #[test]
    fn line_total_saturates() {
        let line = CartLine::new("p1", "v1", u32::MAX)
            .with_price(Decimal::from_str("100000000000000000000").unwrap());
        assert_eq!(line.line_total(), Decimal::MAX);
    }
}
