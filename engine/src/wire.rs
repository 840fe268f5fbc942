//! Remote wire format.
//!
//! Lines are fully normalized before they leave the client. The payload is
//! canonical: lines sorted by identity key, metadata pruned of empty values,
//! so two payloads for the same logical cart serialize byte-for-byte equal
//! and can be compared by fingerprint.

use crate::fields::is_empty_value;
use crate::{CartLine, Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One line as sent to the order service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireLine {
    pub line_id: String,
    pub product_id: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub slug: String,
    pub variant_id: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub inventory_row_id: String,
    pub selected_size: String,
    pub selected_color: String,
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub price: Option<Decimal>,
    pub currency: String,
    pub title: String,
    pub thumbnail: String,
    pub variant_title: String,
    pub fit: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_available: Option<u32>,
    #[serde(skip_serializing_if = "Map::is_empty", default)]
    pub metadata: Map<String, Value>,
}

impl From<&CartLine> for WireLine {
    fn from(line: &CartLine) -> Self {
        let mut line = line.clone();
        line.normalize();
        Self {
            line_id: line.line_id,
            product_id: line.product_id,
            slug: line.slug,
            variant_id: line.variant_id,
            inventory_row_id: line.inventory_row_id,
            selected_size: line.selected_size,
            selected_color: line.selected_color,
            quantity: line.quantity,
            price: line.price,
            currency: line.currency,
            title: line.title,
            thumbnail: line.thumbnail,
            variant_title: line.variant_title,
            fit: line.fit,
            max_available: line.max_available,
            metadata: prune(line.metadata),
        }
    }
}

/// Body of a replace call: `{ "items": [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePayload {
    pub items: Vec<WireLine>,
}

impl WirePayload {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Digest of the canonical JSON encoding.
    pub fn fingerprint(&self) -> Result<String> {
        let json = self.to_json()?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}

/// Build the canonical payload for a set of lines.
pub fn to_wire(lines: &[CartLine]) -> WirePayload {
    let mut items: Vec<(String, WireLine)> = lines
        .iter()
        .map(|line| {
            let wire = WireLine::from(line);
            (sort_key(line), wire)
        })
        .collect();
    items.sort_by(|(ka, a), (kb, b)| ka.cmp(kb).then_with(|| a.line_id.cmp(&b.line_id)));
    WirePayload {
        items: items.into_iter().map(|(_, wire)| wire).collect(),
    }
}

fn sort_key(line: &CartLine) -> String {
    if !line.strict_key.is_empty() {
        line.strict_key.clone()
    } else {
        line.loose_key.clone()
    }
}

fn prune(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .filter_map(|(key, value)| {
            let value = match value {
                Value::Object(nested) => Value::Object(prune(nested)),
                other => other,
            };
            (!is_empty_value(&value)).then_some((key, value))
        })
        .collect()
}
