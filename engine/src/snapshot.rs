//! Persisted cart encoding.
//!
//! A scope's partition holds `{ "items": [CartLine, ...] }`. Decoding is
//! lenient: items go through full ingestion, so older or hand-edited entries
//! still normalize, and a bare array is accepted as a legacy layout.

use crate::stabilize::stabilize_values;
use crate::{CartLine, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The value stored under `cart:<scope>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCart {
    pub items: Vec<CartLine>,
}

impl StoredCart {
    pub fn new(items: Vec<CartLine>) -> Self {
        Self { items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Serialize for storage.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Decode a stored value. Items are re-ingested and stabilized; entries
    /// that are not objects are skipped.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;

        let items: &[Value] = match &value {
            Value::Object(obj) => match obj.get("items") {
                Some(Value::Array(items)) => items.as_slice(),
                Some(Value::Null) | None => &[],
                Some(_) => {
                    return Err(Error::InvalidSnapshot("items is not an array".into()));
                }
            },
            Value::Array(items) => items.as_slice(),
            _ => return Err(Error::InvalidSnapshot("expected object or array".into())),
        };

        Ok(Self {
            items: stabilize_values(items),
        })
    }
}
