//! Identity resolution for cart lines.
//!
//! Two independently constructed line objects denote the same purchase when
//! their identities match. Identity is derived, never stored on its own: the
//! loose and strict keys on a [`CartLine`] are caches of what this module
//! computes.
//!
//! Matching rules:
//! 1. Both strict keys known: they decide, equal or not
//! 2. Otherwise both loose keys known: they decide
//! 3. Otherwise the lines are distinct (a `lineId` match is handled by callers)

use crate::fields::{self, Path};
use crate::CartLine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The resolved identity fields of a line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub product_id: String,
    pub slug: String,
    pub variant_id: String,
    pub inventory_row_id: String,
    pub selected_size: String,
    pub selected_color: String,
}

impl Identity {
    /// Loose key: product, variant, color and size.
    pub fn loose_key(&self) -> String {
        make_loose_key(self)
    }

    /// Strict key: the loose key plus the inventory row id.
    pub fn strict_key(&self) -> String {
        make_strict_key(self)
    }

    /// True when nothing identifies the line.
    pub fn is_indeterminate(&self) -> bool {
        self.loose_key().is_empty() && self.strict_key().is_empty()
    }
}

/// Derive the identity of a line.
///
/// Each field is read from the line's own field first, then from the candidate
/// paths into its metadata bag (flat aliases, nested `product`/`variant`
/// objects). Missing fields resolve to the empty string.
pub fn derive_identity(line: &CartLine) -> Identity {
    let meta = &line.metadata;
    Identity {
        product_id: resolve(&line.product_id, meta, fields::PRODUCT_ID),
        slug: resolve(&line.slug, meta, fields::SLUG),
        variant_id: resolve(&line.variant_id, meta, fields::VARIANT_ID),
        inventory_row_id: resolve(&line.inventory_row_id, meta, fields::INVENTORY_ROW_ID),
        selected_size: normalize_size(&resolve(&line.selected_size, meta, fields::SIZE)),
        selected_color: normalize_color(&resolve(&line.selected_color, meta, fields::COLOR)),
    }
}

/// Derive the identity of a raw, not yet ingested, line object.
pub fn derive_identity_raw(raw: &Value) -> Identity {
    CartLine::from_value(raw)
        .map(|line| derive_identity(&line))
        .unwrap_or_default()
}

fn resolve(direct: &str, meta: &Map<String, Value>, paths: &[Path]) -> String {
    let direct = direct.trim();
    if !direct.is_empty() {
        return direct.to_string();
    }
    fields::first_text(meta, paths)
}

/// Alphabetic sizes are uppercased (`m` -> `M`); numeric sizes are kept.
pub fn normalize_size(size: &str) -> String {
    let size = size.trim();
    if !size.is_empty() && size.chars().all(char::is_alphabetic) {
        size.to_uppercase()
    } else {
        size.to_string()
    }
}

pub fn normalize_color(color: &str) -> String {
    color.trim().to_lowercase()
}

/// Build the loose key. Empty when product, variant, color and size are all unknown.
pub fn make_loose_key(identity: &Identity) -> String {
    let product = if identity.product_id.is_empty() {
        identity.slug.as_str()
    } else {
        identity.product_id.as_str()
    };
    if product.is_empty()
        && identity.variant_id.is_empty()
        && identity.selected_color.is_empty()
        && identity.selected_size.is_empty()
    {
        return String::new();
    }
    format!(
        "{}::{}::{}::{}",
        product, identity.variant_id, identity.selected_color, identity.selected_size
    )
}

/// Build the strict key. Empty when the inventory row id is unknown.
pub fn make_strict_key(identity: &Identity) -> String {
    if identity.inventory_row_id.is_empty() {
        return String::new();
    }
    format!("{}#{}", make_loose_key(identity), identity.inventory_row_id)
}

/// Compare two (loose, strict) key pairs.
pub fn keys_match(loose_a: &str, strict_a: &str, loose_b: &str, strict_b: &str) -> bool {
    if !strict_a.is_empty() && !strict_b.is_empty() {
        return strict_a == strict_b;
    }
    !loose_a.is_empty() && loose_a == loose_b
}

/// Whether two lines denote the same logical purchase.
pub fn same_identity(a: &CartLine, b: &CartLine) -> bool {
    keys_match(&a.loose_key, &a.strict_key, &b.loose_key, &b.strict_key)
}

/// Whether two lines draw from the same stock.
///
/// A shared inventory row ties lines together regardless of their
/// color/size labels; without row ids on both sides the loose key decides.
pub fn shares_variant(a: &CartLine, b: &CartLine) -> bool {
    if !a.inventory_row_id.is_empty() && !b.inventory_row_id.is_empty() {
        return a.inventory_row_id == b.inventory_row_id;
    }
    !a.loose_key.is_empty() && a.loose_key == b.loose_key
}

/// Selects lines by `lineId`, by identity, or by either.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineMatcher {
    line_id: Option<String>,
    loose_key: String,
    strict_key: String,
}

impl LineMatcher {
    /// Match a single line id.
    pub fn line_id(line_id: impl Into<String>) -> Self {
        Self {
            line_id: Some(line_id.into()),
            ..Self::default()
        }
    }

    /// Match every line with the given identity.
    pub fn identity(identity: &Identity) -> Self {
        Self {
            line_id: None,
            loose_key: identity.loose_key(),
            strict_key: identity.strict_key(),
        }
    }

    /// Match the line itself or anything sharing its identity.
    pub fn for_line(line: &CartLine) -> Self {
        Self {
            line_id: (!line.line_id.is_empty()).then(|| line.line_id.clone()),
            loose_key: line.loose_key.clone(),
            strict_key: line.strict_key.clone(),
        }
    }

    pub fn matches(&self, line: &CartLine) -> bool {
        if let Some(id) = &self.line_id {
            if *id == line.line_id {
                return true;
            }
        }
        keys_match(
            &self.loose_key,
            &self.strict_key,
            &line.loose_key,
            &line.strict_key,
        )
    }
}
