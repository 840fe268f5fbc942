//! # Cart Engine
//!
//! Deterministic cart logic for a client-resident storefront cart.
//!
//! This crate owns everything about a cart that does not touch the outside
//! world: how heterogeneous line objects are ingested, when two of them denote
//! the same purchase, how they merge without losing data, how stock caps are
//! shared, and how a local cart reconciles with the order service's copy.
//! The same inputs always produce the same outputs.
//!
//! ## Design Principles
//!
//! - **No IO**: storage, network and timers live in the `cart-sync` crate
//! - **Total**: identity, merge and stabilization never fail
//! - **Non-destructive**: sparser resubmissions never degrade richer data
//! - **Render-stable**: `lineId` survives repeated stabilization
//!
//! ## Core Concepts
//!
//! ### Lines and identity
//!
//! A [`CartLine`] is ingested from any supported shape with
//! [`CartLine::from_value`]. Its [`Identity`] yields a loose key
//! (product, variant, color, size) and a strict key (plus inventory row).
//!
//! ### Stabilization
//!
//! [`stabilize`] normalizes, backfills and deduplicates a collection of lines,
//! summing quantities under the stock cap.
//!
//! ### Reconciliation
//!
//! [`reconcile`] combines local and remote lines. An empty remote never clears
//! a non-empty local cart.
//!
//! ## Quick Start
//!
//! ```rust
//! use cart_engine::{AddOutcome, Cart, CartLine};
//! use serde_json::json;
//!
//! let mut cart = Cart::new();
//! let first = CartLine::from_value(&json!({
//!     "product": {"id": "p1", "title": "Linen Shirt"},
//!     "variant": {"id": "v1", "size": "m", "inventoryQuantity": 3},
//!     "quantity": 2,
//! }))
//! .unwrap();
//! cart.add(first);
//!
//! // Same purchase from another page; only one unit of headroom remains.
//! let again = CartLine::new("p1", "v1", 5).with_size("M");
//! let outcome = cart.add(again);
//!
//! assert!(matches!(outcome, AddOutcome::Merged { quantity: 3, clamped: true, .. }));
//! assert_eq!(cart.lines()[0].title, "Linen Shirt");
//! assert_eq!(cart.item_count(), 3);
//! ```

pub mod cart;
pub mod error;
pub mod fields;
pub mod identity;
pub mod line;
pub mod merge;
pub mod reconcile;
pub mod scope;
pub mod snapshot;
pub mod stabilize;
pub mod stock;
pub mod wire;

// Re-export main types at crate root
pub use cart::{AddOutcome, Cart, UpdateOutcome};
pub use error::{Error, Result};
pub use identity::{derive_identity, same_identity, shares_variant, Identity, LineMatcher};
pub use line::CartLine;
pub use merge::merge;
pub use reconcile::{reconcile, LineSource, ReconcileResult, Reconciler};
pub use scope::Scope;
pub use snapshot::StoredCart;
pub use stabilize::{stabilize, stabilize_values};
pub use stock::effective_max_available;
pub use wire::{to_wire, WireLine, WirePayload};
