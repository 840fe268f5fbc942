//! The order service's copy of the cart.
//!
//! The contract is owned externally: read, replace and delete a cart per
//! scope. Everything sent has been fully normalized; everything received is
//! input to reconciliation, never sole truth.

mod http;
mod memory;

pub use http::HttpRemote;
pub use memory::{InMemoryRemote, RemoteCall};

use cart_engine::{Scope, WirePayload};
use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

/// Errors talking to the order service. Always soft: logged and retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("order service returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("order service unavailable")]
    Unavailable,
}

/// Remote cart collaborator.
pub trait RemoteCart: Send + Sync {
    /// Raw line objects held for `scope`. A missing cart is an empty list.
    fn fetch<'a>(&'a self, scope: &'a Scope) -> BoxFuture<'a, Result<Vec<Value>, RemoteError>>;

    /// Replace the cart held for `scope`.
    fn replace<'a>(
        &'a self,
        scope: &'a Scope,
        payload: &'a WirePayload,
    ) -> BoxFuture<'a, Result<(), RemoteError>>;

    /// Delete the cart held for `scope`.
    fn delete<'a>(&'a self, scope: &'a Scope) -> BoxFuture<'a, Result<(), RemoteError>>;
}

/// Accept `{ "items": [...] }` or a bare array.
pub(crate) fn items_from_body(body: Value) -> Result<Vec<Value>, RemoteError> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut obj) => match obj.remove("items") {
            Some(Value::Array(items)) => Ok(items),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(_) => Err(RemoteError::Decode("items is not an array".into())),
        },
        Value::Null => Ok(Vec::new()),
        _ => Err(RemoteError::Decode("expected object or array".into())),
    }
}
