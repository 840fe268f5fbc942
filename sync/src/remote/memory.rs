//! In-memory order service, with call recording and failure injection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use cart_engine::{Scope, WirePayload};
use dashmap::DashMap;
use futures::future::{self, BoxFuture, FutureExt};
use serde_json::Value;

use super::{RemoteCart, RemoteError};

/// A call observed by [`InMemoryRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Fetch(Scope),
    /// Scope and number of lines sent
    Replace(Scope, usize),
    Delete(Scope),
}

#[derive(Debug, Default)]
pub struct InMemoryRemote {
    carts: DashMap<Scope, Vec<Value>>,
    calls: Mutex<Vec<RemoteCall>>,
    failing: AtomicBool,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the cart held for `scope`.
    pub fn seed(&self, scope: Scope, items: Vec<Value>) {
        self.carts.insert(scope, items);
    }

    pub fn cart(&self, scope: &Scope) -> Option<Vec<Value>> {
        self.carts.get(scope).map(|items| items.value().clone())
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_calls(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Make every call fail with [`RemoteError::Unavailable`] (still recorded).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn record(&self, call: RemoteCall) -> Result<(), RemoteError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
        if self.failing.load(Ordering::SeqCst) {
            Err(RemoteError::Unavailable)
        } else {
            Ok(())
        }
    }
}

impl RemoteCart for InMemoryRemote {
    fn fetch<'a>(&'a self, scope: &'a Scope) -> BoxFuture<'a, Result<Vec<Value>, RemoteError>> {
        let result = self
            .record(RemoteCall::Fetch(scope.clone()))
            .map(|()| self.cart(scope).unwrap_or_default());
        future::ready(result).boxed()
    }

    fn replace<'a>(
        &'a self,
        scope: &'a Scope,
        payload: &'a WirePayload,
    ) -> BoxFuture<'a, Result<(), RemoteError>> {
        let result = self
            .record(RemoteCall::Replace(scope.clone(), payload.items.len()))
            .and_then(|()| {
                let items = payload
                    .items
                    .iter()
                    .map(serde_json::to_value)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| RemoteError::Decode(e.to_string()))?;
                self.carts.insert(scope.clone(), items);
                Ok(())
            });
        future::ready(result).boxed()
    }

    fn delete<'a>(&'a self, scope: &'a Scope) -> BoxFuture<'a, Result<(), RemoteError>> {
        let result = self.record(RemoteCall::Delete(scope.clone())).map(|()| {
            self.carts.remove(scope);
        });
        future::ready(result).boxed()
    }
}
