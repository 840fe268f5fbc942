//! Scoped cart persistence.
//!
//! # Tier selection
//!
//! - Guest scope: session tier, durable tier when the session tier is unavailable
//! - User scope: durable tier
//! - No usable tier: a process-local map (memory-only cart for this instance)
//!
//! `read` distinguishes an absent key from an empty cart. An absent key must
//! never be treated as "intentionally emptied". Malformed data reads as absent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use cart_engine::{CartLine, Scope, StoredCart};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::notify::{new_token, ChangeBus, ChangeEvent, TokenLedger};
use crate::storage::{StorageError, StorageTier, StorageTiers};

/// Durable key of the "last known user scope" pointer.
pub const LAST_USER_KEY: &str = "cart:last-user-scope";

/// Result of reading a scope's partition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadResult {
    pub lines: Vec<CartLine>,
    /// Whether the partition exists, even if empty
    pub has_key: bool,
}

/// The "last known user scope" record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastUserScope {
    pub user_id: String,
    pub recorded_at: DateTime<Utc>,
}

/// Reads and writes cart partitions and announces writes.
pub struct CartPersistence {
    tiers: StorageTiers,
    /// Used when no tier accepts a key
    fallback: DashMap<String, String>,
    degraded: AtomicBool,
    ledger: Mutex<TokenLedger>,
    bus: ChangeBus,
    source: String,
}

impl CartPersistence {
    pub fn new(tiers: StorageTiers, bus: ChangeBus, source: impl Into<String>) -> Self {
        Self {
            tiers,
            fallback: DashMap::new(),
            degraded: AtomicBool::new(false),
            ledger: Mutex::new(TokenLedger::default()),
            bus,
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    /// True once any write fell back to memory.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    fn tier_for(&self, scope: &Scope) -> Option<&dyn StorageTier> {
        let durable = self.tiers.durable.as_ref();
        match scope {
            Scope::Guest(_) => {
                let session = self.tiers.session.as_ref();
                if session.is_available() {
                    Some(session)
                } else if durable.is_available() {
                    Some(durable)
                } else {
                    None
                }
            }
            Scope::User(_) => durable.is_available().then_some(durable),
        }
    }

    /// Read a scope's partition.
    pub fn read(&self, scope: &Scope) -> ReadResult {
        let key = scope.storage_key();
        let Some(raw) = self.get_raw(self.tier_for(scope), &key) else {
            return ReadResult::default();
        };

        match StoredCart::from_json(&raw) {
            Ok(stored) => ReadResult {
                lines: stored.items,
                has_key: true,
            },
            Err(e) => {
                warn!(scope = %scope, error = %e, "Malformed cart in storage, reading as absent");
                ReadResult::default()
            }
        }
    }

    /// Write a scope's partition and announce it. Returns the write token.
    pub fn write(&self, scope: &Scope, lines: &[CartLine]) -> crate::Result<String> {
        let key = scope.storage_key();
        let value = StoredCart::new(lines.to_vec()).to_json()?;
        self.set_raw(self.tier_for(scope), &key, &value);
        debug!(scope = %scope, lines = lines.len(), "Cart persisted");
        Ok(self.announce(scope, key))
    }

    /// Delete a scope's partition from every tier it may live in.
    pub fn remove(&self, scope: &Scope) -> String {
        let key = scope.storage_key();
        let mut tiers: Vec<&dyn StorageTier> = vec![self.tiers.durable.as_ref()];
        if scope.is_guest() {
            tiers.push(self.tiers.session.as_ref());
        }
        for tier in tiers {
            if tier.is_available() {
                if let Err(e) = tier.remove(&key) {
                    warn!(tier = tier.name(), key = %key, error = %e, "Failed to remove cart");
                }
            }
        }
        self.fallback.remove(&key);
        debug!(scope = %scope, "Cart partition removed");
        self.announce(scope, key)
    }

    fn announce(&self, scope: &Scope, key: String) -> String {
        let token = new_token();
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(token.clone());
        self.bus.emit(ChangeEvent {
            source: self.source.clone(),
            token: token.clone(),
            scope: scope.clone(),
            key,
        });
        token
    }

    /// Whether this instance emitted `token` recently.
    pub fn is_own(&self, token: &str) -> bool {
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(token)
    }

    /// Read the guest session id from the cookie jar, creating it on first use.
    pub fn session_id(&self, cookie: &str) -> String {
        let cookies = self.tiers.cookies.as_ref();
        let tier = cookies.is_available().then_some(cookies);
        if let Some(existing) = self.get_raw(tier, cookie).filter(|v| !v.trim().is_empty()) {
            return existing;
        }
        let session_id = uuid::Uuid::new_v4().simple().to_string();
        self.set_raw(tier, cookie, &session_id);
        debug!(session_id = %session_id, "Created guest session");
        session_id
    }

    pub fn last_user(&self) -> Option<LastUserScope> {
        let raw = self.get_raw(self.durable(), LAST_USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "Malformed last-user pointer, ignoring");
                None
            }
        }
    }

    pub fn record_last_user(&self, user_id: &str) {
        let record = LastUserScope {
            user_id: user_id.to_string(),
            recorded_at: Utc::now(),
        };
        match serde_json::to_string(&record) {
            Ok(value) => self.set_raw(self.durable(), LAST_USER_KEY, &value),
            Err(e) => warn!(error = %e, "Failed to encode last-user pointer"),
        }
    }

    pub fn clear_last_user(&self) {
        if let Some(tier) = self.durable() {
            if let Err(e) = tier.remove(LAST_USER_KEY) {
                warn!(error = %e, "Failed to clear last-user pointer");
            }
        }
        self.fallback.remove(LAST_USER_KEY);
    }

    fn durable(&self) -> Option<&dyn StorageTier> {
        let durable = self.tiers.durable.as_ref();
        durable.is_available().then_some(durable)
    }

    fn get_raw(&self, tier: Option<&dyn StorageTier>, key: &str) -> Option<String> {
        if let Some(tier) = tier {
            match tier.get(key) {
                Ok(Some(value)) => return Some(value),
                Ok(None) => {}
                Err(e) => warn!(tier = tier.name(), key = %key, error = %e, "Storage read failed"),
            }
        }
        self.fallback.get(key).map(|v| v.value().clone())
    }

    fn set_raw(&self, tier: Option<&dyn StorageTier>, key: &str, value: &str) {
        let result = match tier {
            Some(tier) => tier.set(key, value),
            None => Err(StorageError::Unavailable("no storage tier".into())),
        };
        match result {
            Ok(()) => {
                self.fallback.remove(key);
            }
            Err(e) => {
                if !self.degraded.swap(true, Ordering::SeqCst) {
                    warn!(key = %key, error = %e, "Storage unavailable, keeping cart in memory only");
                }
                self.fallback.insert(key.to_string(), value.to_string());
            }
        }
    }
}

impl std::fmt::Debug for CartPersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartPersistence")
            .field("tiers", &self.tiers)
            .field("source", &self.source)
            .field("degraded", &self.is_degraded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use std::sync::Arc;

    struct Fixture {
        session: Arc<MemoryStorage>,
        durable: Arc<MemoryStorage>,
        persistence: CartPersistence,
    }

    fn fixture(session: MemoryStorage, durable: MemoryStorage) -> Fixture {
        let session = Arc::new(session);
        let durable = Arc::new(durable);
        let tiers = StorageTiers::new(
            session.clone(),
            durable.clone(),
            Arc::new(MemoryStorage::named("cookies")),
        );
        Fixture {
            session,
            durable,
            persistence: CartPersistence::new(tiers, ChangeBus::default(), "tab-test"),
        }
    }

    fn available() -> Fixture {
        fixture(MemoryStorage::named("session"), MemoryStorage::named("durable"))
    }

    #[test]
    fn absent_key_differs_from_empty_cart() {
        let f = available();
        let scope = Scope::guest("s1");

        assert_eq!(f.persistence.read(&scope), ReadResult::default());

        f.persistence.write(&scope, &[]).unwrap();
        let read = f.persistence.read(&scope);
        assert!(read.has_key);
        assert!(read.lines.is_empty());
    }

    #[test]
    fn guest_prefers_session_tier_user_uses_durable() {
        let f = available();
        f.persistence
            .write(&Scope::guest("s1"), &[CartLine::new("p", "v", 1)])
            .unwrap();
        f.persistence
            .write(&Scope::user("u1"), &[CartLine::new("p", "v", 1)])
            .unwrap();

        assert!(f.session.contains_key("cart:guest:s1"));
        assert!(!f.durable.contains_key("cart:guest:s1"));
        assert!(f.durable.contains_key("cart:user:u1"));
    }

    #[test]
    fn guest_falls_back_to_durable() {
        let f = fixture(
            MemoryStorage::unavailable("session"),
            MemoryStorage::named("durable"),
        );
        let scope = Scope::guest("s1");
        f.persistence
            .write(&scope, &[CartLine::new("p", "v", 2)])
            .unwrap();

        assert!(f.durable.contains_key("cart:guest:s1"));
        assert_eq!(f.persistence.read(&scope).lines[0].quantity, 2);
        assert!(!f.persistence.is_degraded());
    }

    #[test]
    fn no_tier_degrades_to_memory() {
        let f = fixture(
            MemoryStorage::unavailable("session"),
            MemoryStorage::unavailable("durable"),
        );
        let scope = Scope::user("u1");
        f.persistence
            .write(&scope, &[CartLine::new("p", "v", 3)])
            .unwrap();

        assert!(f.persistence.is_degraded());
        let read = f.persistence.read(&scope);
        assert!(read.has_key);
        assert_eq!(read.lines[0].quantity, 3);
    }

    #[test]
    fn malformed_data_reads_as_absent() {
        let f = available();
        f.session.set("cart:guest:s1", "{broken").unwrap();

        let read = f.persistence.read(&Scope::guest("s1"));
        assert!(!read.has_key);
        assert!(read.lines.is_empty());
    }

    #[test]
    fn writes_are_announced_and_recognized_as_own() {
        let f = available();
        let mut rx = f.persistence.bus().subscribe();
        let token = f.persistence.write(&Scope::guest("s1"), &[]).unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(event.token, token);
        assert_eq!(event.key, "cart:guest:s1");
        assert_eq!(event.source, "tab-test");
        assert!(f.persistence.is_own(&token));
        assert!(!f.persistence.is_own("someone-else"));
    }

    #[test]
    fn remove_clears_guest_from_every_tier() {
        let f = available();
        f.session.set("cart:guest:s1", r#"{"items":[]}"#).unwrap();
        f.durable.set("cart:guest:s1", r#"{"items":[]}"#).unwrap();

        f.persistence.remove(&Scope::guest("s1"));
        assert!(!f.session.contains_key("cart:guest:s1"));
        assert!(!f.durable.contains_key("cart:guest:s1"));
    }

    #[test]
    fn session_id_is_created_once() {
        let f = available();
        let first = f.persistence.session_id("cart_sid");
        assert_eq!(f.persistence.session_id("cart_sid"), first);
        assert_eq!(first.len(), 32);
    }

    #[test]
    fn last_user_pointer_roundtrip() {
        let f = available();
        assert_eq!(f.persistence.last_user(), None);

        f.persistence.record_last_user("u42");
        assert_eq!(f.persistence.last_user().unwrap().user_id, "u42");
        assert!(f.durable.contains_key(LAST_USER_KEY));

        f.persistence.clear_last_user();
        assert_eq!(f.persistence.last_user(), None);
    }
}
