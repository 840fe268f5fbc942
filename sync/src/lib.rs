//! Client-resident cart runtime.
//!
//! Wraps the pure [`cart_engine`] rules with everything a running storefront
//! instance needs: scoped persistence across storage tiers, change
//! notification between instances sharing storage, debounced persistence and
//! remote sync, and guest/user scope transitions driven by an auth provider.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use cart_engine::CartLine;
//! use cart_sync::{CartEngine, InMemoryRemote, StorageTiers};
//!
//! # async fn run() {
//! let engine = CartEngine::builder(StorageTiers::memory())
//!     .remote(Arc::new(InMemoryRemote::new()))
//!     .boot()
//!     .await;
//!
//! engine.add(CartLine::new("tee", "tee-m", 1).with_size("M"));
//! assert_eq!(engine.item_count(), 1);
//!
//! engine.shutdown().await;
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod notify;
pub mod persistence;
pub mod remote;
pub mod scheduler;
pub mod storage;

pub use auth::{AuthError, AuthProvider, StaticAuth};
pub use config::{Config, ConfigError, EngineConfig};
pub use engine::{CartEngine, CartEngineBuilder, CartSnapshot, GuardOutcome, GuardSignal};
pub use error::{Result, SyncError};
pub use notify::{ChangeBus, ChangeEvent};
pub use persistence::{CartPersistence, LastUserScope, ReadResult};
pub use remote::{HttpRemote, InMemoryRemote, RemoteCall, RemoteCart, RemoteError};
pub use scheduler::{SyncPlan, SyncScheduler};
pub use storage::{FileStorage, MemoryStorage, StorageError, StorageTier, StorageTiers};
