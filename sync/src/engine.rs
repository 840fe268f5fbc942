//! The cart engine instance.
//!
//! One [`CartEngine`] owns the in-memory cart, the active scope, and the two
//! debounced side-effect tracks. Mutations apply synchronously to the
//! in-memory cart and publish a new snapshot; persistence and remote sync run
//! later, each a quiet period after the last mutation, always reading the
//! latest state when they fire.
//!
//! # Scope transitions
//!
//! - **Boot**: read or create the guest session, hydrate the last known user
//!   scope optimistically when a signed-in session is plausible, run the guard
//! - **Promote**: merge the guest cart into the user's, switch scope and write
//!   the merged cart in one step, clear the guest partition
//! - **Demote**: fall back to the guest partition and forget the last user
//!
//! Transitions are serialized; a failed auth check leaves the scope alone.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use cart_engine::{
    stabilize, AddOutcome, Cart, CartLine, LineMatcher, Reconciler, Scope, UpdateOutcome,
};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::auth::{AuthProvider, StaticAuth};
use crate::config::EngineConfig;
use crate::debounce::Debouncer;
use crate::notify::{new_token, ChangeBus, ChangeEvent};
use crate::persistence::CartPersistence;
use crate::remote::RemoteCart;
use crate::scheduler::{SyncPlan, SyncScheduler};
use crate::storage::StorageTiers;
use crate::{Result, SyncError};

/// Read-only view published after every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    pub scope: Scope,
    pub lines: Vec<CartLine>,
    pub item_count: u32,
    pub subtotal: Decimal,
    /// Increments with every published change
    pub revision: u64,
}

impl CartSnapshot {
    fn of(scope: &Scope, cart: &Cart, revision: u64) -> Self {
        Self {
            scope: scope.clone(),
            lines: cart.lines().to_vec(),
            item_count: cart.item_count(),
            subtotal: cart.subtotal(),
            revision,
        }
    }
}

/// Triggers that re-run the scope guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardSignal {
    Focus,
    VisibilityChange,
    AuthChanged,
}

/// What a guard run or explicit transition did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Unchanged,
    Promoted { user_id: String },
    Demoted,
    /// A different user signed in while user-scoped
    Switched { from: String, to: String },
    /// The auth check failed; scope left as it was
    AuthFailed,
}

struct EngineState {
    cart: Cart,
    scope: Scope,
    session_id: String,
    scheduler: SyncScheduler,
    revision: u64,
    shut_down: bool,
}

struct Timers {
    persist: Debouncer,
    sync: Debouncer,
    listener: Option<JoinHandle<()>>,
}

impl Drop for Timers {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

struct Shared {
    persistence: CartPersistence,
    remote: Option<Arc<dyn RemoteCart>>,
    auth: Arc<dyn AuthProvider>,
    /// Never held across an await, never held while locking `timers`
    state: Mutex<EngineState>,
    timers: Mutex<Timers>,
    snapshot_tx: watch::Sender<CartSnapshot>,
    transitions: tokio::sync::Mutex<()>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn timers(&self) -> MutexGuard<'_, Timers> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_shut_down(&self) -> bool {
        self.state().shut_down
    }

    fn publish(&self, state: &mut EngineState) {
        state.revision += 1;
        self.snapshot_tx
            .send_replace(CartSnapshot::of(&state.scope, &state.cart, state.revision));
    }

    fn cancel_timers(&self) {
        let mut timers = self.timers();
        timers.persist.cancel();
        timers.sync.cancel();
    }

    fn schedule_persist(self: &Arc<Self>) {
        if self.is_shut_down() {
            return;
        }
        let weak = Arc::downgrade(self);
        self.timers().persist.schedule(async move {
            if let Some(shared) = weak.upgrade() {
                shared.persist_now();
            }
        });
    }

    fn schedule_sync(self: &Arc<Self>) {
        if self.remote.is_none() || self.is_shut_down() {
            return;
        }
        let weak = Arc::downgrade(self);
        self.timers().sync.schedule(async move {
            if let Some(shared) = weak.upgrade() {
                shared.sync_now().await;
            }
        });
    }

    /// Write the current cart to the current scope. The state lock is held
    /// across the write so a transition cannot interleave.
    fn persist_now(&self) {
        let state = self.state();
        if state.shut_down {
            return;
        }
        match self.persistence.write(&state.scope, state.cart.lines()) {
            Ok(token) => trace!(scope = %state.scope, token = %token, "Persisted"),
            Err(e) => warn!(scope = %state.scope, error = %e, "Failed to persist cart"),
        }
    }

    async fn sync_now(&self) {
        let Some(remote) = self.remote.clone() else {
            return;
        };
        let (scope, plan) = {
            let state = self.state();
            if state.shut_down {
                return;
            }
            match state.scheduler.plan(&state.scope, state.cart.lines()) {
                Ok(plan) => (state.scope.clone(), plan),
                Err(e) => {
                    warn!(scope = %state.scope, error = %e, "Failed to build sync payload");
                    return;
                }
            }
        };

        let result = match &plan {
            SyncPlan::Skip => {
                trace!(scope = %scope, "Remote cart already up to date");
                return;
            }
            SyncPlan::Replace { payload, .. } => remote.replace(&scope, payload).await,
            SyncPlan::Delete => remote.delete(&scope).await,
        };

        match result {
            Ok(()) => {
                let mut state = self.state();
                if state.scope == scope {
                    if let Some(fingerprint) = plan.fingerprint() {
                        state.scheduler.mark_sent(scope.clone(), fingerprint);
                    }
                }
                debug!(scope = %scope, deleted = matches!(plan, SyncPlan::Delete), "Remote cart synced");
            }
            Err(e) => {
                warn!(scope = %scope, error = %e, "Remote sync failed, retrying on next change");
            }
        }
    }

    /// React to a write announced on the bus.
    fn apply_external(&self, event: &ChangeEvent) -> bool {
        if self.persistence.is_own(&event.token) {
            trace!(token = %event.token, "Ignoring own change");
            return false;
        }
        let mut state = self.state();
        if state.shut_down || event.scope != state.scope {
            return false;
        }
        let read = self.persistence.read(&state.scope);
        state.cart.replace(read.lines);
        self.publish(&mut state);
        debug!(
            scope = %state.scope,
            source = %event.source,
            lines = state.cart.len(),
            "Rehydrated from external change"
        );
        true
    }

    fn rehydrate(&self) {
        let mut state = self.state();
        if state.shut_down {
            return;
        }
        let read = self.persistence.read(&state.scope);
        state.cart.replace(read.lines);
        self.publish(&mut state);
    }
}

fn spawn_listener(
    shared: Weak<Shared>,
    mut rx: broadcast::Receiver<ChangeEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let Some(shared) = shared.upgrade() else {
                        break;
                    };
                    shared.apply_external(&event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Change listener lagged, rehydrating");
                    let Some(shared) = shared.upgrade() else {
                        break;
                    };
                    shared.rehydrate();
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Builder for [`CartEngine`].
pub struct CartEngineBuilder {
    tiers: StorageTiers,
    bus: ChangeBus,
    config: EngineConfig,
    remote: Option<Arc<dyn RemoteCart>>,
    auth: Arc<dyn AuthProvider>,
    source: Option<String>,
}

impl CartEngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a bus between instances so they see each other's writes.
    pub fn bus(mut self, bus: ChangeBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn remote(mut self, remote: Arc<dyn RemoteCart>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = auth;
        self
    }

    /// Instance label carried on change events.
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Boot the engine: resolve the session, hydrate, run the guard and
    /// reconcile with the remote. Never fails; degraded collaborators are
    /// logged.
    pub async fn boot(self) -> CartEngine {
        let source = self
            .source
            .unwrap_or_else(|| format!("engine-{}", &new_token()[..8]));
        let persistence = CartPersistence::new(self.tiers, self.bus.clone(), source.clone());

        let session_id = persistence.session_id(&self.config.session_cookie);
        let mut scope = Scope::guest(session_id.clone());
        if self.auth.session_hint() {
            if let Some(last) = persistence.last_user() {
                debug!(user_id = %last.user_id, "Hydrating last known user scope");
                scope = Scope::user(last.user_id);
            }
        }

        let read = persistence.read(&scope);
        let cart = Cart::from_lines(read.lines);
        let (snapshot_tx, _) = watch::channel(CartSnapshot::of(&scope, &cart, 0));
        info!(
            source = %source,
            scope = %scope,
            lines = cart.len(),
            stored = read.has_key,
            "Cart engine booted"
        );

        let shared = Arc::new(Shared {
            persistence,
            remote: self.remote,
            auth: self.auth,
            state: Mutex::new(EngineState {
                cart,
                scope,
                session_id,
                scheduler: SyncScheduler::new(),
                revision: 0,
                shut_down: false,
            }),
            timers: Mutex::new(Timers {
                persist: Debouncer::new("persist", self.config.persist_debounce),
                sync: Debouncer::new("sync", self.config.sync_debounce),
                listener: None,
            }),
            snapshot_tx,
            transitions: tokio::sync::Mutex::new(()),
        });
        let listener = spawn_listener(Arc::downgrade(&shared), self.bus.subscribe());
        shared.timers().listener = Some(listener);

        let engine = CartEngine { shared };
        match engine.guard().await {
            GuardOutcome::Unchanged | GuardOutcome::AuthFailed => {
                engine.refresh_from_remote().await;
            }
            // Transitions reconcile on their own.
            _ => {}
        }
        engine
    }
}

/// Handle to a running cart engine. Cheap to clone.
///
/// Mutation methods are synchronous but schedule tokio tasks, so they must
/// be called from within a runtime.
#[derive(Clone)]
pub struct CartEngine {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for CartEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state();
        f.debug_struct("CartEngine")
            .field("scope", &state.scope)
            .field("lines", &state.cart.len())
            .field("revision", &state.revision)
            .finish()
    }
}

impl CartEngine {
    pub fn builder(tiers: StorageTiers) -> CartEngineBuilder {
        CartEngineBuilder {
            tiers,
            bus: ChangeBus::default(),
            config: EngineConfig::default(),
            remote: None,
            auth: Arc::new(StaticAuth::anonymous()),
            source: None,
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    fn mutate<T>(&self, op: impl FnOnce(&mut Cart) -> (T, bool)) -> T {
        let (value, changed) = {
            let mut state = self.shared.state();
            let (value, changed) = op(&mut state.cart);
            if changed {
                self.shared.publish(&mut state);
            }
            (value, changed)
        };
        if changed {
            self.shared.schedule_persist();
            self.shared.schedule_sync();
        }
        value
    }

    /// Add a line, clamped to the variant's stock headroom.
    pub fn add(&self, line: CartLine) -> AddOutcome {
        let outcome = self.mutate(|cart| {
            let outcome = cart.add(line);
            let changed = outcome.changed();
            (outcome, changed)
        });
        match &outcome {
            AddOutcome::StockExhausted => debug!("Add ignored, no stock headroom"),
            AddOutcome::Added {
                line_id, quantity, ..
            }
            | AddOutcome::Merged {
                line_id, quantity, ..
            } => debug!(line_id = %line_id, quantity, "Line added"),
        }
        outcome
    }

    /// Ingest a raw line object and add it.
    pub fn add_raw(&self, raw: &Value) -> Result<AddOutcome> {
        let line = CartLine::from_value(raw)
            .ok_or_else(|| SyncError::InvalidLine("expected a JSON object".into()))?;
        Ok(self.add(line))
    }

    /// Remove every line matching. Returns how many were removed.
    pub fn remove(&self, matcher: &LineMatcher) -> usize {
        let removed = self.mutate(|cart| {
            let removed = cart.remove(matcher);
            (removed, removed > 0)
        });
        debug!(removed, "Lines removed");
        removed
    }

    pub fn update_quantity(&self, matcher: &LineMatcher, quantity: u32) -> UpdateOutcome {
        let outcome = self.mutate(|cart| {
            let outcome = cart.update_quantity(matcher, quantity);
            let changed = outcome.changed();
            (outcome, changed)
        });
        if let UpdateOutcome::Dropped { line_id, quantity } = &outcome {
            debug!(line_id = %line_id, quantity, "Quantity update dropped, siblings hold the stock");
        }
        outcome
    }

    /// Empty the cart. The next sync deletes the remote copy.
    pub fn clear(&self) {
        self.mutate(|cart| {
            cart.clear();
            ((), true)
        });
        debug!("Cart cleared");
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn snapshot(&self) -> CartSnapshot {
        self.shared.snapshot_tx.borrow().clone()
    }

    /// Receive a new snapshot after every change.
    pub fn subscribe(&self) -> watch::Receiver<CartSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    pub fn lines(&self) -> Vec<CartLine> {
        self.shared.state().cart.lines().to_vec()
    }

    pub fn item_count(&self) -> u32 {
        self.shared.state().cart.item_count()
    }

    pub fn subtotal(&self) -> Decimal {
        self.shared.state().cart.subtotal()
    }

    pub fn scope(&self) -> Scope {
        self.shared.state().scope.clone()
    }

    pub fn session_id(&self) -> String {
        self.shared.state().session_id.clone()
    }

    pub fn source(&self) -> &str {
        self.shared.persistence.source()
    }

    /// True once a write could only be kept in memory.
    pub fn storage_degraded(&self) -> bool {
        self.shared.persistence.is_degraded()
    }

    // ========================================================================
    // Scope transitions
    // ========================================================================

    /// Re-run the guard in response to a focus, visibility or auth signal.
    pub async fn on_signal(&self, signal: GuardSignal) -> GuardOutcome {
        debug!(?signal, "Guard signal");
        self.guard().await
    }

    /// Check authentication and move to the matching scope.
    pub async fn guard(&self) -> GuardOutcome {
        let _transition = self.shared.transitions.lock().await;
        let current = self.scope();
        match self.shared.auth.current_user().await {
            Ok(user) => self.transition_to(user).await,
            Err(e) => {
                warn!(scope = %current, error = %e, "Auth check failed, keeping scope");
                GuardOutcome::AuthFailed
            }
        }
    }

    /// Move to `user_id`'s scope, merging the guest cart in.
    pub async fn promote(&self, user_id: &str) -> GuardOutcome {
        let _transition = self.shared.transitions.lock().await;
        self.transition_to(Some(user_id.to_string())).await
    }

    /// Fall back to the guest scope.
    pub async fn demote(&self) -> GuardOutcome {
        let _transition = self.shared.transitions.lock().await;
        self.transition_to(None).await
    }

    /// Caller holds the transition lock.
    async fn transition_to(&self, user: Option<String>) -> GuardOutcome {
        match (self.scope(), user) {
            (Scope::Guest(_), None) => GuardOutcome::Unchanged,
            (Scope::Guest(_), Some(user_id)) => {
                self.promote_locked(&user_id).await;
                GuardOutcome::Promoted { user_id }
            }
            (Scope::User(_), None) => {
                self.demote_locked().await;
                GuardOutcome::Demoted
            }
            (Scope::User(current), Some(user_id)) if current == user_id => GuardOutcome::Unchanged,
            (Scope::User(current), Some(user_id)) => {
                self.demote_locked().await;
                self.promote_locked(&user_id).await;
                GuardOutcome::Switched {
                    from: current,
                    to: user_id,
                }
            }
        }
    }

    async fn promote_locked(&self, user_id: &str) {
        let shared = &self.shared;
        let user_scope = Scope::user(user_id);
        let user_read = shared.persistence.read(&user_scope);
        shared.cancel_timers();

        let guest_scope = {
            let mut state = shared.state();
            let guest_scope = state.scope.clone();
            let guest_lines = state.cart.lines().to_vec();
            let merged = stabilize(user_read.lines.into_iter().chain(guest_lines));

            // Scope and storage target switch together, before the merged write.
            state.scope = user_scope.clone();
            state.cart.replace(merged);
            state.scheduler.reset();
            if let Err(e) = shared.persistence.write(&user_scope, state.cart.lines()) {
                warn!(scope = %user_scope, error = %e, "Failed to persist merged cart");
            }
            shared.persistence.remove(&guest_scope);
            shared.persistence.record_last_user(user_id);
            shared.publish(&mut state);
            info!(
                user_id = %user_id,
                from = %guest_scope,
                lines = state.cart.len(),
                "Promoted to user scope"
            );
            guest_scope
        };

        if let Some(remote) = &shared.remote {
            if let Err(e) = remote.delete(&guest_scope).await {
                debug!(scope = %guest_scope, error = %e, "Guest remote cart not deleted");
            }
        }
        self.refresh_from_remote().await;
    }

    async fn demote_locked(&self) {
        let shared = &self.shared;
        shared.cancel_timers();
        {
            let mut state = shared.state();
            let user_scope = state.scope.clone();
            // A debounced write may still be pending for the user.
            if let Err(e) = shared.persistence.write(&user_scope, state.cart.lines()) {
                warn!(scope = %user_scope, error = %e, "Failed to persist user cart");
            }

            let guest_scope = Scope::guest(state.session_id.clone());
            let read = shared.persistence.read(&guest_scope);
            state.scope = guest_scope;
            state.cart.replace(read.lines);
            state.scheduler.reset();
            shared.persistence.clear_last_user();
            shared.publish(&mut state);
            info!(from = %user_scope, lines = state.cart.len(), "Demoted to guest scope");
        }
        self.refresh_from_remote().await;
    }

    // ========================================================================
    // Remote
    // ========================================================================

    /// Fetch the active scope's remote cart and reconcile it into the local
    /// one. Returns whether the local cart changed. Failures are logged and
    /// leave the local cart untouched.
    pub async fn refresh_from_remote(&self) -> bool {
        let shared = &self.shared;
        let Some(remote) = shared.remote.clone() else {
            return false;
        };
        let scope = self.scope();
        let values = match remote.fetch(&scope).await {
            Ok(values) => values,
            Err(e) => {
                warn!(scope = %scope, error = %e, "Remote fetch failed, keeping local cart");
                return false;
            }
        };
        let remote_lines: Vec<CartLine> = values.iter().filter_map(CartLine::from_value).collect();

        let changed = {
            let mut state = shared.state();
            if state.shut_down || state.scope != scope {
                debug!(scope = %scope, "Scope changed during fetch, discarding remote cart");
                return false;
            }
            let result = Reconciler::new(state.cart.lines()).reconcile(&remote_lines);
            if let Err(e) = state.scheduler.observe_remote(scope.clone(), &remote_lines) {
                warn!(scope = %scope, error = %e, "Failed to fingerprint remote cart");
            }
            if !result.dropped.is_empty() {
                warn!(scope = %scope, dropped = ?result.dropped, "Lines capped out by remote stock");
            }
            debug!(
                scope = %scope,
                merged = result.merged.len(),
                adopted = result.adopted.len(),
                local_only = result.local_only.len(),
                "Reconciled with remote"
            );
            let changed = result.changed_from(state.cart.lines());
            if changed {
                state.cart.replace(result.lines);
                shared.publish(&mut state);
            }
            changed
        };

        if changed {
            shared.schedule_persist();
        }
        shared.schedule_sync();
        changed
    }

    // ========================================================================
    // Notifications and lifecycle
    // ========================================================================

    /// Apply a change event. Own events are ignored; events for the active
    /// scope rehydrate from storage without re-persisting or re-syncing.
    pub fn handle_change(&self, event: &ChangeEvent) -> bool {
        self.shared.apply_external(event)
    }

    /// Run pending persistence and sync now.
    pub async fn flush(&self) {
        self.shared.cancel_timers();
        self.shared.persist_now();
        self.shared.sync_now().await;
    }

    /// Flush, then stop reacting to changes and scheduling work.
    pub async fn shutdown(&self) {
        self.flush().await;
        self.shared.state().shut_down = true;
        let listener = self.shared.timers().listener.take();
        if let Some(listener) = listener {
            listener.abort();
        }
        info!(source = %self.source(), "Cart engine shut down");
    }

    /// Error unless the engine is still running.
    pub fn ensure_running(&self) -> Result<()> {
        if self.shared.is_shut_down() {
            Err(SyncError::ShutDown)
        } else {
            Ok(())
        }
    }
}
