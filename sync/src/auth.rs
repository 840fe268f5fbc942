//! Authentication collaborator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use futures::future::{self, BoxFuture, FutureExt};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("auth check unavailable: {0}")]
    Unavailable(String),

    #[error("auth check rejected: {0}")]
    Rejected(String),
}

/// Reports who, if anyone, is signed in.
pub trait AuthProvider: Send + Sync {
    /// The authenticated user id, `None` for an anonymous visitor.
    fn current_user(&self) -> BoxFuture<'_, Result<Option<String>, AuthError>>;

    /// Cheap synchronous hint that a signed-in session plausibly exists
    /// (a session cookie is present). Never authoritative.
    fn session_hint(&self) -> bool;
}

/// Settable [`AuthProvider`].
#[derive(Debug, Default)]
pub struct StaticAuth {
    user: RwLock<Option<String>>,
    failing: AtomicBool,
}

impl StaticAuth {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(user_id: impl Into<String>) -> Self {
        let auth = Self::default();
        auth.sign_in(user_id);
        auth
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = Some(user_id.into());
    }

    pub fn sign_out(&self) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Make `current_user` fail until cleared.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn user(&self) -> Option<String> {
        self.user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AuthProvider for StaticAuth {
    fn current_user(&self) -> BoxFuture<'_, Result<Option<String>, AuthError>> {
        let result = if self.failing.load(Ordering::SeqCst) {
            Err(AuthError::Unavailable("identity service unreachable".into()))
        } else {
            Ok(self.user())
        };
        future::ready(result).boxed()
    }

    fn session_hint(&self) -> bool {
        self.user().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sign_in_and_out() {
        let auth = StaticAuth::anonymous();
        assert_eq!(auth.current_user().await, Ok(None));
        assert!(!auth.session_hint());

        auth.sign_in("u1");
        assert_eq!(auth.current_user().await, Ok(Some("u1".into())));
        assert!(auth.session_hint());

        auth.sign_out();
        assert_eq!(auth.current_user().await, Ok(None));
    }

    #[tokio::test]
    async fn failing_check() {
        let auth = StaticAuth::signed_in("u1");
        auth.set_failing(true);
        assert!(matches!(
            auth.current_user().await,
            Err(AuthError::Unavailable(_))
        ));
        assert!(auth.session_hint());
    }
}
