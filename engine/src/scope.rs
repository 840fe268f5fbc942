//! Storage scope: the partition a cart belongs to.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const GUEST_PREFIX: &str = "guest:";
const USER_PREFIX: &str = "user:";

/// Storage key prefix for cart partitions.
pub const CART_KEY_PREFIX: &str = "cart:";

/// Exactly one scope is active per engine instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Scope {
    /// Anonymous visitor, keyed by session id
    Guest(String),
    /// Authenticated customer, keyed by user id
    User(String),
}

impl Scope {
    pub fn guest(session_id: impl Into<String>) -> Self {
        Scope::Guest(session_id.into())
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Scope::User(user_id.into())
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Scope::User(_))
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, Scope::Guest(_))
    }

    /// The user id when user-scoped.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Scope::User(id) => Some(id),
            Scope::Guest(_) => None,
        }
    }

    /// Session or user id, without the tag.
    pub fn id(&self) -> &str {
        match self {
            Scope::Guest(id) | Scope::User(id) => id,
        }
    }

    /// The storage partition key, `cart:<scope>`.
    pub fn storage_key(&self) -> String {
        format!("{CART_KEY_PREFIX}{self}")
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Guest(id) => write!(f, "{GUEST_PREFIX}{id}"),
            Scope::User(id) => write!(f, "{USER_PREFIX}{id}"),
        }
    }
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.strip_prefix(CART_KEY_PREFIX).unwrap_or(s);
        let scope = match (s.strip_prefix(GUEST_PREFIX), s.strip_prefix(USER_PREFIX)) {
            (Some(id), _) if !id.trim().is_empty() => Scope::Guest(id.to_string()),
            (_, Some(id)) if !id.trim().is_empty() => Scope::User(id.to_string()),
            _ => return Err(Error::InvalidScope(s.to_string())),
        };
        Ok(scope)
    }
}

impl TryFrom<String> for Scope {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        scope.to_string()
    }
}
