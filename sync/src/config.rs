//! Configuration management for the cart runtime.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PERSIST_DEBOUNCE_MS: u64 = 150;
const DEFAULT_SYNC_DEBOUNCE_MS: u64 = 800;
const DEFAULT_STORAGE_DIR: &str = ".cart-storage";
const DEFAULT_SESSION_COOKIE: &str = "cart_sid";

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Quiet period before the cart is written to storage
    pub persist_debounce: Duration,
    /// Quiet period before the cart is pushed to the order service
    pub sync_debounce: Duration,
    /// Order service base URL; offline when unset
    pub remote_url: Option<String>,
    /// Directory backing the durable storage tier
    pub storage_dir: PathBuf,
    /// Cookie holding the guest session id
    pub session_cookie: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let persist_debounce = duration_ms(
            &lookup,
            "CART_PERSIST_DEBOUNCE_MS",
            DEFAULT_PERSIST_DEBOUNCE_MS,
        )?;
        let sync_debounce = duration_ms(&lookup, "CART_SYNC_DEBOUNCE_MS", DEFAULT_SYNC_DEBOUNCE_MS)?;

        let remote_url = lookup("CART_REMOTE_URL").filter(|url| !url.trim().is_empty());
        if let Some(url) = &remote_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidRemoteUrl(url.clone()));
            }
        }

        let storage_dir = lookup("CART_STORAGE_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_STORAGE_DIR.to_string())
            .into();

        let session_cookie = lookup("CART_SESSION_COOKIE")
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SESSION_COOKIE.to_string());

        Ok(Self {
            persist_debounce,
            sync_debounce,
            remote_url,
            storage_dir,
            session_cookie,
        })
    }

    /// The subset handed to each engine instance.
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            persist_debounce: self.persist_debounce,
            sync_debounce: self.sync_debounce,
            session_cookie: self.session_cookie.clone(),
        }
    }
}

fn duration_ms(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: u64,
) -> Result<Duration, ConfigError> {
    match lookup(var) {
        None => Ok(Duration::from_millis(default)),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::InvalidDuration { var, value }),
    }
}

/// Per-instance engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub persist_debounce: Duration,
    pub sync_debounce: Duration,
    pub session_cookie: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            persist_debounce: Duration::from_millis(DEFAULT_PERSIST_DEBOUNCE_MS),
            sync_debounce: Duration::from_millis(DEFAULT_SYNC_DEBOUNCE_MS),
            session_cookie: DEFAULT_SESSION_COOKIE.to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a whole number of milliseconds, got {value:?}")]
    InvalidDuration { var: &'static str, value: String },

    #[error("CART_REMOTE_URL must be an http(s) URL, got {0:?}")]
    InvalidRemoteUrl(String),
}
