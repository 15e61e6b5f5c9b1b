//! Engine configuration
//!
//! Settings are plain structs with builder-style setters. `ServerConfig` can
//! also be read from the environment, which is how the CLI picks up its
//! endpoint without flags.

use crate::sync::{BackoffPolicy, DriverConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Remote endpoint settings for the field data server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Base URL without a trailing slash
    pub base_url: String,
    /// Bearer token attached to every request, if set
    pub api_key: Option<String>,
}

impl ServerConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(&base_url.into()),
            api_key: None,
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Read server settings from `FIELDWORK_SERVER_URL` and `FIELDWORK_API_KEY`
    ///
    /// Returns `None` when no URL is configured or it lacks an http(s)
    /// scheme, leaving the engine in local-only mode.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("FIELDWORK_SERVER_URL").ok()?;
        let base_url = base_url.trim();
        if base_url.is_empty() {
            return None;
        }
        if !is_http_url(base_url) {
            tracing::warn!("Ignoring FIELDWORK_SERVER_URL: must include http:// or https://");
            return None;
        }

        let mut config = Self::new(base_url);
        if let Ok(key) = env::var("FIELDWORK_API_KEY") {
            let key = key.trim();
            if !key.is_empty() {
                config = config.with_api_key(key);
            }
        }
        Some(config)
    }
}

/// Top-level engine settings
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path of the `SQLite` database file
    pub db_path: PathBuf,
    /// Server endpoint; `None` keeps the engine local-only
    pub server: Option<ServerConfig>,
    /// Delivery attempts per operation before it is parked as failed
    pub max_attempts: u32,
    /// Retry backoff schedule
    pub backoff: BackoffPolicy,
    /// Sync driver knobs
    pub driver: DriverConfig,
}

impl EngineConfig {
    #[must_use]
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            server: None,
            max_attempts: 5,
            backoff: BackoffPolicy::default(),
            driver: DriverConfig::default(),
        }
    }

    #[must_use]
    pub fn with_server(mut self, server: ServerConfig) -> Self {
        self.server = Some(server);
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_driver(mut self, driver: DriverConfig) -> Self {
        self.driver = driver;
        self
    }
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}
