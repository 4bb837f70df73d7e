//! Client configuration structures.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::AppResult;

/// Durable store backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackendConfig {
    /// Process-local store; the cache starts cold on every launch.
    InMemory,
    /// One JSON file per key under `path`.
    File {
        /// Directory holding the store files.
        path: PathBuf,
    },
}

/// Game-platform API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Base URL for platform endpoints.
    #[serde(default = "default_platform_base")]
    pub base_url: String,
    /// Base URL for the stats host serving carnage reports.
    #[serde(default = "default_stats_base")]
    pub stats_base_url: String,
    /// API key sent on authenticated endpoints.
    pub api_key: String,
    /// Header carrying the API key.
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,
    /// Path prefixes that receive the API key.
    #[serde(default = "default_authenticated_prefixes")]
    pub authenticated_prefixes: Vec<String>,
    /// Maximum concurrent in-flight requests.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Per-attempt deadline in seconds.
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Retries on server errors for platform calls.
    #[serde(default)]
    pub retry_budget: u32,
    /// Linear backoff step in milliseconds, also used for reporting retries.
    #[serde(default = "default_backoff_step_ms")]
    pub backoff_step_ms: u64,
}

/// Reporting service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingConfig {
    /// Base URL, e.g. `http://localhost:8080/api`.
    #[serde(default = "default_reporting_base")]
    pub base_url: String,
    /// Per-attempt deadline in seconds.
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Retries on server errors for reporting calls.
    #[serde(default)]
    pub retry_budget: u32,
}

/// Reference-data cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Freshness window in seconds.
    #[serde(default = "default_freshness_secs")]
    pub freshness_secs: u64,
    /// Durable store key.
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
    /// Durable store backend.
    #[serde(default = "default_store")]
    pub store: StoreBackendConfig,
}

/// Root client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Platform API.
    pub platform: PlatformConfig,
    /// Reporting API.
    #[serde(default)]
    pub reporting: ReportingConfig,
    /// Manifest cache.
    #[serde(default)]
    pub cache: CacheConfig,
}

fn default_platform_base() -> String {
    "https://www.bungie.net".into()
}

fn default_stats_base() -> String {
    "https://stats.bungie.net".into()
}

fn default_api_key_header() -> String {
    "X-API-Key".into()
}

fn default_authenticated_prefixes() -> Vec<String> {
    vec!["/Platform/".into()]
}

const fn default_max_concurrency() -> usize {
    20
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_backoff_step_ms() -> u64 {
    200
}

fn default_reporting_base() -> String {
    "http://localhost:8080/api".into()
}

const fn default_freshness_secs() -> u64 {
    60 * 60
}

fn default_storage_key() -> String {
    "bungie_manifest".into()
}

const fn default_store() -> StoreBackendConfig {
    StoreBackendConfig::InMemory
}

fn validate_base_url(field: &str, value: &str) -> Result<(), String> {
    let url = Url::parse(value).map_err(|e| format!("{field} `{value}` is not a valid URL: {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("{field} `{value}` must use http or https"));
    }
    Ok(())
}

impl PlatformConfig {
    /// Defaults with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: default_platform_base(),
            stats_base_url: default_stats_base(),
            api_key: api_key.into(),
            api_key_header: default_api_key_header(),
            authenticated_prefixes: default_authenticated_prefixes(),
            max_concurrency: default_max_concurrency(),
            request_timeout_secs: default_timeout_secs(),
            retry_budget: 0,
            backoff_step_ms: default_backoff_step_ms(),
        }
    }

    /// Per-attempt deadline.
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Backoff step as a duration.
    pub const fn backoff_step(&self) -> Duration {
        Duration::from_millis(self.backoff_step_ms)
    }

    /// Validate platform configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.api_key.trim().is_empty() {
            return Err("api_key must be set".into());
        }
        validate_base_url("base_url", &self.base_url)?;
        validate_base_url("stats_base_url", &self.stats_base_url)?;
        if self.max_concurrency == 0 {
            return Err("max_concurrency must be greater than 0".into());
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be greater than 0".into());
        }
        if let Some(bad) = self
            .authenticated_prefixes
            .iter()
            .find(|p| !p.starts_with('/'))
        {
            return Err(format!("authenticated prefix `{bad}` must start with `/`"));
        }
        Ok(())
    }
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            base_url: default_reporting_base(),
            request_timeout_secs: default_timeout_secs(),
            retry_budget: 0,
        }
    }
}

impl ReportingConfig {
    /// Per-attempt deadline.
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate reporting configuration values.
    pub fn validate(&self) -> Result<(), String> {
        validate_base_url("reporting.base_url", &self.base_url)?;
        if self.request_timeout_secs == 0 {
            return Err("reporting.request_timeout_secs must be greater than 0".into());
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freshness_secs: default_freshness_secs(),
            storage_key: default_storage_key(),
            store: default_store(),
        }
    }
}

impl CacheConfig {
    /// Freshness window as a duration.
    pub const fn freshness(&self) -> Duration {
        Duration::from_secs(self.freshness_secs)
    }

    /// Validate cache configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.freshness_secs == 0 {
            return Err("cache.freshness_secs must be greater than 0".into());
        }
        if self.storage_key.trim().is_empty() {
            return Err("cache.storage_key must not be empty".into());
        }
        Ok(())
    }
}

impl ClientConfig {
    /// Defaults everywhere except the required API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            platform: PlatformConfig::new(api_key),
            reporting: ReportingConfig::default(),
            cache: CacheConfig::default(),
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.platform
            .validate()
            .map_err(|e| format!("platform invalid: {e}"))?;
        self.reporting.validate()?;
        self.cache.validate()
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from the process environment, loading `.env` first.
    pub fn from_env() -> AppResult<Self> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                tracing::warn!(error = %err, "ignoring unreadable .env file");
            }
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("BUNGIE_API_KEY").context("BUNGIE_API_KEY is not set")?;
        let mut cfg = Self::new(api_key);
        if let Some(base) = lookup("BUNGIE_BASE_URL") {
            cfg.platform.base_url = base;
        }
        if let Some(base) = lookup("BUNGIE_STATS_BASE_URL") {
            cfg.platform.stats_base_url = base;
        }
        if let Some(raw) = lookup("BUNGIE_MAX_CONCURRENCY") {
            cfg.platform.max_concurrency = raw
                .parse()
                .with_context(|| format!("BUNGIE_MAX_CONCURRENCY `{raw}` is not a number"))?;
        }
        if let Some(base) = lookup("CALDERA_API_BASE") {
            cfg.reporting.base_url = base;
        }
        if let Some(dir) = lookup("CALDERA_MANIFEST_DIR") {
            cfg.cache.store = StoreBackendConfig::File { path: dir.into() };
        }
        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = ClientConfig::new("key");
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.platform.max_concurrency, 20);
        assert_eq!(cfg.cache.freshness(), Duration::from_secs(3600));
        assert_eq!(cfg.platform.backoff_step(), Duration::from_millis(200));
    }

    #[test]
    fn relative_prefix_is_rejected() {
        let mut cfg = ClientConfig::new("key");
        cfg.platform.authenticated_prefixes = vec!["Platform/".into()];
        assert!(cfg.validate().unwrap_err().contains("must start with"));
    }
}
