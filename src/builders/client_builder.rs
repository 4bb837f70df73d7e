//! Build the platform client, reporting client and manifest cache from
//! configuration.

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::config::{ClientConfig, StoreBackendConfig};
use crate::core::{
    ApiKeyPolicy, BoundedScheduler, CacheSettings, ClientError, HttpTransport, RetryPolicy,
};
use crate::infra::store::{DurableStore, FileStore, InMemoryStore};
use crate::runtime::{ManifestCache, PlatformClient, ReportingClient, TokioSpawner};
use crate::util::clock::SystemClock;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Everything the dashboard needs to talk to its upstreams.
#[derive(Clone)]
pub struct CalderaClients {
    /// Scheduled platform client.
    pub platform: PlatformClient,
    /// Reporting service client.
    pub reporting: ReportingClient,
    /// Manifest cache fetching through `platform`.
    pub manifest: ManifestCache,
}

impl std::fmt::Debug for CalderaClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalderaClients")
            .field("platform", &self.platform)
            .field("reporting", &self.reporting)
            .field("manifest", &self.manifest.status())
            .finish()
    }
}

/// Validate `cfg` and build the client set, spawning background cache
/// refreshes on `spawner`.
pub fn build_clients(
    cfg: &ClientConfig,
    spawner: TokioSpawner,
) -> Result<CalderaClients, ClientError> {
    cfg.validate().map_err(ClientError::InvalidConfig)?;

    let platform_cfg = &cfg.platform;
    let api_key = ApiKeyPolicy::new(
        &platform_cfg.api_key_header,
        &platform_cfg.api_key,
        platform_cfg.authenticated_prefixes.clone(),
    )?;
    let platform_transport = HttpTransport::new(http_client(platform_cfg.request_timeout())?)
        .with_api_key(api_key)
        .with_retry_policy(RetryPolicy::with_step(platform_cfg.backoff_step()));
    let scheduler = BoundedScheduler::new(platform_cfg.max_concurrency)?;
    let platform = PlatformClient::new(
        parse_url("base_url", &platform_cfg.base_url)?,
        parse_url("stats_base_url", &platform_cfg.stats_base_url)?,
        platform_transport,
        scheduler,
    )
    .with_retry_budget(platform_cfg.retry_budget);

    let reporting_cfg = &cfg.reporting;
    let reporting_transport = HttpTransport::new(http_client(reporting_cfg.request_timeout())?)
        .with_retry_policy(RetryPolicy::with_step(platform_cfg.backoff_step()));
    let reporting = ReportingClient::new(
        parse_url("reporting.base_url", &reporting_cfg.base_url)?,
        reporting_transport,
    )
    .with_retry_budget(reporting_cfg.retry_budget);

    let store: Arc<dyn DurableStore> = match &cfg.cache.store {
        StoreBackendConfig::InMemory => Arc::new(InMemoryStore::new()),
        StoreBackendConfig::File { path } => Arc::new(FileStore::new(path)?),
    };
    let manifest = ManifestCache::new(
        CacheSettings {
            freshness: cfg.cache.freshness(),
            storage_key: cfg.cache.storage_key.clone(),
        },
        Arc::new(platform.clone()),
        store,
        Arc::new(SystemClock),
        spawner,
    );

    tracing::info!(
        max_concurrency = platform_cfg.max_concurrency,
        platform = %platform_cfg.base_url,
        reporting = %reporting_cfg.base_url,
        "clients built"
    );
    Ok(CalderaClients {
        platform,
        reporting,
        manifest,
    })
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, ClientError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ClientError::HttpClient(e.to_string()))
}

fn parse_url(field: &str, value: &str) -> Result<Url, ClientError> {
    Url::parse(value).map_err(|e| ClientError::InvalidConfig(format!("{field} `{value}`: {e}")))
}
