//! Client for the rate-limited game-platform API.
//!
//! Every request goes through the shared [`BoundedScheduler`], so the number of
//! in-flight calls to the platform never exceeds the configured ceiling no
//! matter how many views fire at once.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use url::Url;

use crate::core::{
    BoundedScheduler, HttpTransport, ReferenceCache, ReferenceSource, RequestDescriptor, Spawn,
    TransportError,
};
use crate::runtime::models::{
    ActivityDefinitions, GroupsForMember, Manifest, PlatformEnvelope, PostGameCarnageReport,
};
use crate::runtime::{endpoint, TokioSpawner};

/// Definition table holding activity names and artwork.
pub const ACTIVITY_DEFINITION_TABLE: &str = "DestinyActivityDefinition";

/// Language used for definition lookups.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Group filter value meaning "all groups".
const GROUP_FILTER_ALL: u8 = 0;

/// Group type for clans.
const GROUP_TYPE_CLAN: u8 = 1;

/// The manifest cache as wired by the builder.
pub type ManifestCache = ReferenceCache<Manifest, TokioSpawner>;

/// Scheduled, authenticated access to the platform API.
#[derive(Debug, Clone)]
pub struct PlatformClient {
    base_url: Url,
    stats_base_url: Url,
    transport: HttpTransport,
    scheduler: BoundedScheduler,
    retry_budget: u32,
}

impl PlatformClient {
    /// Client sending platform calls to `base_url` and carnage reports to
    /// `stats_base_url`.
    pub const fn new(
        base_url: Url,
        stats_base_url: Url,
        transport: HttpTransport,
        scheduler: BoundedScheduler,
    ) -> Self {
        Self {
            base_url,
            stats_base_url,
            transport,
            scheduler,
            retry_budget: 0,
        }
    }

    /// Retry server errors up to `budget` times on the typed operations.
    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget;
        self
    }

    /// The scheduler bounding this client.
    pub const fn scheduler(&self) -> &BoundedScheduler {
        &self.scheduler
    }

    /// Run one request inside the scheduler.
    pub async fn send<T: DeserializeOwned>(
        &self,
        req: RequestDescriptor,
    ) -> Result<T, TransportError> {
        let req = &req;
        self.scheduler
            .schedule(|| self.transport.call::<T>(req))
            .await
    }

    /// The manifest index.
    pub async fn manifest(&self) -> Result<Manifest, TransportError> {
        let url = endpoint(&self.base_url, &["Platform", "Destiny2", "Manifest"], true)?;
        self.platform_get(url).await
    }

    /// Post-game carnage report for one activity instance.
    pub async fn post_game_carnage_report(
        &self,
        activity_id: &str,
    ) -> Result<PostGameCarnageReport, TransportError> {
        let url = endpoint(
            &self.stats_base_url,
            &[
                "Platform",
                "Destiny2",
                "Stats",
                "PostGameCarnageReport",
                activity_id,
            ],
            true,
        )?;
        self.platform_get(url).await
    }

    /// Clans a member belongs to.
    pub async fn groups_for_member(
        &self,
        membership_type: i32,
        membership_id: &str,
    ) -> Result<GroupsForMember, TransportError> {
        let membership_type = membership_type.to_string();
        let filter = GROUP_FILTER_ALL.to_string();
        let group_type = GROUP_TYPE_CLAN.to_string();
        let url = endpoint(
            &self.base_url,
            &[
                "Platform",
                "GroupV2",
                "User",
                membership_type.as_str(),
                membership_id,
                filter.as_str(),
                group_type.as_str(),
            ],
            true,
        )?;
        self.platform_get(url).await
    }

    /// Load one definition table from the public content host.
    pub async fn manifest_component<T: DeserializeOwned>(
        &self,
        manifest: &Manifest,
        table: &str,
        language: &str,
    ) -> Result<T, TransportError> {
        let path = manifest.component_path(table, language).ok_or_else(|| {
            TransportError::Decode(format!("manifest has no `{table}` table for `{language}`"))
        })?;
        let url = self
            .base_url
            .join(path)
            .map_err(|e| TransportError::Decode(format!("component path `{path}`: {e}")))?;
        self.send(RequestDescriptor::get(url).with_retry_budget(self.retry_budget))
            .await
    }

    /// Activity definitions, resolving the manifest through `cache`.
    pub async fn activity_definitions<S>(
        &self,
        cache: &ReferenceCache<Manifest, S>,
    ) -> Result<ActivityDefinitions, TransportError>
    where
        S: Spawn + Send + Sync + 'static,
    {
        let manifest = cache.get().await?;
        self.manifest_component(&manifest, ACTIVITY_DEFINITION_TABLE, DEFAULT_LANGUAGE)
            .await
    }

    async fn platform_get<T: DeserializeOwned>(&self, url: Url) -> Result<T, TransportError> {
        let envelope: PlatformEnvelope<T> = self
            .send(RequestDescriptor::get(url).with_retry_budget(self.retry_budget))
            .await?;
        envelope.into_response()
    }
}

#[async_trait]
impl ReferenceSource<Manifest> for PlatformClient {
    async fn fetch(&self) -> Result<Manifest, TransportError> {
        self.manifest().await
    }
}
