//! Client for the internal reporting API.
//!
//! The reporting service is not rate limited, so calls use the transport
//! directly without going through the scheduler.

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use url::Url;

use crate::core::{HttpTransport, RequestDescriptor, TransportError};
use crate::runtime::endpoint;
use crate::runtime::models::{
    ActivityLoadResponse, ActivityReportDto, LeaderboardEntry, OpTypeDto, PlayerDto,
    PlayerSearchRequest,
};

/// Typed access to the reporting API rooted at one base URL.
#[derive(Debug, Clone)]
pub struct ReportingClient {
    base_url: Url,
    transport: HttpTransport,
    retry_budget: u32,
}

impl ReportingClient {
    /// Client for the service at `base_url`.
    pub const fn new(base_url: Url, transport: HttpTransport) -> Self {
        Self {
            base_url,
            transport,
            retry_budget: 0,
        }
    }

    /// Retry server errors up to `budget` times.
    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget;
        self
    }

    /// Base URL every path is resolved against.
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve `path` against the base URL. Leading and repeated slashes are
    /// ignored; a trailing slash is kept.
    pub fn url_for(&self, path: &str) -> Result<Url, TransportError> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        endpoint(&self.base_url, &segments, path.len() > 1 && path.ends_with('/'))
    }

    /// Issue a prepared request.
    pub async fn send<T: DeserializeOwned>(
        &self,
        req: RequestDescriptor,
    ) -> Result<T, TransportError> {
        self.transport.call(&req).await
    }

    /// `GET path`.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, TransportError> {
        self.send(self.request(Method::GET, self.url_for(path)?))
            .await
    }

    /// `POST path` with a JSON body.
    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let req = self.request(Method::POST, self.url_for(path)?).with_json(body)?;
        self.send(req).await
    }

    /// `PUT path` with a JSON body.
    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let req = self.request(Method::PUT, self.url_for(path)?).with_json(body)?;
        self.send(req).await
    }

    /// `DELETE path`.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, TransportError> {
        self.send(self.request(Method::DELETE, self.url_for(path)?))
            .await
    }

    /// Every tracked player.
    pub async fn players(&self) -> Result<Vec<PlayerDto>, TransportError> {
        self.get_segments(&["players"]).await
    }

    /// Players whose name matches `name`.
    pub async fn search_players(&self, name: &str) -> Result<Vec<PlayerDto>, TransportError> {
        let url = endpoint(&self.base_url, &["players", "search"], false)?;
        let req = self
            .request(Method::POST, url)
            .with_json(&PlayerSearchRequest { player_name: name })?;
        self.send(req).await
    }

    /// Op types with their activities.
    pub async fn activities(&self) -> Result<Vec<OpTypeDto>, TransportError> {
        self.get_segments(&["activities"]).await
    }

    /// One player by membership.
    pub async fn player(
        &self,
        membership_type: i32,
        player_id: &str,
    ) -> Result<PlayerDto, TransportError> {
        let membership_type = membership_type.to_string();
        self.get_segments(&["players", membership_type.as_str(), player_id])
            .await
    }

    /// A player's runs of one activity.
    pub async fn player_reports(
        &self,
        player_id: &str,
        activity_id: &str,
    ) -> Result<Vec<ActivityReportDto>, TransportError> {
        self.get_segments(&["players", player_id, "stats", activity_id])
            .await
    }

    /// Ask the service to reload a player's activity history.
    pub async fn load_player_reports(
        &self,
        player_id: &str,
    ) -> Result<ActivityLoadResponse, TransportError> {
        let url = endpoint(&self.base_url, &["players", player_id, "load"], false)?;
        let req = self.request(Method::POST, url).with_body(json!({}));
        self.send(req).await
    }

    /// Players ranked by completion count.
    pub async fn completions_leaderboard(
        &self,
        activity_id: &str,
    ) -> Result<Vec<LeaderboardEntry>, TransportError> {
        self.leaderboard("completions", activity_id).await
    }

    /// Players ranked by fastest run.
    pub async fn speed_leaderboard(
        &self,
        activity_id: &str,
    ) -> Result<Vec<LeaderboardEntry>, TransportError> {
        self.leaderboard("speed", activity_id).await
    }

    /// Players ranked by total time spent.
    pub async fn total_time_leaderboard(
        &self,
        activity_id: &str,
    ) -> Result<Vec<LeaderboardEntry>, TransportError> {
        self.leaderboard("totalTime", activity_id).await
    }

    async fn leaderboard(
        &self,
        board: &str,
        activity_id: &str,
    ) -> Result<Vec<LeaderboardEntry>, TransportError> {
        self.get_segments(&["activities", "leaderboards", board, activity_id])
            .await
    }

    async fn get_segments<T: DeserializeOwned>(
        &self,
        segments: &[&str],
    ) -> Result<T, TransportError> {
        let url = endpoint(&self.base_url, segments, false)?;
        self.send(self.request(Method::GET, url)).await
    }

    fn request(&self, method: Method, url: Url) -> RequestDescriptor {
        RequestDescriptor::new(method, url).with_retry_budget(self.retry_budget)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ReportingClient {
        ReportingClient::new(
            Url::parse(base).unwrap(),
            HttpTransport::new(reqwest::Client::new()),
        )
    }

    #[test]
    fn url_for_normalises_slashes() {
        let c = client("http://localhost:8080/api/");
        assert_eq!(
            c.url_for("/players").unwrap().as_str(),
            "http://localhost:8080/api/players"
        );
        assert_eq!(
            c.url_for("players//search").unwrap().as_str(),
            "http://localhost:8080/api/players/search"
        );

        let c = client("http://localhost:8080/api");
        assert_eq!(
            c.url_for("activities/").unwrap().as_str(),
            "http://localhost:8080/api/activities/"
        );
    }
}
