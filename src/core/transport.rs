//! Resilient transport: one HTTP call with structured failures and retry.
//!
//! [`HttpTransport::call`] sends a [`RequestDescriptor`], retries server errors
//! within the descriptor's retry budget, and turns every outcome into either a
//! decoded payload or a [`TransportError`]. It knows nothing about concurrency
//! limits; the platform client wraps it in the bounded scheduler, while the
//! reporting client uses it directly.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::core::{ClientError, NetworkReason, RetryPolicy, TransportError};

/// Everything needed to issue one logical request.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// HTTP method.
    pub method: Method,
    /// Absolute target URL.
    pub url: Url,
    /// Query parameters appended to `url`.
    pub query: Vec<(String, String)>,
    /// Optional JSON body.
    pub body: Option<serde_json::Value>,
    /// Caller-owned cancellation signal.
    pub cancel: Option<CancellationToken>,
    /// Extra attempts allowed after a server error. Zero means a single try.
    pub retry_budget: u32,
    /// Per-call deadline; falls back to the client-wide timeout when unset.
    pub timeout: Option<Duration>,
}

impl RequestDescriptor {
    /// Descriptor with no query, body, cancellation, retries or deadline.
    pub const fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            query: Vec::new(),
            body: None,
            cancel: None,
            retry_budget: 0,
            timeout: None,
        }
    }

    /// `GET url`.
    pub const fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// `POST url`.
    pub const fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    /// `PUT url`.
    pub const fn put(url: Url) -> Self {
        Self::new(Method::PUT, url)
    }

    /// `DELETE url`.
    pub const fn delete(url: Url) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Append a query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Attach an already-encoded JSON body.
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialize `body` as the JSON request body.
    pub fn with_json<B: Serialize + ?Sized>(self, body: &B) -> Result<Self, TransportError> {
        let value = serde_json::to_value(body).map_err(|e| TransportError::Network {
            reason: NetworkReason::Request,
            message: format!("request body is not serializable: {e}"),
        })?;
        Ok(self.with_body(value))
    }

    /// Abort the call when `token` is cancelled.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Allow up to `budget` retries on server errors.
    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget;
        self
    }

    /// Bound each attempt by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Static allow-list deciding which requests carry the API key.
#[derive(Clone)]
pub struct ApiKeyPolicy {
    header: HeaderName,
    value: HeaderValue,
    prefixes: Vec<String>,
}

impl std::fmt::Debug for ApiKeyPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyPolicy")
            .field("header", &self.header)
            .field("prefixes", &self.prefixes)
            .finish_non_exhaustive()
    }
}

impl ApiKeyPolicy {
    /// Send `key` in `header` for paths starting with any of `prefixes`.
    pub fn new(header: &str, key: &str, prefixes: Vec<String>) -> Result<Self, ClientError> {
        let header = HeaderName::from_bytes(header.as_bytes())
            .map_err(|e| ClientError::InvalidConfig(format!("api key header `{header}`: {e}")))?;
        let mut value = HeaderValue::from_str(key)
            .map_err(|e| ClientError::InvalidConfig(format!("api key value: {e}")))?;
        value.set_sensitive(true);
        Ok(Self {
            header,
            value,
            prefixes,
        })
    }

    /// Whether a request to `url` is on the authenticated allow-list.
    pub fn applies_to(&self, url: &Url) -> bool {
        let path = url.path();
        self.prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}

/// Executes request descriptors over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    api_key: Option<Arc<ApiKeyPolicy>>,
    retry: RetryPolicy,
}

impl HttpTransport {
    /// Unauthenticated transport with the default retry policy.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            api_key: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Attach API keys according to `policy`.
    pub fn with_api_key(mut self, policy: ApiKeyPolicy) -> Self {
        self.api_key = Some(Arc::new(policy));
        self
    }

    /// Override the backoff policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Perform the request and decode a JSON payload.
    ///
    /// A 204 or empty success body is decoded from JSON `null`, so `()` and
    /// `Option<_>` payloads succeed while required shapes fail with `Decode`.
    pub async fn call<T: DeserializeOwned>(
        &self,
        req: &RequestDescriptor,
    ) -> Result<T, TransportError> {
        match self.execute(req).await? {
            Some(body) => {
                serde_json::from_slice(&body).map_err(|e| TransportError::Decode(e.to_string()))
            }
            None => serde_json::from_value(serde_json::Value::Null).map_err(|e| {
                TransportError::Decode(format!("response had no content: {e}"))
            }),
        }
    }

    /// Run attempts until success, a non-retryable failure, an exhausted
    /// budget, or cancellation. `None` means a success with no body.
    async fn execute(&self, req: &RequestDescriptor) -> Result<Option<Vec<u8>>, TransportError> {
        let request_id = Uuid::new_v4();
        let cancel = req.cancel.as_ref();
        let mut attempt: u32 = 0;
        loop {
            match until_cancelled(cancel, self.attempt(req, request_id, attempt)).await {
                Ok(body) => return Ok(body),
                Err(err) if err.is_retryable() && attempt < req.retry_budget => {
                    attempt += 1;
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        %request_id,
                        attempt,
                        status = err.status(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "retrying after server error"
                    );
                    until_cancelled(cancel, async {
                        tokio::time::sleep(delay).await;
                        Ok(())
                    })
                    .await?;
                }
                Err(err) => {
                    if err.is_cancelled() {
                        tracing::debug!(%request_id, attempt, "request cancelled");
                    } else {
                        tracing::debug!(%request_id, attempt, error = %err, "request failed");
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn attempt(
        &self,
        req: &RequestDescriptor,
        request_id: Uuid,
        attempt: u32,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        let mut builder = self.client.request(req.method.clone(), req.url.clone());
        if !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        if let Some(policy) = self.api_key.as_deref() {
            if policy.applies_to(&req.url) {
                builder = builder.header(policy.header.clone(), policy.value.clone());
            }
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }
        if let Some(timeout) = req.timeout {
            builder = builder.timeout(timeout);
        }

        tracing::debug!(
            %request_id,
            attempt,
            method = %req.method,
            url = %req.url,
            "sending request"
        );
        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            if status == StatusCode::NO_CONTENT {
                return Ok(None);
            }
            let body = response.bytes().await?;
            return Ok((!body.is_empty()).then(|| body.to_vec()));
        }

        let body = response.text().await.unwrap_or_default();
        Err(TransportError::HttpStatus {
            code: status.as_u16(),
            body,
        })
    }
}

/// Race `fut` against the caller's cancellation token, preferring
/// cancellation when both are ready.
async fn until_cancelled<F, R>(token: Option<&CancellationToken>, fut: F) -> Result<R, TransportError>
where
    F: Future<Output = Result<R, TransportError>>,
{
    match token {
        Some(token) => tokio::select! {
            biased;
            () = token.cancelled() => Err(TransportError::cancelled()),
            result = fut => result,
        },
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn api_key_policy_matches_prefixes_only() {
        let policy = ApiKeyPolicy::new("X-API-Key", "secret", vec!["/Platform/".into()]).unwrap();
        assert!(policy.applies_to(&url("https://www.bungie.net/Platform/Destiny2/Manifest/")));
        assert!(!policy.applies_to(&url("https://www.bungie.net/common/destiny2_content/x.json")));
        assert!(!policy.applies_to(&url("https://www.bungie.net/platform/lowercase/")));
    }

    #[test]
    fn api_key_debug_hides_value() {
        let policy = ApiKeyPolicy::new("X-API-Key", "secret", vec![]).unwrap();
        assert!(!format!("{policy:?}").contains("secret"));
    }

    #[test]
    fn invalid_header_name_is_rejected() {
        assert!(ApiKeyPolicy::new("bad header", "k", vec![]).is_err());
    }

    #[test]
    fn descriptor_builders_accumulate() {
        let req = RequestDescriptor::post(url("http://localhost/x"))
            .with_query("a", 1)
            .with_json(&serde_json::json!({ "playerName": "Guardian" }))
            .unwrap()
            .with_retry_budget(3)
            .with_timeout(Duration::from_secs(2));
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.query, vec![("a".to_string(), "1".to_string())]);
        assert_eq!(req.retry_budget, 3);
        assert_eq!(req.body.unwrap()["playerName"], "Guardian");
    }
}
