//! Error types for transport, storage and client construction.

use reqwest::StatusCode;
use thiserror::Error;

use crate::core::RetryPolicy;

/// Why a request produced no usable response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkReason {
    /// Connection could not be established (DNS, refused, TLS).
    Connect,
    /// The per-call deadline elapsed.
    TimedOut,
    /// The caller's cancellation token fired.
    Cancelled,
    /// The request could not be built (bad URL, unserializable body).
    Request,
    /// Any other transport-level failure, including a body cut off mid-read.
    Other,
}

/// Failure of a single transport call.
///
/// `Clone` so one failed fetch can be handed to every caller that joined it.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Upstream answered with a non-success status.
    #[error("upstream responded with status {code}")]
    HttpStatus {
        /// HTTP status code.
        code: u16,
        /// Response body text, empty when the upstream sent none.
        body: String,
    },
    /// No response was obtained.
    #[error("network failure ({reason:?}): {message}")]
    Network {
        /// Classification of the failure.
        reason: NetworkReason,
        /// Underlying error text.
        message: String,
    },
    /// The response body did not parse into the expected shape.
    #[error("response could not be decoded: {0}")]
    Decode(String),
}

impl TransportError {
    /// Failure reported when the caller's cancellation token fires.
    pub fn cancelled() -> Self {
        Self::Network {
            reason: NetworkReason::Cancelled,
            message: "request cancelled by caller".into(),
        }
    }

    /// Status code, when the upstream responded at all.
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// True when the failure came from caller cancellation.
    pub const fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Network {
                reason: NetworkReason::Cancelled,
                ..
            }
        )
    }

    /// True when the retry policy allows another attempt after this failure.
    pub fn is_retryable(&self) -> bool {
        self.status()
            .and_then(|code| StatusCode::from_u16(code).ok())
            .is_some_and(RetryPolicy::should_retry)
    }

    /// Short message suitable for a generic "try again" banner.
    pub fn user_message(&self) -> String {
        match self {
            Self::HttpStatus { code: 404, .. } => "Requested resource not found.".into(),
            Self::HttpStatus { code: 500, .. } => "Server error. Please try again later.".into(),
            Self::HttpStatus { code: 401, .. } => "Not authorized.".into(),
            Self::HttpStatus { code: 429, .. } => "Too many requests. Slow down a bit.".into(),
            Self::HttpStatus { code, .. } => format!("Request failed {code}"),
            Self::Network {
                reason: NetworkReason::Cancelled,
                ..
            } => "Request was cancelled.".into(),
            Self::Network {
                reason: NetworkReason::TimedOut,
                ..
            } => "The server took too long to respond. Please try again.".into(),
            Self::Network { .. } => "Could not reach the server. Check your connection.".into(),
            Self::Decode(_) => "Received an unexpected response from the server.".into(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let reason = if err.is_timeout() {
            NetworkReason::TimedOut
        } else if err.is_connect() {
            NetworkReason::Connect
        } else if err.is_builder() {
            NetworkReason::Request
        } else {
            NetworkReason::Other
        };
        Self::Network {
            reason,
            message: err.to_string(),
        }
    }
}

/// Errors from the durable key/value tier.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure.
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// Key cannot be mapped onto the backend.
    #[error("invalid store key: {0}")]
    InvalidKey(String),
    /// The blocking task running the I/O panicked or was cancelled.
    #[error("store task failed: {0}")]
    Task(String),
}

/// Errors raised while wiring clients together.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The HTTP client could not be constructed.
    #[error("http client setup failed: {0}")]
    HttpClient(String),
    /// No async runtime is available to drive background work.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),
    /// The durable store could not be opened.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_only_for_http_failures() {
        let http = TransportError::HttpStatus {
            code: 503,
            body: String::new(),
        };
        assert_eq!(http.status(), Some(503));
        assert!(http.is_retryable());
        assert_eq!(TransportError::Decode("x".into()).status(), None);
        assert!(!TransportError::cancelled().is_retryable());
    }

    #[test]
    fn any_status_from_500_up_is_retryable() {
        let http = |code| TransportError::HttpStatus {
            code,
            body: String::new(),
        };
        assert!(http(500).is_retryable());
        assert!(http(600).is_retryable());
        assert!(http(999).is_retryable());
        assert!(!http(429).is_retryable());
    }

    #[test]
    fn user_messages_cover_known_statuses() {
        let msg = |code| {
            TransportError::HttpStatus {
                code,
                body: String::new(),
            }
            .user_message()
        };
        assert_eq!(msg(404), "Requested resource not found.");
        assert_eq!(msg(429), "Too many requests. Slow down a bit.");
        assert_eq!(msg(418), "Request failed 418");
        assert_eq!(TransportError::cancelled().user_message(), "Request was cancelled.");
    }

    #[test]
    fn display_includes_context() {
        let err = TransportError::HttpStatus {
            code: 404,
            body: "missing".into(),
        };
        assert_eq!(err.to_string(), "upstream responded with status 404");
        assert!(TransportError::cancelled().is_cancelled());
        let err = ClientError::InvalidConfig("max_concurrency must be greater than 0".into());
        assert_eq!(
            err.to_string(),
            "invalid configuration: max_concurrency must be greater than 0"
        );
    }
}
