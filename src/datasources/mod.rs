/// Read-only clients for the external wallet data sources
///
/// Both adapters sit behind named circuit breakers and token buckets,
/// enforce per-request deadlines and retry transient failures with
/// exponential backoff. They expose independent native shapes that the
/// normalizer folds into a common record.

pub mod indexer;
pub mod platform;
pub mod retry;

pub use indexer::{IndexerActivity, IndexerClient, IndexerPosition};
pub use platform::{
    PlatformActivity, PlatformClient, PlatformPosition, PlatformTrade, PlatformUserData,
};
pub use retry::{retry_request, RetryPolicy};

use thiserror::Error;

/// Failure kinds for external data-source calls. `is_retryable`
/// separates the transient-remote class from permanent failures.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{0} circuit breaker is open")]
    Unavailable(&'static str),

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited by upstream (429)")]
    RateLimited,

    #[error("server error: HTTP {0}")]
    Server(u16),

    #[error("unexpected status: HTTP {0}")]
    Status(u16),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl SourceError {
    /// Transient failures worth a backoff retry; everything else is
    /// surfaced immediately
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SourceError::Timeout
                | SourceError::Network(_)
                | SourceError::RateLimited
                | SourceError::Server(_)
        )
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout
        } else if err.is_decode() {
            SourceError::Decode(err.to_string())
        } else {
            SourceError::Network(err.to_string())
        }
    }
}

/// Numeric wire fields arrive as numbers or decimal strings depending
/// on the endpoint; accept both.
pub(crate) fn de_f64_flexible<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => Ok(n.as_f64().unwrap_or(0.0)),
        serde_json::Value::String(s) => s.parse::<f64>().map_err(serde::de::Error::custom),
        serde_json::Value::Null => Ok(0.0),
        other => Err(serde::de::Error::custom(format!(
            "expected number or string, got {}",
            other
        ))),
    }
}

pub(crate) fn de_opt_f64_flexible<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Number(n) => Ok(n.as_f64()),
        serde_json::Value::String(s) if s.is_empty() => Ok(None),
        serde_json::Value::String(s) => {
            s.parse::<f64>().map(Some).map_err(serde::de::Error::custom)
        }
        _ => Ok(None),
    }
}

pub(crate) fn de_u64_flexible<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => Ok(n.as_u64().unwrap_or(0)),
        serde_json::Value::String(s) => s.parse::<u64>().map_err(serde::de::Error::custom),
        serde_json::Value::Null => Ok(0),
        other => Err(serde::de::Error::custom(format!(
            "expected integer or string, got {}",
            other
        ))),
    }
}

/// Map a non-success HTTP status into the error taxonomy
pub(crate) fn status_error(status: reqwest::StatusCode) -> SourceError {
    if status.as_u16() == 429 {
        SourceError::RateLimited
    } else if status.is_server_error() {
        SourceError::Server(status.as_u16())
    } else {
        SourceError::Status(status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classes() {
        assert!(SourceError::Timeout.is_retryable());
        assert!(SourceError::Network("reset".into()).is_retryable());
        assert!(SourceError::RateLimited.is_retryable());
        assert!(SourceError::Server(502).is_retryable());
        assert!(!SourceError::Status(400).is_retryable());
        assert!(!SourceError::Decode("bad json".into()).is_retryable());
        assert!(!SourceError::Unavailable("platform").is_retryable());
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(reqwest::StatusCode::TOO_MANY_REQUESTS),
            SourceError::RateLimited
        ));
        assert!(matches!(
            status_error(reqwest::StatusCode::BAD_GATEWAY),
            SourceError::Server(502)
        ));
        assert!(matches!(
            status_error(reqwest::StatusCode::BAD_REQUEST),
            SourceError::Status(400)
        ));
    }
}
