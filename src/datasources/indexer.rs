/// GraphQL subgraph client
///
/// Public hosted indexer with account activity and per-market position
/// aggregates. Calls are paced by a token bucket (10 rps default) and
/// retried on transient failures only. A response carrying GraphQL
/// `errors[]` resolves to None so the caller can fall back to the
/// other data source.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::{instrument, warn};

use crate::config::Sources;
use crate::util::{CircuitBreaker, TokenBucket};

use super::{de_f64_flexible, de_u64_flexible, retry_request, status_error, RetryPolicy, SourceError};

const USER_ACTIVITY_QUERY: &str = r#"
query UserActivity($user: ID!) {
  account(id: $user) {
    creationTimestamp
    numTrades
    scaledCollateralVolume
    lastTradedTimestamp
  }
}
"#;

const USER_POSITIONS_QUERY: &str = r#"
query UserPositions($user: String!) {
  marketPositions(where: { user: $user }, first: 500) {
    market { id }
    valueBought
    netQuantity
  }
}
"#;

/// Account-level aggregates from the subgraph
#[derive(Debug, Clone)]
pub struct IndexerActivity {
    pub creation_timestamp_secs: Option<i64>,
    pub num_trades: u64,
    pub collateral_volume_usd: f64,
    pub last_traded_timestamp_secs: Option<i64>,
}

/// One market's aggregate exposure for a wallet
#[derive(Debug, Clone)]
pub struct IndexerPosition {
    pub market_id: String,
    pub value_usd: f64,
}

#[derive(Debug, Deserialize)]
struct GraphQlEnvelope<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct AccountData {
    account: Option<AccountWire>,
}

#[derive(Debug, Deserialize)]
struct AccountWire {
    #[serde(rename = "creationTimestamp", default, deserialize_with = "de_u64_flexible")]
    creation_timestamp: u64,

    #[serde(rename = "numTrades", default, deserialize_with = "de_u64_flexible")]
    num_trades: u64,

    #[serde(
        rename = "scaledCollateralVolume",
        default,
        deserialize_with = "de_f64_flexible"
    )]
    scaled_collateral_volume: f64,

    #[serde(
        rename = "lastTradedTimestamp",
        default,
        deserialize_with = "de_u64_flexible"
    )]
    last_traded_timestamp: u64,
}

#[derive(Debug, Deserialize)]
struct PositionsData {
    #[serde(rename = "marketPositions", default)]
    market_positions: Vec<PositionWire>,
}

#[derive(Debug, Deserialize)]
struct PositionWire {
    market: MarketRef,

    #[serde(rename = "valueBought", default, deserialize_with = "de_f64_flexible")]
    value_bought: f64,
}

#[derive(Debug, Deserialize)]
struct MarketRef {
    id: String,
}

pub struct IndexerClient {
    http: reqwest::Client,
    url: String,
    breaker: Arc<CircuitBreaker>,
    bucket: TokenBucket,
    retry: RetryPolicy,
}

impl IndexerClient {
    pub fn new(sources: &Sources, breaker: Arc<CircuitBreaker>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(sources.http_timeout_secs))
            .build()
            .expect("failed to build indexer HTTP client");

        Self {
            http,
            url: sources.indexer_url.clone(),
            breaker,
            bucket: TokenBucket::per_second(sources.indexer_rate_limit_rps),
            retry: RetryPolicy::default(),
        }
    }

    /// Lifetime activity aggregates; None when the subgraph has never
    /// seen the wallet or answered with GraphQL errors
    #[instrument(skip(self), fields(wallet = %address))]
    pub async fn get_user_activity(
        &self,
        address: &str,
    ) -> Result<Option<IndexerActivity>, SourceError> {
        let data = self
            .execute::<AccountData>("user_activity", USER_ACTIVITY_QUERY, address)
            .await?;

        Ok(data.and_then(|d| d.account).map(|account| IndexerActivity {
            creation_timestamp_secs: (account.creation_timestamp > 0)
                .then_some(account.creation_timestamp as i64),
            num_trades: account.num_trades,
            collateral_volume_usd: account.scaled_collateral_volume,
            last_traded_timestamp_secs: (account.last_traded_timestamp > 0)
                .then_some(account.last_traded_timestamp as i64),
        }))
    }

    /// Per-market exposure aggregates
    #[instrument(skip(self), fields(wallet = %address))]
    pub async fn get_user_positions(
        &self,
        address: &str,
    ) -> Result<Option<Vec<IndexerPosition>>, SourceError> {
        let data = self
            .execute::<PositionsData>("user_positions", USER_POSITIONS_QUERY, address)
            .await?;

        Ok(data.map(|d| {
            d.market_positions
                .into_iter()
                .map(|p| IndexerPosition {
                    market_id: p.market.id,
                    value_usd: p.value_bought,
                })
                .collect()
        }))
    }

    async fn execute<T: serde::de::DeserializeOwned>(
        &self,
        op: &str,
        query: &str,
        user: &str,
    ) -> Result<Option<T>, SourceError> {
        if !self.breaker.allow() {
            return Err(SourceError::Unavailable("indexer"));
        }

        let body = json!({
            "query": query,
            "variables": { "user": user.to_lowercase() },
        });

        let result = retry_request(&self.retry, op, || {
            let body = body.clone();
            async move {
                self.bucket.acquire().await;
                let response = self.http.post(&self.url).json(&body).send().await?;
                if !response.status().is_success() {
                    return Err(status_error(response.status()));
                }
                let envelope = response
                    .json::<GraphQlEnvelope<T>>()
                    .await
                    .map_err(|e| SourceError::Decode(e.to_string()))?;
                Ok(envelope)
            }
        })
        .await;

        match result {
            Ok(envelope) => {
                self.breaker.record_success();
                if !envelope.errors.is_empty() {
                    warn!(
                        op,
                        errors = ?envelope.errors.iter().map(|e| &e.message).collect::<Vec<_>>(),
                        "subgraph returned GraphQL errors, treating as no data"
                    );
                    return Ok(None);
                }
                Ok(envelope.data)
            }
            Err(err) => {
                if err.is_retryable() {
                    self.breaker.record_failure();
                } else {
                    self.breaker.record_success();
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_with_errors_resolves_to_none() {
        let raw = r#"{"data": null, "errors": [{"message": "indexing error"}]}"#;
        let envelope: GraphQlEnvelope<AccountData> = serde_json::from_str(raw).unwrap();
        assert!(envelope.data.is_none());
        assert_eq!(envelope.errors.len(), 1);
    }

    #[test]
    fn test_account_wire_decodes_bigint_strings() {
        let raw = r#"{
            "data": {
                "account": {
                    "creationTimestamp": "1713200000",
                    "numTrades": "4",
                    "scaledCollateralVolume": "1234.56",
                    "lastTradedTimestamp": "1714000000"
                }
            }
        }"#;
        let envelope: GraphQlEnvelope<AccountData> = serde_json::from_str(raw).unwrap();
        let account = envelope.data.unwrap().account.unwrap();
        assert_eq!(account.num_trades, 4);
        assert!((account.scaled_collateral_volume - 1234.56).abs() < 1e-9);
        assert_eq!(account.creation_timestamp, 1_713_200_000);
    }

    #[test]
    fn test_positions_wire() {
        let raw = r#"{
            "data": {
                "marketPositions": [
                    {"market": {"id": "0xm1"}, "valueBought": "900.0", "netQuantity": "10"},
                    {"market": {"id": "0xm2"}, "valueBought": 100.0, "netQuantity": "1"}
                ]
            }
        }"#;
        let envelope: GraphQlEnvelope<PositionsData> = serde_json::from_str(raw).unwrap();
        let positions = envelope.data.unwrap().market_positions;
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0].market.id, "0xm1");
        assert_eq!(positions[0].value_bought, 900.0);
    }
}
