/// Platform data API client
///
/// Rich per-user activity, trades and positions from the exchange's
/// public data API. `get_user_data` fans out four GETs in parallel and
/// treats 404 as "no data"; `get_recent_trades_for_markets` batches
/// condition ids to stay under URL-length limits and bounds batch
/// concurrency.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::Sources;
use crate::util::{CircuitBreaker, TokenBucket};

use super::{
    de_f64_flexible, de_opt_f64_flexible, de_u64_flexible, retry_request, status_error,
    RetryPolicy, SourceError,
};

/// Lifetime activity summary for one wallet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformActivity {
    #[serde(rename = "tradeCount", default, deserialize_with = "de_u64_flexible")]
    pub trade_count: u64,

    #[serde(rename = "volumeUSD", default, deserialize_with = "de_f64_flexible")]
    pub volume_usd: f64,

    /// Millisecond timestamps
    #[serde(rename = "firstTradeTimestamp", default)]
    pub first_trade_timestamp: Option<i64>,
    #[serde(rename = "lastTradeTimestamp", default)]
    pub last_trade_timestamp: Option<i64>,

    #[serde(rename = "winRate", default, deserialize_with = "de_opt_f64_flexible")]
    pub win_rate: Option<f64>,

    #[serde(default, deserialize_with = "de_opt_f64_flexible")]
    pub pnl: Option<f64>,

    #[serde(rename = "marketsTraded", default, deserialize_with = "de_u64_flexible")]
    pub markets_traded: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformTrade {
    #[serde(rename = "transactionHash", default)]
    pub transaction_hash: Option<String>,

    #[serde(rename = "conditionId")]
    pub condition_id: String,

    #[serde(default)]
    pub slug: Option<String>,

    #[serde(default)]
    pub title: Option<String>,

    pub side: String,

    #[serde(default)]
    pub outcome: Option<String>,

    #[serde(default, deserialize_with = "de_f64_flexible")]
    pub size: f64,

    #[serde(default, deserialize_with = "de_f64_flexible")]
    pub price: f64,

    /// Taker wallet
    #[serde(rename = "proxyWallet")]
    pub proxy_wallet: String,

    #[serde(default)]
    pub maker: Option<String>,

    /// Seconds since epoch
    pub timestamp: i64,
}

impl PlatformTrade {
    pub fn usd_value(&self) -> f64 {
        self.size * self.price
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformPosition {
    #[serde(rename = "conditionId")]
    pub condition_id: String,

    #[serde(default, deserialize_with = "de_f64_flexible")]
    pub size: f64,

    #[serde(rename = "currentValue", default, deserialize_with = "de_opt_f64_flexible")]
    pub current_value: Option<f64>,

    #[serde(rename = "initialValue", default, deserialize_with = "de_opt_f64_flexible")]
    pub initial_value: Option<f64>,
}

impl PlatformPosition {
    /// Best available USD valuation of this position
    pub fn usd_value(&self) -> f64 {
        self.current_value
            .or(self.initial_value)
            .unwrap_or(self.size)
            .max(0.0)
    }
}

/// Combined result of the four per-user endpoints. Endpoints that
/// returned 404 leave their slot empty.
#[derive(Debug, Clone)]
pub struct PlatformUserData {
    pub activity: Option<PlatformActivity>,
    pub recent_trades: Vec<PlatformTrade>,
    pub positions: Vec<PlatformPosition>,
    pub closed_positions: Vec<PlatformPosition>,
    pub queried_at: DateTime<Utc>,
}

impl PlatformUserData {
    pub fn is_empty(&self) -> bool {
        self.activity.is_none()
            && self.recent_trades.is_empty()
            && self.positions.is_empty()
            && self.closed_positions.is_empty()
    }
}

pub struct PlatformClient {
    http: reqwest::Client,
    base_url: String,
    breaker: Arc<CircuitBreaker>,
    bucket: TokenBucket,
    retry: RetryPolicy,
    batch_size: usize,
    batch_concurrency: usize,
    batch_timeout: Duration,
}

impl PlatformClient {
    pub fn new(sources: &Sources, breaker: Arc<CircuitBreaker>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(sources.http_timeout_secs))
            .build()
            .expect("failed to build platform HTTP client");

        Self {
            http,
            base_url: sources.platform_base_url.trim_end_matches('/').to_string(),
            breaker,
            bucket: TokenBucket::per_second(sources.platform_rate_limit_rps),
            retry: RetryPolicy::default(),
            batch_size: sources.platform_batch_size,
            batch_concurrency: sources.platform_batch_concurrency,
            batch_timeout: Duration::from_secs(sources.platform_batch_timeout_secs),
        }
    }

    /// Fetch the activity summary plus recent trades and open/closed
    /// positions for one wallet, all four requests in parallel.
    #[instrument(skip(self), fields(wallet = %address))]
    pub async fn get_user_data(&self, address: &str) -> Result<PlatformUserData, SourceError> {
        if !self.breaker.allow() {
            return Err(SourceError::Unavailable("platform"));
        }

        let user_query = [("user", address)];
        let trades_query = [("user", address), ("limit", "100"), ("takerOnly", "true")];

        let activity = self.fetch_opt::<PlatformActivity>("/activity", &user_query);
        let trades = self.fetch_opt::<Vec<PlatformTrade>>("/trades", &trades_query);
        let positions = self.fetch_opt::<Vec<PlatformPosition>>("/positions", &user_query);
        let closed = self.fetch_opt::<Vec<PlatformPosition>>("/closed-positions", &user_query);

        let (activity, trades, positions, closed) =
            tokio::join!(activity, trades, positions, closed);

        let result = (|| {
            Ok::<_, SourceError>(PlatformUserData {
                activity: activity?,
                recent_trades: trades?.unwrap_or_default(),
                positions: positions?.unwrap_or_default(),
                closed_positions: closed?.unwrap_or_default(),
                queried_at: Utc::now(),
            })
        })();

        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(err) if err.is_retryable() => self.breaker.record_failure(),
            // Permanent 4xx means the endpoint itself is healthy
            Err(_) => self.breaker.record_success(),
        }

        result
    }

    /// Recent large trades across many markets, batched by condition id.
    /// Results are deduplicated by transaction hash and sorted
    /// newest-first.
    #[instrument(skip(self, condition_ids), fields(markets = condition_ids.len()))]
    pub async fn get_recent_trades_for_markets(
        &self,
        condition_ids: &[String],
        limit: usize,
        min_usd_value: Option<f64>,
    ) -> Result<Vec<PlatformTrade>, SourceError> {
        if condition_ids.is_empty() {
            return Ok(Vec::new());
        }
        if !self.breaker.allow() {
            return Err(SourceError::Unavailable("platform"));
        }

        let limit_str = limit.to_string();
        let min_usd_str = min_usd_value.map(|v| format!("{:.0}", v));

        let batches: Vec<Vec<String>> = condition_ids
            .chunks(self.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();
        let batch_count = batches.len();

        let results: Vec<Result<Vec<PlatformTrade>, SourceError>> = stream::iter(batches)
            .map(|batch| {
                let market_csv = batch.join(",");
                let limit_str = limit_str.clone();
                let min_usd_str = min_usd_str.clone();
                async move {
                    let mut query: Vec<(&str, &str)> = vec![
                        ("market", market_csv.as_str()),
                        ("limit", limit_str.as_str()),
                        ("takerOnly", "true"),
                    ];
                    if let Some(min) = min_usd_str.as_deref() {
                        query.push(("filterType", "CASH"));
                        query.push(("filterAmount", min));
                    }
                    match tokio::time::timeout(
                        self.batch_timeout,
                        self.fetch_opt::<Vec<PlatformTrade>>("/trades", &query),
                    )
                    .await
                    {
                        Ok(result) => result.map(Option::unwrap_or_default),
                        Err(_) => Err(SourceError::Timeout),
                    }
                }
            })
            .buffer_unordered(self.batch_concurrency)
            .collect()
            .await;

        let mut trades = Vec::new();
        let mut last_error = None;
        let mut failed_batches = 0;
        for result in results {
            match result {
                Ok(batch) => trades.extend(batch),
                Err(err) => {
                    failed_batches += 1;
                    warn!(error = %err, "trade batch fetch failed");
                    last_error = Some(err);
                }
            }
        }

        if failed_batches == batch_count {
            self.breaker.record_failure();
            return Err(last_error.unwrap_or(SourceError::Timeout));
        }
        self.breaker.record_success();

        let mut seen = HashSet::new();
        trades.retain(|t| match &t.transaction_hash {
            Some(hash) => seen.insert(hash.clone()),
            None => true,
        });
        trades.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        debug!(
            trades = trades.len(),
            failed_batches, batch_count, "market trade sweep complete"
        );
        Ok(trades)
    }

    /// GET + JSON decode with retry; 404 resolves to None
    async fn fetch_opt<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, SourceError> {
        let url = format!("{}{}", self.base_url, path);
        retry_request(&self.retry, path, || {
            let url = url.clone();
            async move {
                self.bucket.acquire().await;
                let response = self.http.get(&url).query(query).send().await?;
                if response.status() == reqwest::StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                if !response.status().is_success() {
                    return Err(status_error(response.status()));
                }
                let value = response
                    .json::<T>()
                    .await
                    .map_err(|e| SourceError::Decode(e.to_string()))?;
                Ok(Some(value))
            }
        })
        .await
    }
}
