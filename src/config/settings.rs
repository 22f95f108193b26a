/// Configuration structures loaded from the environment

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub detection: Detection,
    pub wallet_thresholds: WalletThresholds,
    pub sources: Sources,
    pub storage: Storage,
    pub pipeline: Pipeline,
}

/// Trade-level gate thresholds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Detection {
    /// Minimum trade share of open interest to pass the impact gate (%)
    pub min_oi_percentage: f64,

    /// Minimum estimated price impact to pass the impact gate (%)
    pub min_price_impact: f64,

    /// Absolute USD ceiling for the market-aware minimum
    pub absolute_min_usd: f64,

    /// Fraction of available liquidity a trade must reach in thin markets
    pub relative_liquidity_factor: f64,

    /// Minimum fingerprint data confidence worth alerting on
    pub min_confidence_score: f64,

    /// Wallet score floor used by statistics queries
    pub min_wallet_score: f64,
}

/// Wallet fingerprint flag thresholds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WalletThresholds {
    pub low_trade_count: u64,
    pub young_account_days: f64,
    pub low_volume_usd: f64,
    pub high_concentration_pct: f64,
    pub fresh_fat_bet_prior_trades: u64,
    pub fresh_fat_bet_size_usd: f64,
    pub fresh_fat_bet_max_oi: f64,
    /// Markets traded at or below this count flags low diversification
    pub low_diversification_markets: u64,
    pub fingerprint_cache_ttl_hours: u64,
}

/// External data source endpoints and limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Sources {
    pub platform_base_url: String,
    pub indexer_url: String,
    pub market_metadata_base_url: String,

    /// Per-request HTTP deadline in seconds
    pub http_timeout_secs: u64,

    /// Token bucket rates (requests per second)
    pub indexer_rate_limit_rps: f64,
    pub platform_rate_limit_rps: f64,

    /// Platform batch fan-out limits
    pub platform_batch_size: usize,
    pub platform_batch_concurrency: usize,
    pub platform_batch_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Storage {
    pub database_url: String,
    pub trade_retention_days: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Pipeline {
    /// Bounded worker pool size
    pub workers: usize,

    /// Input channel capacity (back-pressure bound)
    pub queue_capacity: usize,

    /// Ingest poll interval in milliseconds
    pub poll_interval_ms: u64,

    /// Minimum USD value requested from the market-filtered trade feed
    pub ingest_min_usd: f64,
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Read the full configuration surface from the environment,
    /// falling back to documented defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            detection: Detection {
                min_oi_percentage: env_f64("MIN_OI_PERCENTAGE", 20.0),
                min_price_impact: env_f64("MIN_PRICE_IMPACT", 20.0),
                absolute_min_usd: env_f64("ABSOLUTE_MIN_USD", 5000.0),
                relative_liquidity_factor: env_f64("RELATIVE_LIQUIDITY_FACTOR", 0.5),
                min_confidence_score: env_f64("MIN_CONFIDENCE_SCORE", 75.0),
                min_wallet_score: env_f64("MIN_WALLET_SCORE", 70.0),
            },
            wallet_thresholds: WalletThresholds {
                low_trade_count: env_u64("SUBGRAPH_LOW_TRADE_COUNT", 10),
                young_account_days: env_f64("SUBGRAPH_YOUNG_ACCOUNT_DAYS", 30.0),
                low_volume_usd: env_f64("SUBGRAPH_LOW_VOLUME_USD", 50_000.0),
                high_concentration_pct: env_f64("SUBGRAPH_HIGH_CONCENTRATION_PCT", 70.0),
                fresh_fat_bet_prior_trades: env_u64("SUBGRAPH_FRESH_FAT_BET_PRIOR_TRADES", 2),
                fresh_fat_bet_size_usd: env_f64("SUBGRAPH_FRESH_FAT_BET_SIZE_USD", 20_000.0),
                fresh_fat_bet_max_oi: env_f64("SUBGRAPH_FRESH_FAT_BET_MAX_OI", 500_000.0),
                low_diversification_markets: env_u64("SUBGRAPH_LOW_DIVERSIFICATION_MARKETS", 3),
                fingerprint_cache_ttl_hours: env_u64("SUBGRAPH_CACHE_TTL_HOURS", 48),
            },
            sources: Sources {
                platform_base_url: env_string(
                    "PLATFORM_DATA_API_URL",
                    "https://data-api.polymarket.com",
                ),
                indexer_url: env_string(
                    "INDEXER_SUBGRAPH_URL",
                    "https://api.goldsky.com/api/public/polymarket/subgraphs/activity/prod/gn",
                ),
                market_metadata_base_url: env_string(
                    "MARKET_METADATA_API_URL",
                    "https://gamma-api.polymarket.com",
                ),
                http_timeout_secs: env_u64("HTTP_TIMEOUT_SECS", 10),
                indexer_rate_limit_rps: env_f64("INDEXER_RATE_LIMIT_RPS", 10.0),
                platform_rate_limit_rps: env_f64("PLATFORM_RATE_LIMIT_RPS", 20.0),
                platform_batch_size: env_usize("PLATFORM_BATCH_SIZE", 20),
                platform_batch_concurrency: env_usize("PLATFORM_BATCH_CONCURRENCY", 5),
                platform_batch_timeout_secs: env_u64("PLATFORM_BATCH_TIMEOUT_SECS", 5),
            },
            storage: Storage {
                database_url: env_string("DATABASE_URL", "sqlite:data/polysentry.db"),
                trade_retention_days: env_u64("TRADE_RETENTION_DAYS", 7) as u32,
            },
            pipeline: Pipeline {
                workers: env_usize("PIPELINE_WORKERS", 8),
                queue_capacity: env_usize("PIPELINE_QUEUE_CAPACITY", 256),
                poll_interval_ms: env_u64("POLL_INTERVAL_MS", 3000),
                ingest_min_usd: env_f64("INGEST_MIN_USD", 1000.0),
            },
        }
    }
}
