/// Core data types for the insider detection pipeline
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A monitored prediction market and the metadata the detector needs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    /// Exchange market id (primary key)
    pub id: String,

    /// On-chain condition id used by the data API trade filters
    pub condition_id: String,

    /// Human readable question
    pub question: String,

    /// URL slug on the exchange
    pub slug: String,

    /// Monitoring tier (1 = highest priority)
    pub tier: MarketTier,

    /// Market category for reporting
    pub category: MarketCategory,

    /// Total USD staked across outcomes
    pub open_interest: f64,

    /// Lifetime traded volume in USD
    pub volume: f64,

    /// Operator switch: false removes the market from monitoring
    pub enabled: bool,

    /// Exchange state flags
    pub active: bool,
    pub closed: bool,
}

impl Market {
    /// Markets the detector will analyze
    pub fn is_monitorable(&self) -> bool {
        self.enabled && self.active && !self.closed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MarketTier {
    Tier1,
    Tier2,
    Tier3,
}

impl TryFrom<u8> for MarketTier {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MarketTier::Tier1),
            2 => Ok(MarketTier::Tier2),
            3 => Ok(MarketTier::Tier3),
            other => Err(format!("invalid market tier: {}", other)),
        }
    }
}

impl From<MarketTier> for u8 {
    fn from(tier: MarketTier) -> u8 {
        match tier {
            MarketTier::Tier1 => 1,
            MarketTier::Tier2 => 2,
            MarketTier::Tier3 => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketCategory {
    Politics,
    Corporate,
    Sports,
    Misc,
}

impl MarketCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketCategory::Politics => "politics",
            MarketCategory::Corporate => "corporate",
            MarketCategory::Sports => "sports",
            MarketCategory::Misc => "misc",
        }
    }
}

impl std::str::FromStr for MarketCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "politics" => Ok(MarketCategory::Politics),
            "corporate" => Ok(MarketCategory::Corporate),
            "sports" => Ok(MarketCategory::Sports),
            "misc" => Ok(MarketCategory::Misc),
            other => Err(format!("invalid market category: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

/// A single exchange trade as delivered by the ingest feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    /// Unique trade id from the exchange
    pub id: String,

    pub market_id: String,

    pub side: TradeSide,

    /// Share count
    pub size: f64,

    /// Price per share, 0..1
    pub price: f64,

    /// Outcome label the taker bought into
    pub outcome: String,

    /// Maker wallet address (40-hex lowercase)
    pub maker: String,

    /// Taker wallet address (40-hex lowercase) — the wallet we analyze
    pub taker: String,

    /// Exchange timestamp in milliseconds
    pub timestamp_ms: i64,
}

impl Trade {
    /// Notional USD value of the trade
    pub fn usd_value(&self) -> f64 {
        self.size * self.price
    }
}

/// Normalize a wallet address to the canonical 40-hex lowercase form.
/// Accepts an optional 0x prefix; returns None for anything that is not
/// a 20-byte hex string.
pub fn normalize_wallet_address(raw: &str) -> Option<String> {
    let stripped = raw.strip_prefix("0x").unwrap_or(raw);
    if stripped.len() != 40 {
        return None;
    }
    let lowered = stripped.to_ascii_lowercase();
    hex::decode(&lowered).ok()?;
    Some(lowered)
}

/// Output of the signal detector gate for a trade worth analyzing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    pub market_id: String,

    /// Notional USD value of the trade
    pub trade_usd_value: f64,

    /// 100 * trade_usd_value / open_interest
    pub oi_percentage: f64,

    /// Estimated percentage price move attributable to the trade
    pub price_impact: f64,

    /// Open interest at analysis time
    pub open_interest: f64,
}

/// Which external source produced a normalized wallet record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletDataSource {
    Indexer,
    Platform,
    Combined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

/// Confidence accounting attached to every normalized wallet record.
/// Score starts at 100 and is decremented per missing sub-field; the
/// level bands are >=80 high, >=50 medium, else low.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Confidence {
    pub level: ConfidenceLevel,
    pub score: f64,
    pub reasons: Vec<String>,
}

impl Confidence {
    pub fn from_score(score: f64, reasons: Vec<String>) -> Self {
        let score = score.clamp(0.0, 100.0);
        Self {
            level: Self::level_for(score),
            score,
            reasons,
        }
    }

    pub fn level_for(score: f64) -> ConfidenceLevel {
        if score >= 80.0 {
            ConfidenceLevel::High
        } else if score >= 50.0 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

/// Common wallet shape both data-source adapters normalize into
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedWallet {
    pub address: String,

    /// Lifetime trade count on the exchange
    pub trade_count: u64,

    /// Lifetime traded volume in USD
    pub volume_usd: f64,

    /// Days since first observed activity
    pub account_age_days: f64,

    /// Millisecond timestamps of first/last observed trades
    pub first_trade_timestamp: Option<i64>,
    pub last_trade_timestamp: Option<i64>,

    /// Only the platform source reports these
    pub win_rate: Option<f64>,
    pub pnl: Option<f64>,

    /// Distinct markets the wallet has traded
    pub markets_traded: u64,

    pub data_source: WalletDataSource,

    pub confidence: Confidence,

    pub warnings: Vec<String>,
}

/// On-chain funding flags; only available when chain-indexed data was
/// reachable for the wallet
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OnChainFlags {
    pub cex_funded: bool,
    pub low_tx_count: bool,
    pub young_wallet: bool,
    pub high_exchange_netflow: bool,
    pub single_purpose: bool,
}

impl OnChainFlags {
    pub fn count_set(&self) -> u32 {
        [
            self.cex_funded,
            self.low_tx_count,
            self.young_wallet,
            self.high_exchange_netflow,
            self.single_purpose,
        ]
        .iter()
        .filter(|f| **f)
        .count() as u32
    }
}

/// Flags derived from exchange/subgraph history
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SubgraphFlags {
    pub low_trade_count: bool,
    pub young_account: bool,
    pub low_volume: bool,
    pub high_concentration: bool,
    pub fresh_fat_bet: bool,
    pub low_diversification: bool,
}

impl SubgraphFlags {
    pub fn count_set(&self) -> u32 {
        [
            self.low_trade_count,
            self.young_account,
            self.low_volume,
            self.high_concentration,
            self.fresh_fat_bet,
            self.low_diversification,
        ]
        .iter()
        .filter(|f| **f)
        .count() as u32
    }
}

/// Supplementary numbers carried alongside the flags
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletMetadata {
    pub total_transactions: Option<u64>,
    pub wallet_age_days: Option<f64>,
    pub cex_funding_source: Option<String>,
    pub exchange_netflow_percentage: Option<f64>,
}

/// Per-wallet summary of history and flags used by the scorer.
/// Built per trade, cached by address with a 48 h default TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletFingerprint {
    pub address: String,

    /// None when only indexed data was available
    pub onchain: Option<OnChainFlags>,

    pub subgraph: SubgraphFlags,

    pub metadata: WalletMetadata,

    /// Data confidence of the merged record backing this fingerprint
    pub data_confidence: Confidence,

    /// OR across both flag sets with the >=3 true rule
    pub is_suspicious: bool,
}

impl WalletFingerprint {
    pub fn total_flags_set(&self) -> u32 {
        self.onchain.map(|f| f.count_set()).unwrap_or(0) + self.subgraph.count_set()
    }

    /// Recompute the derived suspicion bit after flag changes
    pub fn refresh_suspicion(&mut self) {
        self.is_suspicious = self.total_flags_set() >= 3;
    }
}

/// Named score bucket; determines persistence and notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Classification {
    LogOnly,
    AlertMediumConfidence,
    AlertHighConfidence,
    AlertStrongInsider,
}

impl Classification {
    pub fn for_score(score: f64) -> Self {
        if score >= 85.0 {
            Classification::AlertStrongInsider
        } else if score >= 70.0 {
            Classification::AlertHighConfidence
        } else if score >= 50.0 {
            Classification::AlertMediumConfidence
        } else {
            Classification::LogOnly
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::LogOnly => "LOG_ONLY",
            Classification::AlertMediumConfidence => "ALERT_MEDIUM_CONFIDENCE",
            Classification::AlertHighConfidence => "ALERT_HIGH_CONFIDENCE",
            Classification::AlertStrongInsider => "ALERT_STRONG_INSIDER",
        }
    }
}

impl std::str::FromStr for Classification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOG_ONLY" => Ok(Classification::LogOnly),
            "ALERT_MEDIUM_CONFIDENCE" => Ok(Classification::AlertMediumConfidence),
            "ALERT_HIGH_CONFIDENCE" => Ok(Classification::AlertHighConfidence),
            "ALERT_STRONG_INSIDER" => Ok(Classification::AlertStrongInsider),
            other => Err(format!("invalid classification: {}", other)),
        }
    }
}

/// Contribution split behind a total score
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub wallet_contribution: f64,
    pub impact_contribution: f64,
    /// Retained from the 3-factor model; 0 when not computed
    pub extremity_contribution: f64,
}

/// Weighted 0-100 score with its classification band
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertScore {
    pub total_score: f64,
    pub breakdown: ScoreBreakdown,
    pub classification: Classification,
}

impl AlertScore {
    pub fn should_alert(&self) -> bool {
        self.total_score >= 70.0
    }
}

/// Everything required to reconstruct an alerting decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,

    /// Original trade snapshot
    pub trade: Trade,

    /// Signal numerics at decision time
    pub signal: TradeSignal,

    /// Wallet flags and metadata at decision time
    pub fingerprint: WalletFingerprint,

    pub score: AlertScore,

    /// Fingerprint data confidence, 0-100
    pub confidence_score: f64,

    /// Millisecond timestamp of the decision
    pub timestamp_ms: i64,

    // Lifecycle
    pub notified: bool,
    pub notified_at_ms: Option<i64>,
    pub dismissed: bool,
    pub dismissed_at_ms: Option<i64>,
    pub notes: Option<String>,

    // Retired gating inputs, kept as nullable snapshot columns
    pub dormancy_days: Option<f64>,
    pub dormancy_flag: Option<bool>,
}

impl Alert {
    pub fn new(
        trade: Trade,
        signal: TradeSignal,
        fingerprint: WalletFingerprint,
        score: AlertScore,
    ) -> Self {
        let confidence_score = fingerprint.data_confidence.score;
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            trade,
            signal,
            fingerprint,
            score,
            confidence_score,
            timestamp_ms: Utc::now().timestamp_millis(),
            notified: false,
            notified_at_ms: None,
            dismissed: false,
            dismissed_at_ms: None,
            notes: None,
            dormancy_days: None,
            dormancy_flag: None,
        }
    }
}
