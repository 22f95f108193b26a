/// Wallet forensics service
///
/// Fuses the two data-source adapters into a `WalletFingerprint` for
/// one wallet in the context of one trade. Cache-first with a 48 h
/// TTL; the `fresh_fat_bet` flag is recomputed against the new trade
/// context even on cache hits.

pub mod normalizer;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::config::WalletThresholds;
use crate::datasources::{IndexerClient, PlatformClient, SourceError};
use crate::types::{NormalizedWallet, SubgraphFlags, WalletFingerprint, WalletMetadata};
use crate::util::SharedCache;

pub use normalizer::{
    max_position_share_pct, merge, normalize_indexer, normalize_platform, validate_consistency,
    ConsistencyReport,
};

const STAT_WALLET_TOTAL: &str = "stats:wallet:total";
const STAT_WALLET_ERRORS: &str = "stats:wallet:errors";

/// Trade context the per-trade flags depend on
#[derive(Debug, Clone, Copy)]
pub struct TradeContext {
    pub trade_size_usd: f64,
    pub market_oi: f64,
}

#[derive(Debug, Error)]
pub enum ForensicsError {
    #[error("no wallet data available for {address} from either source")]
    NoData { address: String },
}

/// Fingerprint plus the merged inputs needed to re-derive contextual
/// flags on cache hits
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedFingerprint {
    fingerprint: WalletFingerprint,
    trade_count: u64,
    max_position_share_pct: Option<f64>,
}

pub struct WalletForensics {
    platform: Arc<PlatformClient>,
    indexer: Arc<IndexerClient>,
    cache: Arc<SharedCache>,
    thresholds: WalletThresholds,
}

impl WalletForensics {
    pub fn new(
        platform: Arc<PlatformClient>,
        indexer: Arc<IndexerClient>,
        cache: Arc<SharedCache>,
        thresholds: WalletThresholds,
    ) -> Self {
        Self {
            platform,
            indexer,
            cache,
            thresholds,
        }
    }

    fn cache_key(address: &str) -> String {
        format!("wallet:fingerprint:{}", address)
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.thresholds.fingerprint_cache_ttl_hours * 3600)
    }

    /// Build (or re-contextualize) the fingerprint for one wallet
    #[instrument(skip(self, context), fields(wallet = %address))]
    pub async fn analyze(
        &self,
        address: &str,
        context: &TradeContext,
    ) -> Result<WalletFingerprint, ForensicsError> {
        self.cache.incr(STAT_WALLET_TOTAL);

        let key = Self::cache_key(address);
        if let Some(mut cached) = self.cache.get_json::<CachedFingerprint>(&key) {
            debug!("fingerprint cache hit");
            cached.fingerprint.subgraph.fresh_fat_bet =
                self.is_fresh_fat_bet(cached.trade_count, context);
            cached.fingerprint.refresh_suspicion();
            return Ok(cached.fingerprint);
        }

        // Both adapters in parallel; one failing is tolerated
        let (platform_result, indexer_activity, indexer_positions) = tokio::join!(
            self.platform.get_user_data(address),
            self.indexer.get_user_activity(address),
            self.indexer.get_user_positions(address),
        );

        let mut position_values: Vec<f64> = Vec::new();

        let platform_normalized = match platform_result {
            Ok(data) => {
                position_values.extend(data.positions.iter().map(|p| p.usd_value()));
                Some(normalize_platform(address, &data))
            }
            Err(err) => {
                self.log_source_failure("platform", address, &err);
                None
            }
        };

        let indexer_normalized = {
            let activity = match indexer_activity {
                Ok(activity) => activity,
                Err(err) => {
                    self.log_source_failure("indexer", address, &err);
                    None
                }
            };
            let positions = match indexer_positions {
                Ok(positions) => positions,
                Err(err) => {
                    self.log_source_failure("indexer", address, &err);
                    None
                }
            };
            if activity.is_none() && positions.is_none() {
                None
            } else {
                if position_values.is_empty() {
                    if let Some(positions) = positions.as_deref() {
                        position_values.extend(positions.iter().map(|p| p.value_usd));
                    }
                }
                Some(normalize_indexer(
                    address,
                    activity.as_ref(),
                    positions.as_deref(),
                ))
            }
        };

        let Some(merged) = merge(platform_normalized, indexer_normalized) else {
            self.cache.incr(STAT_WALLET_ERRORS);
            return Err(ForensicsError::NoData {
                address: address.to_string(),
            });
        };

        let max_share = max_position_share_pct(&position_values);
        let fingerprint = self.build_fingerprint(&merged, max_share, context);

        self.cache.set_json(
            &key,
            &CachedFingerprint {
                fingerprint: fingerprint.clone(),
                trade_count: merged.trade_count,
                max_position_share_pct: max_share,
            },
            self.cache_ttl(),
        );

        Ok(fingerprint)
    }

    /// Drop the cached fingerprint so the next analyze refetches
    pub fn invalidate(&self, address: &str) {
        self.cache.remove(&Self::cache_key(address));
    }

    fn log_source_failure(&self, source: &str, address: &str, err: &SourceError) {
        warn!(source, wallet = %address, error = %err, "wallet data source failed");
    }

    fn is_fresh_fat_bet(&self, trade_count: u64, context: &TradeContext) -> bool {
        trade_count <= self.thresholds.fresh_fat_bet_prior_trades
            && context.trade_size_usd >= self.thresholds.fresh_fat_bet_size_usd
            && context.market_oi <= self.thresholds.fresh_fat_bet_max_oi
    }

    fn build_fingerprint(
        &self,
        merged: &NormalizedWallet,
        max_position_share: Option<f64>,
        context: &TradeContext,
    ) -> WalletFingerprint {
        let t = &self.thresholds;
        let subgraph = SubgraphFlags {
            low_trade_count: merged.trade_count <= t.low_trade_count,
            young_account: merged.account_age_days <= t.young_account_days,
            low_volume: merged.volume_usd <= t.low_volume_usd,
            high_concentration: max_position_share
                .map(|share| share >= t.high_concentration_pct)
                .unwrap_or(false),
            fresh_fat_bet: self.is_fresh_fat_bet(merged.trade_count, context),
            low_diversification: merged.markets_traded <= t.low_diversification_markets,
        };

        let metadata = WalletMetadata {
            total_transactions: Some(merged.trade_count),
            wallet_age_days: Some(merged.account_age_days),
            cex_funding_source: None,
            exchange_netflow_percentage: None,
        };

        let mut fingerprint = WalletFingerprint {
            address: merged.address.clone(),
            // On-chain funding analysis is fed by a separate indexer;
            // absent here, the flags stay null and scoring uses the
            // subgraph set alone.
            onchain: None,
            subgraph,
            metadata,
            data_confidence: merged.confidence.clone(),
            is_suspicious: false,
        };
        fingerprint.refresh_suspicion();
        fingerprint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Confidence, WalletDataSource};

    fn thresholds() -> WalletThresholds {
        WalletThresholds {
            low_trade_count: 10,
            young_account_days: 30.0,
            low_volume_usd: 50_000.0,
            high_concentration_pct: 70.0,
            fresh_fat_bet_prior_trades: 2,
            fresh_fat_bet_size_usd: 20_000.0,
            fresh_fat_bet_max_oi: 500_000.0,
            low_diversification_markets: 3,
            fingerprint_cache_ttl_hours: 48,
        }
    }

    fn forensics() -> WalletForensics {
        let config = crate::config::Config::from_env();
        let registry = crate::util::BreakerRegistry::global();
        WalletForensics::new(
            Arc::new(PlatformClient::new(&config.sources, registry.get("platform"))),
            Arc::new(IndexerClient::new(&config.sources, registry.get("indexer"))),
            Arc::new(SharedCache::new()),
            thresholds(),
        )
    }

    fn merged_wallet(trade_count: u64, volume: f64, age_days: f64, markets: u64) -> NormalizedWallet {
        NormalizedWallet {
            address: "c".repeat(40),
            trade_count,
            volume_usd: volume,
            account_age_days: age_days,
            first_trade_timestamp: None,
            last_trade_timestamp: None,
            win_rate: None,
            pnl: None,
            markets_traded: markets,
            data_source: WalletDataSource::Combined,
            confidence: Confidence::from_score(90.0, vec![]),
            warnings: vec![],
        }
    }

    #[test]
    fn test_fresh_wallet_fat_bet_is_suspicious() {
        let service = forensics();
        let merged = merged_wallet(1, 0.0, 7.0, 1);
        let context = TradeContext {
            trade_size_usd: 40_000.0,
            market_oi: 200_000.0,
        };
        let fingerprint = service.build_fingerprint(&merged, None, &context);

        assert!(fingerprint.subgraph.low_trade_count);
        assert!(fingerprint.subgraph.young_account);
        assert!(fingerprint.subgraph.low_volume);
        assert!(fingerprint.subgraph.fresh_fat_bet);
        assert!(fingerprint.subgraph.low_diversification);
        assert!(fingerprint.is_suspicious);
        assert!(fingerprint.onchain.is_none());
    }

    #[test]
    fn test_established_wallet_is_clean() {
        let service = forensics();
        let merged = merged_wallet(500, 250_000.0, 400.0, 40);
        let context = TradeContext {
            trade_size_usd: 6_000.0,
            market_oi: 900_000.0,
        };
        let fingerprint = service.build_fingerprint(&merged, Some(20.0), &context);
        assert_eq!(fingerprint.total_flags_set(), 0);
        assert!(!fingerprint.is_suspicious);
    }

    #[test]
    fn test_high_concentration_flag() {
        let service = forensics();
        let merged = merged_wallet(50, 100_000.0, 200.0, 10);
        let context = TradeContext {
            trade_size_usd: 1_000.0,
            market_oi: 1_000_000.0,
        };
        let fingerprint = service.build_fingerprint(&merged, Some(85.0), &context);
        assert!(fingerprint.subgraph.high_concentration);
        assert!(!fingerprint.is_suspicious); // only one flag
    }

    #[test]
    fn test_fresh_fat_bet_context_recomputation() {
        let service = forensics();
        assert!(service.is_fresh_fat_bet(
            1,
            &TradeContext {
                trade_size_usd: 25_000.0,
                market_oi: 100_000.0
            }
        ));
        // big market disables the prior
        assert!(!service.is_fresh_fat_bet(
            1,
            &TradeContext {
                trade_size_usd: 25_000.0,
                market_oi: 900_000.0
            }
        ));
        // experienced wallet disables it
        assert!(!service.is_fresh_fat_bet(
            10,
            &TradeContext {
                trade_size_usd: 25_000.0,
                market_oi: 100_000.0
            }
        ));
    }
}
