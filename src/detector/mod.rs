/// Trade-level signal gate
///
/// Decides per trade whether it is worth running wallet forensics.
/// Uninteresting trades are dropped silently with a reason counter;
/// the gate never fails a trade onward.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::config::ConfigManager;
use crate::markets::{GammaClient, MarketRegistry};
use crate::types::{Trade, TradeSignal};
use crate::util::SharedCache;

const STAT_TRADES_ANALYZED: &str = "stats:trades:analyzed";

/// Why a trade was dropped at the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    UnknownMarket,
    FilteredMarketAwareMinimum,
    FilteredImpact,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::UnknownMarket => "unknown_market",
            DropReason::FilteredMarketAwareMinimum => "filtered_market_aware_minimum",
            DropReason::FilteredImpact => "filtered_impact",
        }
    }
}

pub struct SignalDetector {
    registry: Arc<MarketRegistry>,
    market_data: Arc<GammaClient>,
    config: ConfigManager,
    cache: Arc<SharedCache>,
}

impl SignalDetector {
    pub fn new(
        registry: Arc<MarketRegistry>,
        market_data: Arc<GammaClient>,
        config: ConfigManager,
        cache: Arc<SharedCache>,
    ) -> Self {
        Self {
            registry,
            market_data,
            config,
            cache,
        }
    }

    /// Gate a trade; None means "not worth analyzing"
    #[instrument(skip(self, trade), fields(trade_id = %trade.id, market = %trade.market_id))]
    pub async fn analyze(&self, trade: &Trade) -> Option<TradeSignal> {
        match self.evaluate(trade).await {
            Ok(signal) => Some(signal),
            Err(reason) => {
                debug!(reason = reason.as_str(), "trade dropped at gate");
                self.cache.incr(&format!("stats:drops:{}", reason.as_str()));
                None
            }
        }
    }

    /// Gate with the concrete drop reason, for callers that track them
    pub async fn evaluate(&self, trade: &Trade) -> Result<TradeSignal, DropReason> {
        let detection = self.config.get().detection;

        let market = self
            .registry
            .get(&trade.market_id)
            .filter(|market| market.is_monitorable())
            .ok_or(DropReason::UnknownMarket)?;

        let trade_usd_value = trade.usd_value();

        // Live liquidity with stored open interest as the fallback
        let available_liquidity = match self
            .market_data
            .get_live_liquidity(&market.slug, &market.condition_id)
            .await
        {
            Ok(Some(liquidity)) if liquidity > 0.0 => liquidity,
            _ => market.open_interest,
        };

        // Gate 1: market-aware minimum. The relative term keeps
        // thin-book markets honest without silencing dominant trades
        // in small markets.
        let min_threshold = detection
            .absolute_min_usd
            .min(detection.relative_liquidity_factor * available_liquidity);
        if trade_usd_value < min_threshold {
            return Err(DropReason::FilteredMarketAwareMinimum);
        }

        // Gate 2: impact thresholds
        let oi_percentage = if market.open_interest > 0.0 {
            100.0 * trade_usd_value / market.open_interest
        } else {
            0.0
        };
        let price_impact = estimate_price_impact(trade_usd_value, available_liquidity);

        if oi_percentage < detection.min_oi_percentage && price_impact < detection.min_price_impact
        {
            return Err(DropReason::FilteredImpact);
        }

        self.cache.incr(STAT_TRADES_ANALYZED);
        debug!(
            usd = trade_usd_value,
            oi_pct = oi_percentage,
            impact_pct = price_impact,
            "trade passed signal gate"
        );

        Ok(TradeSignal {
            market_id: market.id,
            trade_usd_value,
            oi_percentage,
            price_impact,
            open_interest: market.open_interest,
        })
    }
}

/// Price impact estimated from trade size against available liquidity,
/// as a percentage capped at 100. Chosen over pre/post order-book
/// diffing: the feed delivers trades without book snapshots.
pub fn estimate_price_impact(trade_usd_value: f64, available_liquidity: f64) -> f64 {
    if available_liquidity <= 0.0 {
        return 0.0;
    }
    (100.0 * trade_usd_value / available_liquidity).min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::types::{Market, MarketCategory, MarketTier, TradeSide};

    fn market(id: &str, open_interest: f64) -> Market {
        Market {
            id: id.to_string(),
            condition_id: format!("0xcond-{}", id),
            question: "?".to_string(),
            slug: format!("slug-{}", id),
            tier: MarketTier::Tier1,
            category: MarketCategory::Politics,
            open_interest,
            volume: 0.0,
            enabled: true,
            active: true,
            closed: false,
        }
    }

    fn trade(market_id: &str, size: f64, price: f64) -> Trade {
        Trade {
            id: "t1".to_string(),
            market_id: market_id.to_string(),
            side: TradeSide::Buy,
            size,
            price,
            outcome: "Yes".to_string(),
            maker: "0".repeat(40),
            taker: "b".repeat(40),
            timestamp_ms: 1_714_000_000_000,
        }
    }

    fn detector_with(markets: Vec<Market>) -> SignalDetector {
        let config = ConfigManager::from_config(Config::from_env());
        let sources = config.get().sources;
        SignalDetector::new(
            Arc::new(MarketRegistry::with_markets(markets)),
            // Unroutable host: the live lookup fails fast in tests and the
            // detector falls back to stored open interest.
            Arc::new(GammaClient::new(&crate::config::Sources {
                market_metadata_base_url: "http://127.0.0.1:9".to_string(),
                http_timeout_secs: 1,
                ..sources
            })),
            config,
            Arc::new(SharedCache::new()),
        )
    }

    #[tokio::test]
    async fn test_unknown_market_dropped() {
        let detector = detector_with(vec![]);
        let result = detector.evaluate(&trade("missing", 1000.0, 0.5)).await;
        assert_eq!(result.unwrap_err(), DropReason::UnknownMarket);
    }

    #[tokio::test]
    async fn test_closed_market_dropped() {
        let mut m = market("m1", 100_000.0);
        m.closed = true;
        let detector = detector_with(vec![m]);
        let result = detector.evaluate(&trade("m1", 100_000.0, 0.5)).await;
        assert_eq!(result.unwrap_err(), DropReason::UnknownMarket);
    }

    #[tokio::test]
    async fn test_thin_market_lottery_ticket_dropped() {
        // OI 3000: minThreshold = min(5000, 0.5*3000) = 1500; 900 < 1500
        let detector = detector_with(vec![market("m1", 3_000.0)]);
        let result = detector.evaluate(&trade("m1", 3_000.0, 0.3)).await;
        assert_eq!(result.unwrap_err(), DropReason::FilteredMarketAwareMinimum);
    }

    #[tokio::test]
    async fn test_dominant_trade_in_small_market_passes() {
        // 2000 USD in a 3000 OI market clears the 1500 relative
        // minimum and 66% of OI clears the impact gate
        let detector = detector_with(vec![market("m1", 3_000.0)]);
        let signal = detector.evaluate(&trade("m1", 4_000.0, 0.5)).await.unwrap();
        assert!(signal.oi_percentage > 20.0);
        assert!(signal.trade_usd_value >= 1_500.0);
    }

    #[tokio::test]
    async fn test_large_but_low_impact_trade_dropped() {
        // 6000 USD clears the absolute minimum but is 0.6% of a 1M
        // OI market with matching liquidity
        let detector = detector_with(vec![market("m1", 1_000_000.0)]);
        let result = detector.evaluate(&trade("m1", 12_000.0, 0.5)).await;
        assert_eq!(result.unwrap_err(), DropReason::FilteredImpact);
    }

    #[tokio::test]
    async fn test_strong_insider_trade_emits_signal() {
        // OI 200k, trade 40000 * 0.03 ... sized to 40k USD: 20% of OI
        let detector = detector_with(vec![market("m1", 200_000.0)]);
        let signal = detector
            .evaluate(&trade("m1", 1_333_333.0, 0.03))
            .await
            .unwrap();
        assert!((signal.oi_percentage - 20.0).abs() < 0.1);
        assert!(signal.price_impact >= 20.0);
        assert_eq!(signal.open_interest, 200_000.0);
    }

    #[tokio::test]
    async fn test_gate_coherence_boundary() {
        // exactly at the absolute minimum with oi% at threshold
        let detector = detector_with(vec![market("m1", 25_000.0)]);
        let signal = detector.evaluate(&trade("m1", 10_000.0, 0.5)).await.unwrap();
        assert!((signal.trade_usd_value - 5_000.0).abs() < 1e-9);
        assert!((signal.oi_percentage - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_price_impact_estimator() {
        assert_eq!(estimate_price_impact(0.0, 10_000.0), 0.0);
        assert_eq!(estimate_price_impact(1_000.0, 0.0), 0.0);
        assert_eq!(estimate_price_impact(2_000.0, 10_000.0), 20.0);
        assert_eq!(estimate_price_impact(50_000.0, 10_000.0), 100.0); // capped
    }
}
