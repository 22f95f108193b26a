/// Polling trade feed
///
/// Sweeps the market-filtered trades endpoint for every monitorable
/// market and pushes unseen trades into the pipeline channel. The
/// seen-id set bounds memory by shedding half its entries when full.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};

use crate::datasources::{PlatformClient, PlatformTrade};
use crate::markets::MarketRegistry;
use crate::types::{Trade, TradeSide};

const SEEN_CAP: usize = 10_000;
const FEED_LIMIT: usize = 100;

pub struct TradeIngester {
    platform: Arc<PlatformClient>,
    registry: Arc<MarketRegistry>,
    input: mpsc::Sender<Trade>,
    poll_interval: Duration,
    min_usd: f64,
    seen: Mutex<HashSet<String>>,
}

impl TradeIngester {
    pub fn new(
        platform: Arc<PlatformClient>,
        registry: Arc<MarketRegistry>,
        input: mpsc::Sender<Trade>,
        poll_interval_ms: u64,
        min_usd: f64,
    ) -> Self {
        Self {
            platform,
            registry,
            input,
            poll_interval: Duration::from_millis(poll_interval_ms),
            min_usd,
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Poll until the pipeline input closes
    #[instrument(skip(self))]
    pub async fn run(self) {
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            min_usd = self.min_usd,
            "📡 Trade ingester starting"
        );
        let mut timer = tokio::time::interval(self.poll_interval);
        loop {
            timer.tick().await;
            match self.poll_once().await {
                Ok(dispatched) if dispatched > 0 => {
                    debug!(dispatched, "trades dispatched to pipeline");
                }
                Ok(_) => {}
                Err(IngestError::PipelineClosed) => {
                    info!("pipeline input closed, ingester stopping");
                    return;
                }
                Err(err) => {
                    error!(error = %err, "trade poll failed");
                }
            }
        }
    }

    /// One sweep across every monitorable market
    pub async fn poll_once(&self) -> Result<usize, IngestError> {
        let condition_ids = self.registry.monitorable_condition_ids();
        if condition_ids.is_empty() {
            return Ok(0);
        }

        let raw = self
            .platform
            .get_recent_trades_for_markets(&condition_ids, FEED_LIMIT, Some(self.min_usd))
            .await
            .map_err(|e| IngestError::Feed(e.to_string()))?;

        self.dispatch(raw).await
    }

    /// Convert, dedup against the seen set and push downstream
    async fn dispatch(&self, raw: Vec<PlatformTrade>) -> Result<usize, IngestError> {
        let fresh: Vec<Trade> = {
            let mut seen = self.seen.lock().unwrap();
            if seen.len() > SEEN_CAP {
                let keep: HashSet<String> =
                    seen.iter().take(SEEN_CAP / 2).cloned().collect();
                *seen = keep;
            }
            raw.iter()
                .filter_map(|t| self.convert(t))
                .filter(|t| seen.insert(t.id.clone()))
                .collect()
        };

        let mut dispatched = 0;
        for trade in fresh {
            self.input
                .send(trade)
                .await
                .map_err(|_| IngestError::PipelineClosed)?;
            dispatched += 1;
        }
        Ok(dispatched)
    }

    /// Map a feed trade onto the internal model; trades for markets
    /// outside the registry are skipped
    fn convert(&self, raw: &PlatformTrade) -> Option<Trade> {
        let market = self.registry.find_by_condition_id(&raw.condition_id)?;

        let side = match raw.side.to_ascii_uppercase().as_str() {
            "BUY" => TradeSide::Buy,
            "SELL" => TradeSide::Sell,
            _ => return None,
        };

        let id = raw.transaction_hash.clone().unwrap_or_else(|| {
            format!("{}-{}-{}", raw.proxy_wallet, raw.condition_id, raw.timestamp)
        });

        Some(Trade {
            id,
            market_id: market.id,
            side,
            size: raw.size,
            price: raw.price,
            outcome: raw.outcome.clone().unwrap_or_else(|| raw.side.clone()),
            maker: raw.maker.clone().unwrap_or_else(|| "0".repeat(40)),
            taker: raw.proxy_wallet.clone(),
            timestamp_ms: raw.timestamp * 1000,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("trade feed error: {0}")]
    Feed(String),

    #[error("pipeline input channel closed")]
    PipelineClosed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::types::{Market, MarketCategory, MarketTier};
    use crate::util::CircuitBreaker;

    fn market(id: &str) -> Market {
        Market {
            id: id.to_string(),
            condition_id: format!("0xcond-{}", id),
            question: "?".to_string(),
            slug: format!("slug-{}", id),
            tier: MarketTier::Tier2,
            category: MarketCategory::Sports,
            open_interest: 10_000.0,
            volume: 0.0,
            enabled: true,
            active: true,
            closed: false,
        }
    }

    fn raw_trade(tx: Option<&str>, condition_id: &str, side: &str) -> PlatformTrade {
        PlatformTrade {
            transaction_hash: tx.map(str::to_string),
            condition_id: condition_id.to_string(),
            slug: None,
            title: None,
            side: side.to_string(),
            outcome: Some("Yes".to_string()),
            size: 100.0,
            price: 0.4,
            proxy_wallet: "a".repeat(40),
            maker: None,
            timestamp: 1_714_000_000,
        }
    }

    fn ingester(capacity: usize) -> (TradeIngester, mpsc::Receiver<Trade>) {
        let config = Config::from_env();
        let (tx, rx) = mpsc::channel(capacity);
        let ingester = TradeIngester::new(
            Arc::new(PlatformClient::new(
                &config.sources,
                Arc::new(CircuitBreaker::with_defaults("platform-ingest-test")),
            )),
            Arc::new(MarketRegistry::with_markets(vec![market("m1")])),
            tx,
            1000,
            1000.0,
        );
        (ingester, rx)
    }

    #[tokio::test]
    async fn test_convert_maps_known_market() {
        let (ingester, _rx) = ingester(4);
        let trade = ingester
            .convert(&raw_trade(Some("0xhash"), "0xcond-m1", "BUY"))
            .unwrap();
        assert_eq!(trade.id, "0xhash");
        assert_eq!(trade.market_id, "m1");
        assert_eq!(trade.side, TradeSide::Buy);
        assert_eq!(trade.timestamp_ms, 1_714_000_000_000);
        assert_eq!(trade.maker, "0".repeat(40));
    }

    #[tokio::test]
    async fn test_convert_skips_unknown_market_and_side() {
        let (ingester, _rx) = ingester(4);
        assert!(ingester
            .convert(&raw_trade(Some("0xhash"), "0xcond-unknown", "BUY"))
            .is_none());
        assert!(ingester
            .convert(&raw_trade(Some("0xhash"), "0xcond-m1", "MERGE"))
            .is_none());
    }

    #[tokio::test]
    async fn test_convert_synthesizes_id_without_hash() {
        let (ingester, _rx) = ingester(4);
        let trade = ingester
            .convert(&raw_trade(None, "0xcond-m1", "SELL"))
            .unwrap();
        assert!(trade.id.contains("0xcond-m1"));
    }

    #[tokio::test]
    async fn test_dispatch_dedups_seen_trades() {
        let (ingester, mut rx) = ingester(8);
        let batch = vec![
            raw_trade(Some("0x1"), "0xcond-m1", "BUY"),
            raw_trade(Some("0x1"), "0xcond-m1", "BUY"),
            raw_trade(Some("0x2"), "0xcond-m1", "SELL"),
        ];
        let dispatched = ingester.dispatch(batch).await.unwrap();
        assert_eq!(dispatched, 2);

        // replaying the same hashes dispatches nothing
        let replay = vec![raw_trade(Some("0x1"), "0xcond-m1", "BUY")];
        assert_eq!(ingester.dispatch(replay).await.unwrap(), 0);

        assert_eq!(rx.recv().await.unwrap().id, "0x1");
        assert_eq!(rx.recv().await.unwrap().id, "0x2");
    }

    #[tokio::test]
    async fn test_dispatch_reports_closed_pipeline() {
        let (ingester, rx) = ingester(1);
        drop(rx);
        let result = ingester
            .dispatch(vec![raw_trade(Some("0x1"), "0xcond-m1", "BUY")])
            .await;
        assert!(matches!(result, Err(IngestError::PipelineClosed)));
    }
}
