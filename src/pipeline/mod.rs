/// Detection pipeline orchestrator
///
/// A bounded worker pool consumes trades from the input channel and
/// runs each one end-to-end: gate -> forensics -> scorer ->
/// persistence. A failure in any stage is caught at the trade
/// boundary; one bad trade never takes down a worker or touches its
/// neighbors.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::alerts::{AlertPersistence, PersistOutcome};
use crate::config::ConfigManager;
use crate::database::TradeStore;
use crate::detector::SignalDetector;
use crate::forensics::{TradeContext, WalletForensics};
use crate::scoring::AlertScorer;
use crate::types::{normalize_wallet_address, Alert, Trade};
use crate::util::SharedCache;

const STAT_TRADES_RECEIVED: &str = "stats:trades:received";
const STAT_ALERTS_PERSISTED: &str = "stats:alerts:persisted";
const STAT_ALERTS_SUPPRESSED: &str = "stats:alerts:suppressed";
const STAT_TRADE_ERRORS: &str = "stats:trades:errors";

/// Terminal state of one trade's trip through the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeOutcome {
    /// Gate rejected, invalid address, or below score threshold
    Dropped,
    /// Scored below the alert threshold; logged, not persisted
    LogOnly,
    Persisted(String),
    DedupSuppressed,
}

/// Explicitly-wired stage handles the orchestrator owns
pub struct PipelineServices {
    pub detector: Arc<SignalDetector>,
    pub forensics: Arc<WalletForensics>,
    pub scorer: Arc<AlertScorer>,
    pub persistence: Arc<AlertPersistence>,
    pub trades: Arc<TradeStore>,
    pub cache: Arc<SharedCache>,
    pub config: ConfigManager,
}

pub struct DetectionPipeline {
    services: Arc<PipelineServices>,
    tx: mpsc::Sender<Trade>,
    rx: Arc<Mutex<mpsc::Receiver<Trade>>>,
    workers: usize,
}

impl DetectionPipeline {
    pub fn new(services: PipelineServices, workers: usize, queue_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity);
        Self {
            services: Arc::new(services),
            tx,
            rx: Arc::new(Mutex::new(rx)),
            workers: workers.max(1),
        }
    }

    /// Producer handle for the ingest feed; channel capacity is the
    /// back-pressure bound
    pub fn input(&self) -> mpsc::Sender<Trade> {
        self.tx.clone()
    }

    /// Spawn the worker pool. Workers exit when every input handle is
    /// dropped and the queue drains.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        info!(workers = self.workers, "⚙️  Detection pipeline starting");
        (0..self.workers)
            .map(|worker_id| {
                let services = self.services.clone();
                let rx = self.rx.clone();
                tokio::spawn(async move {
                    Self::worker_loop(worker_id, services, rx).await;
                })
            })
            .collect()
    }

    async fn worker_loop(
        worker_id: usize,
        services: Arc<PipelineServices>,
        rx: Arc<Mutex<mpsc::Receiver<Trade>>>,
    ) {
        debug!(worker_id, "pipeline worker online");
        loop {
            // One trade per worker end-to-end; the shared receiver is
            // only held long enough to dequeue.
            let trade = { rx.lock().await.recv().await };
            let Some(trade) = trade else {
                debug!(worker_id, "input channel closed, worker stopping");
                break;
            };

            let trade_id = trade.id.clone();
            match Self::process_trade(&services, trade).await {
                Ok(outcome) => {
                    debug!(worker_id, trade_id = %trade_id, ?outcome, "trade processed");
                }
                Err(err) => {
                    services.cache.incr(STAT_TRADE_ERRORS);
                    error!(worker_id, trade_id = %trade_id, error = %err, "trade processing failed");
                }
            }
        }
    }

    /// One trade end-to-end. Errors returned here are caught at the
    /// worker's trade boundary.
    pub async fn process_trade(
        services: &PipelineServices,
        mut trade: Trade,
    ) -> Result<TradeOutcome> {
        services.cache.incr(STAT_TRADES_RECEIVED);

        let Some(taker) = normalize_wallet_address(&trade.taker) else {
            warn!(trade_id = %trade.id, taker = %trade.taker, "invalid taker address, dropping");
            return Ok(TradeOutcome::Dropped);
        };
        trade.taker = taker;

        if let Err(err) = services.trades.record(&trade).await {
            warn!(trade_id = %trade.id, error = %err, "trade snapshot write failed");
        }

        let Some(signal) = services.detector.analyze(&trade).await else {
            return Ok(TradeOutcome::Dropped);
        };

        let context = TradeContext {
            trade_size_usd: signal.trade_usd_value,
            market_oi: signal.open_interest,
        };
        let fingerprint = services
            .forensics
            .analyze(&trade.taker, &context)
            .await
            .context("wallet forensics failed")?;

        let score = services.scorer.score(&fingerprint, &signal);

        let detection = services.config.get().detection;
        if score.total_score < detection.min_wallet_score {
            info!(
                trade_id = %trade.id,
                score = score.total_score,
                classification = score.classification.as_str(),
                "below alert threshold, log only"
            );
            return Ok(TradeOutcome::LogOnly);
        }
        if fingerprint.data_confidence.score < detection.min_confidence_score {
            warn!(
                trade_id = %trade.id,
                confidence = fingerprint.data_confidence.score,
                "alerting on low-confidence wallet data"
            );
        }

        let alert = Alert::new(trade, signal, fingerprint, score);
        match services.persistence.persist(alert).await? {
            PersistOutcome::Persisted(alert_id) => {
                services.cache.incr(STAT_ALERTS_PERSISTED);
                Ok(TradeOutcome::Persisted(alert_id))
            }
            PersistOutcome::DedupSuppressed => {
                services.cache.incr(STAT_ALERTS_SUPPRESSED);
                Ok(TradeOutcome::DedupSuppressed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Sources};
    use crate::database::{AlertStore, Database};
    use crate::datasources::{IndexerClient, PlatformClient};
    use crate::markets::{GammaClient, MarketRegistry};
    use crate::transport::{AlertNotifier, NotificationOutcome};
    use crate::types::{Market, MarketCategory, MarketTier, TradeSide};
    use crate::util::CircuitBreaker;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Canned-response HTTP stub for the data-source endpoints.
    /// GET routes match on path prefix; every POST is the GraphQL
    /// endpoint.
    struct StubUpstream {
        addr: std::net::SocketAddr,
        _task: JoinHandle<()>,
    }

    impl StubUpstream {
        async fn spawn(
            activity_json: String,
            graphql_json: String,
            graphql_status: u16,
        ) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let task = tokio::spawn(async move {
                loop {
                    let Ok((socket, _)) = listener.accept().await else {
                        break;
                    };
                    let activity = activity_json.clone();
                    let graphql = graphql_json.clone();
                    tokio::spawn(async move {
                        Self::handle(socket, activity, graphql, graphql_status).await;
                    });
                }
            });
            Self { addr, _task: task }
        }

        async fn handle(
            mut socket: tokio::net::TcpStream,
            activity_json: String,
            graphql_json: String,
            graphql_status: u16,
        ) {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            // read until the header block is complete
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
            }
            let request = String::from_utf8_lossy(&buf);
            let first_line = request.lines().next().unwrap_or_default();
            let mut parts = first_line.split_whitespace();
            let method = parts.next().unwrap_or_default();
            let path = parts.next().unwrap_or_default();

            let (status, body) = if method == "POST" {
                (graphql_status, graphql_json)
            } else if path.starts_with("/activity") {
                (200, activity_json)
            } else {
                // trades / positions / closed-positions
                (200, "[]".to_string())
            };

            let response = format!(
                "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    }

    struct AlwaysOkNotifier;

    #[async_trait]
    impl AlertNotifier for AlwaysOkNotifier {
        async fn send(&self, _alert: &Alert) -> NotificationOutcome {
            NotificationOutcome::single("test", true)
        }
    }

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

    fn trade(id: &str, market_id: &str, wallet: &str, size: f64, price: f64) -> Trade {
        Trade {
            id: id.to_string(),
            market_id: market_id.to_string(),
            side: TradeSide::Buy,
            size,
            price,
            outcome: "Yes".to_string(),
            maker: "0".repeat(40),
            taker: wallet.to_string(),
            timestamp_ms: Utc::now().timestamp_millis(),
        }
    }

    async fn build_services(
        sources: Sources,
        markets: Vec<Market>,
    ) -> (PipelineServices, Arc<AlertStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}/pipeline.db", dir.path().display());
        let db = Arc::new(Database::new(&url).await.unwrap());

        let config = ConfigManager::from_config(Config::from_env());
        let cache = Arc::new(SharedCache::new());
        let registry = Arc::new(MarketRegistry::with_markets(markets));

        // Fresh breakers per test so state never leaks between runs
        let platform_breaker = Arc::new(CircuitBreaker::with_defaults("platform-test"));
        let indexer_breaker = Arc::new(CircuitBreaker::with_defaults("indexer-test"));

        let platform = Arc::new(PlatformClient::new(&sources, platform_breaker));
        let indexer = Arc::new(IndexerClient::new(&sources, indexer_breaker));
        let forensics = Arc::new(WalletForensics::new(
            platform,
            indexer,
            cache.clone(),
            config.get().wallet_thresholds,
        ));

        let detector = Arc::new(SignalDetector::new(
            registry,
            Arc::new(GammaClient::new(&sources)),
            config.clone(),
            cache.clone(),
        ));

        let store = Arc::new(AlertStore::new(db.clone()));
        let persistence = Arc::new(AlertPersistence::new(
            store.clone(),
            cache.clone(),
            Arc::new(AlwaysOkNotifier),
        ));

        let services = PipelineServices {
            detector,
            forensics,
            scorer: Arc::new(AlertScorer::new()),
            persistence,
            trades: Arc::new(TradeStore::new(db)),
            cache,
            config,
        };
        (services, store, dir)
    }

    fn stub_sources(stub_addr: std::net::SocketAddr) -> Sources {
        let base = format!("http://{}", stub_addr);
        Sources {
            platform_base_url: base.clone(),
            indexer_url: format!("{}/graphql", base),
            // unroutable: liquidity lookups fall back to stored OI
            market_metadata_base_url: "http://127.0.0.1:9".to_string(),
            http_timeout_secs: 2,
            indexer_rate_limit_rps: 100.0,
            platform_rate_limit_rps: 100.0,
            platform_batch_size: 20,
            platform_batch_concurrency: 5,
            platform_batch_timeout_secs: 2,
        }
    }

    fn fresh_wallet_activity_json() -> String {
        let now_ms = Utc::now().timestamp_millis();
        format!(
            r#"{{"tradeCount": 1, "volumeUSD": 0, "firstTradeTimestamp": {}, "lastTradeTimestamp": {}, "marketsTraded": 1}}"#,
            now_ms - 7 * 86_400_000,
            now_ms
        )
    }

    #[tokio::test]
    async fn test_fresh_fat_bet_end_to_end_persists_alert() {
        // indexer answers with GraphQL errors so the platform record
        // carries the fingerprint alone
        let stub = StubUpstream::spawn(
            fresh_wallet_activity_json(),
            r#"{"data": null, "errors": [{"message": "indexing error"}]}"#.to_string(),
            200,
        )
        .await;

        // 40k USD into a 50k OI market: oi% 80, impact 80
        let (services, store, _dir) =
            build_services(stub_sources(stub.addr), vec![market("m1", 50_000.0)]).await;
        let wallet = "f".repeat(40);

        let outcome = DetectionPipeline::process_trade(
            &services,
            trade("t1", "m1", &wallet, 1_333_333.0, 0.03),
        )
        .await
        .unwrap();

        assert!(matches!(outcome, TradeOutcome::Persisted(_)));
        assert_eq!(store.count_all().await.unwrap(), 1);
        let rows = store.list_recent(10).await.unwrap();
        assert_eq!(rows[0].wallet_address, wallet);
        assert!(rows[0].total_score >= 70.0);

        // same wallet+market inside the window: suppressed
        let outcome = DetectionPipeline::process_trade(
            &services,
            trade("t2", "m1", &wallet, 1_333_333.0, 0.03),
        )
        .await
        .unwrap();
        assert_eq!(outcome, TradeOutcome::DedupSuppressed);
        assert_eq!(store.count_all().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_indexer_down_still_completes() {
        let stub = StubUpstream::spawn(
            fresh_wallet_activity_json(),
            r#"{"error": "upstream down"}"#.to_string(),
            500,
        )
        .await;

        let (services, _store, _dir) =
            build_services(stub_sources(stub.addr), vec![market("m1", 50_000.0)]).await;

        let outcome = DetectionPipeline::process_trade(
            &services,
            trade("t1", "m1", &"e".repeat(40), 1_333_333.0, 0.03),
        )
        .await
        .unwrap();
        // platform data alone still yields a fingerprint and a decision
        assert!(matches!(
            outcome,
            TradeOutcome::Persisted(_) | TradeOutcome::LogOnly
        ));
    }

    #[tokio::test]
    async fn test_uninteresting_trade_dropped_before_forensics() {
        // no stub needed: the gate rejects before any wallet lookup
        let (services, store, _dir) = build_services(
            stub_sources("127.0.0.1:9".parse().unwrap()),
            vec![market("m1", 3_000.0)],
        )
        .await;

        let outcome = DetectionPipeline::process_trade(
            &services,
            trade("t1", "m1", &"a".repeat(40), 3_000.0, 0.3),
        )
        .await
        .unwrap();
        assert_eq!(outcome, TradeOutcome::Dropped);
        assert_eq!(store.count_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_taker_address_dropped() {
        let (services, _store, _dir) = build_services(
            stub_sources("127.0.0.1:9".parse().unwrap()),
            vec![market("m1", 50_000.0)],
        )
        .await;

        let outcome = DetectionPipeline::process_trade(
            &services,
            trade("t1", "m1", "not-a-wallet", 1_000_000.0, 0.03),
        )
        .await
        .unwrap();
        assert_eq!(outcome, TradeOutcome::Dropped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_worker_pool_isolates_failures() {
        // both sources unreachable: forensics errors for analyzable
        // trades, but workers keep draining the queue
        let (services, store, _dir) = build_services(
            stub_sources("127.0.0.1:9".parse().unwrap()),
            vec![market("m1", 50_000.0)],
        )
        .await;

        let pipeline = DetectionPipeline::new(services, 4, 16);
        let input = pipeline.input();
        let handles = pipeline.start();
        drop(pipeline);

        for i in 0..8 {
            let t = if i % 2 == 0 {
                // fails inside forensics
                trade(&format!("t{}", i), "m1", &"a".repeat(40), 1_333_333.0, 0.03)
            } else {
                // dropped at the gate
                trade(&format!("t{}", i), "m1", &"b".repeat(40), 100.0, 0.3)
            };
            input.send(t).await.unwrap();
        }
        drop(input);

        for handle in handles {
            tokio::time::timeout(Duration::from_secs(30), handle)
                .await
                .expect("worker hung")
                .unwrap();
        }
        // nothing persisted, nothing crashed
        assert_eq!(store.count_all().await.unwrap(), 0);
    }
}
