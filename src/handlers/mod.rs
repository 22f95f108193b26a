/// System orchestrator
///
/// Wires the explicitly-dependency-injected services together and
/// manages their lifecycle: durable store, market registry, data-source
/// clients, detection pipeline, trade ingester, retention sweeper and
/// the alert bus.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::alerts::AlertPersistence;
use crate::config::ConfigManager;
use crate::database::{AlertStore, Database, MarketStore, RetentionSweeper, TradeStore};
use crate::datasources::{IndexerClient, PlatformClient};
use crate::detector::SignalDetector;
use crate::forensics::WalletForensics;
use crate::ingest::TradeIngester;
use crate::markets::{GammaClient, MarketRegistry};
use crate::pipeline::{DetectionPipeline, PipelineServices};
use crate::scoring::AlertScorer;
use crate::transport::{AlertBus, BusNotifier};
use crate::util::{BreakerRegistry, SharedCache};

const REGISTRY_REFRESH_INTERVAL: Duration = Duration::from_secs(300);
const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct SystemOrchestrator {
    config: ConfigManager,
    cache: Arc<SharedCache>,
    bus: AlertBus,
    registry: Arc<MarketRegistry>,
    market_store: Arc<MarketStore>,
    alert_store: Arc<AlertStore>,
    platform: Arc<PlatformClient>,
    pipeline: DetectionPipeline,
    sweeper: Option<RetentionSweeper>,
    tasks: Vec<JoinHandle<()>>,
}

impl SystemOrchestrator {
    /// Initialize every component; nothing runs until `start`
    pub async fn init() -> Result<Self> {
        info!("🚀 Initializing insider detection system");

        let config = ConfigManager::from_env();
        let snapshot = config.get();

        let db = Arc::new(
            Database::new(&snapshot.storage.database_url)
                .await
                .context("database initialization failed")?,
        );
        let market_store = Arc::new(MarketStore::new(db.clone()));
        let trade_store = Arc::new(TradeStore::new(db.clone()));
        let alert_store = Arc::new(AlertStore::new(db.clone()));

        let markets = market_store
            .load_enabled()
            .await
            .context("market registry load failed")?;
        if markets.is_empty() {
            warn!("no enabled markets in the store; the detector will drop every trade");
        }
        let registry = Arc::new(MarketRegistry::with_markets(markets));

        let cache = Arc::new(SharedCache::new());
        let breakers = BreakerRegistry::global();

        let platform = Arc::new(PlatformClient::new(
            &snapshot.sources,
            breakers.get("platform"),
        ));
        let indexer = Arc::new(IndexerClient::new(
            &snapshot.sources,
            breakers.get("indexer"),
        ));

        let forensics = Arc::new(WalletForensics::new(
            platform.clone(),
            indexer,
            cache.clone(),
            snapshot.wallet_thresholds.clone(),
        ));
        let detector = Arc::new(SignalDetector::new(
            registry.clone(),
            Arc::new(GammaClient::new(&snapshot.sources)),
            config.clone(),
            cache.clone(),
        ));

        let bus = AlertBus::new();
        let persistence = Arc::new(AlertPersistence::new(
            alert_store.clone(),
            cache.clone(),
            Arc::new(BusNotifier::new(bus.clone())),
        ));

        let pipeline = DetectionPipeline::new(
            PipelineServices {
                detector,
                forensics,
                scorer: Arc::new(AlertScorer::new()),
                persistence,
                trades: trade_store.clone(),
                cache: cache.clone(),
                config: config.clone(),
            },
            snapshot.pipeline.workers,
            snapshot.pipeline.queue_capacity,
        );

        let sweeper = RetentionSweeper::new(trade_store, snapshot.storage.trade_retention_days);

        info!("✅ All system components initialized");
        Ok(Self {
            config,
            cache,
            bus,
            registry,
            market_store,
            alert_store,
            platform,
            pipeline,
            sweeper: Some(sweeper),
            tasks: Vec::new(),
        })
    }

    /// Spawn the worker pool and every background service
    pub async fn start(&mut self) -> Result<()> {
        info!("🔄 Starting services");

        // Log-channel subscriber keeps the bus drained even with no
        // chat transports attached
        let mut alert_rx = self.bus.subscribe();
        self.tasks.push(tokio::spawn(async move {
            loop {
                match alert_rx.recv().await {
                    Ok(alert) => info!(
                        alert_id = %alert.id,
                        wallet = %alert.trade.taker,
                        market = %alert.trade.market_id,
                        score = alert.score.total_score,
                        classification = alert.score.classification.as_str(),
                        usd = alert.signal.trade_usd_value,
                        "📣 Insider alert"
                    ),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "alert log subscriber lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }));

        self.tasks.extend(self.pipeline.start());

        let snapshot = self.config.get();
        let ingester = TradeIngester::new(
            self.platform.clone(),
            self.registry.clone(),
            self.pipeline.input(),
            snapshot.pipeline.poll_interval_ms,
            snapshot.pipeline.ingest_min_usd,
        );
        self.tasks.push(tokio::spawn(ingester.run()));

        if let Some(sweeper) = self.sweeper.take() {
            self.tasks.push(tokio::spawn(async move {
                if let Err(err) = sweeper.run().await {
                    error!(error = %err, "retention sweeper stopped");
                }
            }));
        }

        // Periodic market registry refresh + config re-read
        {
            let registry = self.registry.clone();
            let store = self.market_store.clone();
            let config = self.config.clone();
            self.tasks.push(tokio::spawn(async move {
                let mut timer = tokio::time::interval(REGISTRY_REFRESH_INTERVAL);
                timer.tick().await; // skip the immediate tick
                loop {
                    timer.tick().await;
                    config.reload();
                    match store.load_enabled().await {
                        Ok(markets) => registry.reload(markets),
                        Err(err) => error!(error = %err, "market registry refresh failed"),
                    }
                }
            }));
        }

        // Expired cache entry sweep
        {
            let cache = self.cache.clone();
            self.tasks.push(tokio::spawn(async move {
                let mut timer = tokio::time::interval(CACHE_SWEEP_INTERVAL);
                loop {
                    timer.tick().await;
                    cache.sweep();
                }
            }));
        }

        info!("✅ All services started");
        Ok(())
    }

    /// Human-readable status summary for the periodic report; the
    /// same snapshot lands under `health:current` for collaborators
    pub async fn get_status(&self) -> String {
        let alert_count = self.alert_store.count_all().await.unwrap_or(-1);
        let snapshot = serde_json::json!({
            "markets": self.registry.len(),
            "trades_received": self.cache.counter("stats:trades:received"),
            "trades_analyzed": self.cache.counter("stats:trades:analyzed"),
            "wallets_fingerprinted": self.cache.counter("stats:wallet:total"),
            "wallet_errors": self.cache.counter("stats:wallet:errors"),
            "alerts_persisted": self.cache.counter("stats:alerts:persisted"),
            "alerts_suppressed": self.cache.counter("stats:alerts:suppressed"),
            "trade_errors": self.cache.counter("stats:trades:errors"),
            "alert_rows": alert_count,
        });
        self.cache
            .set_json("health:current", &snapshot, Duration::from_secs(600));
        format!(
            "🕵️ Insider Detection Status:\n\
            📊 Markets monitored: {}\n\
            📥 Trades received: {}\n\
            🔬 Trades analyzed: {}\n\
            🔎 Wallets fingerprinted: {}\n\
            🚨 Alerts persisted: {} (lifetime rows: {})\n\
            🔇 Duplicates suppressed: {}\n\
            ⚠️  Trade errors: {}",
            self.registry.len(),
            self.cache.counter("stats:trades:received"),
            self.cache.counter("stats:trades:analyzed"),
            self.cache.counter("stats:wallet:total"),
            self.cache.counter("stats:alerts:persisted"),
            alert_count,
            self.cache.counter("stats:alerts:suppressed"),
            self.cache.counter("stats:trades:errors"),
        )
    }

    /// Stop every background task
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("🛑 Shutting down services");
        for task in self.tasks.drain(..) {
            task.abort();
        }
        Ok(())
    }
}
