/// Monitored market registry
///
/// Process-wide map of market id to metadata, refreshed from the
/// durable store. Readers never block each other; reloads swap the
/// whole map atomically.

pub mod gamma;

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::info;

use crate::types::Market;

pub use gamma::{GammaClient, GammaEvent, GammaMarket};

pub struct MarketRegistry {
    markets: RwLock<HashMap<String, Market>>,
}

impl MarketRegistry {
    pub fn new() -> Self {
        Self {
            markets: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_markets(markets: Vec<Market>) -> Self {
        let registry = Self::new();
        registry.reload(markets);
        registry
    }

    pub fn get(&self, market_id: &str) -> Option<Market> {
        self.markets.read().unwrap().get(market_id).cloned()
    }

    /// Swap in a fresh snapshot of monitored markets
    pub fn reload(&self, markets: Vec<Market>) {
        let fresh: HashMap<String, Market> = markets
            .into_iter()
            .map(|market| (market.id.clone(), market))
            .collect();
        let count = fresh.len();
        *self.markets.write().unwrap() = fresh;
        info!(markets = count, "📊 Market registry reloaded");
    }

    /// Lookup by on-chain condition id (the trade feed's market key)
    pub fn find_by_condition_id(&self, condition_id: &str) -> Option<Market> {
        self.markets
            .read()
            .unwrap()
            .values()
            .find(|market| market.condition_id == condition_id)
            .cloned()
    }

    /// Condition ids of every market the detector will analyze,
    /// used by the ingest feed's market filter
    pub fn monitorable_condition_ids(&self) -> Vec<String> {
        self.markets
            .read()
            .unwrap()
            .values()
            .filter(|market| market.is_monitorable())
            .map(|market| market.condition_id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.markets.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.read().unwrap().is_empty()
    }
}

impl Default for MarketRegistry {
    fn default() -> Self {
        Self::new()
    }
}
