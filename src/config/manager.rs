/// Shared configuration handle with atomic reload

use std::sync::{Arc, RwLock};
use tracing::info;

use super::Config;

/// Hands out configuration snapshots to services and swaps in a fresh
/// environment read on reload. Readers never observe a partial update.
#[derive(Clone)]
pub struct ConfigManager {
    current: Arc<RwLock<Config>>,
}

impl ConfigManager {
    pub fn from_env() -> Self {
        Self {
            current: Arc::new(RwLock::new(Config::from_env())),
        }
    }

    #[cfg(test)]
    pub fn from_config(config: Config) -> Self {
        Self {
            current: Arc::new(RwLock::new(config)),
        }
    }

    /// Snapshot of the current configuration
    pub fn get(&self) -> Config {
        self.current.read().unwrap().clone()
    }

    /// Re-read the environment and swap the snapshot atomically
    pub fn reload(&self) {
        let fresh = Config::from_env();
        *self.current.write().unwrap() = fresh;
        info!("🔄 Configuration reloaded from environment");
    }
}
