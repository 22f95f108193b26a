/// Data retention sweeper
///
/// Periodically prunes trade snapshots past the retention window.
/// Alerts are kept: they are the audit trail reviewers work from.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info, instrument};

use super::{DatabaseError, TradeStore};

const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

pub struct RetentionSweeper {
    trades: Arc<TradeStore>,
    retention_days: u32,
}

impl RetentionSweeper {
    pub fn new(trades: Arc<TradeStore>, retention_days: u32) -> Self {
        Self {
            trades,
            retention_days,
        }
    }

    /// Run the hourly sweep loop until the task is aborted
    #[instrument(skip(self))]
    pub async fn run(self) -> Result<(), DatabaseError> {
        info!(
            retention_days = self.retention_days,
            "🧹 Retention sweeper starting"
        );
        let mut timer = interval(SWEEP_INTERVAL);
        loop {
            timer.tick().await;
            if let Err(err) = self.sweep_once().await {
                error!(error = %err, "retention sweep failed");
            }
        }
    }

    pub async fn sweep_once(&self) -> Result<u64, DatabaseError> {
        let cutoff_ms =
            Utc::now().timestamp_millis() - self.retention_days as i64 * 24 * 3600 * 1000;
        let pruned = self.trades.prune_older_than(cutoff_ms).await?;
        if pruned > 0 {
            info!(pruned, retention_days = self.retention_days, "trade snapshots pruned");
        }
        Ok(pruned)
    }
}
