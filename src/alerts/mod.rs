/// Alert persistence with concurrency-safe deduplication
///
/// Protocol per candidate alert:
///   1. take the `alert:lock:{wallet}:{market}` key (create-if-absent,
///      30 s TTL); a held lock means a sibling worker owns this alert
///   2. an unreachable lock store degrades to the DB checks alone
///   3. check the 2-hour window for an existing non-dismissed alert
///   4. transactional insert (UNIQUE trade_id is the final net)
///   5. notify outside the transaction; delivery failures never roll
///      back the write

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use crate::database::{AlertStore, DatabaseError};
use crate::transport::AlertNotifier;
use crate::types::Alert;
use crate::util::{LockOutcome, SharedCache};

const DEDUP_WINDOW: Duration = Duration::from_secs(2 * 3600);
const LOCK_TTL: Duration = Duration::from_secs(30);

/// What happened to a candidate alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    /// New alert row committed; carries the alert id
    Persisted(String),
    /// A sibling alert already covers this (wallet, market) window
    DedupSuppressed,
}

pub struct AlertPersistence {
    store: Arc<AlertStore>,
    cache: Arc<SharedCache>,
    notifier: Arc<dyn AlertNotifier>,
}

impl AlertPersistence {
    pub fn new(
        store: Arc<AlertStore>,
        cache: Arc<SharedCache>,
        notifier: Arc<dyn AlertNotifier>,
    ) -> Self {
        Self {
            store,
            cache,
            notifier,
        }
    }

    fn lock_key(alert: &Alert) -> String {
        format!("alert:lock:{}:{}", alert.trade.taker, alert.trade.market_id)
    }

    /// Run the dedup protocol and, on success, dispatch notifications
    #[instrument(skip(self, alert), fields(
        alert_id = %alert.id,
        wallet = %alert.trade.taker,
        market = %alert.trade.market_id
    ))]
    pub async fn persist(&self, alert: Alert) -> Result<PersistOutcome, DatabaseError> {
        let lock_key = Self::lock_key(&alert);
        let lock = self.cache.try_lock(&lock_key, LOCK_TTL);
        let lock_acquired = match lock {
            LockOutcome::Acquired => true,
            LockOutcome::Held => {
                info!("duplicate alert suppressed: lock held by sibling worker");
                return Ok(PersistOutcome::DedupSuppressed);
            }
            LockOutcome::Unavailable => {
                warn!("dedup lock store unavailable, relying on database checks");
                false
            }
        };

        let window_start = alert.timestamp_ms - DEDUP_WINDOW.as_millis() as i64;
        match self
            .store
            .find_recent_active(&alert.trade.taker, &alert.trade.market_id, window_start)
            .await
        {
            Ok(Some(existing_id)) => {
                info!(existing_id = %existing_id, "duplicate alert suppressed: window hit");
                if lock_acquired {
                    self.cache.remove(&lock_key);
                }
                return Ok(PersistOutcome::DedupSuppressed);
            }
            Ok(None) => {}
            Err(err) => {
                if lock_acquired {
                    self.cache.remove(&lock_key);
                }
                return Err(err);
            }
        }

        let inserted = match self.store.insert(&alert).await {
            Ok(inserted) => inserted,
            Err(err) => {
                if lock_acquired {
                    self.cache.remove(&lock_key);
                }
                return Err(err);
            }
        };
        if !inserted {
            info!("duplicate alert suppressed: trade id already persisted");
            if lock_acquired {
                self.cache.remove(&lock_key);
            }
            return Ok(PersistOutcome::DedupSuppressed);
        }

        info!(
            score = alert.score.total_score,
            classification = alert.score.classification.as_str(),
            "🚨 Alert persisted"
        );

        self.dispatch_notifications(&alert).await;
        Ok(PersistOutcome::Persisted(alert.id))
    }

    async fn dispatch_notifications(&self, alert: &Alert) {
        let outcome = self.notifier.send(alert).await;
        for (channel, delivered) in &outcome.per_channel {
            if !delivered {
                error!(channel = %channel, alert_id = %alert.id, "notification delivery failed");
            }
        }
        if outcome.any_success {
            let now_ms = Utc::now().timestamp_millis();
            if let Err(err) = self.store.mark_notified(&alert.id, now_ms).await {
                warn!(error = %err, "failed to record notification state");
            }
        }
    }
}
