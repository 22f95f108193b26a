/// Alert persistence queries
///
/// Owns the alerts table: transactional insert, the 2-hour dedup
/// window lookup and lifecycle updates. The UNIQUE constraint on
/// trade_id is the last-resort duplicate guard under concurrency.

use std::sync::Arc;

use sqlx::Row;
use tracing::{debug, instrument};

use super::{Database, DatabaseError};
use crate::types::Alert;

/// Summary row for statistics and listings
#[derive(Debug, Clone)]
pub struct AlertRow {
    pub id: String,
    pub trade_id: String,
    pub market_id: String,
    pub wallet_address: String,
    pub total_score: f64,
    pub classification: String,
    pub timestamp_ms: i64,
    pub notified: bool,
    pub dismissed: bool,
}

pub struct AlertStore {
    db: Arc<Database>,
}

impl AlertStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert an alert inside a transaction. Returns false when the
    /// trade id already has an alert row (duplicate suppressed by the
    /// unique constraint).
    #[instrument(skip(self, alert), fields(alert_id = %alert.id, wallet = %alert.trade.taker))]
    pub async fn insert(&self, alert: &Alert) -> Result<bool, DatabaseError> {
        let onchain = alert.fingerprint.onchain;
        let subgraph = &alert.fingerprint.subgraph;
        let metadata = &alert.fingerprint.metadata;

        let mut tx = self.db.get_pool().begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO alerts (
                id, trade_id, market_id, wallet_address,
                side, outcome, size, price, trade_timestamp_ms,
                trade_usd_value, oi_percentage, price_impact, open_interest,
                cex_funded, low_tx_count, young_wallet,
                high_exchange_netflow, single_purpose,
                sg_low_trade_count, sg_young_account, sg_low_volume,
                sg_high_concentration, sg_fresh_fat_bet, sg_low_diversification,
                total_transactions, wallet_age_days, cex_funding_source,
                exchange_netflow_percentage, is_suspicious,
                wallet_contribution, impact_contribution, extremity_contribution,
                total_score, confidence_score, classification, timestamp_ms,
                notified, dismissed, dormancy_days, dormancy_flag
            ) VALUES (
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?, ?
            )
            "#,
        )
        .bind(&alert.id)
        .bind(&alert.trade.id)
        .bind(&alert.trade.market_id)
        .bind(&alert.trade.taker)
        .bind(alert.trade.side.as_str())
        .bind(&alert.trade.outcome)
        .bind(alert.trade.size)
        .bind(alert.trade.price)
        .bind(alert.trade.timestamp_ms)
        .bind(alert.signal.trade_usd_value)
        .bind(alert.signal.oi_percentage)
        .bind(alert.signal.price_impact)
        .bind(alert.signal.open_interest)
        .bind(onchain.map(|f| f.cex_funded))
        .bind(onchain.map(|f| f.low_tx_count))
        .bind(onchain.map(|f| f.young_wallet))
        .bind(onchain.map(|f| f.high_exchange_netflow))
        .bind(onchain.map(|f| f.single_purpose))
        .bind(subgraph.low_trade_count)
        .bind(subgraph.young_account)
        .bind(subgraph.low_volume)
        .bind(subgraph.high_concentration)
        .bind(subgraph.fresh_fat_bet)
        .bind(subgraph.low_diversification)
        .bind(metadata.total_transactions.map(|v| v as i64))
        .bind(metadata.wallet_age_days)
        .bind(metadata.cex_funding_source.as_deref())
        .bind(metadata.exchange_netflow_percentage)
        .bind(alert.fingerprint.is_suspicious)
        .bind(alert.score.breakdown.wallet_contribution)
        .bind(alert.score.breakdown.impact_contribution)
        .bind(alert.score.breakdown.extremity_contribution)
        .bind(alert.score.total_score)
        .bind(alert.confidence_score)
        .bind(alert.score.classification.as_str())
        .bind(alert.timestamp_ms)
        .bind(alert.dormancy_days)
        .bind(alert.dormancy_flag)
        .execute(&mut *tx)
        .await;

        match result {
            Ok(_) => {
                tx.commit().await?;
                debug!("alert row inserted");
                Ok(true)
            }
            Err(err) if is_unique_violation(&err) => {
                tx.rollback().await.ok();
                Ok(false)
            }
            Err(err) => {
                tx.rollback().await.ok();
                Err(DatabaseError::QueryError(format!(
                    "failed to insert alert: {}",
                    err
                )))
            }
        }
    }

    /// Any non-dismissed alert for (wallet, market) at or after
    /// `since_ms` — the dedup window lookup
    pub async fn find_recent_active(
        &self,
        wallet_address: &str,
        market_id: &str,
        since_ms: i64,
    ) -> Result<Option<String>, DatabaseError> {
        let row = sqlx::query(
            r#"
            SELECT id FROM alerts
            WHERE wallet_address = ? AND market_id = ?
                AND dismissed = 0 AND timestamp_ms >= ?
            LIMIT 1
            "#,
        )
        .bind(wallet_address)
        .bind(market_id)
        .bind(since_ms)
        .fetch_optional(self.db.get_pool())
        .await
        .map_err(|e| DatabaseError::QueryError(format!("dedup window lookup failed: {}", e)))?;

        Ok(row.map(|r| r.get::<String, _>("id")))
    }

    pub async fn mark_notified(&self, alert_id: &str, at_ms: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE alerts SET notified = 1, notified_at_ms = ? WHERE id = ?")
            .bind(at_ms)
            .bind(alert_id)
            .execute(self.db.get_pool())
            .await
            .map_err(|e| DatabaseError::QueryError(format!("failed to mark notified: {}", e)))?;
        Ok(())
    }

    /// Dismissal is terminal for statistics queries
    pub async fn dismiss(
        &self,
        alert_id: &str,
        at_ms: i64,
        notes: Option<&str>,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE alerts SET dismissed = 1, dismissed_at_ms = ?, notes = COALESCE(?, notes) WHERE id = ?",
        )
        .bind(at_ms)
        .bind(notes)
        .bind(alert_id)
        .execute(self.db.get_pool())
        .await
        .map_err(|e| DatabaseError::QueryError(format!("failed to dismiss alert: {}", e)))?;
        Ok(())
    }

    pub async fn list_recent(&self, limit: i64) -> Result<Vec<AlertRow>, DatabaseError> {
        let rows = sqlx::query(
            r#"
            SELECT id, trade_id, market_id, wallet_address, total_score,
                   classification, timestamp_ms, notified, dismissed
            FROM alerts
            ORDER BY timestamp_ms DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(self.db.get_pool())
        .await
        .map_err(|e| DatabaseError::QueryError(format!("failed to list alerts: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|row| AlertRow {
                id: row.get("id"),
                trade_id: row.get("trade_id"),
                market_id: row.get("market_id"),
                wallet_address: row.get("wallet_address"),
                total_score: row.get("total_score"),
                classification: row.get("classification"),
                timestamp_ms: row.get("timestamp_ms"),
                notified: row.get::<i64, _>("notified") != 0,
                dismissed: row.get::<i64, _>("dismissed") != 0,
            })
            .collect())
    }

    /// Non-dismissed alert counts per classification since `cutoff_ms`
    pub async fn stats_since(
        &self,
        cutoff_ms: i64,
    ) -> Result<Vec<(String, i64)>, DatabaseError> {
        let rows = sqlx::query(
            r#"
            SELECT classification, COUNT(*) as count
            FROM alerts
            WHERE timestamp_ms >= ? AND dismissed = 0
            GROUP BY classification
            ORDER BY count DESC
            "#,
        )
        .bind(cutoff_ms)
        .fetch_all(self.db.get_pool())
        .await
        .map_err(|e| DatabaseError::QueryError(format!("failed to read alert stats: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get("classification"), row.get("count")))
            .collect())
    }

    pub async fn count_all(&self) -> Result<i64, DatabaseError> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM alerts")
            .fetch_one(self.db.get_pool())
            .await
            .map_err(|e| DatabaseError::QueryError(format!("failed to count alerts: {}", e)))?;
        Ok(row.get("count"))
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.message().contains("UNIQUE constraint failed"),
        _ => false,
    }
}
