/// Trade snapshot store

use std::sync::Arc;

use sqlx::Row;
use tracing::instrument;

use super::{Database, DatabaseError};
use crate::types::Trade;
#[cfg(test)]
use crate::types::TradeSide;

pub struct TradeStore {
    db: Arc<Database>,
}

impl TradeStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Best-effort snapshot; replays of the same trade id are ignored
    #[instrument(skip(self, trade), fields(trade_id = %trade.id))]
    pub async fn record(&self, trade: &Trade) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO trades (
                id, market_id, side, size, price, outcome, maker, taker, timestamp_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&trade.id)
        .bind(&trade.market_id)
        .bind(trade.side.as_str())
        .bind(trade.size)
        .bind(trade.price)
        .bind(&trade.outcome)
        .bind(&trade.maker)
        .bind(&trade.taker)
        .bind(trade.timestamp_ms)
        .execute(self.db.get_pool())
        .await
        .map_err(|e| DatabaseError::QueryError(format!("failed to record trade: {}", e)))?;
        Ok(())
    }

    /// Delete trades older than `cutoff_ms`; returns rows removed
    pub async fn prune_older_than(&self, cutoff_ms: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM trades WHERE timestamp_ms < ?")
            .bind(cutoff_ms)
            .execute(self.db.get_pool())
            .await
            .map_err(|e| DatabaseError::QueryError(format!("failed to prune trades: {}", e)))?;
        Ok(result.rows_affected())
    }

    pub async fn count(&self) -> Result<i64, DatabaseError> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM trades")
            .fetch_one(self.db.get_pool())
            .await
            .map_err(|e| DatabaseError::QueryError(format!("failed to count trades: {}", e)))?;
        Ok(row.get("count"))
    }
}

#[cfg(test)]
mod tests {
    use super::super::alerts::tests::test_db;
    use super::*;

    fn trade(id: &str, timestamp_ms: i64) -> Trade {
        Trade {
            id: id.to_string(),
            market_id: "m1".to_string(),
            side: TradeSide::Sell,
            size: 10.0,
            price: 0.5,
            outcome: "No".to_string(),
            maker: "0".repeat(40),
            taker: "b".repeat(40),
            timestamp_ms,
        }
    }

    #[tokio::test]
    async fn test_record_is_idempotent() {
        let (db, _dir) = test_db().await;
        let store = TradeStore::new(db);
        store.record(&trade("t1", 1000)).await.unwrap();
        store.record(&trade("t1", 1000)).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_prune() {
        let (db, _dir) = test_db().await;
        let store = TradeStore::new(db);
        store.record(&trade("old", 1000)).await.unwrap();
        store.record(&trade("new", 2_000_000)).await.unwrap();
        let pruned = store.prune_older_than(1_000_000).await.unwrap();
        assert_eq!(pruned, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
