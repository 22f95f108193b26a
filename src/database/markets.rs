/// Market store backing the in-memory registry

use std::sync::Arc;

use sqlx::Row;
use tracing::instrument;

use super::{Database, DatabaseError};
use crate::types::{Market, MarketCategory, MarketTier};

pub struct MarketStore {
    db: Arc<Database>,
}

impl MarketStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, market), fields(market_id = %market.id))]
    pub async fn upsert(&self, market: &Market) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO markets (
                id, condition_id, question, slug, tier, category,
                open_interest, volume, enabled, active, closed, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, strftime('%s', 'now'))
            ON CONFLICT(id) DO UPDATE SET
                condition_id = excluded.condition_id,
                question = excluded.question,
                slug = excluded.slug,
                tier = excluded.tier,
                category = excluded.category,
                open_interest = excluded.open_interest,
                volume = excluded.volume,
                enabled = excluded.enabled,
                active = excluded.active,
                closed = excluded.closed,
                updated_at = strftime('%s', 'now')
            "#,
        )
        .bind(&market.id)
        .bind(&market.condition_id)
        .bind(&market.question)
        .bind(&market.slug)
        .bind(u8::from(market.tier) as i64)
        .bind(market.category.as_str())
        .bind(market.open_interest)
        .bind(market.volume)
        .bind(market.enabled)
        .bind(market.active)
        .bind(market.closed)
        .execute(self.db.get_pool())
        .await
        .map_err(|e| DatabaseError::QueryError(format!("failed to upsert market: {}", e)))?;
        Ok(())
    }

    /// Every enabled market, for the registry reload
    pub async fn load_enabled(&self) -> Result<Vec<Market>, DatabaseError> {
        let rows = sqlx::query(
            r#"
            SELECT id, condition_id, question, slug, tier, category,
                   open_interest, volume, enabled, active, closed
            FROM markets
            WHERE enabled = 1
            "#,
        )
        .fetch_all(self.db.get_pool())
        .await
        .map_err(|e| DatabaseError::QueryError(format!("failed to load markets: {}", e)))?;

        let mut markets = Vec::with_capacity(rows.len());
        for row in rows {
            let tier = MarketTier::try_from(row.get::<i64, _>("tier") as u8)
                .unwrap_or(MarketTier::Tier3);
            let category = row
                .get::<String, _>("category")
                .parse::<MarketCategory>()
                .unwrap_or(MarketCategory::Misc);
            markets.push(Market {
                id: row.get("id"),
                condition_id: row.get("condition_id"),
                question: row.get("question"),
                slug: row.get("slug"),
                tier,
                category,
                open_interest: row.get("open_interest"),
                volume: row.get("volume"),
                enabled: row.get::<i64, _>("enabled") != 0,
                active: row.get::<i64, _>("active") != 0,
                closed: row.get::<i64, _>("closed") != 0,
            });
        }
        Ok(markets)
    }
}
