/// Embedded schema migrations
///
/// Statements are idempotent and run at every startup; the dedup
/// lookup rides the (wallet_address, market_id, timestamp_ms) index.

use tracing::{debug, info};

use super::{Database, DatabaseError};

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS markets (
        id TEXT PRIMARY KEY,
        condition_id TEXT NOT NULL,
        question TEXT NOT NULL,
        slug TEXT NOT NULL,
        tier INTEGER NOT NULL DEFAULT 2 CHECK (tier IN (1, 2, 3)),
        category TEXT NOT NULL DEFAULT 'misc'
            CHECK (category IN ('politics', 'corporate', 'sports', 'misc')),
        open_interest REAL NOT NULL DEFAULT 0,
        volume REAL NOT NULL DEFAULT 0,
        enabled INTEGER NOT NULL DEFAULT 1,
        active INTEGER NOT NULL DEFAULT 1,
        closed INTEGER NOT NULL DEFAULT 0,
        updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS trades (
        id TEXT PRIMARY KEY,
        market_id TEXT NOT NULL,
        side TEXT NOT NULL CHECK (side IN ('BUY', 'SELL')),
        size REAL NOT NULL,
        price REAL NOT NULL,
        outcome TEXT NOT NULL,
        maker TEXT NOT NULL,
        taker TEXT NOT NULL,
        timestamp_ms INTEGER NOT NULL,
        recorded_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_trades_timestamp ON trades(timestamp_ms)",
    "CREATE INDEX IF NOT EXISTS idx_trades_taker ON trades(taker, timestamp_ms)",
    r#"
    CREATE TABLE IF NOT EXISTS alerts (
        id TEXT PRIMARY KEY,
        trade_id TEXT NOT NULL UNIQUE,
        market_id TEXT NOT NULL,
        wallet_address TEXT NOT NULL,
        side TEXT NOT NULL,
        outcome TEXT NOT NULL,
        size REAL NOT NULL,
        price REAL NOT NULL,
        trade_timestamp_ms INTEGER NOT NULL,
        trade_usd_value REAL NOT NULL,
        oi_percentage REAL NOT NULL,
        price_impact REAL NOT NULL,
        open_interest REAL NOT NULL,
        cex_funded INTEGER,
        low_tx_count INTEGER,
        young_wallet INTEGER,
        high_exchange_netflow INTEGER,
        single_purpose INTEGER,
        sg_low_trade_count INTEGER NOT NULL DEFAULT 0,
        sg_young_account INTEGER NOT NULL DEFAULT 0,
        sg_low_volume INTEGER NOT NULL DEFAULT 0,
        sg_high_concentration INTEGER NOT NULL DEFAULT 0,
        sg_fresh_fat_bet INTEGER NOT NULL DEFAULT 0,
        sg_low_diversification INTEGER NOT NULL DEFAULT 0,
        total_transactions INTEGER,
        wallet_age_days REAL,
        cex_funding_source TEXT,
        exchange_netflow_percentage REAL,
        is_suspicious INTEGER NOT NULL DEFAULT 0,
        wallet_contribution REAL NOT NULL DEFAULT 0,
        impact_contribution REAL NOT NULL DEFAULT 0,
        extremity_contribution REAL NOT NULL DEFAULT 0,
        total_score REAL NOT NULL,
        confidence_score REAL NOT NULL DEFAULT 0,
        classification TEXT NOT NULL,
        timestamp_ms INTEGER NOT NULL,
        notified INTEGER NOT NULL DEFAULT 0,
        notified_at_ms INTEGER,
        dismissed INTEGER NOT NULL DEFAULT 0,
        dismissed_at_ms INTEGER,
        notes TEXT,
        dormancy_days REAL,
        dormancy_flag INTEGER
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_alerts_wallet_market_time
        ON alerts(wallet_address, market_id, timestamp_ms)
    "#,
    "CREATE INDEX IF NOT EXISTS idx_alerts_classification ON alerts(classification)",
];

pub async fn run(db: &Database) -> Result<(), DatabaseError> {
    for (index, statement) in MIGRATIONS.iter().enumerate() {
        sqlx::query(statement)
            .execute(db.get_pool())
            .await
            .map_err(|e| {
                DatabaseError::MigrationError(format!("statement {} failed: {}", index, e))
            })?;
        debug!(statement = index, "migration statement applied");
    }
    info!("✅ Database schema is up to date");
    Ok(())
}
