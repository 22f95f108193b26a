/// Durable store for markets, trades and alerts (SQLite via sqlx)

pub mod alerts;
pub mod cleanup;
pub mod markets;
pub mod migrations;
pub mod models;
pub mod trades;

pub use alerts::{AlertRow, AlertStore};
pub use cleanup::RetentionSweeper;
pub use markets::MarketStore;
pub use models::Database;
pub use trades::TradeStore;

#[derive(thiserror::Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionError(String),

    #[error("Query execution failed: {0}")]
    QueryError(String),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("SQLite error: {0}")]
    SqlxError(#[from] sqlx::Error),
}
