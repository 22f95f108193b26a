/// SQLite connection management

use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::SqlitePool;
use tracing::info;

use super::DatabaseError;

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the database and run migrations
    pub async fn new(database_url: &str) -> Result<Self, DatabaseError> {
        let db_path = database_url.strip_prefix("sqlite:").unwrap_or(database_url);
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    DatabaseError::ConnectionError(format!("failed to create data directory: {}", e))
                })?;
            }
        }

        let connection_options = database_url
            .parse::<SqliteConnectOptions>()
            .map_err(|e| DatabaseError::ConnectionError(format!("invalid database URL: {}", e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(15))
            .pragma("cache_size", "-64000")
            .pragma("temp_store", "memory");

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(15))
            .connect_with(connection_options)
            .await
            .map_err(|e| {
                DatabaseError::ConnectionError(format!("failed to connect to database: {}", e))
            })?;

        let db = Self { pool };
        super::migrations::run(&db).await?;

        info!("✅ Database ready at {}", database_url);
        Ok(db)
    }

    pub fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }
}
