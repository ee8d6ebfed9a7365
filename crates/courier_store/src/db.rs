//! Database handle over SQLite via sqlx.

use std::{path::Path, time::Duration};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};

use crate::error::StoreError;

/// Central store handle. Cheap to clone (the pool is an `Arc` internally).
#[derive(Clone)]
pub struct Store {
    pub pool: SqlitePool,
}

impl Store {
    /// Open (or create) the relay database at `db_path` and run pending
    /// migrations.
    ///
    /// WAL mode and foreign keys are set on the connection: SQLite refuses to
    /// change `journal_mode` inside the transaction sqlx wraps migrations in.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePool::connect_with(opts).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        tracing::debug!(path = %db_path.display(), "relay store opened");
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Relay clock, epoch milliseconds.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// First 8 chars of a key, for log lines.
pub(crate) fn short(key: &str) -> &str {
    key.get(..8).unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::Store;

    #[tokio::test]
    async fn reopening_an_existing_database_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.db");

        let store = Store::open(&path).await.expect("first open");
        sqlx::query(
            "INSERT INTO identities (signing_key, encryption_key, alias, published_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind("aa")
        .bind("bb")
        .bind("alice")
        .bind(1_i64)
        .bind(1_i64)
        .execute(&store.pool)
        .await
        .expect("insert identity");
        store.close().await;

        let store = Store::open(&path).await.expect("second open");
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM identities")
            .fetch_one(&store.pool)
            .await
            .expect("count identities");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn status_column_rejects_unknown_states() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("relay.db")).await.unwrap();

        let res = sqlx::query(
            "INSERT INTO relay_messages (id, from_key, envelope_json, status, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind("m1")
        .bind("aa")
        .bind("{}")
        .bind("failed")
        .bind(1_i64)
        .execute(&store.pool)
        .await;
        assert!(res.is_err());
    }
}
