//! SQLite-backed store. One row per `(bucket, key)`, values stored as JSON text.

use std::sync::{Mutex, RwLock};

use {
    async_trait::async_trait,
    serde_json::Value,
    sqlx::{Row, SqlitePool, sqlite::SqlitePoolOptions},
    tracing::debug,
};

use crate::{DEFAULT_BUCKET, Error, Result, store::StorageBackend};

pub struct SqliteStore {
    name: String,
    url: String,
    pool: RwLock<Option<SqlitePool>>,
    bucket: Mutex<String>,
}

impl SqliteStore {
    /// Store that will open `url` on [`connect`](StorageBackend::connect).
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            pool: RwLock::new(None),
            bucket: Mutex::new(DEFAULT_BUCKET.to_string()),
        }
    }

    /// Build from module settings: either `url` or a file `path`, plus an
    /// optional `bucket`.
    pub fn from_settings(settings: &Value) -> Result<Self> {
        let name = settings
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("sqlite");
        let url = match (
            settings.get("url").and_then(Value::as_str),
            settings.get("path").and_then(Value::as_str),
        ) {
            (Some(url), _) => url.to_string(),
            (None, Some(path)) => format!("sqlite://{path}?mode=rwc"),
            (None, None) => {
                return Err(Error::invalid_config(format!(
                    "sqlite backend '{name}' needs a `path` or `url`"
                )));
            },
        };
        let store = Self::new(name, url);
        if let Some(bucket) = settings.get("bucket").and_then(Value::as_str) {
            store.set_bucket(bucket);
        }
        Ok(store)
    }

    fn pool(&self) -> Result<SqlitePool> {
        self.pool
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| Error::not_connected(&self.name))
    }

    fn current_bucket(&self) -> String {
        self.bucket.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl StorageBackend for SqliteStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<()> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&self.url)
            .await?;
        crate::run_migrations(&pool).await?;
        debug!(backend = %self.name, "sqlite store connected");
        *self.pool.write().unwrap_or_else(|e| e.into_inner()) = Some(pool);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let pool = self.pool()?;
        let row = sqlx::query("SELECT data FROM memory WHERE bucket = ? AND key = ?")
            .bind(self.current_bucket())
            .bind(key)
            .fetch_optional(&pool)
            .await?;
        match row {
            Some(row) => {
                let data: String = row.get("data");
                Ok(Some(serde_json::from_str(&data)?))
            },
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &Value) -> Result<()> {
        let pool = self.pool()?;
        let data = serde_json::to_string(value)?;
        sqlx::query(
            "INSERT INTO memory (bucket, key, data, updated_at)
             VALUES (?, ?, ?, CAST(strftime('%s', 'now') AS INTEGER))
             ON CONFLICT(bucket, key) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
        )
        .bind(self.current_bucket())
        .bind(key)
        .bind(&data)
        .execute(&pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let pool = self.pool()?;
        sqlx::query("DELETE FROM memory WHERE bucket = ? AND key = ?")
            .bind(self.current_bucket())
            .bind(key)
            .execute(&pool)
            .await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let pool = self.pool.write().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(pool) = pool {
            pool.close().await;
        }
        Ok(())
    }

    fn bucket(&self) -> Option<String> {
        Some(self.current_bucket())
    }

    fn set_bucket(&self, bucket: &str) {
        *self.bucket.lock().unwrap_or_else(|e| e.into_inner()) = bucket.to_string();
    }
}
