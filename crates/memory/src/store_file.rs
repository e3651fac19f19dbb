//! JSON file-backed store with atomic writes.
//!
//! Each bucket is one JSON object in `<dir>/<bucket>.json`.

use std::{path::PathBuf, sync::Mutex};

use {
    async_trait::async_trait,
    serde_json::{Map, Value},
    tokio::fs,
    tracing::debug,
};

use crate::{DEFAULT_BUCKET, Error, Result, store::StorageBackend};

pub struct FileStore {
    name: String,
    dir: PathBuf,
    bucket: Mutex<String>,
    /// Serializes read-modify-write cycles within this process.
    write_lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            bucket: Mutex::new(DEFAULT_BUCKET.to_string()),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_bucket(self, bucket: impl Into<String>) -> Self {
        *self.bucket.lock().unwrap_or_else(|e| e.into_inner()) = bucket.into();
        self
    }

    fn bucket_path(&self) -> Result<PathBuf> {
        let bucket = self.bucket.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if bucket.is_empty() || bucket.contains(['/', '\\']) || bucket.starts_with('.') {
            return Err(Error::invalid_config(format!(
                "invalid bucket name for file store: {bucket:?}"
            )));
        }
        Ok(self.dir.join(format!("{bucket}.json")))
    }

    async fn load(&self, path: &PathBuf) -> Result<Map<String, Value>> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            return Ok(Map::new());
        }
        let data = fs::read_to_string(path).await?;
        if data.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str(&data)? {
            Value::Object(map) => Ok(map),
            _ => Err(Error::invalid_config(format!(
                "{} does not contain a JSON object",
                path.display()
            ))),
        }
    }

    /// Atomic write: write to temp, rename over target, keep `.bak`.
    async fn save(&self, path: &PathBuf, entries: &Map<String, Value>) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_string_pretty(entries)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json.as_bytes()).await?;

        if fs::try_exists(path).await.unwrap_or(false) {
            let bak = path.with_extension("json.bak");
            let _ = fs::rename(path, &bak).await;
        }

        fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FileStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        debug!(backend = %self.name, dir = %self.dir.display(), "file store ready");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.bucket_path()?;
        let mut entries = self.load(&path).await?;
        Ok(entries.remove(key))
    }

    async fn put(&self, key: &str, value: &Value) -> Result<()> {
        let path = self.bucket_path()?;
        let _lock = self.write_lock.lock().await;
        let mut entries = self.load(&path).await?;
        entries.insert(key.to_string(), value.clone());
        self.save(&path, &entries).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.bucket_path()?;
        let _lock = self.write_lock.lock().await;
        let mut entries = self.load(&path).await?;
        if entries.remove(key).is_some() {
            self.save(&path, &entries).await?;
        }
        Ok(())
    }

    fn bucket(&self) -> Option<String> {
        Some(self.bucket.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn set_bucket(&self, bucket: &str) {
        *self.bucket.lock().unwrap_or_else(|e| e.into_inner()) = bucket.to_string();
    }
}
