//! Process-local backend. Nothing survives a restart; used in tests and as
//! the zero-config default.

use std::{collections::HashMap, sync::Mutex};

use {async_trait::async_trait, serde_json::Value};

use crate::{DEFAULT_BUCKET, Result, store::StorageBackend};

pub struct InMemoryStore {
    name: String,
    buckets: Mutex<HashMap<String, HashMap<String, Value>>>,
    bucket: Mutex<String>,
}

impl InMemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buckets: Mutex::new(HashMap::new()),
            bucket: Mutex::new(DEFAULT_BUCKET.to_string()),
        }
    }

    fn current_bucket(&self) -> String {
        self.bucket.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of keys stored in `bucket`.
    pub fn len_in(&self, bucket: &str) -> usize {
        let buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        buckets.get(bucket).map_or(0, HashMap::len)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new("memory")
    }
}

#[async_trait]
impl StorageBackend for InMemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let bucket = self.current_bucket();
        let buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        Ok(buckets.get(&bucket).and_then(|b| b.get(key)).cloned())
    }

    async fn put(&self, key: &str, value: &Value) -> Result<()> {
        let bucket = self.current_bucket();
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        buckets
            .entry(bucket)
            .or_default()
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let bucket = self.current_bucket();
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(b) = buckets.get_mut(&bucket) {
            b.remove(key);
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

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[tokio::test]
    async fn put_get_delete() {
        let store = InMemoryStore::default();
        store.put("k", &json!({"a": 1})).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!({"a": 1})));
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn buckets_are_isolated() {
        let store = InMemoryStore::default();
        store.put("k", &json!(1)).await.unwrap();
        store.set_bucket("archive");
        assert_eq!(store.get("k").await.unwrap(), None);
        store.put("k", &json!(2)).await.unwrap();
        store.set_bucket(DEFAULT_BUCKET);
        assert_eq!(store.get("k").await.unwrap(), Some(json!(1)));
        assert_eq!(store.len_in("archive"), 1);
    }
}
