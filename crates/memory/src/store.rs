//! Persistence trait implemented by every storage backend.

use {async_trait::async_trait, serde_json::Value};

use crate::Result;

/// Durable key-value storage behind [`crate::Memory`].
///
/// Values are JSON documents. Backends that partition data into named
/// buckets (tables, collections, files) expose the active bucket through
/// [`bucket`](Self::bucket) so [`crate::Memory::scoped_bucket`] can switch it
/// temporarily.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Configured instance name, used in logs.
    fn name(&self) -> &str;

    async fn connect(&self) -> Result<()>;

    /// `Ok(None)` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn put(&self, key: &str, value: &Value) -> Result<()>;

    /// Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    /// Active bucket, `None` if this backend does not partition data.
    fn bucket(&self) -> Option<String> {
        None
    }

    /// Switch the active bucket. No-op for unpartitioned backends.
    fn set_bucket(&self, _bucket: &str) {}
}
