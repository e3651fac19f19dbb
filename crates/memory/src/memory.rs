//! Write-through cache in front of the configured storage backends.

use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex, RwLock},
};

use {
    futures::future::join_all,
    serde::{Serialize, de::DeserializeOwned},
    serde_json::Value,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use skiff_metrics::{counter, gauge, labels, memory as mem_metrics};

use crate::{Result, store::StorageBackend};

type Namespace = Option<String>;

/// Process-wide key-value memory.
///
/// The cache answers first and is never rolled back when a backend write
/// fails. Backends are consulted in the order they were attached. Concurrent
/// writes to the same key are last-write-wins per backend.
#[derive(Default)]
pub struct Memory {
    cache: Mutex<HashMap<Namespace, HashMap<String, Value>>>,
    backends: RwLock<Vec<Arc<dyn StorageBackend>>>,
    scopes: Mutex<Scopes>,
}

/// Open bucket overrides. The most recently opened one still alive wins.
#[derive(Default)]
struct Scopes {
    next_id: u64,
    active: Vec<(u64, String)>,
    /// Bucket each backend had before the first override touched it.
    defaults: Vec<(Arc<dyn StorageBackend>, String)>,
}

impl Scopes {
    fn top(&self) -> Namespace {
        self.active.last().map(|(_, bucket)| bucket.clone())
    }

    /// Point every bucket-aware backend at `bucket`, remembering defaults.
    fn apply(&mut self, backends: &[Arc<dyn StorageBackend>], bucket: &str) {
        for backend in backends {
            let Some(current) = backend.bucket() else {
                continue;
            };
            if !self.defaults.iter().any(|(b, _)| Arc::ptr_eq(b, backend)) {
                self.defaults.push((Arc::clone(backend), current));
            }
            backend.set_bucket(bucket);
        }
    }

    fn restore_defaults(&mut self) {
        for (backend, bucket) in self.defaults.drain(..) {
            backend.set_bucket(&bucket);
        }
    }
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backends(backends: Vec<Arc<dyn StorageBackend>>) -> Self {
        let memory = Self::new();
        for backend in backends {
            memory.add_backend(backend);
        }
        memory
    }

    /// Attach an already connected backend after the existing ones.
    pub fn add_backend(&self, backend: Arc<dyn StorageBackend>) {
        let mut backends = self.backends.write().unwrap_or_else(|e| e.into_inner());
        backends.push(backend);
        #[cfg(feature = "metrics")]
        gauge!(mem_metrics::BACKENDS_ACTIVE).set(backends.len() as f64);
    }

    pub fn backends(&self) -> Vec<Arc<dyn StorageBackend>> {
        self.backends
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn backend_count(&self) -> usize {
        self.backends.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Detach every backend, leaving the cache intact. The caller disconnects them.
    pub fn take_backends(&self) -> Vec<Arc<dyn StorageBackend>> {
        let taken = std::mem::take(&mut *self.backends.write().unwrap_or_else(|e| e.into_inner()));
        #[cfg(feature = "metrics")]
        gauge!(mem_metrics::BACKENDS_ACTIVE).set(0.0);
        taken
    }

    /// Forget every cached value. Subsequent reads go to the backends.
    pub fn clear_cache(&self) {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Bucket override currently in effect, `None` for backend defaults.
    pub fn current_bucket(&self) -> Option<String> {
        self.scopes.lock().unwrap_or_else(|e| e.into_inner()).top()
    }

    /// Store `value` under `key`.
    ///
    /// Visible to `get` as soon as the cache is written. Returns once every
    /// backend answered; backend failures are logged, not returned.
    pub async fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        let namespace = self.current_bucket();
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(namespace)
            .or_default()
            .insert(key.to_string(), value.clone());

        let backends = self.backends();
        let results = join_all(backends.iter().map(|b| b.put(key, &value))).await;
        for (backend, result) in backends.iter().zip(results) {
            if let Err(e) = result {
                warn!(backend = %backend.name(), key, error = %e, "memory write not persisted");
                #[cfg(feature = "metrics")]
                counter!(mem_metrics::BACKEND_ERRORS_TOTAL, labels::BACKEND => backend.name().to_string())
                    .increment(1);
            }
        }
        Ok(())
    }

    /// Read `key` and deserialize it. `Ok(None)` when nothing has it.
    ///
    /// Only a value that does not deserialize into `T` is an error.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_value(key).await {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Raw JSON read: cache first, then each backend in order.
    pub async fn get_value(&self, key: &str) -> Option<Value> {
        let namespace = self.current_bucket();
        let cached = self
            .cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&namespace)
            .and_then(|entries| entries.get(key))
            .cloned();
        if cached.is_some() {
            #[cfg(feature = "metrics")]
            counter!(mem_metrics::CACHE_HITS_TOTAL).increment(1);
            return cached;
        }
        #[cfg(feature = "metrics")]
        counter!(mem_metrics::CACHE_MISSES_TOTAL).increment(1);

        for backend in self.backends() {
            match backend.get(key).await {
                Ok(Some(value)) => {
                    debug!(backend = %backend.name(), key, "memory loaded from backend");
                    self.cache
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .entry(namespace)
                        .or_default()
                        .insert(key.to_string(), value.clone());
                    return Some(value);
                },
                Ok(None) => {},
                Err(e) => {
                    warn!(backend = %backend.name(), key, error = %e, "memory read failed, trying next backend");
                    #[cfg(feature = "metrics")]
                    counter!(mem_metrics::BACKEND_ERRORS_TOTAL, labels::BACKEND => backend.name().to_string())
                        .increment(1);
                },
            }
        }
        None
    }

    /// Remove `key` from the cache and every backend.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let namespace = self.current_bucket();
        if let Some(entries) = self
            .cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(&namespace)
        {
            entries.remove(key);
        }

        let backends = self.backends();
        let results = join_all(backends.iter().map(|b| b.delete(key))).await;
        for (backend, result) in backends.iter().zip(results) {
            if let Err(e) = result {
                warn!(backend = %backend.name(), key, error = %e, "memory delete not persisted");
            }
        }
        Ok(())
    }

    /// Switch every bucket-aware backend to `bucket` until the guard drops.
    ///
    /// The override is process-wide: other tasks using this memory while the
    /// guard lives see the same bucket. Guards may drop in any order; the
    /// newest live override stays in effect and the backend defaults return
    /// once none is left.
    pub fn scoped_bucket(&self, bucket: &str) -> BucketGuard<'_> {
        let mut scopes = self.scopes.lock().unwrap_or_else(|e| e.into_inner());
        let id = scopes.next_id;
        scopes.next_id += 1;
        scopes.active.push((id, bucket.to_string()));
        scopes.apply(&self.backends(), bucket);
        BucketGuard { memory: self, id }
    }

    /// Run `fut` with `bucket` active, restoring the previous bucket however
    /// `fut` ends.
    pub async fn with_bucket<F, T>(&self, bucket: &str, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = self.scoped_bucket(bucket);
        fut.await
    }
}

/// Ends one bucket override on drop. See [`Memory::scoped_bucket`].
#[must_use = "the bucket reverts as soon as the guard is dropped"]
pub struct BucketGuard<'a> {
    memory: &'a Memory,
    id: u64,
}

impl Drop for BucketGuard<'_> {
    fn drop(&mut self) {
        let mut scopes = self
            .memory
            .scopes
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        scopes.active.retain(|(id, _)| *id != self.id);
        match scopes.top() {
            Some(bucket) => scopes.apply(&self.memory.backends(), &bucket),
            None => scopes.restore_defaults(),
        }
    }
}
