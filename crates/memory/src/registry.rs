use std::{collections::HashMap, sync::Arc};

use serde_json::Value;

use crate::{
    Error, FileStore, InMemoryStore, Result, SqliteStore, store::StorageBackend,
};

/// Builds a backend from its `databases` module settings (`name` included).
pub type BackendFactory = Arc<dyn Fn(&Value) -> Result<Arc<dyn StorageBackend>> + Send + Sync>;

/// Storage backends available to the runtime, keyed by config `type`.
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn setting<'a>(settings: &'a Value, key: &str) -> Option<&'a str> {
    settings.get(key).and_then(Value::as_str)
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// `memory`, `file` and `sqlite`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("memory", |settings| {
            let store = InMemoryStore::new(setting(settings, "name").unwrap_or("memory"));
            if let Some(bucket) = setting(settings, "bucket") {
                store.set_bucket(bucket);
            }
            Ok(Arc::new(store) as Arc<dyn StorageBackend>)
        });
        registry.register("file", |settings| {
            let name = setting(settings, "name").unwrap_or("file");
            let dir = setting(settings, "path").ok_or_else(|| {
                Error::invalid_config(format!("file backend '{name}' needs a `path` directory"))
            })?;
            let mut store = FileStore::new(name, dir);
            if let Some(bucket) = setting(settings, "bucket") {
                store = store.with_bucket(bucket);
            }
            Ok(Arc::new(store) as Arc<dyn StorageBackend>)
        });
        registry.register("sqlite", |settings| {
            Ok(Arc::new(SqliteStore::from_settings(settings)?) as Arc<dyn StorageBackend>)
        });
        registry
    }

    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> Result<Arc<dyn StorageBackend>> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<_> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Construct, but do not connect, a backend of type `kind`.
    pub fn build(&self, kind: &str, settings: &Value) -> Result<Arc<dyn StorageBackend>> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| Error::unknown_backend(kind))?;
        factory(settings)
    }
}
