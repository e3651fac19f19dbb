use std::{collections::HashMap, sync::Arc};

use serde_json::Value;

use crate::{
    Error, Result, connector::Connector, loopback::LoopbackConnector, shell::ShellConnector,
};

/// Builds a connector from its module settings (`name` included).
pub type ConnectorFactory = Arc<dyn Fn(&Value) -> Result<Arc<dyn Connector>> + Send + Sync>;

/// Connector implementations available to the runtime, keyed by config `type`.
pub struct ConnectorRegistry {
    factories: HashMap<String, ConnectorFactory>,
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the connectors shipped in this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("shell", |settings| {
            Ok(Arc::new(ShellConnector::from_settings(settings)?) as Arc<dyn Connector>)
        });
        registry.register("loopback", |settings| {
            let name = settings
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("loopback");
            Ok(Arc::new(LoopbackConnector::new(name)) as Arc<dyn Connector>)
        });
        registry
    }

    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> Result<Arc<dyn Connector>> + Send + Sync + 'static,
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

    /// Construct a connector of type `kind`.
    pub fn build(&self, kind: &str, settings: &Value) -> Result<Arc<dyn Connector>> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| Error::unknown_connector(kind))?;
        factory(settings)
    }
}
