use std::{collections::HashMap, sync::Arc};

use serde_json::Value;

use crate::{Error, Result, builtin, skill::Skill};

/// Builds the skills of one `skills` module from its settings.
pub type SkillConstructor = Arc<dyn Fn(&Value) -> Result<Vec<Skill>> + Send + Sync>;

/// Skill modules available to the runtime, keyed by config `type`.
pub struct SkillCatalog {
    constructors: HashMap<String, SkillConstructor>,
}

impl Default for SkillCatalog {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl SkillCatalog {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.register("ping", |settings| Ok(vec![builtin::ping(settings)?]));
        catalog.register("hello", |settings| Ok(vec![builtin::hello(settings)?]));
        catalog.register("remember", |settings| Ok(vec![builtin::remember(settings)?]));
        catalog.register("recall", |settings| Ok(vec![builtin::recall(settings)?]));
        catalog
    }

    pub fn register<F>(&mut self, kind: impl Into<String>, constructor: F)
    where
        F: Fn(&Value) -> Result<Vec<Skill>> + Send + Sync + 'static,
    {
        self.constructors.insert(kind.into(), Arc::new(constructor));
    }

    /// Register a fixed set of skills under `kind`, ignoring settings.
    pub fn register_skills(&mut self, kind: impl Into<String>, skills: Vec<Skill>) {
        self.register(kind, move |_| Ok(skills.clone()));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<_> = self.constructors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Build the skills for `kind`; each one carries `settings` as its config.
    pub fn build(&self, kind: &str, settings: &Value) -> Result<Vec<Skill>> {
        let constructor = self
            .constructors
            .get(kind)
            .ok_or_else(|| Error::unknown_skill(kind))?;
        Ok(constructor(settings)?
            .into_iter()
            .map(|skill| skill.with_config(settings.clone()))
            .collect())
    }
}
