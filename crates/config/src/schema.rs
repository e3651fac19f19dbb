//! Config schema types (connectors, databases, skills, dispatch, web, runtime).

use std::fmt;

use {
    serde::{
        Deserialize, Deserializer, Serialize,
        de::{self, MapAccess, SeqAccess, Visitor},
    },
    serde_json::{Map, Value},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SkiffConfig {
    /// Channel connectors, started in the listed order.
    #[serde(deserialize_with = "deserialize_modules")]
    pub connectors: Vec<ModuleConfig>,
    /// Storage backends, queried in the listed order on cache misses.
    #[serde(deserialize_with = "deserialize_modules")]
    pub databases: Vec<ModuleConfig>,
    /// Skills to enable, with their per-skill configuration.
    #[serde(deserialize_with = "deserialize_modules")]
    pub skills: Vec<ModuleConfig>,
    pub dispatch: DispatchConfig,
    pub web: WebConfig,
    pub runtime: RuntimeConfig,
    pub logging: LoggingConfig,
}

impl SkiffConfig {
    /// Iterate over all module sections with their section name.
    pub fn sections(&self) -> [(&'static str, &[ModuleConfig]); 3] {
        [
            ("connectors", self.connectors.as_slice()),
            ("databases", self.databases.as_slice()),
            ("skills", self.skills.as_slice()),
        ]
    }
}

/// One configured connector, database or skill.
///
/// `type` selects the implementation and defaults to `name`, so a single
/// `[[connectors]] name = "shell"` entry is enough for the common case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Everything else in the entry, handed to the module untouched.
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl ModuleConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: None,
            enabled: true,
            settings: Map::new(),
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    /// Implementation name used for registry lookup.
    pub fn kind(&self) -> &str {
        self.kind.as_deref().unwrap_or(&self.name)
    }

    /// Settings as a JSON object, including `name`.
    pub fn settings_value(&self) -> Value {
        let mut settings = self.settings.clone();
        settings.insert("name".into(), Value::String(self.name.clone()));
        Value::Object(settings)
    }

    /// Build from a `name: { ... }` map entry.
    fn from_entry(name: String, body: Value) -> Result<Self, String> {
        let mut settings = match body {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => return Err(format!("module '{name}' must be a table, got {other}")),
        };
        let kind = match settings.remove("type") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(other) => return Err(format!("module '{name}': `type` must be a string, got {other}")),
        };
        let enabled = match settings.remove("enabled") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(b)) => b,
            Some(other) => {
                return Err(format!("module '{name}': `enabled` must be a boolean, got {other}"));
            },
        };
        settings.remove("name");
        Ok(Self {
            name,
            kind,
            enabled,
            settings,
        })
    }
}

fn default_true() -> bool {
    true
}

/// Accept both `[[section]] name = ".."` lists and `section.name = { .. }` maps.
///
/// Map entries keep their document order.
fn deserialize_modules<'de, D>(deserializer: D) -> Result<Vec<ModuleConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ModulesVisitor;

    impl<'de> Visitor<'de> for ModulesVisitor {
        type Value = Vec<ModuleConfig>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a list of modules or a map of module name to settings")
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut modules = Vec::new();
            while let Some(module) = seq.next_element::<ModuleConfig>()? {
                modules.push(module);
            }
            Ok(modules)
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut modules = Vec::new();
            while let Some((name, body)) = map.next_entry::<String, Value>()? {
                modules.push(ModuleConfig::from_entry(name, body).map_err(de::Error::custom)?);
            }
            Ok(modules)
        }
    }

    deserializer.deserialize_any(ModulesVisitor)
}

/// How many of the ranked candidates get invoked for one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchPolicy {
    /// Only the best-scoring skill.
    #[default]
    Top,
    /// Every skill scoring at least `min_score`.
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub policy: DispatchPolicy,
    /// Lower bound for `policy = "all"`. Ignored by `top`.
    pub min_score: f64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            policy: DispatchPolicy::Top,
            min_score: 0.0,
        }
    }
}

/// HTTP API serving `/stats` and webhook triggers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".into(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Seconds in-flight skills get to finish on stop/reload before they are
    /// abandoned.
    pub grace_period_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `skiff_runtime=debug`.
    pub level: Option<String>,
    pub json: bool,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_form_modules() {
        let cfg: SkiffConfig = toml::from_str(
            r#"
            [[databases]]
            name = "primary"
            type = "sqlite"
            path = "skiff.db"

            [[databases]]
            name = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.databases.len(), 2);
        assert_eq!(cfg.databases[0].kind(), "sqlite");
        assert_eq!(cfg.databases[0].settings["path"], "skiff.db");
        assert_eq!(cfg.databases[1].kind(), "memory");
        assert!(cfg.databases[1].enabled);
    }

    #[test]
    fn map_form_modules_keep_document_order() {
        let cfg: SkiffConfig = serde_yaml::from_str(
            "databases:\n  zeta:\n    type: file\n    path: /tmp/zeta\n  alpha:\n  mid:\n    enabled: false\n",
        )
        .unwrap();
        let names: Vec<_> = cfg.databases.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
        assert_eq!(cfg.databases[0].kind(), "file");
        assert!(!cfg.databases[0].settings.contains_key("type"));
        assert!(!cfg.databases[2].enabled);
    }

    #[test]
    fn map_form_rejects_scalar_body() {
        let err = serde_json::from_str::<SkiffConfig>(r#"{"skills": {"ping": 3}}"#).unwrap_err();
        assert!(err.to_string().contains("must be a table"));
    }

    #[test]
    fn defaults() {
        let cfg = SkiffConfig::default();
        assert_eq!(cfg.dispatch.policy, DispatchPolicy::Top);
        assert_eq!(cfg.web.port, 8080);
        assert_eq!(cfg.runtime.grace_period_secs, 10);
        assert!(!cfg.web.enabled);
    }

    #[test]
    fn settings_value_includes_name() {
        let module = ModuleConfig::new("remember").with_setting("prefix", "note:".into());
        let value = module.settings_value();
        assert_eq!(value["name"], "remember");
        assert_eq!(value["prefix"], "note:");
    }

    #[test]
    fn dispatch_policy_parses_lowercase() {
        let cfg: SkiffConfig =
            toml::from_str("[dispatch]\npolicy = \"all\"\nmin_score = 0.5\n").unwrap();
        assert_eq!(cfg.dispatch.policy, DispatchPolicy::All);
        assert!((cfg.dispatch.min_score - 0.5).abs() < f64::EPSILON);
    }
}
