//! Configuration validation.
//!
//! Catches mistakes that deserialize fine but would make the runtime skip a
//! module or misrank skills: duplicate or empty module names, out-of-range
//! scores, and settings that leave the bot deaf.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use serde_json::Value;

use crate::{loader::load_config, schema::SkiffConfig};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "duplicate", "range", "empty"
    pub category: &'static str,
    /// Dotted path, e.g. "databases.primary"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result of validating a configuration file.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Load and validate a config file. Parse failures become a single
/// `syntax` error instead of an `Err`.
pub fn validate_file(path: &Path) -> ValidationResult {
    let diagnostics = match load_config(path) {
        Ok(config) => validate(&config),
        Err(e) => vec![Diagnostic::new(Severity::Error, "syntax", "", e.to_string())],
    };
    ValidationResult {
        diagnostics,
        config_path: Some(path.to_path_buf()),
    }
}

const MATCHING_CONDITIONS: [&str; 3] = ["search", "match", "fullmatch"];

/// Validate an already-parsed config.
pub fn validate(config: &SkiffConfig) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    for (section, modules) in config.sections() {
        let mut seen = HashSet::new();
        for (idx, module) in modules.iter().enumerate() {
            if module.name.trim().is_empty() {
                diagnostics.push(Diagnostic::new(
                    Severity::Error,
                    "empty",
                    format!("{section}[{idx}]"),
                    "module name must not be empty",
                ));
                continue;
            }
            if !seen.insert(module.name.as_str()) {
                diagnostics.push(Diagnostic::new(
                    Severity::Error,
                    "duplicate",
                    format!("{section}.{}", module.name),
                    format!("'{}' is configured more than once", module.name),
                ));
            }
        }
    }

    for skill in &config.skills {
        if let Some(factor) = skill.settings.get("score_factor") {
            let in_range = factor.as_f64().is_some_and(|f| (0.0..=1.0).contains(&f));
            if !in_range {
                diagnostics.push(Diagnostic::new(
                    Severity::Error,
                    "range",
                    format!("skills.{}.score_factor", skill.name),
                    format!("score_factor must be a number in [0, 1], got {factor}"),
                ));
            }
        }
        if let Some(Value::String(case)) = skill.settings.get("case_sensitive") {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "range",
                format!("skills.{}.case_sensitive", skill.name),
                format!("case_sensitive must be a boolean, got \"{case}\""),
            ));
        }
        if let Some(condition) = skill.settings.get("matching_condition") {
            let known = condition.as_str().is_some_and(|c| {
                MATCHING_CONDITIONS
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(c))
            });
            if !known {
                diagnostics.push(Diagnostic::new(
                    Severity::Error,
                    "range",
                    format!("skills.{}.matching_condition", skill.name),
                    format!(
                        "matching_condition must be one of {}, got {condition}",
                        MATCHING_CONDITIONS.join(", ")
                    ),
                ));
            }
        }
    }

    if !(0.0..=1.0).contains(&config.dispatch.min_score) {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "range",
            "dispatch.min_score",
            format!(
                "min_score must be in [0, 1], got {}",
                config.dispatch.min_score
            ),
        ));
    }

    if config.connectors.iter().all(|c| !c.enabled) {
        let message = if config.web.enabled {
            "no connectors enabled; only webhook and crontab skills will fire"
        } else {
            "no connectors enabled and the web API is off; nothing can reach the skills"
        };
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "empty",
            "connectors",
            message,
        ));
    }

    if config.runtime.grace_period_secs == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "range",
            "runtime.grace_period_secs",
            "in-flight skills are abandoned immediately on stop and reload",
        ));
    }

    if config.web.enabled && config.web.port == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Info,
            "range",
            "web.port",
            "port 0 binds a random free port",
        ));
    }

    diagnostics
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::schema::ModuleConfig, rstest::rstest};

    fn with_shell() -> SkiffConfig {
        SkiffConfig {
            connectors: vec![ModuleConfig::new("shell")],
            ..Default::default()
        }
    }

    #[test]
    fn minimal_config_is_clean() {
        assert!(validate(&with_shell()).is_empty());
    }

    #[test]
    fn duplicate_module_names_are_errors() {
        let mut cfg = with_shell();
        cfg.databases = vec![
            ModuleConfig::new("main").with_kind("sqlite"),
            ModuleConfig::new("main").with_kind("file"),
        ];
        let diags = validate(&cfg);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].category, "duplicate");
        assert_eq!(diags[0].path, "databases.main");
    }

    #[test]
    fn out_of_range_scores() {
        let mut cfg = with_shell();
        cfg.skills = vec![ModuleConfig::new("ping").with_setting("score_factor", 1.5.into())];
        cfg.dispatch.min_score = -0.1;
        let diags = validate(&cfg);
        assert_eq!(diags.len(), 2);
        assert!(diags.iter().all(|d| d.severity == Severity::Error));
    }

    #[rstest]
    #[case::lowercase("fullmatch", true)]
    #[case::any_case("Match", true)]
    #[case::typo("fulmatch", false)]
    fn matching_condition_values(#[case] condition: &str, #[case] valid: bool) {
        let mut cfg = with_shell();
        cfg.skills = vec![
            ModuleConfig::new("ping").with_setting("matching_condition", condition.into()),
        ];
        assert_eq!(validate(&cfg).is_empty(), valid);
    }

    #[test]
    fn no_connectors_warns() {
        let diags = validate(&SkiffConfig::default());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Warning);
    }

    #[test]
    fn syntax_error_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skiff.toml");
        std::fs::write(&path, "[[connectors]\nname=").unwrap();
        let result = validate_file(&path);
        assert!(result.has_errors());
        assert_eq!(result.count(Severity::Error), 1);
        assert_eq!(result.diagnostics[0].category, "syntax");
    }
}
