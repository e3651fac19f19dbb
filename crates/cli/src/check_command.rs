use std::path::{Path, PathBuf};

use {
    anyhow::Result,
    skiff_channels::ConnectorRegistry,
    skiff_config::{Diagnostic, Severity, SkiffConfig, ValidationResult, load_config, validate},
    skiff_memory::BackendRegistry,
    skiff_skills::SkillCatalog,
};

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Validate `file` (or the discovered config) and print diagnostics.
/// Exits with status 1 when there are errors.
pub fn check(file: Option<PathBuf>, verbose: bool) -> Result<()> {
    let path = file.or_else(skiff_config::find_config_file);
    let result = match &path {
        Some(path) => {
            eprintln!("Checking {}\n", path.display());
            check_file(path)
        },
        None => {
            eprintln!("No config file found; checking defaults.\n");
            ValidationResult {
                diagnostics: validate(&SkiffConfig::default()),
                config_path: None,
            }
        },
    };

    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }

        let color = match d.severity {
            Severity::Error => RED,
            Severity::Warning => YELLOW,
            Severity::Info => CYAN,
        };

        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{}{RESET} {}", d.severity, d.message);
        } else {
            eprintln!("  {BOLD}{color}{}{RESET} {}: {}", d.severity, d.path, d.message);
        }
        shown += 1;
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if shown > 0 {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}

/// Schema validation plus a lookup of every module type against the
/// implementations compiled into this binary.
fn check_file(path: &Path) -> ValidationResult {
    let mut result = skiff_config::validate_file(path);
    if let Ok(config) = load_config(path) {
        result.diagnostics.extend(unknown_kinds(&config));
    }
    result
}

fn unknown_kinds(config: &SkiffConfig) -> Vec<Diagnostic> {
    let connectors = ConnectorRegistry::with_builtins();
    let backends = BackendRegistry::with_builtins();
    let skills = SkillCatalog::with_builtins();

    let mut diagnostics = Vec::new();
    for (section, modules) in config.sections() {
        let available = match section {
            "connectors" => connectors.kinds(),
            "databases" => backends.kinds(),
            _ => skills.kinds(),
        };
        for module in modules.iter().filter(|m| m.enabled) {
            if !available.contains(&module.kind()) {
                diagnostics.push(Diagnostic {
                    severity: Severity::Warning,
                    category: "unknown-type",
                    path: format!("{section}.{}", module.name),
                    message: format!(
                        "unknown type '{}' (available: {}); it will be skipped",
                        module.kind(),
                        available.join(", ")
                    ),
                });
            }
        }
    }
    diagnostics
}
