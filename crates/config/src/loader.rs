use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{Error, Result, env_subst::substitute_env, schema::SkiffConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["skiff.toml", "skiff.yaml", "skiff.yml", "skiff.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<SkiffConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::read(path, e))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./skiff.{toml,yaml,yml,json}`
/// 2. `<user config dir>/skiff/skiff.{toml,yaml,yml,json}`
///
/// Returns the discovered path alongside the config so a later reload can
/// re-read the same file. Falls back to `SkiffConfig::default()` when nothing
/// is found or the file fails to parse.
pub fn discover_and_load() -> (SkiffConfig, Option<PathBuf>) {
    let Some(path) = find_config_file() else {
        debug!("no config file found, using defaults");
        return (SkiffConfig::default(), None);
    };
    debug!(path = %path.display(), "loading config");
    match load_config(&path) {
        Ok(cfg) => (cfg, Some(path)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            (SkiffConfig::default(), Some(path))
        },
    }
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/skiff/` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "skiff").map(|d| d.config_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> Result<SkiffConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => Err(Error::unsupported_format(ext)),
    }
}
