//! Configuration schema, discovery, loading and validation.
//!
//! Config files: `skiff.toml`, `skiff.yaml`, `skiff.yml` or `skiff.json`,
//! searched in `./` then the user config dir (`~/.config/skiff/` on Linux).
//!
//! `${ENV_VAR}` placeholders are substituted before parsing.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{config_dir, discover_and_load, find_config_file, load_config},
    schema::{
        DispatchConfig, DispatchPolicy, LoggingConfig, ModuleConfig, RuntimeConfig, SkiffConfig,
        WebConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate, validate_file},
};
