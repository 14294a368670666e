//! Configuration loading, validation, and env substitution.
//!
//! Config files: `resonance.toml`, `resonance.yaml`, or `resonance.json`.
//! Searched in `./` then `~/.config/resonance/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{
        config_dir, discover_and_load, find_or_default_config_path, load_config,
        load_config_value, save_config,
    },
    schema::{
        AuthConfig, BusConfig, GatewayConfig, KvConfig, LogicConfig, RegistryConfig,
        ResonanceConfig, StorageConfig, TaskConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
