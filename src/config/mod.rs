// src/config/mod.rs

//! Configuration for watchproxy.
//!
//! - `model.rs`: the TOML data model.
//! - `loader.rs`: reading a config file from disk.
//! - `validate.rs`: semantic checks, including continuation cycles.
//! - `env.rs`: environment composition and `$VAR` expansion.
//! - `service.rs`: turning a validated config into runnable rules.

pub mod env;
pub mod loader;
pub mod model;
pub mod service;
pub mod validate;

pub use loader::{config_base_dir, default_config_path, load_and_validate, load_from_path};
pub use model::{ConfigFile, RawConfigFile, RuleConfig, ServiceSection};
pub use service::{DEFAULT_REFRESH, Service, ServiceOverrides};
pub use validate::validate_config;
