// src/config/mod.rs

//! Configuration: TOML model, bundler profiles, loading and validation.

pub mod bundler;
pub mod loader;
pub mod model;
pub mod validate;

pub use bundler::{BundlerOverlay, BundlerSection, BundlerSettings};
pub use loader::{config_root_dir, default_config_path, load_and_validate, load_from_path};
pub use model::{
    ActionKind, ConfigFile, ConfigSection, ProxySection, RawConfigFile, RouteConfig, TaskConfig,
    WatchRuleConfig,
};
