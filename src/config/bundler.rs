// src/config/bundler.rs

//! Typed bundler settings and profile overlays.
//!
//! ```toml
//! [bundler]
//! entry_points = ["app/index.js"]
//! public_path = "/assets/js/"
//!
//! [bundler.profiles.dev]
//! devtool = "source-map"
//! hot_reload = true
//!
//! [bundler.profiles.release]
//! mode = "production"
//! minify = true
//! define = { NODE_ENV = "\"production\"" }
//! ```
//!
//! A set overlay field replaces the base value wholesale, lists included.
//! `define` is the exception: it merges key by key, overlay keys winning.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::BuildMode;

/// Fully resolved bundler settings for one bundle task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundlerSettings {
    pub mode: BuildMode,
    pub devtool: Option<String>,
    pub hot_reload: bool,
    pub minify: bool,
    pub entry_points: Vec<String>,
    pub public_path: Option<String>,
    pub define: BTreeMap<String, String>,
}

/// Partial settings; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BundlerOverlay {
    #[serde(default)]
    pub mode: Option<BuildMode>,
    #[serde(default)]
    pub devtool: Option<String>,
    #[serde(default)]
    pub hot_reload: Option<bool>,
    #[serde(default)]
    pub minify: Option<bool>,
    #[serde(default)]
    pub entry_points: Option<Vec<String>>,
    #[serde(default)]
    pub public_path: Option<String>,
    #[serde(default)]
    pub define: BTreeMap<String, String>,
}

impl BundlerSettings {
    /// Return a copy of `self` with `overlay` applied.
    pub fn apply(&self, overlay: &BundlerOverlay) -> Self {
        let mut define = self.define.clone();
        define.extend(overlay.define.iter().map(|(k, v)| (k.clone(), v.clone())));

        Self {
            mode: overlay.mode.unwrap_or(self.mode),
            devtool: overlay.devtool.clone().or_else(|| self.devtool.clone()),
            hot_reload: overlay.hot_reload.unwrap_or(self.hot_reload),
            minify: overlay.minify.unwrap_or(self.minify),
            entry_points: overlay
                .entry_points
                .clone()
                .unwrap_or_else(|| self.entry_points.clone()),
            public_path: overlay
                .public_path
                .clone()
                .or_else(|| self.public_path.clone()),
            define,
        }
    }

    /// Environment variables handed to the bundler command.
    pub fn to_env(&self) -> BTreeMap<String, String> {
        let flag = |b: bool| if b { "1" } else { "0" }.to_string();

        let mut env = BTreeMap::new();
        env.insert("NODE_ENV".to_string(), self.mode.as_str().to_string());
        env.insert("PIPEWORKS_BUNDLE_HOT".to_string(), flag(self.hot_reload));
        env.insert("PIPEWORKS_BUNDLE_MINIFY".to_string(), flag(self.minify));
        if let Some(devtool) = &self.devtool {
            env.insert("PIPEWORKS_BUNDLE_DEVTOOL".to_string(), devtool.clone());
        }
        if !self.entry_points.is_empty() {
            env.insert(
                "PIPEWORKS_BUNDLE_ENTRY".to_string(),
                self.entry_points.join(","),
            );
        }
        if let Some(public_path) = &self.public_path {
            env.insert(
                "PIPEWORKS_BUNDLE_PUBLIC_PATH".to_string(),
                public_path.clone(),
            );
        }
        for (key, value) in &self.define {
            env.insert(format!("PIPEWORKS_DEFINE_{}", env_key(key)), value.clone());
        }
        env
    }
}

fn env_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// `[bundler]` section: base settings plus named profiles.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BundlerSection {
    #[serde(flatten)]
    pub base: BundlerOverlay,

    #[serde(default)]
    pub profiles: BTreeMap<String, BundlerOverlay>,
}

impl BundlerSection {
    pub fn base_settings(&self) -> BundlerSettings {
        BundlerSettings::default().apply(&self.base)
    }

    /// Base settings with the named profile applied, if it exists.
    pub fn profile(&self, name: &str) -> Option<BundlerSettings> {
        self.profiles
            .get(name)
            .map(|overlay| self.base_settings().apply(overlay))
    }
}
