//! User-level configuration.
//!
//! `~/.stackline.yaml` is optional; a missing or malformed file falls back
//! to defaults. Tokens configured here take precedence over environment
//! variables and helper CLIs.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

const SETTINGS_FILE: &str = ".stackline.yaml";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub forge: ForgeSettings,
    #[serde(default)]
    pub git: GitSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ForgeSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gitlab_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitSettings {
    #[serde(default = "default_remote")]
    pub remote: String,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            remote: default_remote(),
        }
    }
}

fn default_remote() -> String {
    "origin".to_string()
}

impl Settings {
    /// Load settings from the user's home directory.
    pub fn load() -> Self {
        match std::env::var_os("HOME") {
            Some(home) => Self::load_from_file(&Path::new(&home).join(SETTINGS_FILE)),
            None => Self::default(),
        }
    }

    pub fn load_from_file(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(data) => serde_yaml::from_str(&data).unwrap_or_else(|err| {
                warn!("ignoring malformed settings file {}: {err}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }
}
