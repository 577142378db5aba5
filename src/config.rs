// src/config.rs

//! Runtime configuration
//!
//! Every field has a default, so an empty JSON object (or no config file at
//! all) yields a usable configuration for the host system.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default location of the provenance database
pub const DEFAULT_DB_PATH: &str = "/var/lib/pkgtxn/provenance.db";

/// Per-repository settings the transaction core cares about
#[derive(Debug, Clone, Deserialize)]
pub struct RepoConfig {
    pub id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether group (comps) metadata from this repo may be used
    #[serde(default = "default_true")]
    pub enablegroups: bool,
    /// Local path of the repo's comps file, once metadata has been fetched
    #[serde(default)]
    pub comps_path: Option<PathBuf>,
}

impl RepoConfig {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            enabled: true,
            enablegroups: true,
            comps_path: None,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub installroot: PathBuf,
    pub db_path: PathBuf,
    /// Lock file path is `<lock_prefix><pid_filename><lock_suffix>`
    pub lock_prefix: String,
    pub pid_filename: String,
    pub lock_suffix: String,
    /// Directory holding generated index caches
    pub tmpdir: PathBuf,
    pub releasever: Option<String>,
    pub clean_requirements_on_remove: bool,
    pub repos: Vec<RepoConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            installroot: PathBuf::from("/"),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            lock_prefix: "/var/run/".to_string(),
            pid_filename: "pkgtxn.pid".to_string(),
            lock_suffix: String::new(),
            tmpdir: PathBuf::from("/var/tmp/pkgtxn"),
            releasever: None,
            clean_requirements_on_remove: true,
            repos: Vec::new(),
        }
    }
}

impl Config {
    /// Load a JSON configuration file
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());

        let content = fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        serde_json::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Invalid config {}: {}", path.display(), e)))
    }

    pub fn lock_path(&self) -> PathBuf {
        PathBuf::from(format!(
            "{}{}{}",
            self.lock_prefix, self.pid_filename, self.lock_suffix
        ))
    }

    /// Repositories that are switched on
    pub fn enabled_repos(&self) -> impl Iterator<Item = &RepoConfig> {
        self.repos.iter().filter(|r| r.enabled)
    }

    /// The OS release tag recorded with every installed package
    ///
    /// Uses the configured value when present, otherwise `VERSION_ID` from
    /// `<installroot>/etc/os-release`, otherwise `"unknown"`.
    pub fn releasever(&self) -> String {
        if let Some(ref ver) = self.releasever {
            return ver.clone();
        }

        let os_release = self.installroot.join("etc/os-release");
        fs::read_to_string(&os_release)
            .ok()
            .and_then(|content| parse_version_id(&content))
            .unwrap_or_else(|| "unknown".to_string())
    }
}

fn parse_version_id(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let value = line.trim().strip_prefix("VERSION_ID=")?;
        let value = value.trim_matches(|c| c == '"' || c == '\'');
        (!value.is_empty()).then(|| value.to_string())
    })
}
