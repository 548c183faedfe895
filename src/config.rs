use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Extension shared with the legacy database deployments.
pub const DB_EXTENSION: &str = ".pkl";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("Unsupported web app \"{0}\"")]
    UnknownApp(String),
    #[error("No pluginsRoot entry for {0}; plugins may not be supported for this app")]
    NoPluginsRoot(String),
}

/// Per-app knobs: how release directories are named, what never gets
/// fingerprinted, where plugins live and which files cheaply prove the app
/// exists at all.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Must carry exactly one capture group yielding the version string.
    pub version_directory_regex: String,
    #[serde(default)]
    pub directory_exclude_regex: Option<String>,
    #[serde(default)]
    pub file_exclude_regex: Option<String>,
    /// URL path component under which plugins are installed.
    #[serde(default)]
    pub plugins_root: Option<String>,
    #[serde(default)]
    pub plugins_directory_regex: Option<String>,
    /// Seed paths for existence probing; the planner derives its own set
    /// when this is empty.
    #[serde(default)]
    pub indicator_files: Vec<String>,
}

impl AppConfig {
    pub fn version_directory_regex(&self) -> Result<Regex> {
        Regex::new(&self.version_directory_regex)
            .with_context(|| format!("Invalid versionDirectoryRegex: {}", self.version_directory_regex))
    }

    pub fn directory_exclude_regex(&self) -> Result<Option<Regex>> {
        self.directory_exclude_regex
            .as_deref()
            .map(Regex::new)
            .transpose()
            .context("Invalid directoryExcludeRegex")
    }

    pub fn file_exclude_regex(&self) -> Result<Option<Regex>> {
        self.file_exclude_regex
            .as_deref()
            .map(Regex::new)
            .transpose()
            .context("Invalid fileExcludeRegex")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_dbs_dir")]
    pub dbs_dir: PathBuf,
    pub apps: BTreeMap<String, AppConfig>,
}

fn default_dbs_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("verscout").join("dbs"))
        .unwrap_or_else(|| PathBuf::from("dbs"))
}

impl Default for Config {
    fn default() -> Self {
        Config::builtin()
    }
}

impl Config {
    /// Loads a JSON config file (same shape as the built-in table).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// The stock app table, so the tool works without a config file.
    pub fn builtin() -> Self {
        let raw = include_str!("apps.json");
        serde_json::from_str(raw).expect("built-in app table is valid")
    }

    pub fn app(&self, app_name: &str) -> Result<&AppConfig, ConfigError> {
        self.apps
            .get(app_name)
            .ok_or_else(|| ConfigError::UnknownApp(app_name.to_string()))
    }

    pub fn plugins_root<'a>(&'a self, app_name: &str) -> Result<&'a str, ConfigError> {
        self.app(app_name)?
            .plugins_root
            .as_deref()
            .ok_or_else(|| ConfigError::NoPluginsRoot(app_name.to_string()))
    }

    pub fn db_path(&self, app_name: &str) -> PathBuf {
        self.dbs_dir.join(format!("{app_name}{DB_EXTENSION}"))
    }

    pub fn plugin_db_path(&self, app_name: &str, plugin_name: &str) -> PathBuf {
        self.plugin_db_dir(app_name).join(format!("{plugin_name}{DB_EXTENSION}"))
    }

    /// Directory holding the per-plugin databases of an app.
    pub fn plugin_db_dir(&self, app_name: &str) -> PathBuf {
        self.dbs_dir.join(app_name)
    }

    /// Names of the plugins with a database on disk, sorted. A missing
    /// plugin directory just means no plugins are supported yet.
    pub fn plugin_dbs(&self, app_name: &str) -> std::io::Result<Vec<String>> {
        let mut names = Vec::new();
        let entries = match std::fs::read_dir(self.plugin_db_dir(app_name)) {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(error) => return Err(error),
        };
        for entry in entries {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if let Some(stem) = name.strip_suffix(DB_EXTENSION) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
