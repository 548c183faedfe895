//! One-shot scan: guess which apps live at a URL, fingerprint each, then
//! optionally do the same for their plugins. Results can be written to a
//! report file, JSON or plain text depending on the extension.

use crate::config::{Config, ConfigError};
use crate::engine::{FingerprintResult, PluginFingerprinter, WebAppFingerprinter};
use crate::guess::{PluginGuesser, WebAppGuesser};
use crate::http::Fetcher;
use crate::tables::store::TableCache;
use anyhow::{Context, Result};
use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct ScanReport {
    pub url: String,
    pub apps: BTreeMap<String, FingerprintResult>,
    pub plugins: BTreeMap<String, BTreeMap<String, FingerprintResult>>,
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scan results for {}", self.url)?;
        for (app, result) in &self.apps {
            let versions: Vec<&str> = result.versions.iter().map(|v| v.as_str()).collect();
            writeln!(f, "  - {app}: {versions:?}")?;
            if let Some(plugins) = self.plugins.get(app) {
                for (plugin, result) in plugins {
                    let versions: Vec<&str> = result.versions.iter().map(|v| v.as_str()).collect();
                    writeln!(f, "    -- {plugin}: {versions:?}")?;
                }
            }
        }
        Ok(())
    }
}

impl ScanReport {
    /// Writes the report; a `.json` extension selects JSON, anything else
    /// the text rendering. Parent directories are created.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let rendered = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            _ => self.to_string(),
        };
        std::fs::write(path, rendered)
            .with_context(|| format!("Failed to write report to {}", path.display()))
    }
}

pub struct Scanner<'a, F: Fetcher> {
    fetcher: &'a F,
    cache: &'a TableCache,
    config: &'a Config,
    url: String,
    scan_plugins: bool,
    num_probes: usize,
    winnow: bool,
}

impl<'a, F: Fetcher> Scanner<'a, F> {
    pub fn new(
        fetcher: &'a F,
        cache: &'a TableCache,
        config: &'a Config,
        url: &str,
        scan_plugins: bool,
        num_probes: usize,
        winnow: bool,
    ) -> Self {
        Scanner {
            fetcher,
            cache,
            config,
            url: url.to_string(),
            scan_plugins,
            num_probes,
            winnow,
        }
    }

    pub async fn scan(&self) -> Result<ScanReport> {
        let mut report = ScanReport {
            url: self.url.clone(),
            apps: BTreeMap::new(),
            plugins: BTreeMap::new(),
        };

        let mut guesser = WebAppGuesser::new(self.fetcher, self.cache, self.config, &self.url);
        let possible_apps = guesser.guess_apps(None).await?;
        info!("Possible apps at {}: {possible_apps:?}", self.url);

        for app_name in &possible_apps {
            let fingerprinter = WebAppFingerprinter::new(
                self.fetcher,
                self.cache,
                self.config,
                &self.url,
                app_name,
                self.num_probes,
                self.winnow,
            );
            report.apps.insert(app_name.clone(), fingerprinter.fingerprint().await?);
        }

        if self.scan_plugins {
            for app_name in &possible_apps {
                let mut guesser =
                    match PluginGuesser::new(self.fetcher, self.cache, self.config, &self.url, app_name) {
                        Ok(guesser) => guesser,
                        Err(error) if error.is::<ConfigError>() => {
                            debug!("Skipping plugins for {app_name}: {error}");
                            continue;
                        }
                        Err(error) => return Err(error),
                    };
                let mut found = BTreeMap::new();
                for plugin_name in guesser.guess_plugins().await? {
                    let fingerprinter = PluginFingerprinter::new(
                        self.fetcher,
                        self.cache,
                        self.config,
                        &self.url,
                        app_name,
                        &plugin_name,
                        self.num_probes,
                        self.winnow,
                    )?;
                    found.insert(plugin_name, fingerprinter.fingerprint().await?);
                }
                report.plugins.insert(app_name.clone(), found);
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;

    fn sample_report() -> ScanReport {
        let mut apps = BTreeMap::new();
        apps.insert(
            "joomla".to_string(),
            FingerprintResult {
                versions: vec![Version::new("1.5.12")],
                best_guess: Some(Version::new("1.5.12")),
            },
        );
        let mut joomla_plugins = BTreeMap::new();
        joomla_plugins.insert(
            "tinymce".to_string(),
            FingerprintResult { versions: vec![Version::new("3.0")], best_guess: Some(Version::new("3.0")) },
        );
        let mut plugins = BTreeMap::new();
        plugins.insert("joomla".to_string(), joomla_plugins);
        ScanReport { url: "http://example.com".to_string(), apps, plugins }
    }

    #[test]
    fn text_rendering_nests_plugins_under_apps() {
        let rendered = sample_report().to_string();
        assert!(rendered.contains("Scan results for http://example.com"));
        assert!(rendered.contains("  - joomla: [\"1.5.12\"]"));
        assert!(rendered.contains("    -- tinymce: [\"3.0\"]"));
    }

    #[test]
    fn report_extension_selects_the_format() {
        let dir = tempfile::tempdir().unwrap();
        let report = sample_report();

        let json_path = dir.path().join("out/report.json");
        report.write_to(&json_path).unwrap();
        let raw = std::fs::read_to_string(&json_path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["apps"]["joomla"]["best_guess"], "1.5.12");

        let text_path = dir.path().join("report.txt");
        report.write_to(&text_path).unwrap();
        let raw = std::fs::read_to_string(&text_path).unwrap();
        assert!(raw.starts_with("Scan results for"));
    }
}
