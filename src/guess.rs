//! Existence detection: which supported apps (and which plugins) are
//! installed at a URL, without fingerprinting their versions.

use crate::config::Config;
use crate::engine::ProbeSession;
use crate::error_page::{self, ErrorPageFingerprint};
use crate::http::Fetcher;
use crate::planner;
use crate::tables::store::TableCache;
use anyhow::Result;
use log::{debug, info, warn};

/// Probes a small number of indicator files per supported app to check for
/// existence. An app counts as present only on a known-hash hit.
pub struct WebAppGuesser<'a, F: Fetcher> {
    cache: &'a TableCache,
    config: &'a Config,
    session: ProbeSession<'a, F>,
    identified_error_page: bool,
}

impl<'a, F: Fetcher> WebAppGuesser<'a, F> {
    pub fn new(fetcher: &'a F, cache: &'a TableCache, config: &'a Config, url: &str) -> Self {
        WebAppGuesser {
            cache,
            config,
            session: ProbeSession {
                fetcher,
                url: url.to_string(),
                error_page: None,
                host_down_errors: 0,
            },
            identified_error_page: false,
        }
    }

    async fn ensure_error_page(&mut self) {
        if !self.identified_error_page {
            self.session.error_page =
                error_page::identify_error_page(self.session.fetcher, &self.session.url).await;
            self.identified_error_page = true;
        }
    }

    /// Checks every configured app (or the supplied subset) and returns the
    /// names with at least one positive indicator probe. One host-down
    /// budget covers the whole run.
    pub async fn guess_apps(&mut self, app_list: Option<&[String]>) -> Result<Vec<String>> {
        self.ensure_error_page().await;

        let apps: Vec<String> = match app_list {
            Some(list) => list.to_vec(),
            None => self.config.apps.keys().cloned().collect(),
        };

        let mut possible_apps = Vec::new();
        for app_name in apps {
            if self.guess_app(&app_name).await? {
                possible_apps.push(app_name);
            }
            if self.session.host_down() {
                warn!("Giving up guessing at {}: host appears to be down", self.session.url);
                break;
            }
        }
        Ok(possible_apps)
    }

    /// Whether the named app is installed, judged by its indicator files.
    pub async fn guess_app(&mut self, app_name: &str) -> Result<bool> {
        self.ensure_error_page().await;

        let db_path = self.config.db_path(app_name);
        if !db_path.exists() {
            debug!("No database for {app_name} at {}; skipping", db_path.display());
            return Ok(false);
        }
        let tables = self.cache.load(&db_path)?;
        let app = self.config.app(app_name)?;

        let indicator_files = if app.indicator_files.is_empty() {
            planner::pick_indicator_files(&tables.version_index, &tables.all_versions)
        } else {
            app.indicator_files.clone()
        };

        for file in &indicator_files {
            if self.session.fingerprint_file(file, &tables).await.is_some() {
                return Ok(true);
            }
            if self.session.host_down() {
                break;
            }
        }
        Ok(false)
    }
}

/// Discovers installed plugins of one app by probing indicator files under
/// the plugins root.
///
/// Presence here is deliberately weaker than the app guesser's known-hash
/// requirement: a plugin counts as present as soon as an indicator file
/// returns data that is not the host's custom 404 page. Plugin trees change
/// too often between point releases for a hash requirement to be useful.
pub struct PluginGuesser<'a, F: Fetcher> {
    fetcher: &'a F,
    cache: &'a TableCache,
    config: &'a Config,
    app_name: String,
    url: String,
    error_page: Option<ErrorPageFingerprint>,
    identified_error_page: bool,
}

impl<'a, F: Fetcher> PluginGuesser<'a, F> {
    pub fn new(
        fetcher: &'a F,
        cache: &'a TableCache,
        config: &'a Config,
        url: &str,
        app_name: &str,
    ) -> Result<Self> {
        let plugins_root = config.plugins_root(app_name)?;
        Ok(PluginGuesser {
            fetcher,
            cache,
            config,
            app_name: app_name.to_string(),
            url: format!("{url}{plugins_root}"),
            error_page: None,
            identified_error_page: false,
        })
    }

    async fn ensure_error_page(&mut self) {
        if !self.identified_error_page {
            self.error_page = error_page::identify_error_page(self.fetcher, &self.url).await;
            self.identified_error_page = true;
        }
    }

    /// Checks every plugin with a database on disk, sorted by name.
    pub async fn guess_plugins(&mut self) -> Result<Vec<String>> {
        let mut possible_plugins = Vec::new();
        for plugin_name in self.config.plugin_dbs(&self.app_name)? {
            if self.guess_plugin(&plugin_name).await? {
                possible_plugins.push(plugin_name);
            }
        }
        possible_plugins.sort();
        info!("Possible plugins: {possible_plugins:?}");
        Ok(possible_plugins)
    }

    /// Whether the named plugin is installed.
    pub async fn guess_plugin(&mut self, plugin_name: &str) -> Result<bool> {
        let tables = self.cache.load(self.config.plugin_db_path(&self.app_name, plugin_name))?;
        self.ensure_error_page().await;

        for file in planner::pick_indicator_files(&tables.version_index, &tables.all_versions) {
            let url = format!("{}{}{}", self.url, plugin_name, file);
            match self.fetcher.fetch(&url).await {
                Ok(data) => {
                    return Ok(!error_page::matches_error_page(self.error_page.as_ref(), &data));
                }
                Err(error) => debug!("Hit {url}: {error}"),
            }
        }
        Ok(false)
    }
}
