//! The probe loop: fetch ranked paths, hash what comes back, intersect the
//! implied version sets, and optionally winnow the survivors.

use crate::config::Config;
use crate::error_page::{self, ErrorPageFingerprint};
use crate::http::{FetchError, Fetcher};
use crate::infer;
use crate::massagers;
use crate::planner;
use crate::tables::builder::file_hash;
use crate::tables::store::TableCache;
use crate::tables::Tables;
use crate::version::Version;
use anyhow::Result;
use log::{debug, info, warn};
use serde::Serialize;
use std::path::PathBuf;

/// Consecutive low-level communication failures to tolerate before giving up.
pub const HOST_DOWN_THRESHOLD: u32 = 2;

pub const DEFAULT_NUM_PROBES: usize = 15;

#[derive(Debug, Clone, Default, Serialize)]
pub struct FingerprintResult {
    /// Every version consistent with what the server served, sorted.
    pub versions: Vec<Version>,
    /// Single recommendation; absent when every version was ruled out.
    pub best_guess: Option<Version>,
}

/// Per-session probing state shared by the fingerprinters and the app
/// guesser: the base URL, the error-page defense, and the consecutive
/// transport-failure counter.
pub(crate) struct ProbeSession<'a, F: Fetcher> {
    pub(crate) fetcher: &'a F,
    pub(crate) url: String,
    pub(crate) error_page: Option<ErrorPageFingerprint>,
    pub(crate) host_down_errors: u32,
}

impl<'a, F: Fetcher> ProbeSession<'a, F> {
    pub(crate) async fn start(fetcher: &'a F, url: String) -> Self {
        let error_page = error_page::identify_error_page(fetcher, &url).await;
        ProbeSession { fetcher, url, error_page, host_down_errors: 0 }
    }

    pub(crate) fn host_down(&self) -> bool {
        self.host_down_errors >= HOST_DOWN_THRESHOLD
    }

    /// Probes a single path and returns the version list implied by the
    /// response hash, or `None` when the probe yielded no information
    /// (unknown hash, custom 404, HTTP error, transport failure).
    pub(crate) async fn fingerprint_file(&mut self, path: &str, tables: &Tables) -> Option<Vec<Version>> {
        let url = if path.starts_with('/') {
            format!("{}{}", self.url, path)
        } else {
            format!("{}/{}", self.url, path)
        };

        let data = match self.fetcher.fetch(&url).await {
            Ok(data) => {
                self.host_down_errors = 0;
                data
            }
            Err(FetchError::Status { code }) => {
                info!("Hit {url}: error code {code}");
                return None;
            }
            Err(error @ FetchError::Transport { .. }) => {
                warn!("Hit {url}: {error}");
                self.host_down_errors += 1;
                return None;
            }
        };

        let Some(known_hashes) = tables.path_index.get(path) else {
            debug!("No fingerprints recorded for {path}");
            return None;
        };

        let digest = file_hash(&data, path);
        if let Some(versions) = known_hashes.get(&digest) {
            info!("Hit {url}; possible versions: {}", join_versions(versions));
            return Some(versions.clone());
        }

        // The raw hash missed; tolerate known-benign serving differences
        for subset in massagers::subsets() {
            let massaged_hash = file_hash(&massagers::apply(&subset, &data), path);
            if let Some(versions) = known_hashes.get(&massaged_hash) {
                info!(
                    "Hit {url} after canonicalization; possible versions: {}",
                    join_versions(versions)
                );
                return Some(versions.clone());
            }
        }

        if error_page::matches_error_page(self.error_page.as_ref(), &data) {
            debug!("Hit {url}: custom 404 page");
            return None;
        }

        info!("Hit {url}: retrieved file doesn't match any known fingerprint");
        None
    }
}

fn join_versions(versions: &[Version]) -> String {
    let mut sorted: Vec<&Version> = versions.iter().collect();
    sorted.sort();
    sorted.iter().map(|v| v.as_str()).collect::<Vec<_>>().join(", ")
}

/// Fingerprints the version of one web app installation.
pub struct WebAppFingerprinter<'a, F: Fetcher> {
    fetcher: &'a F,
    cache: &'a TableCache,
    url: String,
    app_name: String,
    db_path: PathBuf,
    num_probes: usize,
    winnow: bool,
}

impl<'a, F: Fetcher> WebAppFingerprinter<'a, F> {
    pub fn new(
        fetcher: &'a F,
        cache: &'a TableCache,
        config: &Config,
        url: &str,
        app_name: &str,
        num_probes: usize,
        winnow: bool,
    ) -> Self {
        WebAppFingerprinter {
            fetcher,
            cache,
            url: url.to_string(),
            app_name: app_name.to_string(),
            db_path: config.db_path(app_name),
            num_probes,
            winnow,
        }
    }

    /// Fetches the `num_probes` most useful paths and returns the ordered
    /// list of versions consistent with all of them, plus a best guess.
    pub async fn fingerprint(&self) -> Result<FingerprintResult> {
        let tables = self.cache.load(&self.db_path)?;
        info!("Starting fingerprint for version of {} at {}", self.app_name, self.url);

        let paths = planner::pick_fingerprint_files(&tables.path_index, &tables.all_versions);
        let mut session = ProbeSession::start(self.fetcher, self.url.clone()).await;

        let mut constraints: Vec<Vec<Version>> = Vec::new();
        for path in paths.iter().take(self.num_probes) {
            if let Some(versions) = session.fingerprint_file(path, &tables).await {
                constraints.push(versions);
            }
            if session.host_down() {
                warn!("Giving up on {}: host appears to be down", self.url);
                break;
            }
        }

        let candidates = infer::collapse_version_possibilities(&constraints);
        if self.winnow && candidates.len() > 1 && !session.host_down() {
            debug!("Candidates before winnowing: {}", join_versions(&candidates));
            self.winnow_versions(&mut session, &tables, &mut constraints, candidates).await;
        }

        let versions = infer::collapse_version_possibilities(&constraints);
        let best_guess = match versions.as_slice() {
            [] => None,
            [only] => Some(only.clone()),
            _ => infer::pick_likely_version(&versions),
        };

        match &best_guess {
            Some(guess) => info!(
                "Fingerprinting {} resulted in {} (best guess {guess})",
                self.app_name,
                join_versions(&versions)
            ),
            None => info!("Fingerprinting {} ruled out every known version", self.app_name),
        }
        Ok(FingerprintResult { versions, best_guess })
    }

    /// Second pass over paths chosen because their hash differs between
    /// subsets of the current candidate set. A probe that eliminates a
    /// version invalidates the remaining picks, so the paths are re-picked
    /// against the shrunken set.
    async fn winnow_versions(
        &self,
        session: &mut ProbeSession<'a, F>,
        tables: &Tables,
        constraints: &mut Vec<Vec<Version>>,
        mut candidates: Vec<Version>,
    ) {
        let mut attempts = 0usize;
        while candidates.len() > 1 && attempts < self.num_probes {
            let paths = planner::pick_winnow_files(
                &candidates,
                &tables.version_index,
                self.num_probes - attempts,
            );
            if paths.is_empty() {
                break;
            }
            for path in &paths {
                attempts += 1;
                if let Some(versions) = session.fingerprint_file(path, tables).await {
                    constraints.push(versions);
                    let narrowed = infer::collapse_version_possibilities(constraints);
                    if narrowed.len() < candidates.len() {
                        debug!("Winnowing eliminated a version; picking winnow files again");
                        candidates = narrowed;
                        break;
                    }
                }
                if session.host_down() {
                    return;
                }
                if attempts >= self.num_probes {
                    break;
                }
            }
        }
    }
}

/// Fingerprints a plugin of a configured web app, using the same probe loop
/// pointed below the app's plugins root.
pub struct PluginFingerprinter<'a, F: Fetcher> {
    inner: WebAppFingerprinter<'a, F>,
}

impl<'a, F: Fetcher> PluginFingerprinter<'a, F> {
    pub fn new(
        fetcher: &'a F,
        cache: &'a TableCache,
        config: &Config,
        url: &str,
        app_name: &str,
        plugin_name: &str,
        num_probes: usize,
        winnow: bool,
    ) -> Result<Self> {
        let plugins_root = config.plugins_root(app_name)?;
        let mut inner = WebAppFingerprinter::new(
            fetcher,
            cache,
            config,
            &format!("{url}{plugins_root}{plugin_name}"),
            app_name,
            num_probes,
            winnow,
        );
        inner.db_path = config.plugin_db_path(app_name, plugin_name);
        Ok(PluginFingerprinter { inner })
    }

    pub async fn fingerprint(&self) -> Result<FingerprintResult> {
        self.inner.fingerprint().await
    }
}
