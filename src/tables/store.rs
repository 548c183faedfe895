use super::Tables;
use log::info;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("Failed to access database {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Database {path} is not a valid table blob: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Database {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Persists the table triple as a self-describing JSON blob. The BTreeMap
/// backing makes the encoding byte-deterministic for identical inputs.
pub fn save_tables(path: impl AsRef<Path>, tables: &Tables) -> Result<(), StoreError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|source| StoreError::Io { path: path.to_path_buf(), source })?;
    }
    let blob = serde_json::to_vec(tables)
        .map_err(|source| StoreError::Format { path: path.to_path_buf(), source })?;
    std::fs::write(path, blob).map_err(|source| StoreError::Io { path: path.to_path_buf(), source })
}

/// Loads and validates a blob written by [`save_tables`]. Invariant
/// violations are fatal for the session that wanted the database.
pub fn load_tables(path: impl AsRef<Path>) -> Result<Tables, StoreError> {
    let path = path.as_ref();
    let blob = std::fs::read(path).map_err(|source| StoreError::Io { path: path.to_path_buf(), source })?;
    let tables: Tables = serde_json::from_slice(&blob)
        .map_err(|source| StoreError::Format { path: path.to_path_buf(), source })?;
    tables
        .validate()
        .map_err(|corrupt| StoreError::Corrupt { path: path.to_path_buf(), reason: corrupt.to_string() })?;
    info!(
        "Loaded {} with {} versions, {} differentiating paths, and {} version groups.",
        path.display(),
        tables.all_versions.len(),
        tables.path_index.len(),
        tables.version_index.len()
    );
    Ok(tables)
}

/// Scoped load cache keyed by filename. Loaded tables are shared read-only;
/// a second request for the same file returns the same `Arc`.
#[derive(Default)]
pub struct TableCache {
    loaded: Mutex<HashMap<PathBuf, Arc<Tables>>>,
}

impl TableCache {
    pub fn new() -> Self {
        TableCache::default()
    }

    pub fn load(&self, path: impl AsRef<Path>) -> Result<Arc<Tables>, StoreError> {
        let path = path.as_ref();
        let mut loaded = self.loaded.lock().expect("table cache poisoned");
        if let Some(tables) = loaded.get(path) {
            return Ok(Arc::clone(tables));
        }
        let tables = Arc::new(load_tables(path)?);
        loaded.insert(path.to_path_buf(), Arc::clone(&tables));
        Ok(tables)
    }
}
