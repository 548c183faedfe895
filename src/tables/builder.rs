use super::{PathIndex, Tables, VersionIndex, group_key};
use crate::version::Version;
use anyhow::{Context, Result, bail};
use log::{debug, info};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BuildError {
    #[error("No version directories matching the pattern in {0}")]
    NoVersionsFound(String),
    #[error("Hash {hash} recorded for divergent paths {first} and {second}")]
    DivergentHash { hash: String, first: String, second: String },
}

/// Filters applied while walking release trees. Name matches are anchored at
/// the start of the directory or file name.
#[derive(Debug, Default)]
pub struct WalkFilters {
    pub directory_exclude: Option<Regex>,
    pub file_exclude: Option<Regex>,
}

fn matches_at_start(pattern: &Regex, name: &str) -> bool {
    pattern.find(name).is_some_and(|m| m.start() == 0)
}

/// Walks every release directory under `basepath` whose name matches
/// `version_directory_regex` (group 1 captures the version), hashes every
/// retained file, and condenses the result into the dual-index [`Tables`].
///
/// Unreadable files are fatal: the operator must fix the release trees, a
/// database with silent holes would poison every later scan.
pub fn compute_tables(
    basepath: impl AsRef<Path>,
    version_directory_regex: &Regex,
    filters: &WalkFilters,
) -> Result<Tables> {
    let basepath = basepath.as_ref();
    if version_directory_regex.captures_len() < 2 {
        bail!(
            "version directory pattern {version_directory_regex} must capture the version number"
        );
    }

    // hash -> every (version, path) that produced it; the seed for version_index
    let mut hash_index: BTreeMap<String, Vec<(Version, String)>> = BTreeMap::new();
    let mut path_index: PathIndex = BTreeMap::new();
    let mut all_versions: Vec<Version> = Vec::new();
    let mut file_count = 0usize;

    let mut roots: Vec<(Version, std::path::PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(basepath)
        .with_context(|| format!("Failed to list release trees in {}", basepath.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        match Version::capture(version_directory_regex, &name) {
            Some(version) => roots.push((version, entry.path())),
            None => debug!("Skipping non-release directory {name}"),
        }
    }
    if roots.is_empty() {
        return Err(BuildError::NoVersionsFound(basepath.display().to_string()).into());
    }
    roots.sort_by(|a, b| a.0.cmp(&b.0));

    for (version, root) in &roots {
        debug!("Hashing release tree {} as version {version}", root.display());
        all_versions.push(version.clone());

        let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !filters
                .directory_exclude
                .as_ref()
                .is_some_and(|pattern| matches_at_start(pattern, &name))
        });

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if filters
                .file_exclude
                .as_ref()
                .is_some_and(|pattern| matches_at_start(pattern, &name))
            {
                continue;
            }

            let rel_path = relative_url_path(entry.path(), root)?;
            let bytes = std::fs::read(entry.path())
                .with_context(|| format!("Failed to read {}", entry.path().display()))?;
            let hash = file_hash(&bytes, &rel_path);
            file_count += 1;

            hash_index
                .entry(hash.clone())
                .or_default()
                .push((version.clone(), rel_path.clone()));
            path_index
                .entry(rel_path)
                .or_default()
                .entry(hash)
                .or_default()
                .push(version.clone());
        }
    }

    let mut version_index: VersionIndex = VersionIndex::new();
    for (hash, entries) in &hash_index {
        let first_path = &entries[0].1;
        if let Some((_, divergent)) = entries.iter().find(|(_, path)| path != first_path) {
            return Err(BuildError::DivergentHash {
                hash: hash.clone(),
                first: first_path.clone(),
                second: divergent.clone(),
            }
            .into());
        }
        let versions: Vec<Version> = entries.iter().map(|(version, _)| version.clone()).collect();
        version_index
            .entry(group_key(&versions))
            .or_default()
            .push((first_path.clone(), hash.clone()));
    }

    for hashes in path_index.values_mut() {
        for versions in hashes.values_mut() {
            versions.sort();
        }
    }
    all_versions.sort();
    all_versions.dedup();

    info!(
        "Processed {} versions with {} files matching filter, resulting in {} unique hashes, \
         {} differentiating paths, and {} version groups.",
        all_versions.len(),
        file_count,
        hash_index.len(),
        path_index.len(),
        version_index.len()
    );

    Ok(Tables { path_index, version_index, all_versions })
}

/// Digest of `bytes ∥ path` as lowercase hex. Hashing the path in keeps
/// identical file contents at different locations from colliding.
pub fn file_hash(bytes: &[u8], rel_path: &str) -> String {
    let mut input = Vec::with_capacity(bytes.len() + rel_path.len());
    input.extend_from_slice(bytes);
    input.extend_from_slice(rel_path.as_bytes());
    format!("{:x}", md5::compute(input))
}

/// The portion of `path` below the release root, `/`-separated with the
/// leading slash preserved: the URL path a scanner would fetch it at.
fn relative_url_path(path: &Path, root: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .with_context(|| format!("{} escaped release root {}", path.display(), root.display()))?;
    let joined = rel
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    Ok(format!("/{joined}"))
}
