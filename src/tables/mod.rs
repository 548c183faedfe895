//! The fingerprint database: two dual indices over every known release.
//!
//! `path_index` answers "this file hashed to H, which versions is that
//! consistent with?"; `version_index` answers "which (path, hash) pairs pin
//! down exactly this group of versions?". Both are projections of the same
//! underlying multi-set and must never drift.

use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

pub mod builder;
pub mod store;

/// `path -> hash -> sorted versions consistent with that hash`.
pub type PathIndex = BTreeMap<String, BTreeMap<String, Vec<Version>>>;

/// `sorted comma-joined version group -> (path, hash) pairs asserting it`.
pub type VersionIndex = BTreeMap<String, Vec<(String, String)>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tables {
    pub path_index: PathIndex,
    pub version_index: VersionIndex,
    pub all_versions: Vec<Version>,
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct CorruptDatabase(pub String);

/// Key of the version group asserting a (path, hash) pair.
pub fn group_key(versions: &[Version]) -> String {
    let mut sorted: Vec<&Version> = versions.iter().collect();
    sorted.sort();
    sorted.iter().map(|v| v.as_str()).collect::<Vec<_>>().join(",")
}

pub fn parse_group_key(key: &str) -> Vec<Version> {
    if key.is_empty() {
        return Vec::new();
    }
    key.split(',').map(Version::new).collect()
}

/// Member count of a group key without allocating the versions.
pub fn group_size(key: &str) -> usize {
    if key.is_empty() { 0 } else { key.split(',').count() }
}

impl Tables {
    /// Checks the invariants linking the two indices to the version universe.
    /// Violations mean the blob was built by a broken or tampered writer and
    /// are fatal for the session loading it.
    pub fn validate(&self) -> Result<(), CorruptDatabase> {
        if self.all_versions.windows(2).any(|w| w[0] >= w[1]) {
            return Err(CorruptDatabase("version universe is not sorted and duplicate-free".into()));
        }
        let universe: BTreeSet<&Version> = self.all_versions.iter().collect();

        let mut seen: BTreeSet<&Version> = BTreeSet::new();
        for (path, hashes) in &self.path_index {
            for (hash, versions) in hashes {
                if versions.is_empty() {
                    return Err(CorruptDatabase(format!("empty version set for ({path}, {hash})")));
                }
                if versions.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(CorruptDatabase(format!("unsorted version set for ({path}, {hash})")));
                }
                seen.extend(versions.iter());
                let key = group_key(versions);
                let group_holds_pair = self
                    .version_index
                    .get(&key)
                    .is_some_and(|pairs| pairs.iter().any(|(p, h)| p == path && h == hash));
                if !group_holds_pair {
                    return Err(CorruptDatabase(format!(
                        "({path}, {hash}) missing from version group {key}"
                    )));
                }
            }
        }
        if seen != universe {
            return Err(CorruptDatabase(
                "version universe disagrees with the union of path index entries".into(),
            ));
        }

        for (key, pairs) in &self.version_index {
            let group = parse_group_key(key);
            for (path, hash) in pairs {
                let matches = self
                    .path_index
                    .get(path)
                    .and_then(|hashes| hashes.get(hash))
                    .is_some_and(|versions| *versions == group);
                if !matches {
                    return Err(CorruptDatabase(format!(
                        "version group {key} claims ({path}, {hash}) but the path index disagrees"
                    )));
                }
            }
        }
        Ok(())
    }
}
