//! Chooses which paths to spend the probe budget on.

use crate::tables::{PathIndex, VersionIndex, group_size};
use crate::version::Version;
use log::debug;
use std::collections::BTreeSet;

/// Every known path, most informative first.
///
/// The fitness function rewards paths present across many versions (broad
/// coverage means the probe almost always yields a constraint) and paths
/// with many distinct hashes (more variation means more bits per probe):
/// `fitness = |versions covered| / |all versions| + |distinct hashes|`.
pub fn pick_fingerprint_files(path_index: &PathIndex, all_versions: &[Version]) -> Vec<String> {
    let universe = all_versions.len().max(1) as f64;
    let mut ranked: Vec<(f64, &String)> = path_index
        .iter()
        .map(|(path, hashes)| {
            let coverage: usize = hashes.values().map(Vec::len).sum();
            let fitness = coverage as f64 / universe + hashes.len() as f64;
            (fitness, path)
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.cmp(b.1))
    });
    ranked.into_iter().map(|(_, path)| path.clone()).collect()
}

/// A few files that should exist in (nearly) every release, for cheap
/// existence probing.
///
/// Starts by demanding a version group that spans every known version and
/// backs the threshold off until at least two groups qualify, then takes the
/// first two (path, hash) entries of each.
pub fn pick_indicator_files(version_index: &VersionIndex, all_versions: &[Version]) -> Vec<String> {
    let mut qualifying: Vec<&String> = Vec::new();
    let mut threshold = all_versions.len();
    while qualifying.len() < 2 && threshold > 0 {
        qualifying = version_index.keys().filter(|key| group_size(key) >= threshold).collect();
        threshold -= 1;
    }

    let mut indicator_files: Vec<String> = Vec::new();
    for key in qualifying {
        for (path, _hash) in version_index[key].iter().take(2) {
            if !indicator_files.contains(path) {
                indicator_files.push(path.clone());
            }
        }
    }
    indicator_files
}

/// Paths whose recorded hash discriminates within the current candidate set:
/// each comes from a version group that contains one of the candidates but
/// is strictly smaller than the candidate set, so fetching it must either
/// confirm or eliminate versions. Each group contributes at most one path.
pub fn pick_winnow_files(
    candidates: &[Version],
    version_index: &VersionIndex,
    max_paths: usize,
) -> Vec<String> {
    let mut winnow_paths: Vec<String> = Vec::new();
    let mut selected_groups: BTreeSet<&String> = BTreeSet::new();

    for candidate in candidates {
        debug!(
            "Winnow candidate {candidate}: {} of {max_paths} paths selected",
            winnow_paths.len()
        );
        for (key, pairs) in version_index {
            if selected_groups.contains(key) || group_size(key) >= candidates.len() {
                continue;
            }
            if !key.split(',').any(|member| member == candidate.as_str()) {
                continue;
            }
            selected_groups.insert(key);
            if let Some((path, _hash)) = pairs.first() {
                winnow_paths.push(path.clone());
            }
            if winnow_paths.len() >= max_paths {
                return winnow_paths;
            }
        }
    }
    winnow_paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::PathIndex;

    fn v(s: &str) -> Version {
        Version::new(s)
    }

    fn index_entry(index: &mut PathIndex, path: &str, hash: &str, versions: &[&str]) {
        index
            .entry(path.to_string())
            .or_default()
            .insert(hash.to_string(), versions.iter().map(|s| v(s)).collect());
    }

    #[test]
    fn fingerprint_ranking_is_a_permutation_with_the_fittest_first() {
        let all = vec![v("1.0"), v("1.1"), v("1.2")];
        let mut index = PathIndex::new();
        // present everywhere, three distinct hashes: the ideal probe
        index_entry(&mut index, "/CHANGELOG", "h1", &["1.0"]);
        index
            .get_mut("/CHANGELOG")
            .unwrap()
            .extend([("h2".to_string(), vec![v("1.1")]), ("h3".to_string(), vec![v("1.2")])]);
        // present everywhere but never changes: low information
        index_entry(&mut index, "/static.gif", "h4", &["1.0", "1.1", "1.2"]);
        // present in one version only
        index_entry(&mut index, "/new.js", "h5", &["1.2"]);

        let ranked = pick_fingerprint_files(&index, &all);
        assert_eq!(ranked.len(), index.len());
        assert_eq!(ranked[0], "/CHANGELOG");
        let mut as_set: Vec<&String> = index.keys().collect();
        let mut returned: Vec<&String> = ranked.iter().collect();
        as_set.sort();
        returned.sort();
        assert_eq!(as_set, returned);
    }

    #[test]
    fn ranking_ties_break_deterministically() {
        let all = vec![v("1.0")];
        let mut index = PathIndex::new();
        index_entry(&mut index, "/b.js", "h1", &["1.0"]);
        index_entry(&mut index, "/a.js", "h2", &["1.0"]);
        assert_eq!(pick_fingerprint_files(&index, &all), ["/a.js", "/b.js"]);
    }

    #[test]
    fn indicator_selection_backs_off_until_two_groups_qualify() {
        let all = vec![v("1.0"), v("1.1"), v("1.2")];
        let mut version_index = VersionIndex::new();
        version_index.insert(
            "1.0,1.1,1.2".into(),
            vec![
                ("/readme.html".into(), "h1".into()),
                ("/license.txt".into(), "h2".into()),
                ("/ignored.txt".into(), "h3".into()),
            ],
        );
        version_index.insert("1.0,1.1".into(), vec![("/old.css".into(), "h4".into())]);
        version_index.insert("1.2".into(), vec![("/new.css".into(), "h5".into())]);

        let files = pick_indicator_files(&version_index, &all);
        // threshold backs off from 3 until both the full group and the pair qualify
        assert!(files.len() >= 2);
        assert!(files.contains(&"/readme.html".to_string()));
        assert!(files.contains(&"/license.txt".to_string()));
        assert!(!files.contains(&"/ignored.txt".to_string()));
    }

    #[test]
    fn indicator_selection_dedupes_preserving_order() {
        let all = vec![v("1.0"), v("1.1")];
        let mut version_index = VersionIndex::new();
        version_index.insert(
            "1.0,1.1".into(),
            vec![("/readme.html".into(), "h1".into()), ("/readme.html".into(), "h2".into())],
        );
        version_index.insert("1.0".into(), vec![("/readme.html".into(), "h3".into())]);
        assert_eq!(pick_indicator_files(&version_index, &all), ["/readme.html"]);
    }

    #[test]
    fn winnow_files_come_from_strictly_smaller_groups() {
        let candidates = vec![v("1.0"), v("1.1")];
        let mut version_index = VersionIndex::new();
        version_index.insert("1.0".into(), vec![("/only-10.js".into(), "h1".into())]);
        version_index.insert("1.0,1.1".into(), vec![("/both.js".into(), "h2".into())]);
        version_index.insert("1.0,1.1,1.2".into(), vec![("/all.js".into(), "h3".into())]);
        version_index.insert("1.2".into(), vec![("/other.js".into(), "h4".into())]);

        let paths = pick_winnow_files(&candidates, &version_index, 10);
        assert_eq!(paths, ["/only-10.js"]);
    }

    #[test]
    fn winnow_respects_max_paths_and_exact_membership() {
        let candidates = vec![v("1.1"), v("1.10"), v("1.2")];
        let mut version_index = VersionIndex::new();
        version_index.insert("1.10".into(), vec![("/a.js".into(), "h1".into())]);
        version_index.insert("1.1,1.2".into(), vec![("/b.js".into(), "h2".into())]);
        version_index.insert("1.2".into(), vec![("/c.js".into(), "h3".into())]);

        let capped = pick_winnow_files(&candidates, &version_index, 1);
        assert_eq!(capped.len(), 1);

        // "1.1" must not match inside "1.10"
        let candidates = vec![v("1.1"), v("1.3")];
        let mut version_index = VersionIndex::new();
        version_index.insert("1.10".into(), vec![("/trap.js".into(), "h4".into())]);
        assert!(pick_winnow_files(&candidates, &version_index, 5).is_empty());
    }
}
