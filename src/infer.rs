//! Turns per-probe version constraints into a final candidate set.

use crate::version::Version;
use std::collections::BTreeSet;

/// Intersects the constraint lists collected from every informative probe.
///
/// Empty lists are discarded. When the surviving lists conflict (empty
/// intersection), the most specific probe wins via
/// [`resolve_conflicting`]. The returned list is sorted.
pub fn collapse_version_possibilities(possible_vers: &[Vec<Version>]) -> Vec<Version> {
    let non_empty: Vec<&Vec<Version>> = possible_vers.iter().filter(|list| !list.is_empty()).collect();
    let Some((first, rest)) = non_empty.split_first() else {
        return Vec::new();
    };

    let mut intersection: BTreeSet<&Version> = first.iter().collect();
    for list in rest {
        let members: BTreeSet<&Version> = list.iter().collect();
        intersection.retain(|version| members.contains(*version));
    }

    if intersection.is_empty() {
        return resolve_conflicting(&non_empty);
    }
    intersection.into_iter().cloned().collect()
}

/// Conflicting probes mean at least one hash hit was misleading (mirrored
/// file, partial upgrade). Trusting the smallest constraint list was
/// expedient rather than principled; it is isolated here so the policy has
/// a single swap point.
fn resolve_conflicting(non_empty: &[&Vec<Version>]) -> Vec<Version> {
    let mut smallest: Option<&Vec<Version>> = None;
    for &list in non_empty {
        if smallest.is_none_or(|current| list.len() < current.len()) {
            smallest = Some(list);
        }
    }
    let mut smallest = smallest.cloned().unwrap_or_default();
    smallest.sort();
    smallest
}

/// One recommended version out of a surviving candidate set.
///
/// Decorated versions collapse onto their plain numeric release when that
/// release is itself a candidate (`1.3.4-RC2` -> `1.3.4` only if `1.3.4`
/// survived); the maximum of the collapsed list is the guess. Nothing is
/// invented: a decoration with no matching plain release stays as-is.
pub fn pick_likely_version(ver_list: &[Version]) -> Option<Version> {
    if ver_list.is_empty() {
        return None;
    }
    let mut simplified: Vec<Version> = ver_list
        .iter()
        .map(|version| {
            version
                .numeric_prefix()
                .map(Version::new)
                .filter(|prefix| ver_list.contains(prefix))
                .unwrap_or_else(|| version.clone())
        })
        .collect();
    simplified.sort();
    simplified.pop()
}
