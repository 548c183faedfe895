use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// A loosely-structured release version as it appears in release directory
/// names and fingerprint databases (e.g. `1.5.12`, `1.0.14-RC2`).
///
/// Releases in the wild do not follow semver, so ordering is defined over
/// maximal runs of digits and non-digits: numeric runs compare by integer
/// value, everything else compares lexically, and a version that is a run
/// prefix of another compares less (`1.3.4` < `1.3.4-RC2`).
#[derive(Debug, Clone)]
pub struct Version {
    canonical: String,
}

/// One maximal run of the canonical string.
#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Number(&'a str),
    Text(&'a str),
}

impl Segment<'_> {
    fn cmp_segment(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Segment::Number(a), Segment::Number(b)) => {
                match (a.parse::<u64>(), b.parse::<u64>()) {
                    (Ok(a), Ok(b)) => a.cmp(&b),
                    // Runs too long for u64 are compared as digit strings
                    _ => a.trim_start_matches('0').len().cmp(&b.trim_start_matches('0').len()).then_with(|| a.cmp(b)),
                }
            }
            (Segment::Number(a), Segment::Text(b))
            | (Segment::Text(a), Segment::Number(b))
            | (Segment::Text(a), Segment::Text(b)) => a.cmp(b),
        }
    }
}

fn segments(s: &str) -> impl Iterator<Item = Segment<'_>> {
    let bytes = s.as_bytes();
    let mut start = 0;
    std::iter::from_fn(move || {
        if start >= bytes.len() {
            return None;
        }
        let numeric = bytes[start].is_ascii_digit();
        let mut end = start;
        while end < bytes.len() && bytes[end].is_ascii_digit() == numeric {
            end += 1;
        }
        let run = &s[start..end];
        start = end;
        Some(if numeric { Segment::Number(run) } else { Segment::Text(run) })
    })
}

impl Version {
    pub fn new(canonical: impl Into<String>) -> Self {
        Version { canonical: canonical.into() }
    }

    /// Extracts a version from a directory name by applying `pattern` anchored
    /// at the start of the name and taking its first capture group.
    pub fn capture(pattern: &Regex, name: &str) -> Option<Self> {
        let captures = pattern.captures(name)?;
        if captures.get(0)?.start() != 0 {
            return None;
        }
        captures.get(1).map(|m| Version::new(m.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// The maximal leading `[0-9.]` run, when the version starts with one.
    ///
    /// `1.3.4-RC2` -> `1.3.4`; `beta` -> `None`. Used to collapse decorated
    /// versions onto their plain release when picking a best guess.
    pub fn numeric_prefix(&self) -> Option<&str> {
        let end = self
            .canonical
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(self.canonical.len());
        if end == 0 { None } else { Some(&self.canonical[..end]) }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Version::new(s)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for Version {}

impl std::hash::Hash for Version {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let mut ours = segments(&self.canonical);
        let mut theirs = segments(&other.canonical);
        loop {
            match (ours.next(), theirs.next()) {
                (Some(a), Some(b)) => match a.cmp_segment(&b) {
                    Ordering::Equal => continue,
                    unequal => return unequal,
                },
                (Some(_), None) => return Ordering::Greater,
                (None, Some(_)) => return Ordering::Less,
                // Distinct spellings of the same value still need a total
                // order consistent with Eq ("1.0" vs "1.00")
                (None, None) => return self.canonical.cmp(&other.canonical),
            }
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Version::new(String::deserialize(deserializer)?))
    }
}
