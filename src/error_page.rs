//! Structural fingerprint of a server's synthetic "not found" page.
//!
//! Hosts that answer HTTP 200 with an error-looking body for missing files
//! would otherwise be mistaken for present-but-unknown hashes and poison
//! both guessing and fingerprinting.

use crate::http::{FetchError, Fetcher};
use log::debug;

/// How close a page needs to be to the reference error page to count as a
/// custom error page. Range (0, 1), 1 meaning exact count match.
pub const SIMILARITY_TOLERANCE: f64 = 0.9;

const TAGS: [&str; 4] = ["</div>", "</a>", "</tr>", "</p>"];

/// Parked domains respond with random junk; manual exceptions until a
/// pattern emerges.
const PARKING_PHRASES: [&str; 2] = [
    "GoDaddy.com is the world's No. 1 ICANN-accredited domain name registrar",
    "This site is not currently available.",
];

/// Closed-tag counts for one probed page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFingerprint {
    counts: [usize; TAGS.len()],
}

/// One [`PageFingerprint`] per probed non-existent URL (an `.html` and a
/// `.gif`, since servers often special-case the two).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPageFingerprint {
    pages: Vec<PageFingerprint>,
}

fn count_occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    if needle.is_empty() || haystack.len() < needle.len() {
        return 0;
    }
    haystack.windows(needle.len()).filter(|window| *window == needle).count()
}

/// Counts each closed tag case-sensitively plus its uppercase form.
pub fn page_fingerprint(page_data: &[u8]) -> PageFingerprint {
    let mut counts = [0usize; TAGS.len()];
    for (slot, tag) in counts.iter_mut().zip(TAGS) {
        *slot = count_occurrences(page_data, tag.as_bytes())
            + count_occurrences(page_data, tag.to_uppercase().as_bytes());
    }
    PageFingerprint { counts }
}

/// Fetches two pages that should not exist and fingerprints what came back.
///
/// A proper HTTP error status means the server has working error handling,
/// so there is no custom error page to defend against (`None`). Transport
/// failures are retried on a budget of 2, then give up with `None`.
pub async fn identify_error_page<F: Fetcher>(fetcher: &F, base_url: &str) -> Option<ErrorPageFingerprint> {
    let mut retry = 2;
    while retry > 0 {
        match probe_missing_pair(fetcher, base_url).await {
            Ok(fingerprint) => return Some(fingerprint),
            Err(FetchError::Status { code }) => {
                debug!("{base_url} returns a proper error status ({code}) for missing files");
                return None;
            }
            Err(FetchError::Transport { reason }) => {
                debug!("Transport failure while identifying error page: {reason}");
                retry -= 1;
            }
        }
    }
    None
}

async fn probe_missing_pair<F: Fetcher>(
    fetcher: &F,
    base_url: &str,
) -> Result<ErrorPageFingerprint, FetchError> {
    let html = fetcher.fetch(&format!("{base_url}/should/not/exist.html")).await?;
    let mut pages = vec![page_fingerprint(&html)];
    let gif = fetcher.fetch(&format!("{base_url}/should/not/exist.gif")).await?;
    pages.push(page_fingerprint(&gif));
    Ok(ErrorPageFingerprint { pages })
}

/// Whether `page_data` is probably the server's custom error page.
pub fn matches_error_page(fingerprint: Option<&ErrorPageFingerprint>, page_data: &[u8]) -> bool {
    let Some(fingerprint) = fingerprint else {
        return false;
    };

    for phrase in PARKING_PHRASES {
        if count_occurrences(page_data, phrase.as_bytes()) > 0 {
            return true;
        }
    }

    let candidate = page_fingerprint(page_data);
    for page in &fingerprint.pages {
        for (reference, observed) in page.counts.iter().zip(candidate.counts) {
            let reference = *reference as f64;
            let observed = observed as f64;
            let bigger = reference.max(observed);
            let tolerance = bigger - bigger * SIMILARITY_TOLERANCE;
            // a single tag outside tolerance settles it
            if (reference - observed).abs() > tolerance {
                return false;
            }
        }
    }
    true
}
