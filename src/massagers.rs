//! Byte-level canonicalizers applied before re-hashing a response whose raw
//! hash missed the database. They absorb known-benign serving differences
//! (transfer-mode line endings, editor BOMs, stripped trailing whitespace).
//!
//! Subsets are enumerated exhaustively, so this list must stay a handful.

pub type Massager = fn(&[u8]) -> Vec<u8>;

pub const MASSAGERS: &[Massager] = &[crlf_to_lf, strip_trailing_whitespace, strip_utf8_bom];

fn crlf_to_lf(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i] == b'\r' && data.get(i + 1) == Some(&b'\n') {
            i += 1;
        } else {
            out.push(data[i]);
            i += 1;
        }
    }
    out
}

fn strip_trailing_whitespace(data: &[u8]) -> Vec<u8> {
    let end = data
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |pos| pos + 1);
    data[..end].to_vec()
}

fn strip_utf8_bom(data: &[u8]) -> Vec<u8> {
    data.strip_prefix(b"\xef\xbb\xbf").unwrap_or(data).to_vec()
}

/// Every non-empty subset of [`MASSAGERS`], smallest subsets first.
pub fn subsets() -> Vec<Vec<Massager>> {
    let mut all = Vec::new();
    for size in 1..=MASSAGERS.len() {
        combinations(MASSAGERS, size, &mut Vec::new(), &mut all);
    }
    all
}

fn combinations(pool: &[Massager], size: usize, current: &mut Vec<Massager>, out: &mut Vec<Vec<Massager>>) {
    if size == 0 {
        out.push(current.clone());
        return;
    }
    for (i, massager) in pool.iter().enumerate() {
        if pool.len() - i < size {
            break;
        }
        current.push(*massager);
        combinations(&pool[i + 1..], size - 1, current, out);
        current.pop();
    }
}

pub fn apply(subset: &[Massager], data: &[u8]) -> Vec<u8> {
    let mut data = data.to_vec();
    for massager in subset {
        data = massager(&data);
    }
    data
}
