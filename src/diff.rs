//! Diff fingerprinting.
//!
//! Two submissions of the same change hash identically even when they were
//! generated against different path prefixes or line offsets.

use sha2::{Digest, Sha256};

/// Hash the normalized hunks of a unified diff.
///
/// File names lose their first path component (`a/`, `b/`), hunk headers
/// are reduced to their line counts, and lines outside of hunks are ignored.
pub fn hash_diff(diff: &str) -> String {
    let mut hasher = Sha256::new();
    let mut in_hunk = false;

    for line in diff.lines() {
        let file_header = line
            .strip_prefix("--- ")
            .map(|name| ("--- ", name))
            .or_else(|| line.strip_prefix("+++ ").map(|name| ("+++ ", name)))
            .filter(|_| !in_hunk);

        if let Some((marker, name)) = file_header {
            let name = name.split_whitespace().next().unwrap_or_default();
            let name = match name.split_once('/') {
                Some((_, rest)) if name != "/dev/null" => rest,
                _ => name,
            };
            hasher.update(marker.as_bytes());
            hasher.update(name.as_bytes());
            hasher.update(b"\n");
        } else if let Some(header) = line.strip_prefix("@@ ") {
            in_hunk = true;
            hasher.update(b"@@ ");
            hasher.update(hunk_counts(header).as_bytes());
            hasher.update(b"\n");
        } else if in_hunk && matches!(line.chars().next(), Some('+' | '-' | ' ')) {
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        } else {
            in_hunk = false;
        }
    }

    hex::encode(hasher.finalize())
}

/// `-12,7 +12,8 @@ fn foo()` becomes `-7 +8`.
fn hunk_counts(header: &str) -> String {
    header
        .split_whitespace()
        .take_while(|part| *part != "@@")
        .map(|range| {
            let mut chars = range.chars();
            let sign = chars.next().unwrap_or_default();
            let count = chars.as_str().split_once(',').map(|(_, n)| n).unwrap_or("1");
            format!("{}{}", sign, count)
        })
        .collect::<Vec<_>>()
        .join(" ")
}
