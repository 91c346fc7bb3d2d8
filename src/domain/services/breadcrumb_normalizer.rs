//! Breadcrumb Normalizer
//!
//! Pure, total canonicalisation of breadcrumb segments. Steps, in order, per
//! segment: NFKC, lowercase, `&` unified to `and`, apostrophes removed, other
//! punctuation turned into word breaks, whitespace collapsed and trimmed.
//! Empty segments are dropped and the rest are joined with `>`.
//!
//! Applying the normalizer to its own output is a no-op.

use unicode_normalization::UnicodeNormalization;

use crate::domain::breadcrumb::{NormalizedPath, RawBreadcrumb};
use crate::domain::constants::breadcrumb::{
    AND_WORD, APOSTROPHES, CANONICAL_SEPARATOR, RAW_SEPARATORS,
};

/// Normalizes an ordered list of raw segments.
pub fn normalize<S: AsRef<str>>(raw_segments: &[S]) -> NormalizedPath {
    let segments = raw_segments
        .iter()
        .map(|s| normalize_segment(s.as_ref()))
        .filter(|s| !s.is_empty())
        .collect();
    NormalizedPath::from_normalized_segments(segments)
}

/// Normalizes a breadcrumb given as one string ("Grocery > Dairy & Eggs > Milk").
pub fn normalize_raw(raw: &str) -> NormalizedPath {
    let segments: Vec<&str> = split_raw(raw).collect();
    normalize(&segments)
}

/// Normalizes an extracted breadcrumb regardless of its source.
pub fn normalize_breadcrumb(breadcrumb: &RawBreadcrumb) -> NormalizedPath {
    normalize(&breadcrumb.segments)
}

/// Rebuilds a path from a stored key. Stored keys are already normalized, so
/// this returns the same key.
pub fn from_key(key: &str) -> NormalizedPath {
    let segments: Vec<&str> = key.split(CANONICAL_SEPARATOR).collect();
    normalize(&segments)
}

fn split_raw(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(|c: char| RAW_SEPARATORS.contains(&c))
}

/// Canonical form of a single segment.
///
/// The result contains only lowercase alphanumerics separated by single spaces,
/// so it never contains a separator.
pub fn normalize_segment(raw: &str) -> String {
    let lowered: String = raw.nfkc().collect::<String>().to_lowercase();
    let unified = lowered.replace("&amp;", "&");

    let mut words = String::with_capacity(unified.len());
    for ch in unified.chars() {
        if ch == '&' {
            words.push(' ');
            words.push_str(AND_WORD);
            words.push(' ');
        } else if APOSTROPHES.contains(&ch) {
            continue;
        } else if ch.is_alphanumeric() {
            words.push(ch);
        } else {
            words.push(' ');
        }
    }

    words.split_whitespace().collect::<Vec<_>>().join(" ")
}
