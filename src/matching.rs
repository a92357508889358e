//! Title matching between venues.
//!
//! Market pairing compares question titles across venues using Jaccard
//! similarity over normalized token sets. Normalization is lossy on
//! purpose: case, punctuation and spacing never affect the score.

use std::collections::HashSet;

/// Lowercases a title, replaces every non-alphanumeric run with a single
/// space, and trims the result.
pub fn normalize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_space = false;

    for c in title.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        } else {
            pending_space = true;
        }
    }

    out
}

/// Splits a normalized title into words.
pub fn tokenize(s: &str) -> Vec<&str> {
    s.split_whitespace().collect()
}

/// Jaccard similarity coefficient between two token sets, in [0, 1].
///
/// Two empty sets are considered identical (1.0); one empty set against a
/// non-empty one scores 0.0.
pub fn jaccard_similarity(tokens_a: &[&str], tokens_b: &[&str]) -> f64 {
    if tokens_a.is_empty() && tokens_b.is_empty() {
        return 1.0;
    }
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let set_a: HashSet<&str> = tokens_a.iter().copied().collect();
    let set_b: HashSet<&str> = tokens_b.iter().copied().collect();

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.len() + set_b.len() - intersection;

    if union == 0 {
        return 0.0;
    }

    intersection as f64 / union as f64
}

/// Normalizes, tokenizes and computes Jaccard similarity in one call.
pub fn title_similarity(title_a: &str, title_b: &str) -> f64 {
    let norm_a = normalize_title(title_a);
    let norm_b = normalize_title(title_b);
    jaccard_similarity(&tokenize(&norm_a), &tokenize(&norm_b))
}

/// Returns true if two titles score at or above the given threshold.
pub fn is_likely_match(title_a: &str, title_b: &str, threshold: f64) -> bool {
    title_similarity(title_a, title_b) >= threshold
}

/// Common English stop words with no discriminating power in market titles.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has",
    "he", "in", "is", "it", "its", "of", "on", "or", "that", "the", "they",
    "this", "to", "was", "will", "with",
];

/// Removes stop words from a token list.
pub fn remove_stop_words<'a>(tokens: &[&'a str]) -> Vec<&'a str> {
    tokens
        .iter()
        .copied()
        .filter(|t| !t.is_empty() && !STOP_WORDS.contains(t))
        .collect()
}
