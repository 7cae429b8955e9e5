use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s'-]").unwrap());
static EDGE_TRIM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^['-]+|['-]+$").unwrap());

/// Tokenize text into lowercase words.
/// Preserves inner apostrophes and hyphens (e.g., "don't", "node-a").
/// No stemming, no stop-word removal.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned = NON_WORD.replace_all(text, " ");
    cleaned
        .to_lowercase()
        .split_whitespace()
        .map(|t| EDGE_TRIM.replace_all(t, "").to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Deduplicated, ordered token set.
pub fn token_set(text: &str) -> BTreeSet<String> {
    tokenize(text).into_iter().collect()
}

/// Intersection over union of two sets. Two empty sets are identical (1.0).
pub fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}
