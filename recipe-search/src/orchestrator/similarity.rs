//! Title normalisation and normalised Levenshtein similarity.
//!
//! Two providers rarely agree on capitalisation or punctuation for the
//! same dish, so titles are canonicalised before comparison and then
//! compared by edit distance relative to the longer title.

/// Normalise a recipe title for duplicate comparison.
///
/// 1. Lowercase.
/// 2. Drop every character that is neither alphanumeric nor whitespace.
/// 3. Collapse runs of whitespace to a single space and trim.
///
/// # Examples
///
/// ```
/// use recipe_search::orchestrator::similarity::normalize_title;
///
/// assert_eq!(normalize_title("  Chicken   Soup!! "), "chicken soup");
/// ```
pub fn normalize_title(raw: &str) -> String {
    let stripped: String = raw
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Similarity ratio in `[0, 1]`: `1 - levenshtein(a, b) / max(len(a), len(b))`,
/// with lengths counted in chars.
///
/// Inputs are expected to be normalised already. An empty string is
/// similar to nothing, including another empty string.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(a, b)
}
