//! Near-duplicate removal by fuzzy title match.
//!
//! Walks the merged candidate list in order and keeps an ordered list of
//! accepted representatives. A candidate whose normalised title is at
//! least [`SIMILARITY_THRESHOLD`] similar to any representative is
//! dropped, so the earliest-seen copy of a recipe always survives. The
//! comparison is O(n²) over the merged list, which stays small (tens of
//! candidates per call).

use crate::types::Recipe;

use super::similarity::{normalize_title, similarity};

/// Minimum similarity ratio at which two titles count as the same recipe.
pub const SIMILARITY_THRESHOLD: f64 = 0.8;

/// Remove near-duplicate candidates, preserving input order.
///
/// The first candidate of each cluster (by input position) is kept and
/// every later candidate within [`SIMILARITY_THRESHOLD`] of it is
/// discarded. Candidates whose normalised title is empty never match and
/// are always kept.
pub fn deduplicate(candidates: Vec<Recipe>) -> Vec<Recipe> {
    // Ordered, not hashed: the first-seen representative must win.
    let mut representatives: Vec<String> = Vec::with_capacity(candidates.len());
    let mut kept: Vec<Recipe> = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let title = normalize_title(&candidate.title);

        let duplicate_of = if title.is_empty() {
            None
        } else {
            representatives
                .iter()
                .position(|rep| similarity(&title, rep) >= SIMILARITY_THRESHOLD)
        };

        match duplicate_of {
            Some(index) => {
                tracing::trace!(
                    dropped = %candidate.title,
                    source = %candidate.source_name,
                    kept = %kept[index].title,
                    "duplicate candidate dropped"
                );
            }
            None => {
                representatives.push(title);
                kept.push(candidate);
            }
        }
    }

    kept
}
