//! Final ordering of scored candidates.

use std::cmp::Ordering;

use crate::error::SearchError;
use crate::types::Recipe;

/// Stable sort by relevance score, highest first.
///
/// Equal scores keep their input order, which is the dedup order and
/// therefore the source registration order.
///
/// # Errors
///
/// Returns [`SearchError::Pipeline`] if a candidate reaches the ranker
/// without a score.
pub fn rank(mut recipes: Vec<Recipe>) -> Result<Vec<Recipe>, SearchError> {
    if let Some(unscored) = recipes.iter().find(|r| r.relevance_score.is_none()) {
        return Err(SearchError::Pipeline(format!(
            "candidate {} reached ranking unscored",
            unscored.id
        )));
    }

    // `sort_by` is stable.
    recipes.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(Ordering::Equal)
    });
    Ok(recipes)
}
