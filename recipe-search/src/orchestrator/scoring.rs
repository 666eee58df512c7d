//! Multi-factor relevance scoring for recipe candidates.
//!
//! A candidate's score is the sum of independent components:
//!
//! ```text
//! score = 10 * source_weight
//!       + 30 * text_relevance(title)
//!       + 15 * text_relevance(summary)
//!       + 10 * text_relevance(ingredients joined by spaces)
//!       + filter_bonus
//!       + quality_bonus
//!       - unfiltered_time_penalty
//! ```
//!
//! floored at zero. The weights are fixed; changing any of them changes
//! ranking order across the board.

use url::Url;

use crate::error::SearchError;
use crate::types::{Recipe, SearchFilters, SearchQuery};

const SOURCE_TRUST_WEIGHT: f64 = 10.0;
const TITLE_WEIGHT: f64 = 30.0;
const SUMMARY_WEIGHT: f64 = 15.0;
const INGREDIENT_WEIGHT: f64 = 10.0;

const DIET_BONUS: f64 = 5.0;
const INTOLERANCE_BONUS: f64 = 3.0;
const READY_TIME_BONUS: f64 = 3.0;
const CUISINE_BONUS: f64 = 4.0;

const IMAGE_BONUS: f64 = 2.0;
const CALORIES_BONUS: f64 = 1.0;
const INSTRUCTIONS_BONUS: f64 = 2.0;
const INGREDIENTS_BONUS: f64 = 1.0;
const SERVINGS_BONUS: f64 = 0.5;
const READY_RANGE_BONUS: f64 = 0.5;

const SLOW_RECIPE_MINUTES: u32 = 120;
const SLOW_RECIPE_PENALTY: f64 = 5.0;

const WORD_MATCH: f64 = 1.0;
const LEADING_WORD_BONUS: f64 = 0.5;
const REPEAT_BONUS: f64 = 0.2;

/// Query words that carry meaning: lowercase, edge punctuation trimmed,
/// longer than two characters.
pub fn significant_words(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| w.chars().count() > 2)
        .collect()
}

/// Text relevance of `text` against pre-split query `words`, normalised
/// by the number of words.
///
/// Each word found as a case-insensitive substring contributes 1, plus 0.5
/// if the text starts with it, plus 0.2 for every occurrence beyond the
/// first. Returns 0 when there are no words or the text is empty.
pub fn text_relevance(text: &str, words: &[String]) -> f64 {
    if words.is_empty() || text.is_empty() {
        return 0.0;
    }
    let haystack = text.to_lowercase();

    let total: f64 = words
        .iter()
        .filter(|w| haystack.contains(w.as_str()))
        .map(|w| {
            let mut score = WORD_MATCH;
            if haystack.starts_with(w.as_str()) {
                score += LEADING_WORD_BONUS;
            }
            let occurrences = haystack.matches(w.as_str()).count();
            score + REPEAT_BONUS * occurrences.saturating_sub(1) as f64
        })
        .sum();

    total / words.len() as f64
}

/// Bonus for honouring the caller's structured filters.
pub fn filter_bonus(recipe: &Recipe, filters: &SearchFilters) -> f64 {
    let mut bonus = 0.0;

    if filters.diet.is_some_and(|d| recipe.diet.satisfies(d)) {
        bonus += DIET_BONUS;
    }

    bonus += filters
        .intolerances
        .iter()
        .filter(|i| recipe.diet.free_of(**i))
        .count() as f64
        * INTOLERANCE_BONUS;

    if filters
        .max_ready_time
        .is_some_and(|max| recipe.ready_in_minutes <= max)
    {
        bonus += READY_TIME_BONUS;
    }

    if let Some(cuisine) = filters.cuisine.as_deref() {
        let wanted = cuisine.trim().to_lowercase();
        if !wanted.is_empty() && cuisine_text(recipe).contains(&wanted) {
            bonus += CUISINE_BONUS;
        }
    }

    bonus
}

/// Cuisine tags, or the title when the provider supplied none.
fn cuisine_text(recipe: &Recipe) -> String {
    if recipe.cuisines.is_empty() {
        recipe.title.to_lowercase()
    } else {
        recipe.cuisines.join(" ").to_lowercase()
    }
}

/// Bonus for well-formed, complete recipe records.
pub fn quality_bonus(recipe: &Recipe) -> f64 {
    let mut bonus = 0.0;
    if has_real_image(&recipe.image) {
        bonus += IMAGE_BONUS;
    }
    if recipe.nutrition.calories > 0.0 {
        bonus += CALORIES_BONUS;
    }
    if !recipe.instructions.is_empty() {
        bonus += INSTRUCTIONS_BONUS;
    }
    if !recipe.ingredients.is_empty() {
        bonus += INGREDIENTS_BONUS;
    }
    if (1..=12).contains(&recipe.servings) {
        bonus += SERVINGS_BONUS;
    }
    if (5..=180).contains(&recipe.ready_in_minutes) {
        bonus += READY_RANGE_BONUS;
    }
    bonus
}

/// An image counts when it is an absolute http(s) URL that is not a
/// provider placeholder.
fn has_real_image(image: &str) -> bool {
    let image = image.trim();
    if image.is_empty() || image.to_lowercase().contains("placeholder") {
        return false;
    }
    Url::parse(image).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}

/// Compute the relevance score of one candidate.
pub fn calculate_score(recipe: &Recipe, words: &[String], filters: &SearchFilters) -> f64 {
    let ingredients = recipe.ingredients.join(" ");

    let mut score = SOURCE_TRUST_WEIGHT * recipe.source_weight
        + TITLE_WEIGHT * text_relevance(&recipe.title, words)
        + SUMMARY_WEIGHT * text_relevance(&recipe.summary, words)
        + INGREDIENT_WEIGHT * text_relevance(&ingredients, words)
        + filter_bonus(recipe, filters)
        + quality_bonus(recipe);

    if filters.max_ready_time.is_none() && recipe.ready_in_minutes > SLOW_RECIPE_MINUTES {
        score -= SLOW_RECIPE_PENALTY;
    }

    score.max(0.0)
}

/// Score every candidate in place.
///
/// # Errors
///
/// Returns [`SearchError::Pipeline`] if any score comes out non-finite.
pub fn score_recipes(
    mut recipes: Vec<Recipe>,
    query: &SearchQuery,
) -> Result<Vec<Recipe>, SearchError> {
    let words = significant_words(&query.query);
    for recipe in &mut recipes {
        let score = calculate_score(recipe, &words, &query.filters);
        if !score.is_finite() {
            return Err(SearchError::Pipeline(format!(
                "non-finite score for candidate {} from {}",
                recipe.id, recipe.source_name
            )));
        }
        recipe.relevance_score = Some(score);
    }
    Ok(recipes)
}
