//! # recipe-search
//!
//! Aggregates recipe search results from several independent, unreliable
//! providers into one ranked list.
//!
//! Provider integrations live outside this crate: each implements
//! [`SourceAdapter`] and is registered in a [`SourceRegistry`] with a
//! trust weight and timeout. This crate owns the aggregation core.
//!
//! ## Design
//!
//! - Queries every source concurrently, each under its own timeout, and
//!   waits for all of them to settle
//! - Failing or slow sources contribute nothing; they never fail the search
//! - Collapses near-identical titles across sources, keeping the copy from
//!   the earliest-registered source
//! - Scores candidates on source trust, text relevance, filter matches, and
//!   record quality, then sorts stably
//! - Optionally skips sources that keep failing, via a per-source circuit
//!   breaker (off by default)
//! - Falls back to the highest-weight source alone if the pipeline itself
//!   hits a defect
//!
//! ## Logging
//!
//! Query text is logged only at trace level. Each search runs in an
//! `info` span carrying a random `search_id`.

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod source;
pub mod types;

pub use config::{SearchConfig, SourceOverride};
pub use error::{Result, SearchError};
pub use orchestrator::fanout::{SourceReport, SourceStatus};
pub use orchestrator::search::{RecipeSearch, SearchOutcome};
pub use source::{SourceAdapter, SourceRegistry};
pub use types::{
    Diet, DietFlags, Intolerance, Nutrition, RawRecipe, Recipe, SearchFilters, SearchQuery,
};

/// One-shot search across `sources` using `config`.
///
/// Builds a [`RecipeSearch`] for a single call. Long-lived callers should
/// keep a [`RecipeSearch`] instead so the circuit breaker can learn
/// across searches.
///
/// # Errors
///
/// Returns [`SearchError::Config`] if the configuration or registry is
/// invalid, or [`SearchError::Fallback`] if the pipeline and its fallback
/// both failed.
///
/// # Examples
///
/// ```no_run
/// # async fn example(sources: recipe_search::SourceRegistry) -> recipe_search::Result<()> {
/// let query = recipe_search::SearchQuery::new("chicken rice");
/// let config = recipe_search::SearchConfig::default();
/// let recipes = recipe_search::search(sources, &config, &query).await?;
/// for recipe in &recipes {
///     println!("{} ({})", recipe.title, recipe.source_name);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn search(
    sources: SourceRegistry,
    config: &SearchConfig,
    query: &SearchQuery,
) -> Result<Vec<Recipe>> {
    RecipeSearch::new(sources, config.clone())?
        .search(query)
        .await
}
