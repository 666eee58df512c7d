//! Core search orchestrator: fan-out, dedup, score, rank, with fallback.
//!
//! [`RecipeSearch`] owns the resolved source registry, the configuration,
//! and the per-source circuit breaker. A search fans out to every source,
//! then runs the single-threaded pipeline over the merged candidates.
//! A defect inside that pipeline (a stage error or a panic) never reaches
//! the caller directly: the search degrades to one direct call against the
//! highest-weight source instead.

use std::panic::AssertUnwindSafe;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::source::SourceRegistry;
use crate::types::{Recipe, SearchQuery};

use super::dedup::deduplicate;
use super::fanout::{
    fan_out, panic_message, query_source, source_timeout, SourceReport, SourceStatus,
};
use super::rank::rank;
use super::scoring::score_recipes;

/// Result of one search with per-source detail.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Ranked recipes, or fallback recipes in pass-through order.
    pub recipes: Vec<Recipe>,
    /// One report per registered source, in registration order.
    pub sources: Vec<SourceReport>,
    /// Whether the pipeline failed and the fallback path produced `recipes`.
    pub fallback_used: bool,
}

/// Multi-source recipe search aggregator.
///
/// Construct once with the adapters and configuration, then call
/// [`RecipeSearch::search`] per query. Sharing one instance across calls
/// lets the circuit breaker learn which sources are unhealthy.
#[derive(Debug)]
pub struct RecipeSearch {
    registry: SourceRegistry,
    config: SearchConfig,
    breaker: Mutex<CircuitBreaker>,
}

impl RecipeSearch {
    /// Build an aggregator from registered sources and configuration.
    ///
    /// Per-source overrides in `config` are applied here and sources
    /// without a declared timeout get `config.default_timeout_ms`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the configuration is invalid or
    /// overrides name unknown sources.
    pub fn new(registry: SourceRegistry, config: SearchConfig) -> Result<Self, SearchError> {
        config.validate()?;
        let registry = registry.resolve(&config)?;
        let breaker = Mutex::new(CircuitBreaker::new(config.circuit_breaker.clone()));
        Ok(Self {
            registry,
            config,
            breaker,
        })
    }

    /// Search every source and return the ranked recipes.
    ///
    /// Zero results is a successful, empty list. The call finishes within
    /// the longest source timeout plus pipeline overhead; a fallback call
    /// only gets whatever remains of that budget.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Fallback`] only when the pipeline failed and
    /// the single-source fallback failed as well.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<Recipe>, SearchError> {
        self.search_with_cancel(query, &CancellationToken::new())
            .await
    }

    /// Like [`RecipeSearch::search`], but abandons in-flight sources when
    /// `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Cancelled`] if `cancel` fired before the
    /// search completed, otherwise the same errors as
    /// [`RecipeSearch::search`].
    pub async fn search_with_cancel(
        &self,
        query: &SearchQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<Recipe>, SearchError> {
        Ok(self.search_detailed(query, cancel).await?.recipes)
    }

    /// Search and also return per-source reports.
    ///
    /// # Errors
    ///
    /// Same as [`RecipeSearch::search_with_cancel`].
    pub async fn search_detailed(
        &self,
        query: &SearchQuery,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome, SearchError> {
        let search_id = Uuid::new_v4();
        let span = tracing::info_span!("recipe_search", %search_id, sources = self.registry.len());
        self.run(query, cancel, run_pipeline).instrument(span).await
    }

    /// Circuit state of every source seen so far, sorted by name.
    pub fn source_health(&self) -> Vec<(String, CircuitState, u32)> {
        self.breaker().health_report()
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    async fn run<P>(
        &self,
        query: &SearchQuery,
        cancel: &CancellationToken,
        pipeline: P,
    ) -> Result<SearchOutcome, SearchError>
    where
        P: FnOnce(Vec<Recipe>, &SearchQuery, Option<usize>) -> Result<Vec<Recipe>, SearchError>,
    {
        tracing::trace!(query = %query.query, "recipe search");

        let budget = self
            .registry
            .entries()
            .iter()
            .map(source_timeout)
            .max()
            .unwrap_or_default();
        let deadline = Instant::now() + budget;

        let fanned = fan_out(self.registry.entries(), query, cancel, |entry| {
            self.breaker().should_attempt(entry.name())
        })
        .await;
        self.record_health(&fanned.reports);

        if cancel.is_cancelled() {
            tracing::debug!("search cancelled, discarding results");
            return Err(SearchError::Cancelled);
        }

        let merged = fanned.candidates.len();
        let max_results = self.config.max_results;
        match guarded(|| pipeline(fanned.candidates, query, max_results)) {
            Ok(recipes) => {
                tracing::debug!(merged, returned = recipes.len(), "search complete");
                Ok(SearchOutcome {
                    recipes,
                    sources: fanned.reports,
                    fallback_used: false,
                })
            }
            Err(err) => {
                tracing::error!(error = %err, "pipeline failed, using fallback source");
                let recipes = self.fallback(query, cancel, deadline).await?;
                Ok(SearchOutcome {
                    recipes,
                    sources: fanned.reports,
                    fallback_used: true,
                })
            }
        }
    }

    /// Single best-effort call against the highest-weight source.
    ///
    /// Results are deduplicated against themselves and returned unscored,
    /// in the order the source produced them. The call is cut off at
    /// `deadline`, the end of the fan-out budget.
    async fn fallback(
        &self,
        query: &SearchQuery,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> Result<Vec<Recipe>, SearchError> {
        let entry = self
            .registry
            .highest_weight()
            .ok_or_else(|| SearchError::Fallback("no sources registered".into()))?;
        let timeout = source_timeout(entry).min(deadline.saturating_duration_since(Instant::now()));
        tracing::warn!(
            source = entry.name(),
            timeout_ms = timeout.as_millis() as u64,
            "running fallback search"
        );

        let raw = match query_source(entry, timeout, query, cancel).await {
            Ok(raw) => raw,
            Err(SearchError::Cancelled) => return Err(SearchError::Cancelled),
            Err(err) => return Err(SearchError::Fallback(err.to_string())),
        };

        let candidates: Vec<Recipe> = raw
            .into_iter()
            .zip(1..)
            .map(|(recipe, id)| Recipe::from_raw(recipe, id, entry.name(), entry.weight()))
            .collect();
        guarded(|| Ok(deduplicate(candidates))).map_err(|e| SearchError::Fallback(e.to_string()))
    }

    fn record_health(&self, reports: &[SourceReport]) {
        let mut breaker = self.breaker();
        for report in reports {
            match report.status {
                SourceStatus::Succeeded { .. } => breaker.record_success(&report.source),
                SourceStatus::TimedOut | SourceStatus::Failed { .. } => {
                    breaker.record_failure(&report.source);
                }
                SourceStatus::Skipped | SourceStatus::Cancelled => {}
            }
        }
    }

    fn breaker(&self) -> MutexGuard<'_, CircuitBreaker> {
        self.breaker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Dedup, score, rank, and truncate the merged candidates.
///
/// # Errors
///
/// Returns [`SearchError::Pipeline`] if a stage detects a defect.
pub fn run_pipeline(
    candidates: Vec<Recipe>,
    query: &SearchQuery,
    max_results: Option<usize>,
) -> Result<Vec<Recipe>, SearchError> {
    let deduped = deduplicate(candidates);
    let scored = score_recipes(deduped, query)?;
    let mut ranked = rank(scored)?;
    if let Some(max) = max_results {
        ranked.truncate(max);
    }
    Ok(ranked)
}

/// Run a synchronous stage, turning a panic into [`SearchError::Pipeline`].
fn guarded<F>(stage: F) -> Result<Vec<Recipe>, SearchError>
where
    F: FnOnce() -> Result<Vec<Recipe>, SearchError>,
{
    std::panic::catch_unwind(AssertUnwindSafe(stage)).unwrap_or_else(|panic| {
        Err(SearchError::Pipeline(format!(
            "panic: {}",
            panic_message(&*panic)
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use crate::source::SourceAdapter;
    use crate::types::{RawRecipe, SearchFilters};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct FixedSource {
        name: &'static str,
        weight: f64,
        titles: Vec<&'static str>,
        /// Calls before this count fail.
        failures: usize,
        delay: Duration,
        timeout: Duration,
        calls: AtomicUsize,
    }

    impl FixedSource {
        fn new(name: &'static str, weight: f64, titles: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                name,
                weight,
                titles,
                failures: 0,
                delay: Duration::ZERO,
                timeout: Duration::from_millis(200),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(name: &'static str, weight: f64) -> Arc<Self> {
            Self::recovering(name, weight, usize::MAX, vec![])
        }

        fn recovering(
            name: &'static str,
            weight: f64,
            failures: usize,
            titles: Vec<&'static str>,
        ) -> Arc<Self> {
            Arc::new(Self {
                name,
                weight,
                titles,
                failures,
                delay: Duration::ZERO,
                timeout: Duration::from_millis(200),
                calls: AtomicUsize::new(0),
            })
        }

        fn slow(
            name: &'static str,
            delay: Duration,
            timeout: Duration,
            titles: Vec<&'static str>,
        ) -> Arc<Self> {
            Arc::new(Self {
                name,
                weight: 1.0,
                titles,
                failures: 0,
                delay,
                timeout,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SourceAdapter for FixedSource {
        fn name(&self) -> &str {
            self.name
        }

        async fn search(
            &self,
            _query: &str,
            _filters: &SearchFilters,
        ) -> Result<Vec<RawRecipe>, SearchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if call < self.failures {
                return Err(SearchError::Source("HTTP 503".into()));
            }
            Ok(self.titles.iter().map(|t| RawRecipe::titled(*t)).collect())
        }

        fn weight(&self) -> f64 {
            self.weight
        }

        fn timeout(&self) -> Option<Duration> {
            Some(self.timeout)
        }
    }

    fn aggregator(sources: Vec<Arc<FixedSource>>) -> RecipeSearch {
        let mut registry = SourceRegistry::new();
        for source in sources {
            registry.register(source).expect("register");
        }
        RecipeSearch::new(registry, SearchConfig::default()).expect("new")
    }

    fn boom(
        _: Vec<Recipe>,
        _: &SearchQuery,
        _: Option<usize>,
    ) -> Result<Vec<Recipe>, SearchError> {
        panic!("ranking bug")
    }

    #[tokio::test]
    async fn pipeline_panic_uses_highest_weight_source() {
        let search = aggregator(vec![
            FixedSource::new("minor", 0.5, vec!["Minor Soup"]),
            FixedSource::new("major", 1.0, vec!["Tomato Soup", "tomato soup!", "Leek Soup"]),
        ]);
        let outcome = search
            .run(&SearchQuery::new("soup"), &CancellationToken::new(), boom)
            .await
            .expect("fallback should succeed");

        assert!(outcome.fallback_used);
        let titles: Vec<_> = outcome.recipes.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Tomato Soup", "Leek Soup"]);
        assert!(outcome.recipes.iter().all(|r| r.relevance_score.is_none()));
        assert!(outcome.recipes.iter().all(|r| r.source_name == "major"));
    }

    #[tokio::test]
    async fn pipeline_error_uses_fallback() {
        let search = aggregator(vec![FixedSource::new("only", 1.0, vec!["Soup"])]);
        let outcome = search
            .run(&SearchQuery::new("soup"), &CancellationToken::new(), |_, _, _| {
                Err(SearchError::Pipeline("stage defect".into()))
            })
            .await
            .expect("fallback should succeed");
        assert!(outcome.fallback_used);
        assert_eq!(outcome.recipes.len(), 1);
    }

    #[tokio::test]
    async fn fallback_failure_surfaces_error() {
        let search = aggregator(vec![
            FixedSource::failing("major", 1.0),
            FixedSource::new("minor", 0.5, vec!["Soup"]),
        ]);
        let err = search
            .run(&SearchQuery::new("soup"), &CancellationToken::new(), boom)
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Fallback(_)));
        assert!(err.to_string().contains("HTTP 503"));
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_is_cut_off_at_fan_out_budget() {
        let search = aggregator(vec![FixedSource::slow(
            "major",
            Duration::from_millis(600),
            Duration::from_secs(1),
            vec!["Soup"],
        )]);
        let started = Instant::now();
        let err = search
            .run(&SearchQuery::new("soup"), &CancellationToken::new(), boom)
            .await
            .unwrap_err();

        // 600ms fan-out leaves 400ms, less than the fallback call needs.
        assert!(matches!(err, SearchError::Fallback(ref m) if m.contains("exceeded")));
        assert!(started.elapsed() <= Duration::from_millis(1_050));
    }

    #[tokio::test]
    async fn default_config_queries_recovered_source_again() {
        let source = FixedSource::recovering("flaky", 1.0, 3, vec!["Chicken Soup"]);
        let search = aggregator(vec![Arc::clone(&source)]);
        let query = SearchQuery::new("chicken soup");

        for _ in 0..3 {
            assert!(search.search(&query).await.expect("search").is_empty());
        }
        let fourth = search.search(&query).await.expect("search");

        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
        assert_eq!(fourth.len(), 1);
        assert_eq!(fourth[0].title, "Chicken Soup");
    }

    #[tokio::test]
    async fn fallback_without_sources_fails() {
        let search = aggregator(vec![]);
        let err = search
            .run(&SearchQuery::new("soup"), &CancellationToken::new(), boom)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no sources registered"));
    }

    #[tokio::test]
    async fn no_sources_is_empty_success() {
        let search = aggregator(vec![]);
        let results = search.search(&SearchQuery::new("soup")).await.expect("search");
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn healthy_pipeline_does_not_call_fallback_twice() {
        let source = FixedSource::new("only", 1.0, vec!["Soup"]);
        let search = aggregator(vec![Arc::clone(&source)]);
        let outcome = search
            .search_detailed(&SearchQuery::new("soup"), &CancellationToken::new())
            .await
            .expect("search");
        assert!(!outcome.fallback_used);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(outcome.recipes[0].relevance_score.is_some());
    }

    #[tokio::test]
    async fn circuit_opens_after_repeated_failures() {
        let flaky = FixedSource::failing("flaky", 1.0);
        let mut registry = SourceRegistry::new();
        registry.register(Arc::clone(&flaky) as Arc<dyn SourceAdapter>).expect("register");
        let config = SearchConfig {
            circuit_breaker: CircuitBreakerConfig {
                enabled: true,
                failure_threshold: 2,
                cooldown_secs: 600,
            },
            ..Default::default()
        };
        let search = RecipeSearch::new(registry, config).expect("new");
        let query = SearchQuery::new("soup");

        for _ in 0..2 {
            assert!(search.search(&query).await.expect("search").is_empty());
        }
        let outcome = search
            .search_detailed(&query, &CancellationToken::new())
            .await
            .expect("search");

        assert_eq!(outcome.sources[0].status, SourceStatus::Skipped);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            search.source_health(),
            vec![("flaky".to_string(), CircuitState::Open, 2)]
        );
    }

    #[tokio::test]
    async fn cancelled_search_returns_cancelled() {
        let search = aggregator(vec![FixedSource::new("only", 1.0, vec!["Soup"])]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = search
            .search_with_cancel(&SearchQuery::new("soup"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Cancelled));
    }

    #[test]
    fn run_pipeline_truncates_after_ranking() {
        let candidates = vec![
            Recipe::from_raw(RawRecipe::titled("Beef Stew"), 1, "a", 1.0),
            Recipe::from_raw(RawRecipe::titled("Chicken Soup"), 2, "a", 1.0),
        ];
        let ranked =
            run_pipeline(candidates, &SearchQuery::new("chicken soup"), Some(1)).expect("pipeline");
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].title, "Chicken Soup");
    }

    #[test]
    fn guarded_converts_panic() {
        let err = guarded(|| panic!("oops")).unwrap_err();
        assert!(matches!(err, SearchError::Pipeline(ref m) if m.contains("oops")));
    }
}
