//! Concurrent fan-out to every registered source with per-source timeouts.
//!
//! Every source runs as its own future under its own timeout, and all of
//! them are joined with [`futures::future::join_all`]: the join resolves
//! only once each source has succeeded, failed, timed out, or been
//! cancelled. A failing source contributes nothing and never disturbs the
//! others. Merge order is registration order, then the order the source
//! returned its results in.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::DEFAULT_TIMEOUT_MS;
use crate::error::SearchError;
use crate::source::SourceEntry;
use crate::types::{RawRecipe, Recipe, SearchQuery};

/// How one source fared in a fan-out round.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    /// Returned `count` valid candidates (possibly zero).
    Succeeded { count: usize },
    /// Did not answer within its timeout.
    TimedOut,
    /// Returned an error, malformed data, or panicked.
    Failed { reason: String },
    /// Not attempted because its circuit is open.
    Skipped,
    /// Still in flight when the search was cancelled.
    Cancelled,
}

/// Observability record for one source in one search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub status: SourceStatus,
    pub elapsed: Duration,
}

/// Everything the coordinator hands to the rest of the pipeline.
#[derive(Debug, Clone)]
pub struct FanOutOutcome {
    /// Merged candidates in registration order, then response order.
    pub candidates: Vec<Recipe>,
    /// One report per registered source, in registration order.
    pub reports: Vec<SourceReport>,
}

/// Query every source concurrently and merge the survivors.
///
/// `should_attempt` is consulted once per source, in order, before any
/// request starts; sources it rejects are reported as
/// [`SourceStatus::Skipped`]. Candidate ids are assigned sequentially from
/// 1 in merge order.
pub async fn fan_out<F>(
    entries: &[SourceEntry],
    query: &SearchQuery,
    cancel: &CancellationToken,
    mut should_attempt: F,
) -> FanOutOutcome
where
    F: FnMut(&SourceEntry) -> bool,
{
    let futures: Vec<_> = entries
        .iter()
        .map(|entry| {
            let attempt = should_attempt(entry);
            async move {
                let started = Instant::now();
                let result = if attempt {
                    Some(query_source(entry, source_timeout(entry), query, cancel).await)
                } else {
                    None
                };
                (entry, result, started.elapsed())
            }
        })
        .collect();

    let outcomes = futures::future::join_all(futures).await;

    let mut candidates: Vec<Recipe> = Vec::new();
    let mut reports: Vec<SourceReport> = Vec::with_capacity(outcomes.len());
    let mut next_id: u32 = 1;

    for (entry, result, elapsed) in outcomes {
        let source = entry.name();
        let status = match result {
            None => {
                tracing::warn!(source, "circuit open, source skipped");
                SourceStatus::Skipped
            }
            Some(Ok(raw)) => {
                let count = raw.len();
                tracing::debug!(source, count, ?elapsed, "source returned results");
                for recipe in raw {
                    candidates.push(Recipe::from_raw(recipe, next_id, source, entry.weight()));
                    next_id += 1;
                }
                SourceStatus::Succeeded { count }
            }
            Some(Err(SearchError::SourceTimeout(reason))) => {
                tracing::warn!(source, %reason, "source timed out");
                SourceStatus::TimedOut
            }
            Some(Err(SearchError::Cancelled)) => {
                tracing::debug!(source, "source cancelled");
                SourceStatus::Cancelled
            }
            Some(Err(err)) => {
                tracing::warn!(source, error = %err, "source query failed");
                SourceStatus::Failed {
                    reason: err.to_string(),
                }
            }
        };
        reports.push(SourceReport {
            source: source.to_string(),
            status,
            elapsed,
        });
    }

    FanOutOutcome {
        candidates,
        reports,
    }
}

/// Timeout a source runs under during fan-out.
pub(crate) fn source_timeout(entry: &SourceEntry) -> Duration {
    entry
        .timeout()
        .unwrap_or(Duration::from_millis(DEFAULT_TIMEOUT_MS))
}

/// Query a single source, giving up after `timeout`.
///
/// Adapter errors, panics, and malformed records become
/// [`SearchError::Source`]; an expired timeout becomes
/// [`SearchError::SourceTimeout`]. If `cancel` fires first, or fires
/// before the result is inspected, the result is discarded and
/// [`SearchError::Cancelled`] is returned.
pub(crate) async fn query_source(
    entry: &SourceEntry,
    timeout: Duration,
    query: &SearchQuery,
    cancel: &CancellationToken,
) -> Result<Vec<RawRecipe>, SearchError> {
    let name = entry.name();
    let call = AssertUnwindSafe(entry.adapter().search(&query.query, &query.filters)).catch_unwind();

    let outcome = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(SearchError::Cancelled),
        outcome = tokio::time::timeout(timeout, call) => outcome,
    };

    let raw = match outcome {
        Err(_elapsed) => {
            return Err(SearchError::SourceTimeout(format!(
                "{name} exceeded {}ms",
                timeout.as_millis()
            )))
        }
        Ok(Err(panic)) => {
            return Err(SearchError::Source(format!(
                "{name} panicked: {}",
                panic_message(&*panic)
            )))
        }
        Ok(Ok(Err(err))) => return Err(SearchError::Source(format!("{name}: {err}"))),
        Ok(Ok(Ok(raw))) => raw,
    };

    if cancel.is_cancelled() {
        return Err(SearchError::Cancelled);
    }

    for recipe in &raw {
        recipe
            .validate()
            .map_err(|e| SearchError::Source(format!("{name}: {e}")))?;
    }
    Ok(raw)
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{SourceAdapter, SourceRegistry};
    use crate::types::{Nutrition, SearchFilters};
    use async_trait::async_trait;
    use std::sync::Arc;

    enum Behaviour {
        Return(Vec<&'static str>),
        Fail,
        Panic,
        Hang,
        Malformed,
    }

    struct StubSource {
        name: &'static str,
        behaviour: Behaviour,
    }

    #[async_trait]
    impl SourceAdapter for StubSource {
        fn name(&self) -> &str {
            self.name
        }

        async fn search(
            &self,
            _query: &str,
            _filters: &SearchFilters,
        ) -> Result<Vec<RawRecipe>, SearchError> {
            match &self.behaviour {
                Behaviour::Return(titles) => {
                    Ok(titles.iter().map(|t| RawRecipe::titled(*t)).collect())
                }
                Behaviour::Fail => Err(SearchError::Source("HTTP 500".into())),
                Behaviour::Panic => panic!("adapter bug"),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(vec![])
                }
                Behaviour::Malformed => Ok(vec![RawRecipe {
                    nutrition: Nutrition {
                        calories: f64::NAN,
                        ..Default::default()
                    },
                    ..RawRecipe::titled("bad")
                }]),
            }
        }
    }

    fn registry(sources: Vec<(&'static str, Behaviour)>) -> SourceRegistry {
        let mut registry = SourceRegistry::new();
        for (name, behaviour) in sources {
            registry
                .register_with(
                    Arc::new(StubSource { name, behaviour }),
                    1.0,
                    Duration::from_millis(500),
                )
                .expect("register");
        }
        registry
    }

    async fn run(registry: &SourceRegistry) -> FanOutOutcome {
        fan_out(
            registry.entries(),
            &SearchQuery::new("soup"),
            &CancellationToken::new(),
            |_| true,
        )
        .await
    }

    #[tokio::test]
    async fn merges_in_registration_then_response_order() {
        let registry = registry(vec![
            ("a", Behaviour::Return(vec!["a1", "a2"])),
            ("b", Behaviour::Return(vec!["b1"])),
        ]);
        let outcome = run(&registry).await;
        let titles: Vec<_> = outcome.candidates.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["a1", "a2", "b1"]);
        let ids: Vec<_> = outcome.candidates.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(outcome.candidates[2].source_name, "b");
    }

    #[tokio::test]
    async fn failing_source_contributes_nothing() {
        let registry = registry(vec![
            ("broken", Behaviour::Fail),
            ("ok", Behaviour::Return(vec!["soup"])),
        ]);
        let outcome = run(&registry).await;
        assert_eq!(outcome.candidates.len(), 1);
        assert!(matches!(
            outcome.reports[0].status,
            SourceStatus::Failed { ref reason } if reason.contains("HTTP 500")
        ));
        assert_eq!(outcome.reports[1].status, SourceStatus::Succeeded { count: 1 });
    }

    #[tokio::test]
    async fn panicking_source_is_absorbed() {
        let registry = registry(vec![
            ("panicky", Behaviour::Panic),
            ("ok", Behaviour::Return(vec!["soup"])),
        ]);
        let outcome = run(&registry).await;
        assert_eq!(outcome.candidates.len(), 1);
        assert!(matches!(
            outcome.reports[0].status,
            SourceStatus::Failed { ref reason } if reason.contains("adapter bug")
        ));
    }

    #[tokio::test]
    async fn malformed_response_dropped_whole() {
        let registry = registry(vec![("bad", Behaviour::Malformed)]);
        let outcome = run(&registry).await;
        assert!(outcome.candidates.is_empty());
        assert!(matches!(
            outcome.reports[0].status,
            SourceStatus::Failed { ref reason } if reason.contains("malformed")
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_source_times_out_without_blocking_others() {
        let registry = registry(vec![
            ("slow", Behaviour::Hang),
            ("ok", Behaviour::Return(vec!["soup"])),
        ]);
        let started = Instant::now();
        let outcome = run(&registry).await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(outcome.reports[0].status, SourceStatus::TimedOut);
        assert_eq!(outcome.candidates.len(), 1);
    }

    #[tokio::test]
    async fn rejected_sources_are_skipped() {
        let registry = registry(vec![
            ("a", Behaviour::Return(vec!["a1"])),
            ("b", Behaviour::Return(vec!["b1"])),
        ]);
        let outcome = fan_out(
            registry.entries(),
            &SearchQuery::new("soup"),
            &CancellationToken::new(),
            |e| e.name() != "a",
        )
        .await;
        assert_eq!(outcome.reports[0].status, SourceStatus::Skipped);
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.candidates[0].title, "b1");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_in_flight_sources() {
        let registry = registry(vec![("slow", Behaviour::Hang)]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let outcome = fan_out(registry.entries(), &SearchQuery::new("soup"), &cancel, |_| true).await;
        assert_eq!(outcome.reports[0].status, SourceStatus::Cancelled);
    }

    #[tokio::test]
    async fn already_cancelled_discards_results() {
        let registry = registry(vec![("a", Behaviour::Return(vec!["a1"]))]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = fan_out(registry.entries(), &SearchQuery::new("soup"), &cancel, |_| true).await;
        assert!(outcome.candidates.is_empty());
        assert_eq!(outcome.reports[0].status, SourceStatus::Cancelled);
    }

    #[test]
    fn panic_message_extracts_payloads() {
        let boxed: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(&*boxed), "static str");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*boxed), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(&*boxed), "unknown panic");
    }
}
