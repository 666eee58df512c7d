//! Trait definition for pluggable recipe source adapters, and the ordered
//! registry the fan-out coordinator dispatches to.
//!
//! Adapters own everything provider-specific: authentication, HTTP, and
//! normalisation into [`RawRecipe`]. The aggregation core depends only on
//! [`SourceAdapter`], never on provider identity.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::types::{RawRecipe, SearchFilters};

/// A pluggable recipe provider.
///
/// All implementations must be `Send + Sync` for concurrent fan-out.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable provider name, used in logs, reports, and config overrides.
    fn name(&self) -> &str;

    /// Search the provider and return normalised recipes in provider order.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError`] if the provider request fails or its
    /// response cannot be normalised. The coordinator absorbs the error.
    async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<RawRecipe>, SearchError>;

    /// Default trust weight for this provider.
    fn weight(&self) -> f64 {
        1.0
    }

    /// Provider-specific timeout. `None` uses
    /// [`SearchConfig::default_timeout_ms`].
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

/// One registered source with its trust weight and timeout fixed.
#[derive(Clone)]
pub struct SourceEntry {
    adapter: Arc<dyn SourceAdapter>,
    name: String,
    weight: f64,
    timeout: Option<Duration>,
}

impl SourceEntry {
    pub fn adapter(&self) -> &Arc<dyn SourceAdapter> {
        &self.adapter
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Effective timeout; `None` only before config resolution.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl std::fmt::Debug for SourceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceEntry")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Ordered list of source adapters.
///
/// Registration order is load-bearing: it is the merge order, and
/// therefore decides which provider's copy of a duplicated recipe wins.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    entries: Vec<SourceEntry>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter using its own weight and timeout.
    ///
    /// # Errors
    ///
    /// Same as [`SourceRegistry::register_with`].
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) -> Result<&mut Self, SearchError> {
        let weight = adapter.weight();
        let timeout = adapter.timeout();
        self.push(adapter, weight, timeout)
    }

    /// Register an adapter with an explicit weight and timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the weight is negative or not
    /// finite, the timeout is zero, or the name is already registered.
    pub fn register_with(
        &mut self,
        adapter: Arc<dyn SourceAdapter>,
        weight: f64,
        timeout: Duration,
    ) -> Result<&mut Self, SearchError> {
        self.push(adapter, weight, Some(timeout))
    }

    fn push(
        &mut self,
        adapter: Arc<dyn SourceAdapter>,
        weight: f64,
        timeout: Option<Duration>,
    ) -> Result<&mut Self, SearchError> {
        let name = adapter.name().to_string();
        validate_weight(&name, weight)?;
        validate_timeout(&name, timeout)?;
        if self.entries.iter().any(|e| e.name == name) {
            return Err(SearchError::Config(format!(
                "source {name} registered twice"
            )));
        }
        self.entries.push(SourceEntry {
            adapter,
            name,
            weight,
            timeout,
        });
        Ok(self)
    }

    pub fn entries(&self) -> &[SourceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply config overrides and fill in default timeouts.
    ///
    /// Disabled sources are removed; order of the rest is preserved.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if an override names a source that
    /// is not registered, or produces an invalid weight or timeout.
    pub(crate) fn resolve(mut self, config: &SearchConfig) -> Result<Self, SearchError> {
        for name in config.sources.keys() {
            if !self.entries.iter().any(|e| &e.name == name) {
                return Err(SearchError::Config(format!(
                    "override for unknown source {name}"
                )));
            }
        }

        self.entries.retain(|e| {
            config
                .sources
                .get(&e.name)
                .is_none_or(|o| o.enabled)
        });

        for entry in &mut self.entries {
            if let Some(o) = config.sources.get(&entry.name) {
                if let Some(weight) = o.weight {
                    entry.weight = weight;
                }
                if let Some(ms) = o.timeout_ms {
                    entry.timeout = Some(Duration::from_millis(ms));
                }
            }
            if entry.timeout.is_none() {
                entry.timeout = Some(config.default_timeout());
            }
            validate_weight(&entry.name, entry.weight)?;
            validate_timeout(&entry.name, entry.timeout)?;
        }
        Ok(self)
    }

    /// The entry with the highest weight; the earliest registered wins ties.
    pub fn highest_weight(&self) -> Option<&SourceEntry> {
        self.entries.iter().fold(None, |best, entry| match best {
            Some(b) if b.weight >= entry.weight => Some(b),
            _ => Some(entry),
        })
    }
}

fn validate_weight(name: &str, weight: f64) -> Result<(), SearchError> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(SearchError::Config(format!(
            "source {name} weight must be finite and >= 0, got {weight}"
        )));
    }
    Ok(())
}

fn validate_timeout(name: &str, timeout: Option<Duration>) -> Result<(), SearchError> {
    if timeout.is_some_and(|t| t.is_zero()) {
        return Err(SearchError::Config(format!(
            "source {name} timeout must be greater than 0"
        )));
    }
    Ok(())
}
