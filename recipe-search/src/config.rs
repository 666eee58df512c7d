//! Search configuration with sensible defaults.
//!
//! [`SearchConfig`] is passed to [`crate::RecipeSearch::new`] at
//! construction. It holds the default per-source timeout, optional result
//! truncation, circuit breaker tuning, and per-source overrides keyed by
//! adapter name. It can be loaded from TOML; missing fields take defaults.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::SearchError;

/// Timeout applied to sources that declare none, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 8_000;

/// Configuration for a [`crate::RecipeSearch`] instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Timeout in milliseconds for adapters that do not declare their own.
    pub default_timeout_ms: u64,
    /// Truncate the ranked list to this many entries. `None` keeps all.
    pub max_results: Option<usize>,
    /// Per-source circuit breaker tuning.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Per-source overrides keyed by adapter name.
    pub sources: BTreeMap<String, SourceOverride>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            max_results: None,
            circuit_breaker: CircuitBreakerConfig::default(),
            sources: BTreeMap::new(),
        }
    }
}

/// Overrides applied to one registered source at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceOverride {
    /// Replacement trust weight.
    pub weight: Option<f64>,
    /// Replacement timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Set to `false` to drop the source from the registry.
    pub enabled: bool,
}

impl Default for SourceOverride {
    fn default() -> Self {
        Self {
            weight: None,
            timeout_ms: None,
            enabled: true,
        }
    }
}

impl SearchConfig {
    /// Default timeout as a [`Duration`].
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the TOML is malformed or the
    /// resulting configuration fails [`SearchConfig::validate`].
    pub fn from_toml_str(content: &str) -> Result<Self, SearchError> {
        let config: Self =
            toml::from_str(content).map_err(|e| SearchError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, SearchError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SearchError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `default_timeout_ms` must be greater than 0
    /// - `max_results`, when set, must be greater than 0
    /// - `circuit_breaker.failure_threshold` must be greater than 0
    /// - source weight overrides must be finite and non-negative
    /// - source timeout overrides must be greater than 0
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.default_timeout_ms == 0 {
            return Err(SearchError::Config(
                "default_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.max_results == Some(0) {
            return Err(SearchError::Config(
                "max_results must be greater than 0 when set".into(),
            ));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(SearchError::Config(
                "circuit_breaker.failure_threshold must be greater than 0".into(),
            ));
        }
        for (name, source) in &self.sources {
            if let Some(weight) = source.weight {
                if !weight.is_finite() || weight < 0.0 {
                    return Err(SearchError::Config(format!(
                        "sources.{name}.weight must be finite and >= 0"
                    )));
                }
            }
            if source.timeout_ms == Some(0) {
                return Err(SearchError::Config(format!(
                    "sources.{name}.timeout_ms must be greater than 0"
                )));
            }
        }
        Ok(())
    }
}
