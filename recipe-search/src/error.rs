//! Error types for the recipe-search crate.
//!
//! All errors use stable string messages suitable for display to users
//! and programmatic handling. Source-level errors never escape the
//! fan-out boundary; callers normally only see [`SearchError::Fallback`],
//! [`SearchError::Cancelled`], or [`SearchError::Config`].

/// Errors that can occur during recipe search operations.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// A source adapter exceeded its time budget.
    #[error("source timed out: {0}")]
    SourceTimeout(String),

    /// A source adapter failed or returned malformed data.
    #[error("source error: {0}")]
    Source(String),

    /// An internal defect in merge, dedup, scoring, or ranking.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// The single-source fallback path also failed.
    #[error("search unavailable: {0}")]
    Fallback(String),

    /// The caller cancelled the search before it completed.
    #[error("search cancelled")]
    Cancelled,

    /// Invalid search configuration or source registry.
    #[error("config error: {0}")]
    Config(String),
}

/// Convenience type alias for recipe-search results.
pub type Result<T> = std::result::Result<T, SearchError>;
