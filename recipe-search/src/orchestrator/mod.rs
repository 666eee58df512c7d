//! Search orchestrator: concurrent fan-out, dedup, scoring, ranking.
//!
//! This module fans out a recipe query to every registered source
//! concurrently, collapses near-duplicate titles, scores each survivor on
//! several independent factors, and returns a stably sorted result set.

pub mod dedup;
pub mod fanout;
pub mod rank;
pub mod scoring;
pub mod search;
pub mod similarity;
