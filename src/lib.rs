//! Statistical aggregation and trend analysis for rubric-based
//! outcome-assessment scores: semester normalization, per-group
//! attainment aggregates, a random-intercept trend model with an OLS
//! fallback, rank-based significance tests, and target classification.
//!
//! The crate consumes a plain table of assessment rows and produces plain
//! data results; rendering, persistence, and authentication live in
//! external collaborators. Every entry point is stateless, so independent
//! analyses can run concurrently without coordination.

pub mod aggregate;
pub mod analysis;
pub mod classify;
pub mod dataset;
pub mod models;
pub mod narrative;
pub mod report;
pub mod semester;
pub mod signif;
pub mod trend;
