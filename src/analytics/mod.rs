//! Registration analytics library.
//!
//! Filtering, bucketing, aggregation, and growth logic shared by the query
//! facade and the `regstats` CLI.
//!
//! # Module structure
//!
//! - [`types`]: filter, grouping, result structs, error type
//! - [`bucketing`]: date → period conversion and time-key parsing
//! - [`derive`]: zero-safe growth / share percentages, key metrics
//! - [`query`]: filter stage and aggregations
//! - [`growth`]: YoY / QoQ growth
//! - [`validate`]: invariant checks over a loaded table

pub mod bucketing;
pub mod derive;
pub mod growth;
pub mod query;
pub mod types;
pub mod validate;

// Re-export the most commonly used items at the crate::analytics level.
pub use bucketing::Period;
pub use types::{
    AggregatedRow, AggregatedTable, AnalyticsError, AnalyticsResult, Dimension, Granularity,
    GrowthKind, GrowthRow, GrowthTable, KeyMetrics, RecordFilter,
};
pub use validate::{ValidationReport, run_validation};
