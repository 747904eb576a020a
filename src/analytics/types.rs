//! Shared types for the analytics library.
//!
//! These types are used by the query facade, the CLI, and the validation
//! report, keeping filtering, bucketing, and growth math in one place.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use super::bucketing::Period;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Analytics-specific error.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// No record source could be found (no file, empty directory probe).
    #[error("no vehicle registration data found: {0}")]
    DataNotFound(String),

    /// A raw row could not be turned into a registration record.
    #[error("malformed record at row {row}: {reason}")]
    MalformedRecord { row: usize, reason: String },

    /// A granularity name outside `year`, `quarter`, `month`.
    #[error("unknown granularity '{0}' (expected year, quarter, or month)")]
    InvalidGranularity(String),

    /// A grouping dimension name outside `total`, `category`, `manufacturer`.
    #[error("unknown dimension '{0}' (expected total, category, or manufacturer)")]
    InvalidDimension(String),

    /// The aggregated table is tagged with a granularity the operation cannot use.
    #[error("{operation} requires {expected} granularity, got {found}")]
    GranularityMismatch {
        operation: &'static str,
        expected: Granularity,
        found: Granularity,
    },

    /// A string time key could not be parsed at the declared granularity.
    #[error("malformed time key '{key}': {reason}")]
    MalformedTimeKey { key: String, reason: String },

    /// Input exceeded the configured record bound.
    #[error("input exceeds the limit of {limit} records")]
    ResourceLimit { limit: usize },

    /// Summing registration counts overflowed `u64`.
    #[error("registration count overflowed while summing")]
    CountOverflow,

    /// Reading a record source failed for a reason other than absence.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AnalyticsError {
    /// Stable machine-readable kind, used in JSON error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DataNotFound(_) => "data_not_found",
            Self::MalformedRecord { .. } => "malformed_record",
            Self::InvalidGranularity(_) => "invalid_granularity",
            Self::InvalidDimension(_) => "invalid_dimension",
            Self::GranularityMismatch { .. } => "granularity_mismatch",
            Self::MalformedTimeKey { .. } => "malformed_time_key",
            Self::ResourceLimit { .. } => "resource_limit",
            Self::CountOverflow => "count_overflow",
            Self::Io { .. } => "io",
        }
    }
}

/// Convenience alias.
pub type AnalyticsResult<T> = std::result::Result<T, AnalyticsError>;

// ---------------------------------------------------------------------------
// Granularity
// ---------------------------------------------------------------------------

/// Time-bucket granularity (library-side, no clap dependency).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Year,
    #[default]
    Quarter,
    Month,
}

impl Granularity {
    pub const ALL: [Granularity; 3] = [Self::Year, Self::Quarter, Self::Month];
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Year => write!(f, "year"),
            Self::Quarter => write!(f, "quarter"),
            Self::Month => write!(f, "month"),
        }
    }
}

impl FromStr for Granularity {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "year" | "yearly" => Ok(Self::Year),
            "quarter" | "quarterly" | "year_quarter" | "yearquarter" => Ok(Self::Quarter),
            "month" | "monthly" | "year_month" | "yearmonth" => Ok(Self::Month),
            _ => Err(AnalyticsError::InvalidGranularity(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Dimension and growth kind
// ---------------------------------------------------------------------------

/// Dimension crossed with the time key, at most one per aggregate.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    /// Time key only.
    #[default]
    Total,
    /// Grouped by `vehicle_type`.
    Category,
    /// Grouped by `manufacturer`.
    Manufacturer,
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Total => write!(f, "total"),
            Self::Category => write!(f, "category"),
            Self::Manufacturer => write!(f, "manufacturer"),
        }
    }
}

impl FromStr for Dimension {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "total" | "none" => Ok(Self::Total),
            "category" | "vehicle_type" | "type" => Ok(Self::Category),
            "manufacturer" | "maker" => Ok(Self::Manufacturer),
            _ => Err(AnalyticsError::InvalidDimension(s.to_string())),
        }
    }
}

/// Which period-over-period comparison to compute.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GrowthKind {
    Yoy,
    Qoq,
}

impl std::fmt::Display for GrowthKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Yoy => write!(f, "yoy"),
            Self::Qoq => write!(f, "qoq"),
        }
    }
}

impl FromStr for GrowthKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yoy" => Ok(Self::Yoy),
            "qoq" => Ok(Self::Qoq),
            other => Err(format!("unknown growth kind '{other}' (expected yoy or qoq)")),
        }
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Record filter for the filter stage.
///
/// Bounds are inclusive. An empty allow-list means "no restriction" on that
/// dimension, not "match nothing".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordFilter {
    /// Inclusive lower date bound.
    pub start: Option<NaiveDate>,
    /// Inclusive upper date bound.
    pub end: Option<NaiveDate>,
    /// Vehicle type allow-list (empty = all types).
    pub vehicle_types: BTreeSet<String>,
    /// Manufacturer allow-list (empty = all manufacturers).
    pub manufacturers: BTreeSet<String>,
}

impl RecordFilter {
    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            ..Default::default()
        }
    }

    pub fn with_vehicle_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vehicle_types.extend(types.into_iter().map(Into::into));
        self
    }

    pub fn with_manufacturers<I, S>(mut self, manufacturers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.manufacturers
            .extend(manufacturers.into_iter().map(Into::into));
        self
    }

    /// True when the filter restricts nothing.
    pub fn is_unfiltered(&self) -> bool {
        self.start.is_none()
            && self.end.is_none()
            && self.vehicle_types.is_empty()
            && self.manufacturers.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Aggregated rows
// ---------------------------------------------------------------------------

/// One (time key, group key) bucket with its summed registrations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregatedRow {
    #[serde(rename = "time_key")]
    pub period: Period,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub registrations: u64,
}

/// Result of an aggregation, tagged with its granularity and dimension.
///
/// The tags travel with the rows so downstream stages never have to guess the
/// shape of a time key from its contents. Growth and rollup reject a table
/// whose rows disagree with its granularity tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregatedTable {
    pub granularity: Granularity,
    pub dimension: Dimension,
    pub rows: Vec<AggregatedRow>,
}

impl AggregatedTable {
    pub fn empty(granularity: Granularity, dimension: Dimension) -> Self {
        Self {
            granularity,
            dimension,
            rows: Vec::new(),
        }
    }

    /// Build a table from string time keys produced outside the engine.
    ///
    /// Every key is parsed at `granularity`; the first key that does not parse
    /// fails the whole table with [`AnalyticsError::MalformedTimeKey`].
    pub fn from_keyed_rows<I, K>(
        granularity: Granularity,
        dimension: Dimension,
        rows: I,
    ) -> AnalyticsResult<Self>
    where
        I: IntoIterator<Item = (K, Option<String>, u64)>,
        K: AsRef<str>,
    {
        let rows = rows
            .into_iter()
            .map(|(key, group, registrations)| {
                Ok(AggregatedRow {
                    period: Period::parse(key.as_ref(), granularity)?,
                    group,
                    registrations,
                })
            })
            .collect::<AnalyticsResult<Vec<_>>>()?;
        Ok(Self {
            granularity,
            dimension,
            rows,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Exact sum of every row's registrations.
    pub fn total(&self) -> AnalyticsResult<u64> {
        self.rows.iter().try_fold(0u64, |acc, row| {
            acc.checked_add(row.registrations)
                .ok_or(AnalyticsError::CountOverflow)
        })
    }
}

// ---------------------------------------------------------------------------
// Growth rows
// ---------------------------------------------------------------------------

/// An aggregated row extended with its baseline and growth percentage.
///
/// `growth_pct` is `None` exactly when `previous_value` is `None` or zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthRow {
    #[serde(rename = "time_key")]
    pub period: Period,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub registrations: u64,
    #[serde(rename = "previous_period_key")]
    pub previous_period: Period,
    pub previous_value: Option<u64>,
    pub growth_pct: Option<f64>,
}

/// Result of a growth computation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthTable {
    pub kind: GrowthKind,
    /// Granularity of the output rows (`year` for YoY, `quarter` for QoQ).
    pub granularity: Granularity,
    pub dimension: Dimension,
    pub rows: Vec<GrowthRow>,
}

impl GrowthTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows of one group, in period order.
    pub fn group_rows<'a, 'g>(
        &'a self,
        group: Option<&'g str>,
    ) -> impl Iterator<Item = &'a GrowthRow> {
        self.rows
            .iter()
            .filter(move |row| row.group.as_deref() == group)
    }

    /// The growth row for the most recent period of the given group.
    pub fn latest(&self, group: Option<&str>) -> Option<&GrowthRow> {
        self.group_rows(group).max_by_key(|row| row.period)
    }
}

// ---------------------------------------------------------------------------
// Key metrics
// ---------------------------------------------------------------------------

/// Headline numbers shown above the charts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyMetrics {
    /// Registrations in the filtered table.
    pub total_registrations: u64,
    /// Most recent year observed in the filtered table.
    pub latest_year: Option<i32>,
    /// YoY growth of total registrations for `latest_year`.
    pub latest_yoy_pct: Option<f64>,
    /// Vehicle type with the most registrations.
    pub top_vehicle_type: Option<String>,
    /// Share of `top_vehicle_type` in percent.
    pub top_vehicle_type_share_pct: Option<f64>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
