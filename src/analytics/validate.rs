//! Analytics validation library.
//!
//! Provides deterministic checks for:
//! - **Calendar invariants**: derived year/quarter/month/keys agree with the date.
//! - **Sum preservation**: every aggregate at every granularity totals the raw table.
//! - **Growth null rule**: growth is null exactly when the baseline is missing or zero.
//!
//! Output is a structured [`ValidationReport`] that serialises to JSON
//! for `regstats validate --json`.

use chrono::Datelike;
use serde::Serialize;

use crate::store::Table;

use super::bucketing::{quarter_of_month, year_month_key, year_quarter_key};
use super::growth::{qoq_growth, yoy_growth};
use super::query::aggregate;
use super::types::{AnalyticsResult, Dimension, Granularity, GrowthTable};

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Severity level for a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A single validation check result.
#[derive(Debug, Clone, Serialize)]
pub struct Check {
    pub id: String,
    pub ok: bool,
    pub severity: Severity,
    pub details: String,
}

impl Check {
    fn pass(id: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ok: true,
            severity: Severity::Info,
            details: details.into(),
        }
    }

    fn fail(id: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ok: false,
            severity: Severity::Error,
            details: details.into(),
        }
    }
}

/// Full validation report.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub rows_checked: usize,
    pub total_registrations: u64,
    pub checks: Vec<Check>,
}

impl ValidationReport {
    /// True if every check passed.
    pub fn all_ok(&self) -> bool {
        self.checks.iter().all(|c| c.ok)
    }

    /// Count of checks that failed with a given severity.
    pub fn count_failures(&self, sev: Severity) -> usize {
        self.checks
            .iter()
            .filter(|c| !c.ok && c.severity == sev)
            .count()
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Run the full validation suite over `table`.
///
/// Only arithmetic failures (count overflow) are returned as errors; invariant
/// violations are reported as failed checks.
pub fn run_validation(table: &Table) -> AnalyticsResult<ValidationReport> {
    let total = table.total_registrations()?;
    let mut checks = vec![validate_calendar_fields(table)];

    for granularity in Granularity::ALL {
        for dimension in [Dimension::Total, Dimension::Category, Dimension::Manufacturer] {
            let agg = aggregate(table, dimension, granularity)?;
            let agg_total = agg.total()?;
            let id = format!("sum_preserved.{dimension}.{granularity}");
            checks.push(if agg_total == total {
                Check::pass(id, format!("{} buckets sum to {total}", agg.len()))
            } else {
                Check::fail(id, format!("buckets sum to {agg_total}, raw total is {total}"))
            });
        }
    }

    let quarterly = aggregate(table, Dimension::Category, Granularity::Quarter)?;
    checks.push(validate_null_rule("growth_null_rule.qoq", &qoq_growth(&quarterly)?));
    checks.push(validate_null_rule("growth_null_rule.yoy", &yoy_growth(&quarterly)?));

    Ok(ValidationReport {
        rows_checked: table.len(),
        total_registrations: total,
        checks,
    })
}

fn validate_calendar_fields(table: &Table) -> Check {
    let mismatches: Vec<usize> = table
        .rows()
        .enumerate()
        .filter(|(_, row)| {
            let year = row.date.year();
            let month = row.date.month();
            let quarter = quarter_of_month(month);
            row.year != year
                || u32::from(row.month) != month
                || row.quarter != quarter
                || row.year_quarter != year_quarter_key(year, quarter)
                || row.year_month != year_month_key(year, month as u8)
        })
        .map(|(i, _)| i)
        .collect();

    if mismatches.is_empty() {
        Check::pass(
            "calendar_fields",
            format!("{} rows agree with their dates", table.len()),
        )
    } else {
        let sample: Vec<String> = mismatches.iter().take(5).map(usize::to_string).collect();
        Check::fail(
            "calendar_fields",
            format!(
                "{} rows disagree with their dates (first rows: {})",
                mismatches.len(),
                sample.join(", ")
            ),
        )
    }
}

fn validate_null_rule(id: &str, growth: &GrowthTable) -> Check {
    let violations = growth
        .rows
        .iter()
        .filter(|row| {
            let baseline_usable = matches!(row.previous_value, Some(v) if v > 0);
            baseline_usable != row.growth_pct.is_some()
        })
        .count();
    if violations == 0 {
        Check::pass(id, format!("{} growth rows checked", growth.rows.len()))
    } else {
        Check::fail(id, format!("{violations} rows break the null-baseline rule"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RegistrationRecord;
    use chrono::NaiveDate;

    #[test]
    fn clean_table_passes_every_check() {
        let d = |m, day| NaiveDate::from_ymd_opt(2022, m, day).unwrap();
        let table = Table::from_records([
            RegistrationRecord::new(d(1, 1), "2W", "Hero", 10),
            RegistrationRecord::new(d(4, 1), "2W", "Hero", 0),
            RegistrationRecord::new(d(7, 1), "2W", "Hero", 5),
            RegistrationRecord::new(d(12, 31), "4W", "Kia", 8),
        ]);
        let report = run_validation(&table).unwrap();
        assert!(report.all_ok(), "{:?}", report.checks);
        assert_eq!(report.total_registrations, 23);
        assert_eq!(report.count_failures(Severity::Error), 0);
        // calendar + 9 sum checks + 2 null-rule checks
        assert_eq!(report.checks.len(), 12);
    }

    #[test]
    fn empty_table_is_valid() {
        let report = run_validation(&Table::default()).unwrap();
        assert!(report.all_ok());
        assert_eq!(report.rows_checked, 0);
    }

    #[test]
    fn null_rule_flags_growth_on_zero_baseline() {
        use crate::analytics::bucketing::Period;
        use crate::analytics::types::{GrowthKind, GrowthRow};

        let bad = GrowthTable {
            kind: GrowthKind::Qoq,
            granularity: Granularity::Quarter,
            dimension: Dimension::Total,
            rows: vec![GrowthRow {
                period: Period::Quarter {
                    year: 2023,
                    quarter: 2,
                },
                group: None,
                registrations: 5,
                previous_period: Period::Quarter {
                    year: 2023,
                    quarter: 1,
                },
                previous_value: Some(0),
                growth_pct: Some(f64::INFINITY),
            }],
        };
        let check = validate_null_rule("x", &bad);
        assert!(!check.ok);
        assert_eq!(check.severity, Severity::Error);
    }
}
