//! Period-over-period growth.
//!
//! Both comparisons share one windowed pass: rows are bucketed per group and
//! keyed by [`Period::index`], and each row is paired with the entry at
//! `index - 1` of the same group. Growth is `None` when that entry is missing
//! or zero.
//!
//! Everything here is a pure function of the input table.

use std::collections::BTreeMap;

use tracing::debug;

use super::bucketing::Period;
use super::derive::growth_pct;
use super::types::*;

/// Dispatch on `kind`.
pub fn compute_growth(aggregated: &AggregatedTable, kind: GrowthKind) -> AnalyticsResult<GrowthTable> {
    match kind {
        GrowthKind::Yoy => yoy_growth(aggregated),
        GrowthKind::Qoq => qoq_growth(aggregated),
    }
}

/// Year-over-year growth per group.
///
/// Sub-year tables are first rolled up to annual totals; the output is always
/// at year granularity.
pub fn yoy_growth(aggregated: &AggregatedTable) -> AnalyticsResult<GrowthTable> {
    let annual = rollup_to_years(aggregated)?;
    let rows = windowed(&annual.rows)?;
    debug!(dimension = %aggregated.dimension, rows = rows.len(), "Computed YoY growth");
    Ok(GrowthTable {
        kind: GrowthKind::Yoy,
        granularity: Granularity::Year,
        dimension: aggregated.dimension,
        rows,
    })
}

/// Quarter-over-quarter growth per group. Requires a quarterly table.
pub fn qoq_growth(aggregated: &AggregatedTable) -> AnalyticsResult<GrowthTable> {
    if aggregated.granularity != Granularity::Quarter {
        return Err(AnalyticsError::GranularityMismatch {
            operation: "QoQ growth",
            expected: Granularity::Quarter,
            found: aggregated.granularity,
        });
    }
    check_row_periods(aggregated, "QoQ growth")?;
    let rows = windowed(&aggregated.rows)?;
    debug!(dimension = %aggregated.dimension, rows = rows.len(), "Computed QoQ growth");
    Ok(GrowthTable {
        kind: GrowthKind::Qoq,
        granularity: Granularity::Quarter,
        dimension: aggregated.dimension,
        rows,
    })
}

/// Re-aggregate any table to annual totals per group.
pub fn rollup_to_years(aggregated: &AggregatedTable) -> AnalyticsResult<AggregatedTable> {
    check_row_periods(aggregated, "year rollup")?;
    if aggregated.granularity == Granularity::Year {
        return Ok(aggregated.clone());
    }
    let mut sums: BTreeMap<(Option<&str>, i32), u64> = BTreeMap::new();
    for row in &aggregated.rows {
        let slot = sums
            .entry((row.group.as_deref(), row.period.year()))
            .or_default();
        *slot = slot
            .checked_add(row.registrations)
            .ok_or(AnalyticsError::CountOverflow)?;
    }
    Ok(AggregatedTable {
        granularity: Granularity::Year,
        dimension: aggregated.dimension,
        rows: sums
            .into_iter()
            .map(|((group, year), registrations)| AggregatedRow {
                period: Period::Year(year),
                group: group.map(str::to_string),
                registrations,
            })
            .collect(),
    })
}

/// Every row's period must sit at the table's tagged granularity, otherwise
/// adjacent indices would compare unlike periods.
fn check_row_periods(aggregated: &AggregatedTable, operation: &'static str) -> AnalyticsResult<()> {
    match aggregated
        .rows
        .iter()
        .find(|row| row.period.granularity() != aggregated.granularity)
    {
        Some(row) => Err(AnalyticsError::GranularityMismatch {
            operation,
            expected: aggregated.granularity,
            found: row.period.granularity(),
        }),
        None => Ok(()),
    }
}

/// Pair every row with its predecessor period in the same group.
///
/// Output is ordered by group, then period. Rows repeating a (group, period)
/// key are summed first so the pairing stays one-to-one.
fn windowed(rows: &[AggregatedRow]) -> AnalyticsResult<Vec<GrowthRow>> {
    let mut groups: BTreeMap<Option<&str>, BTreeMap<i64, (Period, u64)>> = BTreeMap::new();
    for row in rows {
        let entry = groups
            .entry(row.group.as_deref())
            .or_default()
            .entry(row.period.index())
            .or_insert((row.period, 0));
        entry.1 = entry
            .1
            .checked_add(row.registrations)
            .ok_or(AnalyticsError::CountOverflow)?;
    }

    let mut out = Vec::with_capacity(rows.len());
    for (&group, series) in &groups {
        for (index, &(period, value)) in series {
            let previous_value = series.get(&(index - 1)).map(|&(_, v)| v);
            out.push(GrowthRow {
                period,
                group: group.map(str::to_string),
                registrations: value,
                previous_period: period.previous(),
                previous_value,
                growth_pct: growth_pct(value, previous_value),
            });
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn table(
        granularity: Granularity,
        dimension: Dimension,
        rows: &[(&str, Option<&str>, u64)],
    ) -> AggregatedTable {
        AggregatedTable::from_keyed_rows(
            granularity,
            dimension,
            rows.iter()
                .map(|&(k, g, v)| (k, g.map(str::to_string), v)),
        )
        .unwrap()
    }

    fn pcts(g: &GrowthTable) -> Vec<Option<f64>> {
        g.rows.iter().map(|r| r.growth_pct).collect()
    }

    #[test]
    fn yoy_three_year_scenario() {
        let agg = table(
            Granularity::Year,
            Dimension::Total,
            &[("2021", None, 1000), ("2022", None, 1100), ("2023", None, 990)],
        );
        let g = yoy_growth(&agg).unwrap();
        assert_eq!(pcts(&g), vec![None, Some(10.0), Some(-10.0)]);
        assert_eq!(g.rows[1].previous_value, Some(1000));
        assert_eq!(g.rows[1].previous_period, Period::Year(2021));
    }

    #[test]
    fn yoy_first_year_of_each_group_is_null() {
        let agg = table(
            Granularity::Year,
            Dimension::Category,
            &[
                ("2021", Some("2W"), 50),
                ("2022", Some("2W"), 75),
                ("2022", Some("4W"), 20),
                ("2023", Some("4W"), 30),
            ],
        );
        let g = yoy_growth(&agg).unwrap();
        assert_eq!(g.group_rows(Some("2W")).next().unwrap().growth_pct, None);
        assert_eq!(g.group_rows(Some("4W")).next().unwrap().growth_pct, None);
        assert_eq!(g.latest(Some("2W")).unwrap().growth_pct, Some(50.0));
        assert_eq!(g.latest(Some("4W")).unwrap().growth_pct, Some(50.0));
    }

    #[test]
    fn yoy_does_not_join_across_groups() {
        // 4W has 2022 only; its baseline must not be 2W's 2021.
        let agg = table(
            Granularity::Year,
            Dimension::Category,
            &[("2021", Some("2W"), 10), ("2022", Some("4W"), 20)],
        );
        let g = yoy_growth(&agg).unwrap();
        assert!(g.rows.iter().all(|r| r.previous_value.is_none()));
    }

    #[test]
    fn yoy_rolls_quarters_up_to_years() {
        let agg = table(
            Granularity::Quarter,
            Dimension::Total,
            &[
                ("2022-Q1", None, 100),
                ("2022-Q3", None, 100),
                ("2023-Q2", None, 150),
                ("2023-Q4", None, 150),
            ],
        );
        let g = yoy_growth(&agg).unwrap();
        assert_eq!(g.granularity, Granularity::Year);
        assert_eq!(g.rows.len(), 2);
        assert_eq!(g.rows[1].registrations, 300);
        assert_eq!(g.rows[1].growth_pct, Some(50.0));
    }

    #[test]
    fn yoy_rolls_months_up_to_years() {
        let agg = table(
            Granularity::Month,
            Dimension::Total,
            &[("2022-01", None, 40), ("2022-12", None, 60), ("2023-06", None, 80)],
        );
        let g = yoy_growth(&agg).unwrap();
        assert_eq!(pcts(&g), vec![None, Some(-20.0)]);
    }

    #[test]
    fn yoy_gap_year_has_no_baseline() {
        let agg = table(
            Granularity::Year,
            Dimension::Total,
            &[("2020", None, 10), ("2022", None, 20)],
        );
        let g = yoy_growth(&agg).unwrap();
        assert_eq!(pcts(&g), vec![None, None]);
        assert_eq!(g.rows[1].previous_period, Period::Year(2021));
    }

    #[test]
    fn qoq_crosses_year_boundary() {
        let agg = table(
            Granularity::Quarter,
            Dimension::Total,
            &[("2022-Q4", None, 100), ("2023-Q1", None, 120)],
        );
        let g = qoq_growth(&agg).unwrap();
        let q1 = &g.rows[1];
        assert_eq!(q1.period.to_string(), "2023-Q1");
        assert_eq!(q1.previous_period.to_string(), "2022-Q4");
        assert_eq!(q1.previous_value, Some(100));
        assert_eq!(q1.growth_pct, Some(20.0));
    }

    #[test]
    fn qoq_zero_baseline_is_null() {
        let agg = table(
            Granularity::Quarter,
            Dimension::Manufacturer,
            &[("2023-Q1", Some("Ather"), 0), ("2023-Q2", Some("Ather"), 50)],
        );
        let g = qoq_growth(&agg).unwrap();
        assert_eq!(g.rows[1].previous_value, Some(0));
        assert_eq!(g.rows[1].growth_pct, None);
    }

    #[test]
    fn qoq_skipped_quarter_has_no_baseline() {
        let agg = table(
            Granularity::Quarter,
            Dimension::Total,
            &[("2023-Q1", None, 10), ("2023-Q3", None, 30)],
        );
        let g = qoq_growth(&agg).unwrap();
        assert_eq!(g.rows[1].previous_value, None);
        assert_eq!(g.rows[1].previous_period.to_string(), "2023-Q2");
    }

    #[test]
    fn qoq_rejects_non_quarterly_tables() {
        for granularity in [Granularity::Year, Granularity::Month] {
            let agg = AggregatedTable::empty(granularity, Dimension::Total);
            let err = qoq_growth(&agg).unwrap_err();
            assert!(matches!(
                err,
                AnalyticsError::GranularityMismatch { found, .. } if found == granularity
            ));
        }
    }

    #[test]
    fn rows_must_match_the_table_tag() {
        let agg = AggregatedTable {
            granularity: Granularity::Quarter,
            dimension: Dimension::Total,
            rows: vec![
                AggregatedRow {
                    period: Period::Quarter { year: 2023, quarter: 1 },
                    group: None,
                    registrations: 10,
                },
                AggregatedRow {
                    period: Period::Month { year: 2023, month: 2 },
                    group: None,
                    registrations: 20,
                },
            ],
        };
        for result in [qoq_growth(&agg), yoy_growth(&agg)] {
            assert!(matches!(
                result.unwrap_err(),
                AnalyticsError::GranularityMismatch {
                    expected: Granularity::Quarter,
                    found: Granularity::Month,
                    ..
                }
            ));
        }
    }

    #[test]
    fn empty_inputs_give_empty_outputs() {
        assert!(yoy_growth(&AggregatedTable::empty(Granularity::Month, Dimension::Total))
            .unwrap()
            .is_empty());
        assert!(qoq_growth(&AggregatedTable::empty(Granularity::Quarter, Dimension::Category))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn growth_is_idempotent() {
        let agg = table(
            Granularity::Quarter,
            Dimension::Category,
            &[
                ("2022-Q3", Some("2W"), 33),
                ("2022-Q4", Some("2W"), 47),
                ("2023-Q1", Some("2W"), 51),
                ("2023-Q1", Some("3W"), 9),
            ],
        );
        for kind in [GrowthKind::Yoy, GrowthKind::Qoq] {
            let a = compute_growth(&agg, kind).unwrap();
            let b = compute_growth(&agg, kind).unwrap();
            assert_eq!(a, b);
            let bits = |g: &GrowthTable| -> Vec<Option<u64>> {
                g.rows.iter().map(|r| r.growth_pct.map(f64::to_bits)).collect()
            };
            assert_eq!(bits(&a), bits(&b));
        }
    }
}
