//! Derived metric computation for aggregated buckets.
//!
//! All division operations are safe against zero denominators and produce
//! `None` (rendered as JSON `null`) rather than NaN / Infinity.

use std::collections::BTreeMap;

use crate::store::Table;

use super::types::{AnalyticsError, AnalyticsResult, GrowthTable, KeyMetrics};

/// Percent change from `previous` to `current`.
///
/// `None` when there is no baseline or the baseline is zero. The difference is
/// scaled before dividing so round ratios (100 → 120) come out exact.
pub fn growth_pct(current: u64, previous: Option<u64>) -> Option<f64> {
    match previous {
        None | Some(0) => None,
        Some(prev) => {
            let delta = current as f64 - prev as f64;
            Some(delta * 100.0 / prev as f64)
        }
    }
}

/// Share of `part` in `whole` as a percentage, `None` when `whole` is zero.
pub fn share_pct(part: u64, whole: u64) -> Option<f64> {
    if whole == 0 {
        None
    } else {
        Some(part as f64 * 100.0 / whole as f64)
    }
}

/// Compute the headline metrics for a filtered table.
///
/// `total_yoy` is the YoY growth of the ungrouped totals of the same table.
pub fn compute_key_metrics(table: &Table, total_yoy: &GrowthTable) -> AnalyticsResult<KeyMetrics> {
    let total_registrations = table.total_registrations()?;

    let latest = total_yoy.latest(None);
    let latest_year = latest.map(|row| row.period.year());
    let latest_yoy_pct = latest.and_then(|row| row.growth_pct);

    let mut per_type: BTreeMap<&str, u64> = BTreeMap::new();
    for record in table.rows() {
        let slot = per_type.entry(record.vehicle_type).or_default();
        *slot = slot
            .checked_add(record.registrations)
            .ok_or(AnalyticsError::CountOverflow)?;
    }
    // Ties resolve to the alphabetically first type.
    let top = per_type
        .iter()
        .fold(None::<(&str, u64)>, |best, (&name, &count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((name, count)),
        });

    Ok(KeyMetrics {
        total_registrations,
        latest_year,
        latest_yoy_pct,
        top_vehicle_type: top.map(|(name, _)| name.to_string()),
        top_vehicle_type_share_pct: top.and_then(|(_, count)| share_pct(count, total_registrations)),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::types::{Dimension, Granularity, GrowthKind};

    #[test]
    fn growth_pct_missing_baseline() {
        assert_eq!(growth_pct(100, None), None);
    }

    #[test]
    fn growth_pct_zero_baseline_is_null_not_infinite() {
        assert_eq!(growth_pct(50, Some(0)), None);
    }

    #[test]
    fn growth_pct_exact_for_round_ratios() {
        assert_eq!(growth_pct(120, Some(100)), Some(20.0));
        assert_eq!(growth_pct(1100, Some(1000)), Some(10.0));
        assert_eq!(growth_pct(990, Some(1100)), Some(-10.0));
        assert_eq!(growth_pct(0, Some(40)), Some(-100.0));
    }

    #[test]
    fn share_pct_zero_whole() {
        assert_eq!(share_pct(0, 0), None);
        assert_eq!(share_pct(1, 4), Some(25.0));
    }

    #[test]
    fn key_metrics_on_empty_table() {
        let table = Table::default();
        let yoy = GrowthTable {
            kind: GrowthKind::Yoy,
            granularity: Granularity::Year,
            dimension: Dimension::Total,
            rows: vec![],
        };
        let m = compute_key_metrics(&table, &yoy).unwrap();
        assert_eq!(m.total_registrations, 0);
        assert_eq!(m.latest_year, None);
        assert_eq!(m.latest_yoy_pct, None);
        assert_eq!(m.top_vehicle_type, None);
        assert_eq!(m.top_vehicle_type_share_pct, None);
    }
}
