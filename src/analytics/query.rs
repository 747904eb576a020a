//! Filter and aggregation queries over the registration table.
//!
//! All functions take a borrowed [`Table`] and return independently owned
//! results; the input is never modified.

use std::collections::BTreeMap;

use tracing::debug;

use crate::store::Table;

use super::bucketing::Period;
use super::types::*;

// ---------------------------------------------------------------------------
// Filter stage
// ---------------------------------------------------------------------------

/// Rows of `table` matching `filter`, as a new table.
///
/// Date bounds are inclusive; empty allow-lists do not restrict.
pub fn filter_table(table: &Table, filter: &RecordFilter) -> Table {
    if filter.is_unfiltered() {
        return table.clone();
    }
    let out = table.select(|row| {
        filter.start.is_none_or(|start| row.date >= start)
            && filter.end.is_none_or(|end| row.date <= end)
            && (filter.vehicle_types.is_empty() || filter.vehicle_types.contains(row.vehicle_type))
            && (filter.manufacturers.is_empty() || filter.manufacturers.contains(row.manufacturer))
    });
    debug!(rows_in = table.len(), rows_out = out.len(), "Filtered registrations");
    out
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Sum registrations by time key at `granularity`, crossed with `dimension`.
///
/// Rows come back ordered by (group, period); callers may re-sort for display.
pub fn aggregate(
    table: &Table,
    dimension: Dimension,
    granularity: Granularity,
) -> AnalyticsResult<AggregatedTable> {
    let mut sums: BTreeMap<(Option<&str>, Period), u64> = BTreeMap::new();
    for row in table.rows() {
        let group = match dimension {
            Dimension::Total => None,
            Dimension::Category => Some(row.vehicle_type),
            Dimension::Manufacturer => Some(row.manufacturer),
        };
        let slot = sums.entry((group, row.period(granularity))).or_default();
        *slot = slot
            .checked_add(row.registrations)
            .ok_or(AnalyticsError::CountOverflow)?;
    }

    let rows: Vec<AggregatedRow> = sums
        .into_iter()
        .map(|((group, period), registrations)| AggregatedRow {
            period,
            group: group.map(str::to_string),
            registrations,
        })
        .collect();
    debug!(%dimension, %granularity, rows = rows.len(), "Aggregated registrations");

    Ok(AggregatedTable {
        granularity,
        dimension,
        rows,
    })
}

/// Totals per period, no group key.
pub fn total_by_period(table: &Table, granularity: Granularity) -> AnalyticsResult<AggregatedTable> {
    aggregate(table, Dimension::Total, granularity)
}

/// Totals per (period, vehicle_type).
pub fn by_category(table: &Table, granularity: Granularity) -> AnalyticsResult<AggregatedTable> {
    aggregate(table, Dimension::Category, granularity)
}

/// Totals per (period, manufacturer).
pub fn by_manufacturer(table: &Table, granularity: Granularity) -> AnalyticsResult<AggregatedTable> {
    aggregate(table, Dimension::Manufacturer, granularity)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
