//! Query facade: the named operations the presentation layer calls.
//!
//! A [`RegistrationQueries`] holds one store snapshot for its whole lifetime,
//! so every view it builds is computed against the same data even if the
//! [`SharedStore`] is reloaded meanwhile.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::analytics::derive::compute_key_metrics;
use crate::analytics::growth::{compute_growth, qoq_growth, yoy_growth};
use crate::analytics::query::{aggregate, filter_table};
use crate::analytics::{
    AggregatedTable, AnalyticsResult, Dimension, Granularity, GrowthKind, GrowthTable, KeyMetrics,
    RecordFilter,
};
use crate::store::{RecordStore, SharedStore, Table};

/// Everything the dashboard renders for one filter selection.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub granularity: Granularity,
    pub key_metrics: KeyMetrics,
    pub totals: AggregatedTable,
    pub by_category: AggregatedTable,
    pub by_manufacturer: AggregatedTable,
    /// Annual overall totals with YoY growth.
    pub total_yoy: GrowthTable,
    /// Only present for quarterly views.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_qoq: Option<GrowthTable>,
    /// Annual category totals with YoY growth.
    pub category_yoy: GrowthTable,
    /// Only present for quarterly views.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_qoq: Option<GrowthTable>,
}

/// Read-only queries over one store snapshot.
#[derive(Debug, Clone)]
pub struct RegistrationQueries {
    store: Arc<RecordStore>,
}

impl RegistrationQueries {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    pub fn from_shared(shared: &SharedStore) -> Self {
        Self::new(shared.snapshot())
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn get_date_range(&self) -> AnalyticsResult<(NaiveDate, NaiveDate)> {
        self.store.date_range()
    }

    pub fn get_vehicle_types(&self) -> Vec<String> {
        self.store.distinct_vehicle_types()
    }

    pub fn get_manufacturers(&self, vehicle_type: Option<&str>) -> Vec<String> {
        self.store.distinct_manufacturers(vehicle_type)
    }

    pub fn filter_data(&self, filter: &RecordFilter) -> Table {
        filter_table(self.store.table(), filter)
    }

    pub fn aggregate(
        &self,
        table: &Table,
        dimension: Dimension,
        granularity: Granularity,
    ) -> AnalyticsResult<AggregatedTable> {
        aggregate(table, dimension, granularity)
    }

    /// Growth of an aggregate. The group dimension comes from the table's tag.
    pub fn growth(&self, aggregated: &AggregatedTable, kind: GrowthKind) -> AnalyticsResult<GrowthTable> {
        compute_growth(aggregated, kind)
    }

    /// Filter, aggregate and compute growth in one call.
    ///
    /// For YoY the aggregate is rolled up to years before the comparison, so
    /// any granularity is accepted; QoQ needs `Granularity::Quarter`.
    pub fn growth_view(
        &self,
        filter: &RecordFilter,
        dimension: Dimension,
        granularity: Granularity,
        kind: GrowthKind,
    ) -> AnalyticsResult<GrowthTable> {
        let table = self.filter_data(filter);
        let aggregated = aggregate(&table, dimension, granularity)?;
        match kind {
            GrowthKind::Yoy => yoy_growth(&aggregated),
            GrowthKind::Qoq => qoq_growth(&aggregated),
        }
    }

    /// Headline metrics for a filter selection.
    pub fn key_metrics(&self, filter: &RecordFilter) -> AnalyticsResult<KeyMetrics> {
        let table = self.filter_data(filter);
        let totals = aggregate(&table, Dimension::Total, Granularity::Year)?;
        compute_key_metrics(&table, &yoy_growth(&totals)?)
    }

    /// All tables for one dashboard render.
    pub fn dashboard(&self, filter: &RecordFilter, granularity: Granularity) -> AnalyticsResult<DashboardView> {
        let table = self.filter_data(filter);

        let totals = aggregate(&table, Dimension::Total, granularity)?;
        let by_category = aggregate(&table, Dimension::Category, granularity)?;
        let by_manufacturer = aggregate(&table, Dimension::Manufacturer, granularity)?;

        let total_yoy = yoy_growth(&totals)?;
        let category_yoy = yoy_growth(&by_category)?;
        let (total_qoq, category_qoq) = match granularity {
            Granularity::Quarter => (Some(qoq_growth(&totals)?), Some(qoq_growth(&by_category)?)),
            _ => (None, None),
        };
        let key_metrics = compute_key_metrics(&table, &total_yoy)?;

        debug!(
            %granularity,
            rows = table.len(),
            periods = totals.len(),
            "Built dashboard view"
        );
        Ok(DashboardView {
            granularity,
            key_metrics,
            totals,
            by_category,
            by_manufacturer,
            total_yoy,
            total_qoq,
            category_yoy,
            category_qoq,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
