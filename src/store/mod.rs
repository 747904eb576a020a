//! Record store: the canonical in-memory registration table.
//!
//! Records are loaded once from an injected [`RecordSource`], validated, and
//! enriched with calendar fields. After load the table is read-only; every
//! downstream stage works on its own copy.

pub mod shared;
pub mod source;

use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analytics::bucketing::{Period, quarter_of_month, year_month_key, year_quarter_key};
use crate::analytics::types::{AnalyticsError, AnalyticsResult, Granularity};

pub use shared::SharedStore;
pub use source::{CsvFileSource, DataDirSource, MemorySource, RawRecord, RecordSource};

/// Default upper bound on the number of records a single load may hold.
pub const DEFAULT_MAX_RECORDS: usize = 5_000_000;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A validated raw registration record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub date: NaiveDate,
    pub vehicle_type: String,
    pub manufacturer: String,
    pub registrations: u64,
}

impl RegistrationRecord {
    pub fn new(
        date: NaiveDate,
        vehicle_type: impl Into<String>,
        manufacturer: impl Into<String>,
        registrations: u64,
    ) -> Self {
        Self {
            date,
            vehicle_type: vehicle_type.into(),
            manufacturer: manufacturer.into(),
            registrations,
        }
    }

    /// Validate a raw row. `row` is the 1-based data row used in error messages.
    pub fn from_raw(raw: &RawRecord) -> AnalyticsResult<Self> {
        let bad = |reason: String| AnalyticsError::MalformedRecord {
            row: raw.row,
            reason,
        };

        let date = parse_date(&raw.date).ok_or_else(|| bad(format!("unparseable date '{}'", raw.date)))?;

        let vehicle_type = raw.vehicle_type.trim();
        if vehicle_type.is_empty() {
            return Err(bad("missing vehicle_type".into()));
        }
        let manufacturer = raw.manufacturer.trim();
        if manufacturer.is_empty() {
            return Err(bad("missing manufacturer".into()));
        }

        let count = raw.registrations.trim();
        let registrations = match count.parse::<i64>() {
            Ok(n) if n < 0 => return Err(bad(format!("negative registration count {n}"))),
            Ok(n) => n as u64,
            Err(_) => match count.parse::<u64>() {
                Ok(n) => n,
                Err(_) => return Err(bad(format!("invalid registration count '{count}'"))),
            },
        };

        Ok(Self::new(date, vehicle_type, manufacturer, registrations))
    }
}

/// Parse an ISO-8601 date, tolerating a trailing time component.
fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
                .ok()
                .map(|dt| dt.date())
        })
}

/// Borrowed view of one enriched row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EnrichedRecord<'a> {
    pub date: NaiveDate,
    pub vehicle_type: &'a str,
    pub manufacturer: &'a str,
    pub registrations: u64,
    pub year: i32,
    pub quarter: u8,
    pub month: u8,
    pub year_quarter: &'a str,
    pub year_month: &'a str,
}

impl EnrichedRecord<'_> {
    /// The time bucket of this row at `granularity`, built from the derived
    /// columns rather than re-reading the date.
    pub fn period(&self, granularity: Granularity) -> Period {
        match granularity {
            Granularity::Year => Period::Year(self.year),
            Granularity::Quarter => Period::Quarter {
                year: self.year,
                quarter: self.quarter,
            },
            Granularity::Month => Period::Month {
                year: self.year,
                month: self.month,
            },
        }
    }

    /// Owned copy of the underlying raw record.
    pub fn to_record(&self) -> RegistrationRecord {
        RegistrationRecord::new(
            self.date,
            self.vehicle_type,
            self.manufacturer,
            self.registrations,
        )
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Columnar registration table with calendar fields derived at insert time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    date: Vec<NaiveDate>,
    vehicle_type: Vec<String>,
    manufacturer: Vec<String>,
    registrations: Vec<u64>,
    year: Vec<i32>,
    quarter: Vec<u8>,
    month: Vec<u8>,
    year_quarter: Vec<String>,
    year_month: Vec<String>,
}

impl Table {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            date: Vec::with_capacity(capacity),
            vehicle_type: Vec::with_capacity(capacity),
            manufacturer: Vec::with_capacity(capacity),
            registrations: Vec::with_capacity(capacity),
            year: Vec::with_capacity(capacity),
            quarter: Vec::with_capacity(capacity),
            month: Vec::with_capacity(capacity),
            year_quarter: Vec::with_capacity(capacity),
            year_month: Vec::with_capacity(capacity),
        }
    }

    pub fn from_records<I: IntoIterator<Item = RegistrationRecord>>(records: I) -> Self {
        let mut table = Self::default();
        for record in records {
            table.push(record);
        }
        table
    }

    /// Append a record, deriving its calendar columns from the date.
    pub fn push(&mut self, record: RegistrationRecord) {
        use chrono::Datelike;

        let year = record.date.year();
        let month = record.date.month() as u8;
        let quarter = quarter_of_month(record.date.month());
        self.date.push(record.date);
        self.vehicle_type.push(record.vehicle_type);
        self.manufacturer.push(record.manufacturer);
        self.registrations.push(record.registrations);
        self.year.push(year);
        self.quarter.push(quarter);
        self.month.push(month);
        self.year_quarter.push(year_quarter_key(year, quarter));
        self.year_month.push(year_month_key(year, month));
    }

    pub fn len(&self) -> usize {
        self.date.len()
    }

    pub fn is_empty(&self) -> bool {
        self.date.is_empty()
    }

    pub fn row(&self, i: usize) -> Option<EnrichedRecord<'_>> {
        if i >= self.len() {
            return None;
        }
        Some(EnrichedRecord {
            date: self.date[i],
            vehicle_type: &self.vehicle_type[i],
            manufacturer: &self.manufacturer[i],
            registrations: self.registrations[i],
            year: self.year[i],
            quarter: self.quarter[i],
            month: self.month[i],
            year_quarter: &self.year_quarter[i],
            year_month: &self.year_month[i],
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = EnrichedRecord<'_>> + '_ {
        (0..self.len()).filter_map(move |i| self.row(i))
    }

    /// Independent copy of the rows matching `keep`.
    pub fn select<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(&EnrichedRecord<'_>) -> bool,
    {
        let mut out = Table::default();
        for row in self.rows() {
            if keep(&row) {
                out.date.push(row.date);
                out.vehicle_type.push(row.vehicle_type.to_string());
                out.manufacturer.push(row.manufacturer.to_string());
                out.registrations.push(row.registrations);
                out.year.push(row.year);
                out.quarter.push(row.quarter);
                out.month.push(row.month);
                out.year_quarter.push(row.year_quarter.to_string());
                out.year_month.push(row.year_month.to_string());
            }
        }
        out
    }

    /// Exact sum of the registrations column.
    pub fn total_registrations(&self) -> AnalyticsResult<u64> {
        self.registrations.iter().try_fold(0u64, |acc, &n| {
            acc.checked_add(n).ok_or(AnalyticsError::CountOverflow)
        })
    }

    /// Earliest and latest date, `None` for an empty table.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.date.iter().min()?;
        let max = self.date.iter().max()?;
        Some((*min, *max))
    }

    pub fn distinct_vehicle_types(&self) -> Vec<String> {
        self.vehicle_type
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Sorted manufacturers, optionally limited to one vehicle type.
    pub fn distinct_manufacturers(&self, vehicle_type: Option<&str>) -> Vec<String> {
        self.rows()
            .filter(|row| vehicle_type.is_none_or(|vt| row.vehicle_type == vt))
            .map(|row| row.manufacturer.to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Load options
// ---------------------------------------------------------------------------

/// What to do with a row that fails validation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Abort the load on the first bad row.
    #[default]
    Fail,
    /// Drop bad rows, log them, and count them in the [`LoadReport`].
    Skip,
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub max_records: usize,
    pub malformed: MalformedPolicy,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            max_records: DEFAULT_MAX_RECORDS,
            malformed: MalformedPolicy::Fail,
        }
    }
}

/// Bookkeeping from a single load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub source: String,
    pub rows_read: usize,
    pub rows_loaded: usize,
    pub rows_skipped: usize,
}

// ---------------------------------------------------------------------------
// RecordStore
// ---------------------------------------------------------------------------

/// Owner of the canonical table.
#[derive(Debug, Clone)]
pub struct RecordStore {
    table: Table,
    report: LoadReport,
}

impl RecordStore {
    /// Load with default options (fail on malformed rows).
    pub fn load(source: &dyn RecordSource) -> AnalyticsResult<Self> {
        Self::load_with(source, &LoadOptions::default())
    }

    pub fn load_with(source: &dyn RecordSource, options: &LoadOptions) -> AnalyticsResult<Self> {
        let description = source.describe();
        let raw = source.read_raw(options.max_records)?;
        if raw.len() > options.max_records {
            return Err(AnalyticsError::ResourceLimit {
                limit: options.max_records,
            });
        }

        let mut table = Table::with_capacity(raw.len());
        let mut skipped = 0usize;
        for row in &raw {
            match RegistrationRecord::from_raw(row) {
                Ok(record) => table.push(record),
                Err(err) if options.malformed == MalformedPolicy::Skip => {
                    warn!(source = %description, error = %err, "Skipping malformed record");
                    skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }

        let report = LoadReport {
            source: description,
            rows_read: raw.len(),
            rows_loaded: table.len(),
            rows_skipped: skipped,
        };
        info!(
            source = %report.source,
            rows = report.rows_loaded,
            skipped = report.rows_skipped,
            "Loaded registration records"
        );
        Ok(Self { table, report })
    }

    /// Wrap already-validated records (tests, generators).
    pub fn from_records<I: IntoIterator<Item = RegistrationRecord>>(records: I) -> Self {
        let table = Table::from_records(records);
        debug!(rows = table.len(), "Built record store from records");
        let report = LoadReport {
            source: "records".into(),
            rows_read: table.len(),
            rows_loaded: table.len(),
            rows_skipped: 0,
        };
        Self { table, report }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    /// `(min_date, max_date)`; an empty store has no range.
    pub fn date_range(&self) -> AnalyticsResult<(NaiveDate, NaiveDate)> {
        self.table.date_range().ok_or_else(|| {
            AnalyticsError::DataNotFound(format!("{} contains no records", self.report.source))
        })
    }

    pub fn distinct_vehicle_types(&self) -> Vec<String> {
        self.table.distinct_vehicle_types()
    }

    pub fn distinct_manufacturers(&self, vehicle_type: Option<&str>) -> Vec<String> {
        self.table.distinct_manufacturers(vehicle_type)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(row: usize, date: &str, vt: &str, m: &str, n: &str) -> RawRecord {
        RawRecord {
            row,
            date: date.into(),
            vehicle_type: vt.into(),
            manufacturer: m.into(),
            registrations: n.into(),
        }
    }

    #[test]
    fn enrichment_derives_calendar_fields() {
        let table = Table::from_records([RegistrationRecord::new(
            NaiveDate::from_ymd_opt(2023, 8, 14).unwrap(),
            "4W",
            "Kia",
            12,
        )]);
        let row = table.row(0).unwrap();
        assert_eq!(row.year, 2023);
        assert_eq!(row.quarter, 3);
        assert_eq!(row.month, 8);
        assert_eq!(row.year_quarter, "2023-Q3");
        assert_eq!(row.year_month, "2023-08");
        assert_eq!(row.period(Granularity::Quarter).to_string(), row.year_quarter);
        assert!(table.row(1).is_none());
    }

    #[test]
    fn from_raw_accepts_datetime_suffix() {
        let r = RegistrationRecord::from_raw(&raw(1, "2021-03-01 00:00:00", "2W", "Hero", "7"))
            .unwrap();
        assert_eq!(r.date, NaiveDate::from_ymd_opt(2021, 3, 1).unwrap());
        assert_eq!(r.registrations, 7);
    }

    #[test]
    fn from_raw_rejects_negative_count() {
        let err = RegistrationRecord::from_raw(&raw(4, "2021-03-01", "2W", "Hero", "-3"))
            .unwrap_err();
        match err {
            AnalyticsError::MalformedRecord { row, reason } => {
                assert_eq!(row, 4);
                assert!(reason.contains("negative"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn from_raw_rejects_bad_date_and_blank_fields() {
        assert!(RegistrationRecord::from_raw(&raw(1, "2021-13-01", "2W", "Hero", "1")).is_err());
        assert!(RegistrationRecord::from_raw(&raw(1, "01/03/2021", "2W", "Hero", "1")).is_err());
        assert!(RegistrationRecord::from_raw(&raw(1, "2021-03-01", " ", "Hero", "1")).is_err());
        assert!(RegistrationRecord::from_raw(&raw(1, "2021-03-01", "2W", "", "1")).is_err());
        assert!(RegistrationRecord::from_raw(&raw(1, "2021-03-01", "2W", "Hero", "1.5")).is_err());
    }

    #[test]
    fn load_fails_fast_by_default() {
        let source = MemorySource::from_raw(vec![
            raw(1, "2022-01-01", "2W", "Hero", "5"),
            raw(2, "not-a-date", "2W", "Hero", "5"),
        ]);
        let err = RecordStore::load(&source).unwrap_err();
        assert!(matches!(err, AnalyticsError::MalformedRecord { row: 2, .. }));
    }

    #[test]
    fn load_skip_policy_counts_dropped_rows() {
        let source = MemorySource::from_raw(vec![
            raw(1, "2022-01-01", "2W", "Hero", "5"),
            raw(2, "2022-01-02", "2W", "Hero", "-1"),
            raw(3, "2022-01-03", "3W", "Piaggio", "2"),
        ]);
        let options = LoadOptions {
            malformed: MalformedPolicy::Skip,
            ..Default::default()
        };
        let store = RecordStore::load_with(&source, &options).unwrap();
        assert_eq!(store.table().len(), 2);
        assert_eq!(store.report().rows_read, 3);
        assert_eq!(store.report().rows_skipped, 1);
    }

    #[test]
    fn load_enforces_record_limit() {
        let source = MemorySource::from_raw(vec![
            raw(1, "2022-01-01", "2W", "Hero", "5"),
            raw(2, "2022-01-02", "2W", "Hero", "5"),
        ]);
        let options = LoadOptions {
            max_records: 1,
            ..Default::default()
        };
        let err = RecordStore::load_with(&source, &options).unwrap_err();
        assert!(matches!(err, AnalyticsError::ResourceLimit { limit: 1 }));
    }

    #[test]
    fn distinct_lists_are_sorted_and_filterable() {
        let d = NaiveDate::from_ymd_opt(2022, 5, 1).unwrap();
        let store = RecordStore::from_records([
            RegistrationRecord::new(d, "4W", "Toyota", 1),
            RegistrationRecord::new(d, "2W", "TVS", 1),
            RegistrationRecord::new(d, "2W", "Bajaj", 1),
            RegistrationRecord::new(d, "3W", "Bajaj", 1),
        ]);
        assert_eq!(store.distinct_vehicle_types(), vec!["2W", "3W", "4W"]);
        assert_eq!(
            store.distinct_manufacturers(None),
            vec!["Bajaj", "TVS", "Toyota"]
        );
        assert_eq!(store.distinct_manufacturers(Some("2W")), vec!["Bajaj", "TVS"]);
        assert!(store.distinct_manufacturers(Some("9W")).is_empty());
    }

    #[test]
    fn empty_store_has_no_date_range() {
        let store = RecordStore::from_records(Vec::new());
        assert!(matches!(
            store.date_range(),
            Err(AnalyticsError::DataNotFound(_))
        ));
    }
}
