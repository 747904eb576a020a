//! Record sources.
//!
//! A [`RecordSource`] yields raw, unvalidated rows; validation and enrichment
//! happen in [`RecordStore::load_with`](super::RecordStore::load_with) so every
//! source shares one malformed-row policy.
//!
//! Which file to read is decided by the caller: the store never probes the
//! filesystem on its own.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::PathBuf;

use tracing::{debug, info};

use crate::analytics::types::{AnalyticsError, AnalyticsResult};

/// File written by the scraping feed.
pub const SCRAPED_FILE: &str = "vehicle_registrations_scraped.csv";
/// File written by the synthetic generator.
pub const SYNTHETIC_FILE: &str = "vehicle_registrations.csv";

/// Column names of the input format, in canonical order.
pub const COLUMNS: [&str; 4] = ["date", "vehicle_type", "manufacturer", "registrations"];

/// One unvalidated input row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    /// 1-based data row number (header excluded).
    pub row: usize,
    pub date: String,
    pub vehicle_type: String,
    pub manufacturer: String,
    pub registrations: String,
}

/// A producer of raw registration rows.
pub trait RecordSource {
    /// Human-readable description for logs and error messages.
    fn describe(&self) -> String;

    /// Read every raw row. Implementations must fail with
    /// [`AnalyticsError::ResourceLimit`] rather than buffer more than `limit` rows.
    fn read_raw(&self, limit: usize) -> AnalyticsResult<Vec<RawRecord>>;
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Rows held in memory; used by tests and by callers that already have data.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    rows: Vec<RawRecord>,
}

impl MemorySource {
    pub fn from_raw(rows: Vec<RawRecord>) -> Self {
        Self { rows }
    }

    /// Append one row given as `(date, vehicle_type, manufacturer, count)`.
    pub fn push(&mut self, date: &str, vehicle_type: &str, manufacturer: &str, registrations: i64) {
        let row = self.rows.len() + 1;
        self.rows.push(RawRecord {
            row,
            date: date.into(),
            vehicle_type: vehicle_type.into(),
            manufacturer: manufacturer.into(),
            registrations: registrations.to_string(),
        });
    }
}

impl RecordSource for MemorySource {
    fn describe(&self) -> String {
        format!("memory ({} rows)", self.rows.len())
    }

    fn read_raw(&self, limit: usize) -> AnalyticsResult<Vec<RawRecord>> {
        if self.rows.len() > limit {
            return Err(AnalyticsError::ResourceLimit { limit });
        }
        Ok(self.rows.clone())
    }
}

// ---------------------------------------------------------------------------
// CSV file
// ---------------------------------------------------------------------------

/// A single CSV file in the input format.
#[derive(Debug, Clone)]
pub struct CsvFileSource {
    path: PathBuf,
}

impl CsvFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RecordSource for CsvFileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn read_raw(&self, limit: usize) -> AnalyticsResult<Vec<RawRecord>> {
        let file = File::open(&self.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                AnalyticsError::DataNotFound(format!("{} does not exist", self.path.display()))
            }
            _ => AnalyticsError::Io {
                path: self.path.clone(),
                source: e,
            },
        })?;
        read_csv(file, limit).map_err(|e| match e {
            CsvReadError::Io(source) => AnalyticsError::Io {
                path: self.path.clone(),
                source,
            },
            CsvReadError::Analytics(err) => err,
        })
    }
}

// ---------------------------------------------------------------------------
// Data directory probe
// ---------------------------------------------------------------------------

/// A data directory holding one of several candidate files, tried in order.
///
/// The default candidates prefer scraped data over synthetic data.
#[derive(Debug, Clone)]
pub struct DataDirSource {
    dir: PathBuf,
    candidates: Vec<String>,
}

impl DataDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            candidates: vec![SCRAPED_FILE.to_string(), SYNTHETIC_FILE.to_string()],
        }
    }

    /// First candidate that exists on disk, without logging.
    fn find(&self) -> Option<PathBuf> {
        self.candidates
            .iter()
            .map(|name| self.dir.join(name))
            .find(|path| path.is_file())
    }

    /// First candidate that exists on disk.
    pub fn resolve(&self) -> AnalyticsResult<PathBuf> {
        match self.find() {
            Some(path) => {
                info!(path = %path.display(), "Using registration data file");
                Ok(path)
            }
            None => {
                debug!(dir = %self.dir.display(), "No candidate data file present");
                Err(AnalyticsError::DataNotFound(format!(
                    "none of [{}] exist in {}; generate or scrape data first",
                    self.candidates.join(", "),
                    self.dir.display()
                )))
            }
        }
    }
}

impl RecordSource for DataDirSource {
    fn describe(&self) -> String {
        match self.find() {
            Some(path) => path.display().to_string(),
            None => format!("{} (no data file)", self.dir.display()),
        }
    }

    fn read_raw(&self, limit: usize) -> AnalyticsResult<Vec<RawRecord>> {
        CsvFileSource::new(self.resolve()?).read_raw(limit)
    }
}

// ---------------------------------------------------------------------------
// CSV parsing
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum CsvReadError {
    Io(std::io::Error),
    Analytics(AnalyticsError),
}

impl From<AnalyticsError> for CsvReadError {
    fn from(e: AnalyticsError) -> Self {
        Self::Analytics(e)
    }
}

impl From<csv::Error> for CsvReadError {
    fn from(e: csv::Error) -> Self {
        if e.is_io_error() {
            if let csv::ErrorKind::Io(io) = e.into_kind() {
                return Self::Io(io);
            }
            return Self::Io(std::io::Error::other("csv read failed"));
        }
        let row = e
            .position()
            .map_or(0, |pos| usize::try_from(pos.record()).unwrap_or(usize::MAX));
        Self::Analytics(AnalyticsError::MalformedRecord {
            row,
            reason: e.to_string(),
        })
    }
}

/// Read CSV records, mapping columns by header name. Quoted fields may span
/// lines. Missing fields are left empty so the store reports them under its
/// malformed-row policy.
fn read_csv<R: Read>(reader: R, limit: usize) -> Result<Vec<RawRecord>, CsvReadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let header = reader.headers()?.clone();
    if header.iter().all(|h| h.trim().is_empty()) {
        return Ok(Vec::new());
    }

    let mut positions = [0usize; 4];
    for (slot, column) in positions.iter_mut().zip(COLUMNS) {
        *slot = header
            .iter()
            .position(|h| h.trim_start_matches('\u{feff}').trim().eq_ignore_ascii_case(column))
            .ok_or_else(|| AnalyticsError::MalformedRecord {
                row: 0,
                reason: format!("header is missing column '{column}'"),
            })?;
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        if rows.len() == limit {
            return Err(AnalyticsError::ResourceLimit { limit }.into());
        }
        let field = |i: usize| record.get(positions[i]).unwrap_or_default().to_string();
        rows.push(RawRecord {
            row: rows.len() + 1,
            date: field(0),
            vehicle_type: field(1),
            manufacturer: field(2),
            registrations: field(3),
        });
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_csv_handles_quotes_escapes_and_embedded_newlines() {
        let data = "date,vehicle_type,manufacturer,registrations\r\n\
                    2022-01-01,4W,\"Tata, Motors\",5\r\n\
                    2022-01-02,4W,\"say \"\"hi\"\"\",6\r\n\
                    2022-01-03,2W,\"Hero\nMotoCorp\",7\r\n";
        let rows = read_csv(data.as_bytes(), 100).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].manufacturer, "Tata, Motors");
        assert_eq!(rows[1].manufacturer, r#"say "hi""#);
        assert_eq!(rows[2].manufacturer, "Hero\nMotoCorp");
        assert_eq!(rows[2].registrations, "7");
        assert_eq!(rows[2].row, 3);
    }

    #[test]
    fn read_csv_empty_input_has_no_rows() {
        assert!(read_csv("".as_bytes(), 10).unwrap().is_empty());
    }

    #[test]
    fn read_csv_maps_columns_by_header() {
        let data = "registrations,manufacturer,date,vehicle_type\n12,Hero,2022-02-03,2W\n\n7,Kia,2022-02-04,4W\n";
        let rows = read_csv(data.as_bytes(), 100).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, "2022-02-03");
        assert_eq!(rows[0].vehicle_type, "2W");
        assert_eq!(rows[0].manufacturer, "Hero");
        assert_eq!(rows[0].registrations, "12");
        assert_eq!(rows[1].row, 2);
    }

    #[test]
    fn read_csv_rejects_missing_header_column() {
        let data = "date,vehicle_type,registrations\n2022-01-01,2W,4\n";
        let err = read_csv(data.as_bytes(), 100).unwrap_err();
        match err {
            CsvReadError::Analytics(AnalyticsError::MalformedRecord { row, reason }) => {
                assert_eq!(row, 0);
                assert!(reason.contains("manufacturer"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn read_csv_short_rows_leave_fields_empty() {
        let data = "date,vehicle_type,manufacturer,registrations\n2022-01-01,2W\n";
        let rows = read_csv(data.as_bytes(), 100).unwrap();
        assert_eq!(rows[0].manufacturer, "");
        assert_eq!(rows[0].registrations, "");
    }

    #[test]
    fn read_csv_stops_at_limit() {
        let data = "date,vehicle_type,manufacturer,registrations\n2022-01-01,2W,Hero,1\n2022-01-02,2W,Hero,1\n";
        let err = read_csv(data.as_bytes(), 1).unwrap_err();
        assert!(matches!(
            err,
            CsvReadError::Analytics(AnalyticsError::ResourceLimit { limit: 1 })
        ));
    }

    #[test]
    fn missing_file_is_data_not_found() {
        let source = CsvFileSource::new("/definitely/not/here.csv");
        assert!(matches!(
            source.read_raw(10),
            Err(AnalyticsError::DataNotFound(_))
        ));
    }

    #[test]
    fn memory_source_numbers_rows() {
        let mut source = MemorySource::default();
        source.push("2022-01-01", "2W", "Hero", 3);
        source.push("2022-01-02", "2W", "Hero", -4);
        let rows = source.read_raw(10).unwrap();
        assert_eq!(rows[1].row, 2);
        assert_eq!(rows[1].registrations, "-4");
        assert!(source.read_raw(1).is_err());
    }
}
