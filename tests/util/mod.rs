use chrono::NaiveDate;
use regstats::store::{RecordStore, RegistrationRecord};
use std::path::PathBuf;
use tempfile::TempDir;

/// Captures tracing output for tests.
#[allow(dead_code)]
pub struct TestTracing {
    buffer: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Assert that the captured log output contains the provided substring.
    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }
}

struct TestWriter(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.0.lock().unwrap();
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Temp directory holding CSV fixtures.
#[allow(dead_code)]
pub struct CsvFixture {
    pub dir: TempDir,
}

#[allow(dead_code)]
impl CsvFixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("tempdir"),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Write `header` plus `rows` to `name` and return its path.
    pub fn write(&self, name: &str, rows: &[&str]) -> PathBuf {
        let path = self.dir.path().join(name);
        let mut body = String::from("date,vehicle_type,manufacturer,registrations\n");
        for row in rows {
            body.push_str(row);
            body.push('\n');
        }
        std::fs::write(&path, body).expect("write fixture");
        path
    }
}

#[allow(dead_code)]
pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("fixture date")
}

/// Builder for in-memory stores.
#[allow(dead_code)]
#[derive(Default)]
pub struct StoreBuilder {
    records: Vec<RegistrationRecord>,
}

#[allow(dead_code)]
impl StoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, day: &str, vehicle_type: &str, manufacturer: &str, n: u64) -> Self {
        self.records
            .push(RegistrationRecord::new(date(day), vehicle_type, manufacturer, n));
        self
    }

    pub fn build(self) -> RecordStore {
        RecordStore::from_records(self.records)
    }
}
