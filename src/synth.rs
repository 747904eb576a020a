//! Synthetic registration feed.
//!
//! Produces daily per-manufacturer counts with an annual sine seasonality, a
//! linear 15%-per-year trend, a Q4 bump and Q2 dip, a weekend dip and rare
//! promotional spikes. Output is deterministic for a given seed.

use std::f64::consts::PI;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{Datelike, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::analytics::bucketing::quarter_of_month;
use crate::analytics::types::{AnalyticsError, AnalyticsResult};
use crate::store::RegistrationRecord;
use crate::store::source::COLUMNS;

/// Vehicle categories and the manufacturers registered under each.
pub const CATALOG: &[(&str, &[&str])] = &[
    (
        "2W",
        &[
            "Hero",
            "Honda",
            "TVS",
            "Bajaj",
            "Royal Enfield",
            "Yamaha",
            "Suzuki",
            "Ola Electric",
            "Ather",
        ],
    ),
    ("3W", &["Bajaj", "Piaggio", "Mahindra", "TVS", "Atul", "Kinetic"]),
    (
        "4W",
        &[
            "Maruti Suzuki",
            "Hyundai",
            "Tata Motors",
            "Mahindra",
            "Kia",
            "Toyota",
            "Honda",
            "MG",
            "Skoda",
            "Volkswagen",
        ],
    ),
];

const PROMOTION_CHANCE: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthConfig {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub seed: u64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap_or_default(),
            seed: 42,
        }
    }
}

fn category_factor(vehicle_type: &str) -> f64 {
    match vehicle_type {
        "2W" => 5.0,
        "3W" => 0.5,
        _ => 1.0,
    }
}

fn quarter_factor(quarter: u8) -> f64 {
    match quarter {
        2 => 0.97,
        4 => 1.05,
        _ => 1.0,
    }
}

/// Generate records for every day in `[start, end]`. Zero counts are dropped.
pub fn generate(config: &SynthConfig) -> Vec<RegistrationRecord> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut out = Vec::new();

    for date in config.start.iter_days().take_while(|d| *d <= config.end) {
        let seasonal = 1000.0 + 500.0 * (f64::from(date.ordinal()) * 2.0 * PI / 365.0).sin();
        let trend = 1.0 + 0.15 * f64::from(date.year() - config.start.year());
        let quarter = quarter_factor(quarter_of_month(date.month()));
        let weekday = match date.weekday() {
            Weekday::Sat | Weekday::Sun => 0.6,
            _ => 1.0,
        };
        let day_base = seasonal * trend * quarter * weekday;

        for &(vehicle_type, manufacturers) in CATALOG {
            for &manufacturer in manufacturers {
                let share: f64 = rng.gen_range(0.5..1.5);
                let noise: f64 = rng.gen_range(0.8..1.2);
                let mut count = (day_base * category_factor(vehicle_type) * share * noise) as u64;
                if rng.gen_bool(PROMOTION_CHANCE) {
                    count = (count as f64 * rng.gen_range(1.5..2.5)) as u64;
                }
                if count > 0 {
                    out.push(RegistrationRecord::new(date, vehicle_type, manufacturer, count));
                }
            }
        }
    }

    info!(
        start = %config.start,
        end = %config.end,
        seed = config.seed,
        records = out.len(),
        "Generated synthetic registrations"
    );
    out
}

/// Write records in the input CSV format.
pub fn write_csv<W: Write>(records: &[RegistrationRecord], writer: W) -> std::io::Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(COLUMNS)?;
    for record in records {
        out.write_record([
            record.date.format("%Y-%m-%d").to_string(),
            record.vehicle_type.clone(),
            record.manufacturer.clone(),
            record.registrations.to_string(),
        ])?;
    }
    out.flush()
}

/// Write records to `path`, creating parent directories as needed.
pub fn write_csv_file(records: &[RegistrationRecord], path: &Path) -> AnalyticsResult<()> {
    let io_err = |source| AnalyticsError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let file = File::create(path).map_err(io_err)?;
    write_csv(records, BufWriter::new(file)).map_err(io_err)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
