//! `regstats`: aggregation and period-over-period growth analytics for
//! vehicle registration data.
//!
//! The library is organised leaves first:
//!
//! - [`store`]: record sources, validation, the enriched columnar table, and
//!   the snapshot holder used for reloads
//! - [`analytics`]: filtering, aggregation, YoY / QoQ growth, key metrics and
//!   the validation report
//! - [`facade`]: the named queries a presentation layer calls
//! - [`synth`]: the seeded synthetic feed generator
//! - [`config`]: TOML configuration
//!
//! The rest of this file is the `regstats` command line.

pub mod analytics;
pub mod config;
pub mod facade;
pub mod store;
pub mod synth;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::analytics::{
    AggregatedTable, AnalyticsError, Dimension, Granularity, GrowthKind, GrowthTable, RecordFilter,
};
use crate::config::{AppConfig, CONFIG_ENV, ConfigError, DATA_ENV};
use crate::facade::RegistrationQueries;
use crate::store::RecordStore;
use crate::synth::SynthConfig;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "regstats", version, about = "Vehicle registration growth analytics")]
#[command(
    after_help = "Environment:\n  REGSTATS_DATA     Data file (same as --data)\n  REGSTATS_CONFIG   Config file (same as --config)\n  RUST_LOG          Log filter, e.g. regstats=debug"
)]
pub struct Cli {
    /// CSV file to load. Takes precedence over every directory setting.
    #[arg(long, global = true, env = DATA_ENV)]
    pub data: Option<PathBuf>,

    /// Directory probed for the scraped, then the synthetic, data file.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Config file (default: $XDG_CONFIG_HOME/regstats/config.toml).
    #[arg(long, global = true, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    /// Emit JSON on stdout; errors become a JSON payload on stderr.
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Record filter flags shared by the query commands.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// First day to include (YYYY-MM-DD).
    #[arg(long)]
    pub since: Option<NaiveDate>,

    /// Last day to include (YYYY-MM-DD).
    #[arg(long)]
    pub until: Option<NaiveDate>,

    /// Restrict to a vehicle type; repeatable.
    #[arg(long = "vehicle-type")]
    pub vehicle_types: Vec<String>,

    /// Restrict to a manufacturer; repeatable.
    #[arg(long = "manufacturer")]
    pub manufacturers: Vec<String>,
}

impl FilterArgs {
    pub fn to_filter(&self) -> RecordFilter {
        RecordFilter {
            start: self.since,
            end: self.until,
            ..Default::default()
        }
        .with_vehicle_types(self.vehicle_types.iter().cloned())
        .with_manufacturers(self.manufacturers.iter().cloned())
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// First and last date in the data.
    Range,

    /// Vehicle types present in the data.
    Types,

    /// Manufacturers, optionally for one vehicle type.
    Manufacturers {
        #[arg(long = "vehicle-type")]
        vehicle_type: Option<String>,
    },

    /// Sum registrations per period, optionally per group.
    Aggregate {
        #[command(flatten)]
        filter: FilterArgs,
        /// total, category, or manufacturer.
        #[arg(long, default_value = "total")]
        by: String,
        /// year, quarter, or month (default from config).
        #[arg(long)]
        granularity: Option<String>,
    },

    /// Year-over-year or quarter-over-quarter growth.
    Growth {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, default_value = "yoy")]
        kind: GrowthKind,
        #[arg(long, default_value = "total")]
        by: String,
        #[arg(long)]
        granularity: Option<String>,
    },

    /// Headline metrics: total, latest YoY, leading vehicle type.
    Summary {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Every table the dashboard renders for one filter selection.
    Dashboard {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        granularity: Option<String>,
    },

    /// Check calendar fields, sum preservation and the growth null rule.
    Validate,

    /// Write a seeded synthetic data feed.
    Generate {
        /// Output CSV path.
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long, default_value = "2020-01-01")]
        start: NaiveDate,
        #[arg(long, default_value = "2023-12-31")]
        end: NaiveDate,
    },
}

/// Parsed command line.
#[derive(Debug)]
pub struct ParsedCli {
    pub cli: Cli,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error surfaced by the binary: an exit code plus a machine-readable payload.
///
/// `code == 0` marks informational output (help, version) carried in `message`.
#[derive(Debug, Clone, Serialize)]
pub struct CliError {
    pub code: i32,
    pub kind: &'static str,
    pub message: String,
    pub hint: Option<String>,
    pub retryable: bool,
}

impl CliError {
    fn usage(message: impl Into<String>, hint: Option<&str>) -> Self {
        Self {
            code: 2,
            kind: "usage",
            message: message.into(),
            hint: hint.map(str::to_string),
            retryable: false,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CliError {}

impl From<AnalyticsError> for CliError {
    fn from(err: AnalyticsError) -> Self {
        let (code, hint, retryable) = match &err {
            AnalyticsError::InvalidGranularity(_) => (2, Some("use year, quarter, or month"), false),
            AnalyticsError::InvalidDimension(_) => {
                (2, Some("use total, category, or manufacturer"), false)
            }
            AnalyticsError::GranularityMismatch { .. } => (
                2,
                Some("QoQ needs --granularity quarter; YoY accepts any granularity"),
                false,
            ),
            AnalyticsError::MalformedTimeKey { .. } => (
                2,
                Some("time keys look like 2023, 2023-Q1, or 2023-01"),
                false,
            ),
            AnalyticsError::DataNotFound(_) => (
                3,
                Some("pass --data <file>, set REGSTATS_DATA, or run `regstats generate --out data/vehicle_registrations.csv`"),
                false,
            ),
            AnalyticsError::MalformedRecord { .. } => (
                4,
                Some("fix the row or set malformed_rows = \"skip\" in the config"),
                false,
            ),
            AnalyticsError::ResourceLimit { .. } => (5, Some("raise max_records in the config"), false),
            AnalyticsError::CountOverflow => (6, None, false),
            AnalyticsError::Io { .. } => (7, None, true),
        };
        Self {
            code,
            kind: err.kind(),
            message: err.to_string(),
            hint: hint.map(str::to_string),
            retryable,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self {
            code: 8,
            kind: "config",
            message: err.to_string(),
            hint: Some("check the file passed via --config or REGSTATS_CONFIG".into()),
            retryable: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

pub fn parse_cli(args: Vec<String>) -> Result<ParsedCli, CliError> {
    match Cli::try_parse_from(args) {
        Ok(cli) => Ok(ParsedCli { cli }),
        Err(err) => {
            use clap::error::ErrorKind;
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 2,
            };
            Err(CliError {
                code,
                kind: "usage",
                message: err.render().to_string(),
                hint: None,
                retryable: false,
            })
        }
    }
}

pub fn run_with_parsed(parsed: ParsedCli) -> Result<(), CliError> {
    let cli = parsed.cli;
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Generate {
            out,
            seed,
            start,
            end,
        } => run_generate(out, *seed, *start, *end, cli.json),
        Commands::Range => {
            let (first, last) = Session::open(&cli)?.queries.get_date_range()?;
            if cli.json {
                emit_json(&serde_json::json!({ "start": first, "end": last }))
            } else {
                println!("{first} .. {last}");
                Ok(())
            }
        }
        Commands::Types => emit_list(&Session::open(&cli)?.queries.get_vehicle_types(), cli.json),
        Commands::Manufacturers { vehicle_type } => {
            let session = Session::open(&cli)?;
            emit_list(&session.queries.get_manufacturers(vehicle_type.as_deref()), cli.json)
        }
        Commands::Aggregate {
            filter,
            by,
            granularity: g,
        } => {
            let dimension: Dimension = by.parse()?;
            let session = Session::open(&cli)?;
            let table = session.queries.filter_data(&filter.to_filter());
            let aggregated = session
                .queries
                .aggregate(&table, dimension, session.granularity(g)?)?;
            if cli.json {
                emit_json(&aggregated)
            } else {
                print_aggregate(&aggregated);
                Ok(())
            }
        }
        Commands::Growth {
            filter,
            kind,
            by,
            granularity: g,
        } => {
            let dimension: Dimension = by.parse()?;
            let session = Session::open(&cli)?;
            let growth = session.queries.growth_view(
                &filter.to_filter(),
                dimension,
                session.granularity(g)?,
                *kind,
            )?;
            if cli.json {
                emit_json(&growth)
            } else {
                print_growth(&growth);
                Ok(())
            }
        }
        Commands::Summary { filter } => {
            let metrics = Session::open(&cli)?.queries.key_metrics(&filter.to_filter())?;
            if cli.json {
                return emit_json(&metrics);
            }
            println!("Total registrations: {}", metrics.total_registrations);
            match metrics.latest_year {
                Some(year) => println!("YoY growth ({year}): {}", fmt_pct(metrics.latest_yoy_pct)),
                None => println!("YoY growth: -"),
            }
            println!(
                "Top vehicle type: {} ({})",
                metrics.top_vehicle_type.as_deref().unwrap_or("-"),
                fmt_pct(metrics.top_vehicle_type_share_pct)
            );
            Ok(())
        }
        Commands::Dashboard {
            filter,
            granularity: g,
        } => {
            let session = Session::open(&cli)?;
            let view = session
                .queries
                .dashboard(&filter.to_filter(), session.granularity(g)?)?;
            if cli.json {
                return emit_json(&view);
            }
            println!("== Totals ({})", view.granularity);
            print_aggregate(&view.totals);
            println!("\n== Total YoY");
            print_growth(&view.total_yoy);
            if let Some(qoq) = &view.total_qoq {
                println!("\n== Total QoQ");
                print_growth(qoq);
            }
            println!("\n== Category YoY");
            print_growth(&view.category_yoy);
            if let Some(qoq) = &view.category_qoq {
                println!("\n== Category QoQ");
                print_growth(qoq);
            }
            Ok(())
        }
        Commands::Validate => {
            let session = Session::open(&cli)?;
            let report = analytics::run_validation(session.queries.store().table())?;
            if cli.json {
                emit_json(&report)?;
            } else {
                for check in &report.checks {
                    let mark = if check.ok { "ok  " } else { "FAIL" };
                    println!("{mark} {:<36} {}", check.id, check.details);
                }
            }
            if report.all_ok() {
                Ok(())
            } else {
                Err(CliError {
                    code: 9,
                    kind: "validation_failed",
                    message: format!(
                        "{} of {} checks failed",
                        report.checks.iter().filter(|c| !c.ok).count(),
                        report.checks.len()
                    ),
                    hint: None,
                    retryable: false,
                })
            }
        }
    }
}

/// Resolved config plus the store it points at, opened only by commands that
/// read data.
struct Session {
    config: AppConfig,
    queries: RegistrationQueries,
}

impl Session {
    fn open(cli: &Cli) -> Result<Self, CliError> {
        let config = resolve_config(cli)?;
        let store = RecordStore::load_with(config.source().as_ref(), &config.load_options())?;
        Ok(Self {
            config,
            queries: RegistrationQueries::new(Arc::new(store)),
        })
    }

    /// `--granularity` when given, else the configured default.
    fn granularity(&self, flag: &Option<String>) -> Result<Granularity, CliError> {
        match flag {
            Some(name) => Ok(name.parse::<Granularity>()?),
            None => Ok(self.config.granularity()?),
        }
    }
}

fn run_generate(
    out: &std::path::Path,
    seed: u64,
    start: NaiveDate,
    end: NaiveDate,
    json: bool,
) -> Result<(), CliError> {
    if start > end {
        return Err(CliError::usage(
            format!("--start {start} is after --end {end}"),
            None,
        ));
    }
    let records = synth::generate(&SynthConfig { start, end, seed });
    synth::write_csv_file(&records, out)?;
    if json {
        emit_json(&serde_json::json!({
            "path": out,
            "records": records.len(),
            "seed": seed,
        }))
    } else {
        println!("Wrote {} records to {}", records.len(), out.display());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("regstats={level}")));
    // A subscriber may already be installed when run from tests.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Config file, then command-line overrides.
///
/// Data source precedence: `--data` / `REGSTATS_DATA`, then `--data-dir`,
/// then `data_file` from the config, then `data_dir` from the config.
fn resolve_config(cli: &Cli) -> Result<AppConfig, CliError> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
        config.data_file = None;
    }
    if let Some(file) = &cli.data {
        config.data_file = Some(file.clone());
    }
    debug!(
        data_file = ?config.data_file,
        data_dir = %config.data_dir.display(),
        max_records = config.max_records,
        "Resolved configuration"
    );
    Ok(config)
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn emit_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| CliError {
        code: 1,
        kind: "serialization",
        message: e.to_string(),
        hint: None,
        retryable: false,
    })?;
    println!("{text}");
    Ok(())
}

fn emit_list(items: &[String], json: bool) -> Result<(), CliError> {
    if json {
        return emit_json(items);
    }
    for item in items {
        println!("{item}");
    }
    Ok(())
}

fn fmt_pct(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}%"))
}

fn print_aggregate(table: &AggregatedTable) {
    for row in &table.rows {
        match &row.group {
            Some(group) => println!("{:<8} {:<16} {:>12}", row.period.to_string(), group, row.registrations),
            None => println!("{:<8} {:>12}", row.period.to_string(), row.registrations),
        }
    }
}

fn print_growth(table: &GrowthTable) {
    for row in &table.rows {
        let previous = row
            .previous_value
            .map_or_else(|| "-".to_string(), |v| v.to_string());
        println!(
            "{:<8} {:<16} {:>12} {:>12} {:>9}",
            row.period.to_string(),
            row.group.as_deref().unwrap_or("total"),
            row.registrations,
            previous,
            fmt_pct(row.growth_pct)
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
