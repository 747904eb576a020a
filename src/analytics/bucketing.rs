//! Time-bucket conversions for analytics.
//!
//! Converts calendar dates into typed [`Period`] buckets and parses the
//! human-readable keys (`YYYY`, `YYYY-Qn`, `YYYY-MM`) used in CSV/JSON output
//! back into periods.

use chrono::{Datelike, NaiveDate};
use serde::{Serialize, Serializer};

use super::types::{AnalyticsError, AnalyticsResult, Granularity};

/// Calendar quarter (1-4) of a month (1-12).
pub fn quarter_of_month(month: u32) -> u8 {
    // ceil(month / 3)
    month.div_ceil(3) as u8
}

/// Format a year-quarter key (`YYYY-Qn`).
pub fn year_quarter_key(year: i32, quarter: u8) -> String {
    format!("{year:04}-Q{quarter}")
}

/// Format a year-month key (`YYYY-MM`).
pub fn year_month_key(year: i32, month: u8) -> String {
    format!("{year:04}-{month:02}")
}

// ---------------------------------------------------------------------------
// Period
// ---------------------------------------------------------------------------

/// A time bucket at one of the three granularities.
///
/// Ordering is only meaningful between periods of the same granularity, which
/// is all an aggregated table ever holds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Period {
    Year(i32),
    Quarter { year: i32, quarter: u8 },
    Month { year: i32, month: u8 },
}

impl Period {
    /// Bucket a date at the given granularity.
    pub fn of_date(date: NaiveDate, granularity: Granularity) -> Self {
        let year = date.year();
        match granularity {
            Granularity::Year => Self::Year(year),
            Granularity::Quarter => Self::Quarter {
                year,
                quarter: quarter_of_month(date.month()),
            },
            Granularity::Month => Self::Month {
                year,
                month: date.month() as u8,
            },
        }
    }

    pub fn granularity(&self) -> Granularity {
        match self {
            Self::Year(_) => Granularity::Year,
            Self::Quarter { .. } => Granularity::Quarter,
            Self::Month { .. } => Granularity::Month,
        }
    }

    /// Calendar year the period falls in.
    pub fn year(&self) -> i32 {
        match *self {
            Self::Year(year) | Self::Quarter { year, .. } | Self::Month { year, .. } => year,
        }
    }

    /// Monotonic, gap-free index: consecutive periods differ by exactly one,
    /// including across year boundaries (Q4 of Y is one step before Q1 of Y+1).
    pub fn index(&self) -> i64 {
        match *self {
            Self::Year(year) => i64::from(year),
            Self::Quarter { year, quarter } => i64::from(year) * 4 + i64::from(quarter) - 1,
            Self::Month { year, month } => i64::from(year) * 12 + i64::from(month) - 1,
        }
    }

    /// Inverse of [`Period::index`] for the given granularity.
    pub fn from_index(index: i64, granularity: Granularity) -> Self {
        match granularity {
            Granularity::Year => Self::Year(index as i32),
            Granularity::Quarter => Self::Quarter {
                year: index.div_euclid(4) as i32,
                quarter: (index.rem_euclid(4) + 1) as u8,
            },
            Granularity::Month => Self::Month {
                year: index.div_euclid(12) as i32,
                month: (index.rem_euclid(12) + 1) as u8,
            },
        }
    }

    /// The immediately preceding period at the same granularity.
    pub fn previous(&self) -> Self {
        Self::from_index(self.index() - 1, self.granularity())
    }

    /// Parse a key at an explicitly declared granularity.
    ///
    /// `YYYY` for years, `YYYY-Qn` (n in 1-4) for quarters, `YYYY-MM` (MM in
    /// 01-12) for months. Anything else is [`AnalyticsError::MalformedTimeKey`].
    pub fn parse(key: &str, granularity: Granularity) -> AnalyticsResult<Self> {
        let key = key.trim();
        let year = parse_year_prefix(key)?;
        let rest = &key[4..];
        match granularity {
            Granularity::Year => {
                if rest.is_empty() {
                    Ok(Self::Year(year))
                } else {
                    Err(malformed(key, "expected a bare 4-digit year"))
                }
            }
            Granularity::Quarter => {
                let digits = rest
                    .strip_prefix("-Q")
                    .ok_or_else(|| malformed(key, "expected 'YYYY-Qn'"))?;
                match digits.parse::<u8>() {
                    Ok(quarter @ 1..=4) if is_digits(digits, 1) => Ok(Self::Quarter { year, quarter }),
                    _ => Err(malformed(key, "quarter must be 1-4")),
                }
            }
            Granularity::Month => {
                let digits = rest
                    .strip_prefix('-')
                    .ok_or_else(|| malformed(key, "expected 'YYYY-MM'"))?;
                match digits.parse::<u8>() {
                    Ok(month @ 1..=12) if is_digits(digits, 2) => Ok(Self::Month { year, month }),
                    _ => Err(malformed(key, "month must be 01-12")),
                }
            }
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Year(year) => write!(f, "{year:04}"),
            Self::Quarter { year, quarter } => write!(f, "{}", year_quarter_key(year, quarter)),
            Self::Month { year, month } => write!(f, "{}", year_month_key(year, month)),
        }
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Parse the leading 4-digit year of any time key, ignoring its suffix.
pub fn parse_year_prefix(key: &str) -> AnalyticsResult<i32> {
    let head = key.get(..4).filter(|h| h.bytes().all(|b| b.is_ascii_digit()));
    match head {
        Some(head) => head
            .parse::<i32>()
            .map_err(|_| malformed(key, "unparseable year")),
        None => Err(malformed(key, "missing 4-digit year")),
    }
}

fn is_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}

fn malformed(key: &str, reason: &str) -> AnalyticsError {
    AnalyticsError::MalformedTimeKey {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
