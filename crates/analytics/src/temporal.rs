use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeDelta, Timelike, Utc, Weekday};
use core_types::{Table, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Day names in report order, Monday first.
pub const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

const NAIVE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
const ZONED_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f %z"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];

/// Epoch values above this are taken to be milliseconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// A calendar month. Orders chronologically; rendered as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    pub fn of(instant: &DateTime<Utc>) -> Self {
        Self::new(instant.year(), instant.month())
    }

    /// The month immediately before this one.
    pub fn previous(&self) -> Self {
        if self.month <= 1 {
            Self::new(self.year - 1, 12)
        } else {
            Self::new(self.year, self.month - 1)
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Parses a raw cell into an instant; `None` when it is not a recognisable time.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Int(i) => from_epoch(*i),
        Value::Float(f) if f.is_finite() => from_epoch(f.trunc() as i64),
        Value::Text(s) => parse_text(s.trim()),
        _ => None,
    }
}

fn from_epoch(raw: i64) -> Option<DateTime<Utc>> {
    if raw.abs() > MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(raw)
    } else {
        DateTime::from_timestamp(raw, 0)
    }
}

fn parse_text(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ZONED_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }
    s.parse::<i64>().ok().and_then(from_epoch)
}

pub fn weekday_name(day: Weekday) -> &'static str {
    WEEKDAYS[day.num_days_from_monday() as usize]
}

/// Derives calendar buckets from timestamp columns relative to a fixed `now`.
#[derive(Debug, Clone, Copy)]
pub struct TemporalBucketer {
    now: DateTime<Utc>,
}

impl TemporalBucketer {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    /// A bucketer anchored at the current wall-clock time.
    pub fn system() -> Self {
        Self::new(Utc::now())
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Parsed instants of a column, one per row; `None` if the column is absent.
    pub fn instants(&self, table: &Table, column: &str) -> Option<Vec<Option<DateTime<Utc>>>> {
        let values = table.column(column).ok()?;
        Some(values.into_iter().map(parse_timestamp).collect())
    }

    /// The parseable instants of a column, unparseable rows dropped.
    pub fn valid_instants(&self, table: &Table, column: &str) -> Vec<DateTime<Utc>> {
        self.instants(table, column)
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .collect()
    }

    /// Rows whose instant is at or after `now - lookback`.
    ///
    /// Unparseable or missing timestamps are excluded, so an absent column
    /// yields an empty table.
    pub fn recent(&self, table: &Table, column: &str, lookback: TimeDelta) -> Table {
        let cutoff = self.now - lookback;
        table.filter(|row| parse_timestamp(row.get(column)).is_some_and(|t| t >= cutoff))
    }

    /// Number of rows within `lookback`; 0 when the column is absent.
    pub fn count_recent(&self, table: &Table, column: &str, lookback: TimeDelta) -> usize {
        let cutoff = self.now - lookback;
        self.valid_instants(table, column)
            .iter()
            .filter(|t| **t >= cutoff)
            .count()
    }

    /// Whole years elapsed since `birth`, counted as days / 365.
    pub fn age_years(&self, birth: &Value) -> Option<i64> {
        let born = parse_timestamp(birth)?;
        Some((self.now - born).num_days() / 365)
    }

    pub fn counts_by_period(&self, table: &Table, column: &str) -> BTreeMap<Period, usize> {
        let mut counts = BTreeMap::new();
        for instant in self.valid_instants(table, column) {
            *counts.entry(Period::of(&instant)).or_insert(0) += 1;
        }
        counts
    }

    /// Sum of `amount` per month of `column`; rows missing either are skipped.
    pub fn sum_by_period(&self, table: &Table, column: &str, amount: &str) -> BTreeMap<Period, f64> {
        let mut sums = BTreeMap::new();
        for row in table.rows() {
            let (Some(instant), Some(value)) = (parse_timestamp(row.get(column)), row.get(amount).as_f64()) else {
                continue;
            };
            *sums.entry(Period::of(&instant)).or_insert(0.0) += value;
        }
        sums
    }

    /// Counts for all seven days, Monday first.
    pub fn counts_by_weekday(&self, table: &Table, column: &str) -> Vec<(&'static str, usize)> {
        let mut counts = [0usize; 7];
        for instant in self.valid_instants(table, column) {
            counts[instant.weekday().num_days_from_monday() as usize] += 1;
        }
        WEEKDAYS.iter().copied().zip(counts).collect()
    }

    pub fn counts_by_hour(&self, table: &Table, column: &str) -> [usize; 24] {
        let mut counts = [0usize; 24];
        for instant in self.valid_instants(table, column) {
            counts[instant.hour() as usize] += 1;
        }
        counts
    }

    pub fn counts_by_date(&self, table: &Table, column: &str) -> BTreeMap<NaiveDate, usize> {
        let mut counts = BTreeMap::new();
        for instant in self.valid_instants(table, column) {
            *counts.entry(instant.date_naive()).or_insert(0) += 1;
        }
        counts
    }
}

/// The latest `n` entries of a period series, oldest first.
pub fn trailing<V: Clone>(series: &BTreeMap<Period, V>, n: usize) -> Vec<(Period, V)> {
    let skip = series.len().saturating_sub(n);
    series.iter().skip(skip).map(|(p, v)| (*p, v.clone())).collect()
}
