/// Core data types for the COVID-19 dashboard aggregation engine.
///
/// This module defines the shared domain model imported by all other modules:
/// the canonical daily report row, the filter value types, the stats summary
/// and the load error taxonomy. It performs no I/O.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Calendar date format used by both dataset sources, e.g. "2024-01-31".
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Grouping fallback for rows with neither a country code nor a country name,
/// and the region value given to rows with a blank WHO region.
pub const UNKNOWN: &str = "Unknown";

// ---------------------------------------------------------------------------
// WHO regions
// ---------------------------------------------------------------------------

/// The six World Health Organization regions used to bucket country reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WhoRegion {
    Afr,
    Amr,
    Emr,
    Eur,
    Sear,
    Wpr,
}

impl WhoRegion {
    /// All regions in the order the source feed documents them.
    pub const ALL: [WhoRegion; 6] = [
        WhoRegion::Afr,
        WhoRegion::Amr,
        WhoRegion::Emr,
        WhoRegion::Eur,
        WhoRegion::Sear,
        WhoRegion::Wpr,
    ];

    /// The region symbol as it appears in the `WHO_region` column.
    pub fn code(self) -> &'static str {
        match self {
            WhoRegion::Afr => "AFR",
            WhoRegion::Amr => "AMR",
            WhoRegion::Emr => "EMR",
            WhoRegion::Eur => "EUR",
            WhoRegion::Sear => "SEAR",
            WhoRegion::Wpr => "WPR",
        }
    }

    /// Parses a region symbol. Surrounding whitespace and letter case are ignored.
    pub fn from_code(code: &str) -> Option<WhoRegion> {
        let code = code.trim();
        WhoRegion::ALL
            .into_iter()
            .find(|r| r.code().eq_ignore_ascii_case(code))
    }

    /// Matches a stored region value against the exact symbol only.
    pub fn from_symbol(symbol: &str) -> Option<WhoRegion> {
        WhoRegion::ALL.into_iter().find(|r| r.code() == symbol)
    }
}

impl fmt::Display for WhoRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ---------------------------------------------------------------------------
// Report rows
// ---------------------------------------------------------------------------

/// One country's case and death counts on one calendar date.
///
/// This is the single canonical row type. Both dataset sources normalize
/// into it immediately after fetch (see `ingest::flat_file::CsvRecord` and
/// `ingest::table::TableRecord`), so nothing downstream sees source-specific
/// field names.
///
/// `new_*` values may be negative: they carry retroactive corrections from
/// the source feed and are never clamped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyReport {
    pub date_reported: String, // ISO 8601 calendar date, sorts lexicographically
    pub country_code: String,  // may be empty
    pub country: String,
    pub who_region: String,    // one of the six symbols, "Unknown", or verbatim source value
    pub new_cases: i64,
    pub cumulative_cases: i64,
    pub new_deaths: i64,
    pub cumulative_deaths: i64,
}

impl DailyReport {
    /// The report date, or `None` when `date_reported` is not a valid calendar date.
    pub fn date(&self) -> Option<NaiveDate> {
        parse_report_date(&self.date_reported)
    }

    /// The canonical region, or `None` for "Unknown" and non-canonical codes.
    pub fn region(&self) -> Option<WhoRegion> {
        WhoRegion::from_symbol(&self.who_region)
    }

    /// Grouping key for per-country deduplication: the country code, falling
    /// back to the country name, then to "Unknown".
    pub fn country_key(&self) -> &str {
        if !self.country_code.is_empty() {
            &self.country_code
        } else if !self.country.is_empty() {
            &self.country
        } else {
            UNKNOWN
        }
    }
}

/// Parses a report date. Accepts a plain `YYYY-MM-DD` date and also a
/// timestamp whose first ten characters are one ("2024-01-31T00:00:00Z").
pub fn parse_report_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, DATE_FORMAT) {
        return Some(date);
    }
    raw.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, DATE_FORMAT).ok())
}

/// Normalizes a raw date cell: anything `parse_report_date` accepts becomes
/// plain `YYYY-MM-DD`, anything else is kept (trimmed) so it stays visible
/// as an unparseable date.
pub fn normalize_report_date(raw: &str) -> String {
    match parse_report_date(raw) {
        Some(date) => date.format(DATE_FORMAT).to_string(),
        None => raw.trim().to_string(),
    }
}

/// Normalizes a raw region cell: blank becomes "Unknown", any spelling of
/// the six symbols becomes the symbol, anything else is kept verbatim (trimmed).
pub fn normalize_region(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return UNKNOWN.to_string();
    }
    match WhoRegion::from_code(trimmed) {
        Some(region) => region.code().to_string(),
        None => trimmed.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Filter value types
// ---------------------------------------------------------------------------

/// Inclusive calendar date range. A missing bound leaves that side open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    /// Returns `true` if `date` lies within `[from, to]`.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.is_none_or(|from| date >= from) && self.to.is_none_or(|to| date <= to)
    }

    /// Returns `true` if the raw report date parses and lies within the range.
    /// Unparseable dates never match.
    pub fn contains_raw(&self, raw: &str) -> bool {
        parse_report_date(raw).is_some_and(|date| self.contains(date))
    }
}

/// Region selector: every region, or exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RegionFilter {
    #[default]
    All,
    Only(WhoRegion),
}

impl RegionFilter {
    pub fn is_all(&self) -> bool {
        matches!(self, RegionFilter::All)
    }

    pub fn matches(&self, row: &DailyReport) -> bool {
        match self {
            RegionFilter::All => true,
            RegionFilter::Only(region) => row.who_region == region.code(),
        }
    }
}

impl FromStr for RegionFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(RegionFilter::All);
        }
        WhoRegion::from_code(s)
            .map(RegionFilter::Only)
            .ok_or_else(|| format!("unknown region '{}'", s))
    }
}

impl fmt::Display for RegionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionFilter::All => write!(f, "all"),
            RegionFilter::Only(region) => write!(f, "{}", region),
        }
    }
}

/// Display classifier for the dataset. Carried through the filter state but
/// not consulted by any aggregation (there is a single dataset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataType {
    #[default]
    Covid,
    Dengue,
    All,
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "covid" => Ok(DataType::Covid),
            "dengue" => Ok(DataType::Dengue),
            "all" => Ok(DataType::All),
            other => Err(format!("unknown data type '{}'", other)),
        }
    }
}

/// Bucket width for the trend series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Day,
    Month,
}

/// Chart window selector: how many of the most recent distinct report dates
/// feed the trend, distribution and age series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChartTimeRange {
    OneMonth,
    ThreeMonths,
    SixMonths,
    #[default]
    OneYear,
    All,
}

impl ChartTimeRange {
    /// Number of distinct report dates in the window; `None` means full history.
    pub fn window_dates(self) -> Option<usize> {
        match self {
            ChartTimeRange::OneMonth => Some(30),
            ChartTimeRange::ThreeMonths => Some(90),
            ChartTimeRange::SixMonths => Some(180),
            ChartTimeRange::OneYear => Some(365),
            ChartTimeRange::All => None,
        }
    }

    /// Daily buckets for the one-month view, monthly buckets otherwise.
    pub fn granularity(self) -> Granularity {
        match self {
            ChartTimeRange::OneMonth => Granularity::Day,
            _ => Granularity::Month,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChartTimeRange::OneMonth => "1m",
            ChartTimeRange::ThreeMonths => "3m",
            ChartTimeRange::SixMonths => "6m",
            ChartTimeRange::OneYear => "1y",
            ChartTimeRange::All => "all",
        }
    }
}

impl FromStr for ChartTimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1m" => Ok(ChartTimeRange::OneMonth),
            "3m" => Ok(ChartTimeRange::ThreeMonths),
            "6m" => Ok(ChartTimeRange::SixMonths),
            "1y" => Ok(ChartTimeRange::OneYear),
            "all" => Ok(ChartTimeRange::All),
            other => Err(format!("unknown chart time range '{}'", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Stats summary
// ---------------------------------------------------------------------------

/// Point-in-time summary of a filtered row set.
///
/// `total_recovered` is an estimate (95% of cases minus deaths); the source
/// schema has no recovered field.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Stats {
    pub total_cases: i64,
    pub total_deaths: i64,
    pub total_recovered: i64,
    pub cfr: f64,          // percent
    pub cases_trend: f64,  // percent, last 7 report dates vs the 7 before
    pub deaths_trend: f64, // percent
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise while loading the dataset.
///
/// Cache problems are not represented here: the row cache fails soft and
/// reports a miss instead.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadError {
    /// Non-2xx HTTP response from the flat-file host.
    HttpError(u16),
    /// The request could not be sent or the body could not be read.
    Network(String),
    /// A local dataset file could not be read.
    Io(String),
    /// The payload could not be parsed as a dataset.
    ParseError(String),
    /// The hosted table query failed.
    Database(String),
    /// A newer load was started while this one was in flight.
    Superseded { generation: u64, current: u64 },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::HttpError(code) => write!(f, "HTTP error: {}", code),
            LoadError::Network(msg) => write!(f, "Network error: {}", msg),
            LoadError::Io(msg) => write!(f, "I/O error: {}", msg),
            LoadError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            LoadError::Database(msg) => write!(f, "Database error: {}", msg),
            LoadError::Superseded { generation, current } => write!(
                f,
                "Load {} superseded by load {}",
                generation, current
            ),
        }
    }
}

impl std::error::Error for LoadError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
