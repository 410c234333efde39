/// Flat-file dataset source
///
/// Retrieves the WHO COVID-19 global daily CSV, either over HTTP or from a
/// local path, and parses it into canonical `DailyReport` rows. Also writes
/// row sets back out in the same format for user-initiated export.
///
/// Dataset: https://data.who.int/dashboards/covid19/data
///
/// Parsing is header driven, so column order does not matter. Numeric cells
/// are coerced to integers; blank or non-numeric counts become 0. Blank
/// lines are skipped. Only a missing `Date_reported` column or an unreadable
/// payload fails the whole parse.

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Writer};
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::ingest::DatasetSource;
use crate::logging::{self, Component};
use crate::model::{normalize_region, normalize_report_date, DailyReport, LoadError};

/// Column headers of the flat-file format, in export order.
pub const CSV_HEADERS: [&str; 8] = [
    "Date_reported",
    "Country_code",
    "Country",
    "WHO_region",
    "New_cases",
    "Cumulative_cases",
    "New_deaths",
    "Cumulative_deaths",
];

// ============================================================================
// Raw record
// ============================================================================

/// One row of the flat file, before normalization. Count fields are `None`
/// when the cell was blank or not a number.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsvRecord {
    pub date_reported: String,
    pub country_code: String,
    pub country: String,
    pub who_region: String,
    pub new_cases: Option<i64>,
    pub cumulative_cases: Option<i64>,
    pub new_deaths: Option<i64>,
    pub cumulative_deaths: Option<i64>,
}

impl CsvRecord {
    /// Returns `true` if any count cell had to be defaulted.
    pub fn has_missing_counts(&self) -> bool {
        self.new_cases.is_none()
            || self.cumulative_cases.is_none()
            || self.new_deaths.is_none()
            || self.cumulative_deaths.is_none()
    }
}

impl From<CsvRecord> for DailyReport {
    fn from(raw: CsvRecord) -> Self {
        DailyReport {
            date_reported: normalize_report_date(&raw.date_reported),
            country_code: raw.country_code.trim().to_string(),
            country: raw.country.trim().to_string(),
            who_region: normalize_region(&raw.who_region),
            new_cases: raw.new_cases.unwrap_or(0),
            cumulative_cases: raw.cumulative_cases.unwrap_or(0),
            new_deaths: raw.new_deaths.unwrap_or(0),
            cumulative_deaths: raw.cumulative_deaths.unwrap_or(0),
        }
    }
}

/// Coerces a count cell. Accepts integers and finite decimals ("12.0");
/// anything else is `None`.
fn coerce_count(cell: Option<&str>) -> Option<i64> {
    let cell = cell?.trim();
    if cell.is_empty() {
        return None;
    }
    if let Ok(value) = cell.parse::<i64>() {
        return Some(value);
    }
    cell.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v.round() as i64)
}

// ============================================================================
// Header mapping
// ============================================================================

/// Column positions resolved from the header row.
struct HeaderMap {
    date_reported: usize,
    country_code: Option<usize>,
    country: Option<usize>,
    who_region: Option<usize>,
    new_cases: Option<usize>,
    cumulative_cases: Option<usize>,
    new_deaths: Option<usize>,
    cumulative_deaths: Option<usize>,
}

impl HeaderMap {
    fn from_headers(headers: &StringRecord) -> Result<Self, LoadError> {
        // The WHO export carries a UTF-8 byte order mark on the first header
        let names: Vec<&str> = headers
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim())
            .collect();
        let position = |name: &str| names.iter().position(|h| *h == name);

        let date_reported = position("Date_reported").ok_or_else(|| {
            LoadError::ParseError("missing Date_reported column in header".to_string())
        })?;

        Ok(HeaderMap {
            date_reported,
            country_code: position("Country_code"),
            country: position("Country"),
            who_region: position("WHO_region"),
            new_cases: position("New_cases"),
            cumulative_cases: position("Cumulative_cases"),
            new_deaths: position("New_deaths"),
            cumulative_deaths: position("Cumulative_deaths"),
        })
    }

    fn record(&self, fields: &StringRecord) -> CsvRecord {
        let text = |idx: Option<usize>| {
            idx.and_then(|i| fields.get(i))
                .map(str::to_string)
                .unwrap_or_default()
        };
        let count = |idx: Option<usize>| coerce_count(idx.and_then(|i| fields.get(i)));

        CsvRecord {
            date_reported: text(Some(self.date_reported)),
            country_code: text(self.country_code),
            country: text(self.country),
            who_region: text(self.who_region),
            new_cases: count(self.new_cases),
            cumulative_cases: count(self.cumulative_cases),
            new_deaths: count(self.new_deaths),
            cumulative_deaths: count(self.cumulative_deaths),
        }
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Result of a parse pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCsv {
    pub rows: Vec<DailyReport>,
    /// Rows kept with at least one count defaulted to 0.
    pub defaulted: usize,
    /// Records with only empty cells dropped. Fully blank lines never reach
    /// the record stage.
    pub skipped: usize,
}

/// Parses a flat-file payload. An empty payload yields no rows.
pub fn parse_csv(text: &str) -> Result<ParsedCsv, LoadError> {
    let mut parsed = ParsedCsv {
        rows: Vec::new(),
        defaulted: 0,
        skipped: 0,
    };
    if text.trim().is_empty() {
        return Ok(parsed);
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| LoadError::ParseError(format!("unreadable header: {}", e)))?
        .clone();
    let map = HeaderMap::from_headers(&headers)?;

    for (i, result) in reader.records().enumerate() {
        let fields = result
            .map_err(|e| LoadError::ParseError(format!("record {}: {}", i + 1, e)))?;

        if fields.iter().all(|f| f.trim().is_empty()) {
            parsed.skipped += 1;
            continue;
        }

        let raw = map.record(&fields);
        if raw.has_missing_counts() {
            parsed.defaulted += 1;
        }
        parsed.rows.push(raw.into());
    }

    Ok(parsed)
}

// ============================================================================
// Export
// ============================================================================

/// Writes rows in the flat-file format, header first. Parsing the output
/// with `parse_csv` reproduces the same field values.
pub fn write_csv<W: io::Write>(rows: &[DailyReport], writer: W) -> Result<(), csv::Error> {
    let mut out = Writer::from_writer(writer);
    out.write_record(CSV_HEADERS)?;
    for row in rows {
        let counts = [
            row.new_cases.to_string(),
            row.cumulative_cases.to_string(),
            row.new_deaths.to_string(),
            row.cumulative_deaths.to_string(),
        ];
        out.write_record([
            &row.date_reported,
            &row.country_code,
            &row.country,
            &row.who_region,
            &counts[0],
            &counts[1],
            &counts[2],
            &counts[3],
        ])?;
    }
    out.flush()?;
    Ok(())
}

/// Default download name for an export made on `today`.
pub fn export_file_name(today: NaiveDate) -> String {
    format!("covid19-data-{}.csv", today.format("%Y-%m-%d"))
}

// ============================================================================
// Source
// ============================================================================

/// Where the flat file lives.
#[derive(Debug, Clone, PartialEq)]
pub enum FileLocation {
    Url(String),
    Path(PathBuf),
}

impl FileLocation {
    /// `http://` and `https://` locations are fetched; anything else is a path.
    pub fn parse(location: &str) -> Self {
        let trimmed = location.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            FileLocation::Url(trimmed.to_string())
        } else {
            FileLocation::Path(PathBuf::from(trimmed))
        }
    }
}

impl std::fmt::Display for FileLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileLocation::Url(url) => write!(f, "{}", url),
            FileLocation::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

pub struct FlatFileSource {
    location: FileLocation,
    timeout: Duration,
}

impl FlatFileSource {
    pub fn new(location: FileLocation, timeout: Duration) -> Self {
        Self { location, timeout }
    }

    fn fetch_text(&self) -> Result<String, LoadError> {
        match &self.location {
            FileLocation::Path(path) => std::fs::read_to_string(path)
                .map_err(|e| LoadError::Io(format!("{}: {}", path.display(), e))),
            FileLocation::Url(url) => {
                let client = reqwest::blocking::Client::builder()
                    .timeout(self.timeout)
                    .build()
                    .map_err(|e| LoadError::Network(e.to_string()))?;

                let response = client
                    .get(url)
                    .header("Accept", "text/csv")
                    .send()
                    .map_err(|e| LoadError::Network(e.to_string()))?;

                if !response.status().is_success() {
                    return Err(LoadError::HttpError(response.status().as_u16()));
                }

                response.text().map_err(|e| LoadError::Network(e.to_string()))
            }
        }
    }
}

impl DatasetSource for FlatFileSource {
    fn describe(&self) -> String {
        self.location.to_string()
    }

    fn fetch(&self) -> Result<Vec<DailyReport>, LoadError> {
        let location = self.describe();

        logging::info(Component::FlatFile, Some(&location), "Fetching dataset");
        let started = Instant::now();
        let text = self.fetch_text()?;
        logging::info(
            Component::FlatFile,
            Some(&location),
            &format!(
                "Downloaded {} bytes in {:.2}s",
                text.len(),
                started.elapsed().as_secs_f64()
            ),
        );

        let started = Instant::now();
        let parsed = parse_csv(&text)?;
        logging::log_parse_summary(
            Component::FlatFile,
            &location,
            parsed.rows.len(),
            parsed.defaulted,
            parsed.skipped,
        );
        logging::debug(
            Component::FlatFile,
            Some(&location),
            &format!("Parsed in {:.2}s", started.elapsed().as_secs_f64()),
        );

        Ok(parsed.rows)
    }
}

// ============================================================================
// Tests
// ============================================================================
