/// Hosted-table dataset source
///
/// Reads the global report table from Postgres in a single unpaginated
/// query, newest dates first. Columns use snake_case names
/// (`date_reported`, `country_code`, ...) and are normalized into
/// `DailyReport` here.
///
/// The hosting service enforces a per-query row ceiling, mirrored by
/// `row_cap`. A result that fills the cap is logged as possibly truncated.

use chrono::NaiveDate;
use postgres::{Client, NoTls, Row};
use std::time::Instant;

use crate::ingest::DatasetSource;
use crate::logging::{self, Component};
use crate::model::{normalize_region, DailyReport, LoadError, DATE_FORMAT};

/// Default table name.
pub const DEFAULT_TABLE: &str = "covid_global_reports";

/// Default row ceiling, matching the hosted service's per-query limit.
pub const DEFAULT_ROW_CAP: i64 = 1000;

// ---------------------------------------------------------------------------
// Raw record
// ---------------------------------------------------------------------------

/// One table row before normalization. Every column is nullable in the
/// hosted schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRecord {
    pub date_reported: Option<NaiveDate>,
    pub country_code: Option<String>,
    pub country: Option<String>,
    pub who_region: Option<String>,
    pub new_cases: Option<i64>,
    pub cumulative_cases: Option<i64>,
    pub new_deaths: Option<i64>,
    pub cumulative_deaths: Option<i64>,
}

impl TableRecord {
    fn from_row(row: &Row) -> Result<Self, postgres::Error> {
        Ok(TableRecord {
            date_reported: row.try_get("date_reported")?,
            country_code: row.try_get("country_code")?,
            country: row.try_get("country")?,
            who_region: row.try_get("who_region")?,
            new_cases: row.try_get("new_cases")?,
            cumulative_cases: row.try_get("cumulative_cases")?,
            new_deaths: row.try_get("new_deaths")?,
            cumulative_deaths: row.try_get("cumulative_deaths")?,
        })
    }
}

impl From<TableRecord> for DailyReport {
    fn from(raw: TableRecord) -> Self {
        DailyReport {
            // A NULL date becomes an empty string, which date filtering excludes
            date_reported: raw
                .date_reported
                .map(|d| d.format(DATE_FORMAT).to_string())
                .unwrap_or_default(),
            country_code: raw.country_code.unwrap_or_default().trim().to_string(),
            country: raw.country.unwrap_or_default().trim().to_string(),
            who_region: normalize_region(raw.who_region.as_deref().unwrap_or("")),
            new_cases: raw.new_cases.unwrap_or(0),
            cumulative_cases: raw.cumulative_cases.unwrap_or(0),
            new_deaths: raw.new_deaths.unwrap_or(0),
            cumulative_deaths: raw.cumulative_deaths.unwrap_or(0),
        }
    }
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// Returns `true` for a plain SQL identifier (optionally schema-qualified),
/// so a configured table name can be interpolated into the query safely.
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

/// Builds the single global-data query, newest dates first. Counts are cast
/// to bigint so int4 and int8 schemas read the same way.
pub fn build_global_query(table: &str) -> String {
    format!(
        "SELECT date_reported, country_code, country, who_region,
                new_cases::bigint AS new_cases,
                cumulative_cases::bigint AS cumulative_cases,
                new_deaths::bigint AS new_deaths,
                cumulative_deaths::bigint AS cumulative_deaths
         FROM {}
         ORDER BY date_reported DESC
         LIMIT $1",
        table
    )
}

/// Fetches every row of the global report table, up to `row_cap`.
pub fn fetch_global_data(
    client: &mut Client,
    table: &str,
    row_cap: i64,
) -> Result<Vec<TableRecord>, postgres::Error> {
    let rows = client.query(build_global_query(table).as_str(), &[&row_cap])?;
    rows.iter().map(TableRecord::from_row).collect()
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

pub struct TableSource {
    database_url: String,
    table: String,
    row_cap: i64,
}

impl TableSource {
    /// Fails if `table` is not a plain identifier.
    pub fn new(database_url: String, table: String, row_cap: i64) -> Result<Self, LoadError> {
        if !is_valid_identifier(&table) {
            return Err(LoadError::Database(format!("invalid table name '{}'", table)));
        }
        Ok(Self {
            database_url,
            table,
            row_cap,
        })
    }
}

impl DatasetSource for TableSource {
    fn describe(&self) -> String {
        format!("table:{}", self.table)
    }

    fn fetch(&self) -> Result<Vec<DailyReport>, LoadError> {
        let location = self.describe();
        let started = Instant::now();

        let mut client = Client::connect(&self.database_url, NoTls)
            .map_err(|e| LoadError::Database(format!("connect failed: {}", e)))?;
        let records = fetch_global_data(&mut client, &self.table, self.row_cap)
            .map_err(|e| LoadError::Database(e.to_string()))?;

        if records.len() as i64 >= self.row_cap {
            logging::warn(
                Component::Table,
                Some(&location),
                &format!(
                    "Result filled the {}-row cap; dataset may be truncated",
                    self.row_cap
                ),
            );
        }

        let defaulted = records
            .iter()
            .filter(|r| {
                r.date_reported.is_none()
                    || r.new_cases.is_none()
                    || r.cumulative_cases.is_none()
                    || r.new_deaths.is_none()
                    || r.cumulative_deaths.is_none()
            })
            .count();
        logging::log_parse_summary(Component::Table, &location, records.len(), defaulted, 0);
        logging::debug(
            Component::Table,
            Some(&location),
            &format!("Queried in {:.2}s", started.elapsed().as_secs_f64()),
        );

        Ok(records.into_iter().map(DailyReport::from).collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
