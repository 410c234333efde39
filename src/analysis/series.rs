/// Chart series builders
///
/// Turn a filtered row set into chart-ready shapes:
/// - trend series, bucketed by day or calendar month
/// - regional distribution of new cases
/// - age-bracket estimate from fixed population shares
/// - latest-date snapshot table
///
/// The first three restrict themselves to the chart window: the N most recent
/// distinct report dates, N set by `ChartTimeRange`. Rows whose date does not
/// parse never enter a window. Empty input gives empty output throughout.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::analysis::stats::{latest_date, percent_of, round_half_up};
use crate::model::{ChartTimeRange, DailyReport, Granularity, RegionFilter, WhoRegion, DATE_FORMAT};
use crate::regions;

/// Default number of rows in the snapshot table.
pub const DEFAULT_TABLE_LIMIT: usize = 10;

/// Share below which a distribution slice gets no label.
pub const LABEL_THRESHOLD_PERCENT: f64 = 5.0;

/// Fixed share of cases attributed to each age bracket. Sums to 1.
pub const AGE_BRACKETS: [(&str, f64); 5] = [
    ("0-17", 0.04),
    ("18-30", 0.16),
    ("31-45", 0.23),
    ("46-60", 0.34),
    ("60+", 0.23),
];

// ---------------------------------------------------------------------------
// Window and mode
// ---------------------------------------------------------------------------

/// Whether a series is broken out per region or collapsed into one total.
/// Breakdown applies when every region is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesMode {
    ByRegion,
    Aggregate,
}

impl SeriesMode {
    pub fn for_region(region: RegionFilter) -> Self {
        if region.is_all() {
            SeriesMode::ByRegion
        } else {
            SeriesMode::Aggregate
        }
    }
}

/// The most recent distinct valid report dates covered by `range`.
pub fn recent_dates(rows: &[DailyReport], range: ChartTimeRange) -> HashSet<&str> {
    let all: BTreeSet<&str> = rows
        .iter()
        .filter(|r| r.date().is_some())
        .map(|r| r.date_reported.as_str())
        .collect();
    let take = range.window_dates().unwrap_or(all.len());
    all.into_iter().rev().take(take).collect()
}

/// Rows whose report date falls in the chart window, in source order.
pub fn window_rows(rows: &[DailyReport], range: ChartTimeRange) -> Vec<&DailyReport> {
    let dates = recent_dates(rows, range);
    rows.iter()
        .filter(|r| dates.contains(r.date_reported.as_str()))
        .collect()
}

// ---------------------------------------------------------------------------
// Trend series
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CaseDeathTotals {
    pub cases: i64,
    pub deaths: i64,
}

impl CaseDeathTotals {
    fn add(&mut self, row: &DailyReport) {
        self.cases += row.new_cases;
        self.deaths += row.new_deaths;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    /// Sort key: "YYYY-MM-DD" for day buckets, "YYYY-MM" for month buckets.
    pub bucket: String,
    /// Display label, e.g. "5 Jan" or "Jan 2024".
    pub label: String,
    pub totals: CaseDeathTotals,
    /// Per-region totals keyed by raw region value; empty in aggregate mode.
    pub by_region: BTreeMap<String, CaseDeathTotals>,
}

fn bucket_key(row: &DailyReport, granularity: Granularity) -> Option<String> {
    let date = row.date()?;
    Some(match granularity {
        Granularity::Day => date.format(DATE_FORMAT).to_string(),
        Granularity::Month => date.format("%Y-%m").to_string(),
    })
}

fn bucket_label(bucket: &str, granularity: Granularity) -> String {
    let parsed = match granularity {
        Granularity::Day => NaiveDate::parse_from_str(bucket, DATE_FORMAT),
        Granularity::Month => NaiveDate::parse_from_str(&format!("{}-01", bucket), "%Y-%m-%d"),
    };
    match (parsed, granularity) {
        (Ok(date), Granularity::Day) => date.format("%-d %b").to_string(),
        (Ok(date), Granularity::Month) => date.format("%b %Y").to_string(),
        (Err(_), _) => bucket.to_string(),
    }
}

/// Trend series over the chart window, ascending by bucket.
pub fn compute_trend_series(
    rows: &[DailyReport],
    range: ChartTimeRange,
    mode: SeriesMode,
) -> Vec<TrendPoint> {
    let granularity = range.granularity();
    let mut buckets: BTreeMap<String, TrendPoint> = BTreeMap::new();

    for row in window_rows(rows, range) {
        let Some(key) = bucket_key(row, granularity) else {
            continue;
        };
        let point = buckets.entry(key.clone()).or_insert_with(|| TrendPoint {
            label: bucket_label(&key, granularity),
            bucket: key,
            totals: CaseDeathTotals::default(),
            by_region: BTreeMap::new(),
        });
        point.totals.add(row);
        if mode == SeriesMode::ByRegion {
            point
                .by_region
                .entry(row.who_region.clone())
                .or_default()
                .add(row);
        }
    }

    buckets.into_values().collect()
}

// ---------------------------------------------------------------------------
// Regional distribution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionShare {
    pub region: String,
    pub name: String,
    pub total_cases: i64,
}

/// New cases per region over the chart window, largest first. With
/// `selected`, only those canonical regions are kept.
pub fn compute_region_distribution(
    rows: &[DailyReport],
    range: ChartTimeRange,
    selected: Option<&[WhoRegion]>,
) -> Vec<RegionShare> {
    let mut totals: BTreeMap<&str, i64> = BTreeMap::new();
    for row in window_rows(rows, range) {
        if let Some(selected) = selected {
            if !row.region().is_some_and(|r| selected.contains(&r)) {
                continue;
            }
        }
        *totals.entry(row.who_region.as_str()).or_default() += row.new_cases;
    }

    let mut shares: Vec<RegionShare> = totals
        .into_iter()
        .map(|(region, total_cases)| RegionShare {
            region: region.to_string(),
            name: regions::display_name(region),
            total_cases,
        })
        .collect();
    // Stable sort keeps the region-code order among equal totals
    shares.sort_by(|a, b| b.total_cases.cmp(&a.total_cases));
    shares
}

/// A slice's share of the whole, in percent. 0 when the whole is not positive.
pub fn share_percent(value: i64, total: i64) -> f64 {
    percent_of(value, total)
}

/// Whether a slice is large enough to carry a label.
pub fn label_visible(value: i64, total: i64) -> bool {
    share_percent(value, total) > LABEL_THRESHOLD_PERCENT
}

// ---------------------------------------------------------------------------
// Age-bracket estimate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgeBracket {
    pub age: &'static str,
    /// Estimate over the grand total used for this mode.
    pub cases: i64,
    /// Per-region estimates for all six regions; empty in aggregate mode.
    pub by_region: BTreeMap<WhoRegion, i64>,
}

/// Applies the fixed age shares to window new-case totals. In region mode
/// only the six canonical regions are accumulated.
pub fn compute_age_distribution(
    rows: &[DailyReport],
    range: ChartTimeRange,
    mode: SeriesMode,
) -> Vec<AgeBracket> {
    let window = window_rows(rows, range);
    if window.is_empty() {
        return Vec::new();
    }

    let mut per_region: BTreeMap<WhoRegion, i64> =
        WhoRegion::ALL.into_iter().map(|r| (r, 0)).collect();
    let grand_total: i64 = match mode {
        SeriesMode::ByRegion => {
            for row in &window {
                if let Some(region) = row.region() {
                    *per_region.entry(region).or_default() += row.new_cases;
                }
            }
            per_region.values().sum()
        }
        SeriesMode::Aggregate => window.iter().map(|r| r.new_cases).sum(),
    };

    AGE_BRACKETS
        .iter()
        .map(|&(age, share)| AgeBracket {
            age,
            cases: round_half_up(grand_total as f64 * share),
            by_region: match mode {
                SeriesMode::ByRegion => per_region
                    .iter()
                    .map(|(&region, &total)| (region, round_half_up(total as f64 * share)))
                    .collect(),
                SeriesMode::Aggregate => BTreeMap::new(),
            },
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Snapshot table
// ---------------------------------------------------------------------------

/// Rows on the latest report date, highest cumulative cases first, at most
/// `limit` of them.
pub fn compute_table_rows(rows: &[DailyReport], limit: usize) -> Vec<DailyReport> {
    let Some(latest) = latest_date(rows) else {
        return Vec::new();
    };
    let mut snapshot: Vec<&DailyReport> =
        rows.iter().filter(|r| r.date_reported == latest).collect();
    snapshot.sort_by(|a, b| b.cumulative_cases.cmp(&a.cumulative_cases));
    snapshot.into_iter().take(limit).cloned().collect()
}
