/// Filter engine
///
/// Applies the dashboard filter state (date range and region) to the loaded
/// rows. A single-region query walks only that region's index groups; an
/// all-regions query, or one without a usable index, scans linearly. Both
/// paths select the same rows.
///
/// The date predicate applies only when a date range is set. When it is,
/// rows whose date does not parse are excluded.

use crate::analysis::index::PreAggregationIndex;
use crate::filters::FilterState;
use crate::model::{DailyReport, DateRange, RegionFilter};

fn passes_date(raw: &str, date_range: Option<&DateRange>) -> bool {
    date_range.is_none_or(|range| range.contains_raw(raw))
}

/// Applies `filter` to `rows`. Output preserves source order on the linear
/// path and is date-ordered on the indexed path.
pub fn apply(
    rows: &[DailyReport],
    index: &PreAggregationIndex,
    filter: &FilterState,
) -> Vec<DailyReport> {
    match filter.region() {
        RegionFilter::Only(region) if !index.is_empty() && index.covers(rows) => {
            let mut out = Vec::new();
            for (key, positions) in index.region_groups(region.code()) {
                // One date check per group
                if !passes_date(&key.date, filter.date_range()) {
                    continue;
                }
                out.extend(positions.iter().map(|&pos| rows[pos].clone()));
            }
            out
        }
        region => scan(rows, region, filter.date_range()),
    }
}

/// Linear scan over every row.
pub fn scan(
    rows: &[DailyReport],
    region: RegionFilter,
    date_range: Option<&DateRange>,
) -> Vec<DailyReport> {
    rows.iter()
        .filter(|row| region.matches(row) && passes_date(&row.date_reported, date_range))
        .cloned()
        .collect()
}

/// Rows passing the date range only, with no region narrowing. Feeds the
/// per-region breakdowns and the latest-date table.
pub fn date_filtered(rows: &[DailyReport], date_range: Option<&DateRange>) -> Vec<DailyReport> {
    scan(rows, RegionFilter::All, date_range)
}
