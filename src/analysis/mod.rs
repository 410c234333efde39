/// Aggregation over the loaded dataset.
///
/// Everything here is synchronous and pure: each function reads the rows it
/// is handed and returns a fresh value. Recompute scheduling and memoization
/// live in `dashboard`.
///
/// Submodules:
/// - `index`: (date, region) grouping built once per load.
/// - `filter`: date-range and region filtering, indexed or linear.
/// - `stats`: latest-date totals, CFR, week-over-week trend.
/// - `series`: trend, distribution, age and table shapes for charts.

pub mod filter;
pub mod index;
pub mod series;
pub mod stats;
