//! Statistics aggregator.
//!
//! Point-in-time totals come from each country's report on the latest date
//! present in the filtered rows. Trend deltas compare the summed new counts
//! of the 7 most recent report dates against the 7 before them.
//!
//! Rows whose date does not parse take part in neither computation.

use std::collections::{BTreeMap, HashMap};

use crate::model::{DailyReport, Stats};

/// Fraction of cases assumed to recover, before subtracting deaths.
pub const RECOVERY_RATIO: f64 = 0.95;

/// Report dates per trend window.
pub const TREND_WINDOW: usize = 7;

/// Rounds to the nearest integer, halves toward positive infinity.
pub fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// `numerator / denominator * 100`, or 0 when the denominator is not
/// positive.
pub fn percent_of(numerator: i64, denominator: i64) -> f64 {
    if denominator <= 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64 * 100.0
    }
}

/// Percent change from `previous` to `current`, or 0 when `previous` is not
/// positive.
pub fn percent_change(current: i64, previous: i64) -> f64 {
    if previous <= 0 {
        0.0
    } else {
        (current - previous) as f64 / previous as f64 * 100.0
    }
}

/// The latest valid report date among `rows`, as its raw string.
pub fn latest_date(rows: &[DailyReport]) -> Option<&str> {
    rows.iter()
        .filter(|r| r.date().is_some())
        .map(|r| r.date_reported.as_str())
        .max()
}

/// One row per country on `date`: the one with the highest cumulative case
/// count, the first seen on ties. Output follows first-appearance order.
pub fn latest_per_country<'a>(rows: &'a [DailyReport], date: &str) -> Vec<&'a DailyReport> {
    let mut order: Vec<&str> = Vec::new();
    let mut best: HashMap<&str, &DailyReport> = HashMap::new();

    for row in rows.iter().filter(|r| r.date_reported == date) {
        let key = row.country_key();
        match best.get(key) {
            Some(kept) if kept.cumulative_cases >= row.cumulative_cases => {}
            Some(_) => {
                best.insert(key, row);
            }
            None => {
                order.push(key);
                best.insert(key, row);
            }
        }
    }

    order.into_iter().filter_map(|k| best.get(k).copied()).collect()
}

/// Summed new cases and new deaths for a run of report dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowTotals {
    pub cases: i64,
    pub deaths: i64,
}

/// Totals for the most recent `TREND_WINDOW` report dates and the window
/// before it. Short histories give short (or empty) windows.
pub fn trend_windows(rows: &[DailyReport]) -> (WindowTotals, WindowTotals) {
    let mut per_date: BTreeMap<&str, WindowTotals> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.date().is_some()) {
        let totals = per_date.entry(row.date_reported.as_str()).or_default();
        totals.cases += row.new_cases;
        totals.deaths += row.new_deaths;
    }

    let last = sum_totals(per_date.values().rev().take(TREND_WINDOW));
    let prev = sum_totals(per_date.values().rev().skip(TREND_WINDOW).take(TREND_WINDOW));
    (last, prev)
}

fn sum_totals<'a>(totals: impl Iterator<Item = &'a WindowTotals>) -> WindowTotals {
    totals.fold(WindowTotals::default(), |acc, t| WindowTotals {
        cases: acc.cases + t.cases,
        deaths: acc.deaths + t.deaths,
    })
}

/// Summary statistics for a filtered row set. Empty input gives all zeros.
pub fn compute_stats(rows: &[DailyReport]) -> Stats {
    let Some(latest) = latest_date(rows) else {
        return Stats::default();
    };

    let snapshot = latest_per_country(rows, latest);
    let total_cases: i64 = snapshot.iter().map(|r| r.cumulative_cases).sum();
    let total_deaths: i64 = snapshot.iter().map(|r| r.cumulative_deaths).sum();

    let (last, prev) = trend_windows(rows);

    Stats {
        total_cases,
        total_deaths,
        total_recovered: round_half_up(total_cases as f64 * RECOVERY_RATIO - total_deaths as f64),
        cfr: percent_of(total_deaths, total_cases),
        cases_trend: percent_change(last.cases, prev.cases),
        deaths_trend: percent_change(last.deaths, prev.deaths),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(
        date: &str,
        code: &str,
        new_cases: i64,
        cum_cases: i64,
        new_deaths: i64,
        cum_deaths: i64,
    ) -> DailyReport {
        DailyReport {
            date_reported: date.to_string(),
            country_code: code.to_string(),
            country: String::new(),
            who_region: "EUR".to_string(),
            new_cases,
            cumulative_cases: cum_cases,
            new_deaths,
            cumulative_deaths: cum_deaths,
        }
    }

    #[test]
    fn test_single_row_snapshot() {
        let stats = compute_stats(&[row("2024-01-01", "FR", 10, 100, 1, 10)]);
        assert_eq!(stats.total_cases, 100);
        assert_eq!(stats.total_deaths, 10);
        assert_eq!(stats.total_recovered, 85);
        assert!((stats.cfr - 10.0).abs() < 1e-9, "cfr was {}", stats.cfr);
        assert_eq!(stats.cases_trend, 0.0, "no previous window means no trend");
    }

    #[test]
    fn test_empty_input_gives_zero_stats() {
        assert_eq!(compute_stats(&[]), Stats::default());
    }

    #[test]
    fn test_totals_use_latest_date_only() {
        let rows = vec![
            row("2024-01-01", "FR", 10, 100, 1, 10),
            row("2024-01-02", "FR", 5, 105, 0, 10),
            row("2024-01-02", "DE", 5, 200, 1, 20),
            row("2024-01-01", "DE", 5, 195, 1, 19),
        ];
        let stats = compute_stats(&rows);
        assert_eq!(stats.total_cases, 305);
        assert_eq!(stats.total_deaths, 30);
    }

    #[test]
    fn test_duplicate_country_rows_keep_highest_cumulative() {
        let rows = vec![
            row("2024-01-02", "FR", 5, 90, 0, 9),
            row("2024-01-02", "FR", 5, 105, 0, 11),
            row("2024-01-02", "FR", 5, 105, 0, 99),
        ];
        let snapshot = latest_per_country(&rows, "2024-01-02");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].cumulative_cases, 105);
        assert_eq!(snapshot[0].cumulative_deaths, 11, "first row wins a tie");
    }

    #[test]
    fn test_country_key_falls_back_to_name() {
        let mut a = row("2024-01-02", "", 0, 10, 0, 0);
        a.country = "Atlantis".to_string();
        let mut b = row("2024-01-02", "", 0, 20, 0, 0);
        b.country = "Lemuria".to_string();
        let stats = compute_stats(&[a, b]);
        assert_eq!(stats.total_cases, 30, "distinct names are distinct countries");
    }

    #[test]
    fn test_unparseable_dates_do_not_become_latest() {
        let rows = vec![
            row("2024-01-02", "FR", 0, 100, 0, 0),
            row("zzz", "DE", 0, 999, 0, 0),
        ];
        assert_eq!(latest_date(&rows), Some("2024-01-02"));
        assert_eq!(compute_stats(&rows).total_cases, 100);
    }

    #[test]
    fn test_trend_compares_last_seven_dates_to_previous_seven() {
        let mut rows = Vec::new();
        for day in 1..=7 {
            let cases = if day == 7 { 16 } else { 14 };
            rows.push(row(&format!("2024-01-{:02}", day), "FR", cases, 0, 0, 0));
        }
        for day in 8..=14 {
            let cases = if day == 14 { 20 } else { 15 };
            rows.push(row(&format!("2024-01-{:02}", day), "FR", cases, 0, 0, 0));
        }
        // prev window sums to 100, last window to 110
        let (last, prev) = trend_windows(&rows);
        assert_eq!(prev.cases, 100);
        assert_eq!(last.cases, 110);
        let stats = compute_stats(&rows);
        assert!((stats.cases_trend - 10.0).abs() < 1e-9, "trend was {}", stats.cases_trend);
    }

    #[test]
    fn test_trend_with_zero_previous_is_zero() {
        let mut rows = Vec::new();
        for day in 1..=14 {
            let cases = if day > 7 { 10 } else { 0 };
            rows.push(row(&format!("2024-01-{:02}", day), "FR", cases, 0, 0, 0));
        }
        let stats = compute_stats(&rows);
        assert_eq!(stats.cases_trend, 0.0);
        assert!(stats.cases_trend.is_finite());
    }

    #[test]
    fn test_short_history_uses_short_windows() {
        let rows: Vec<DailyReport> = (1..=10)
            .map(|day| row(&format!("2024-01-{:02}", day), "FR", 10, 0, 1, 0))
            .collect();
        let (last, prev) = trend_windows(&rows);
        assert_eq!(last.cases, 70);
        assert_eq!(prev.cases, 30, "only three dates precede the last seven");
        assert_eq!(prev.deaths, 3);
    }

    #[test]
    fn test_trend_sums_all_rows_per_date() {
        let rows = vec![
            row("2024-01-01", "FR", 3, 0, 0, 0),
            row("2024-01-01", "DE", 4, 0, 0, 0),
        ];
        assert_eq!(trend_windows(&rows).0.cases, 7);
    }

    #[test]
    fn test_ratio_guards() {
        assert_eq!(percent_of(5, 0), 0.0);
        assert_eq!(percent_change(5, 0), 0.0);
        assert_eq!(percent_change(5, -3), 0.0);
        assert!((percent_change(110, 100) - 10.0).abs() < 1e-9);
        assert_eq!(round_half_up(84.5), 85);
        assert_eq!(round_half_up(-0.5), 0);
    }

    #[test]
    fn test_cfr_stays_in_range_for_well_formed_data() {
        let rows = vec![
            row("2024-01-05", "FR", 0, 1000, 0, 20),
            row("2024-01-05", "DE", 0, 3, 0, 3),
        ];
        let stats = compute_stats(&rows);
        assert!(stats.cfr >= 0.0 && stats.cfr <= 100.0);
    }
}
