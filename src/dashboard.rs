//! Dashboard session.
//!
//! Owns the loaded dataset, the filter state and the load/error state, and
//! serves every derived view. Derived values are memoized on the dataset
//! generation plus the filter fields they depend on, so repeated reads with
//! unchanged inputs do no work and any filter change recomputes in full.
//!
//! Load results are installed through `install`, which drops results older
//! than the newest one already seen.

use chrono::NaiveDate;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use crate::analysis::filter;
use crate::analysis::index::PreAggregationIndex;
use crate::analysis::series::{
    self, AgeBracket, RegionShare, SeriesMode, TrendPoint, DEFAULT_TABLE_LIMIT,
};
use crate::analysis::stats::compute_stats;
use crate::filters::FilterState;
use crate::ingest::flat_file::{export_file_name, write_csv};
use crate::ingest::loader::{LoadOrigin, LoadedDataset};
use crate::logging::{self, Component};
use crate::model::{
    ChartTimeRange, DailyReport, DataType, DateRange, LoadError, RegionFilter, Stats, WhoRegion,
};

#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    Loading,
    Ready,
    Failed(String),
}

/// Single-entry memo: recomputes only when the key changes.
struct Memo<K, V> {
    entry: Option<(K, V)>,
}

impl<K: PartialEq, V: Clone> Memo<K, V> {
    fn new() -> Self {
        Self { entry: None }
    }

    fn get_or_compute(&mut self, key: K, compute: impl FnOnce() -> V) -> V {
        if let Some((cached_key, value)) = &self.entry {
            if *cached_key == key {
                return value.clone();
            }
        }
        let value = compute();
        self.entry = Some((key, value.clone()));
        value
    }

    fn clear(&mut self) {
        self.entry = None;
    }
}

/// Inputs that decide the filtered row set.
#[derive(Debug, Clone, PartialEq)]
struct FilterKey {
    generation: u64,
    date_range: Option<DateRange>,
    region: RegionFilter,
}

pub struct Dashboard {
    state: LoadState,
    dataset: Option<LoadedDataset>,
    generation: u64,
    initial_filters: FilterState,
    filters: FilterState,
    filtered: Memo<FilterKey, Arc<Vec<DailyReport>>>,
    date_only: Memo<(u64, Option<DateRange>), Arc<Vec<DailyReport>>>,
    stats: Memo<FilterKey, Stats>,
}

impl Dashboard {
    /// A dashboard waiting for its first load. `filters` is also what
    /// `reset_filters` restores.
    pub fn new(filters: FilterState) -> Self {
        Self {
            state: LoadState::Loading,
            dataset: None,
            generation: 0,
            initial_filters: filters.clone(),
            filters,
            filtered: Memo::new(),
            date_only: Memo::new(),
            stats: Memo::new(),
        }
    }

    /// Dashboard with the default filters for today.
    pub fn mount() -> Self {
        Self::new(FilterState::mount())
    }

    // -----------------------------------------------------------------------
    // Load state
    // -----------------------------------------------------------------------

    /// Installs a load result. Returns `false` if the result was dropped
    /// because a newer one has already been installed, or because the load
    /// itself was superseded.
    pub fn install(&mut self, result: Result<LoadedDataset, LoadError>) -> bool {
        match result {
            Ok(dataset) => {
                if dataset.generation < self.generation {
                    logging::debug(
                        Component::Engine,
                        None,
                        &format!(
                            "Dropping load {} (already showing {})",
                            dataset.generation, self.generation
                        ),
                    );
                    return false;
                }
                logging::info(
                    Component::Engine,
                    None,
                    &format!(
                        "Installed {} rows from {}",
                        dataset.rows.len(),
                        match dataset.origin {
                            LoadOrigin::Cache => "cache",
                            LoadOrigin::Source => "source",
                        }
                    ),
                );
                self.generation = dataset.generation;
                self.dataset = Some(dataset);
                self.state = LoadState::Ready;
                self.clear_memos();
                true
            }
            Err(LoadError::Superseded { .. }) => false,
            Err(e) => {
                // Never leave rows from an earlier load on screen
                self.dataset = None;
                self.state = LoadState::Failed(e.to_string());
                self.clear_memos();
                true
            }
        }
    }

    /// Marks a reload as started.
    pub fn begin_loading(&mut self) {
        self.state = LoadState::Loading;
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state == LoadState::Loading
    }

    /// User-visible error text, if the last load failed.
    pub fn error(&self) -> Option<&str> {
        match &self.state {
            LoadState::Failed(msg) => Some(msg),
            _ => None,
        }
    }

    /// All loaded rows; empty before a load and after a failure.
    pub fn rows(&self) -> &[DailyReport] {
        self.dataset.as_ref().map(|d| d.rows.as_slice()).unwrap_or(&[])
    }

    fn clear_memos(&mut self) {
        self.filtered.clear();
        self.date_only.clear();
        self.stats.clear();
    }

    // -----------------------------------------------------------------------
    // Filters
    // -----------------------------------------------------------------------

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn set_date_range(&mut self, date_range: Option<DateRange>) {
        self.filters.set_date_range(date_range);
    }

    pub fn set_region(&mut self, region: RegionFilter) {
        self.filters.set_region(region);
    }

    pub fn set_data_type(&mut self, data_type: DataType) {
        self.filters.set_data_type(data_type);
    }

    pub fn set_chart_time_range(&mut self, chart_time_range: ChartTimeRange) {
        self.filters.set_chart_time_range(chart_time_range);
    }

    /// Restores the filters the dashboard was created with.
    pub fn reset_filters(&mut self) {
        self.filters = self.initial_filters.clone();
    }

    // -----------------------------------------------------------------------
    // Derived views
    // -----------------------------------------------------------------------

    fn filter_key(&self) -> FilterKey {
        FilterKey {
            generation: self.generation,
            date_range: self.filters.date_range().copied(),
            region: self.filters.region(),
        }
    }

    /// Rows passing the date range and region.
    pub fn filtered_rows(&mut self) -> Arc<Vec<DailyReport>> {
        let key = self.filter_key();
        let dataset = self.dataset.as_ref();
        let filters = &self.filters;
        self.filtered.get_or_compute(key, || {
            let Some(dataset) = dataset else {
                return Arc::new(Vec::new());
            };
            let started = Instant::now();
            let rows = filter::apply(&dataset.rows, &dataset.index, filters);
            logging::debug(
                Component::Engine,
                None,
                &format!(
                    "Filtered {} of {} rows ({}) in {:.3}s",
                    rows.len(),
                    dataset.rows.len(),
                    filters.region(),
                    started.elapsed().as_secs_f64()
                ),
            );
            Arc::new(rows)
        })
    }

    /// Rows passing the date range, every region.
    pub fn date_filtered_rows(&mut self) -> Arc<Vec<DailyReport>> {
        let key = (self.generation, self.filters.date_range().copied());
        let dataset = self.dataset.as_ref();
        let date_range = self.filters.date_range();
        self.date_only.get_or_compute(key, || match dataset {
            Some(dataset) => Arc::new(filter::date_filtered(&dataset.rows, date_range)),
            None => Arc::new(Vec::new()),
        })
    }

    /// Input to the chart series: every region when breaking out by region,
    /// the filtered rows otherwise.
    fn series_rows(&mut self) -> (Arc<Vec<DailyReport>>, SeriesMode) {
        let mode = SeriesMode::for_region(self.filters.region());
        let rows = match mode {
            SeriesMode::ByRegion => self.date_filtered_rows(),
            SeriesMode::Aggregate => self.filtered_rows(),
        };
        (rows, mode)
    }

    pub fn stats(&mut self) -> Stats {
        let key = self.filter_key();
        let rows = self.filtered_rows();
        self.stats.get_or_compute(key, || compute_stats(&rows))
    }

    pub fn trend_series(&mut self) -> Vec<TrendPoint> {
        let (rows, mode) = self.series_rows();
        series::compute_trend_series(&rows, self.filters.chart_time_range(), mode)
    }

    /// Distribution over the chart window. With `selected`, only those
    /// regions are included.
    pub fn region_distribution(&mut self, selected: Option<&[WhoRegion]>) -> Vec<RegionShare> {
        let (rows, _) = self.series_rows();
        series::compute_region_distribution(&rows, self.filters.chart_time_range(), selected)
    }

    pub fn age_distribution(&mut self) -> Vec<AgeBracket> {
        let (rows, mode) = self.series_rows();
        series::compute_age_distribution(&rows, self.filters.chart_time_range(), mode)
    }

    /// Latest-date snapshot drawn from every region in the date range.
    pub fn table_rows(&mut self, limit: usize) -> Vec<DailyReport> {
        let rows = self.date_filtered_rows();
        series::compute_table_rows(&rows, limit)
    }

    pub fn default_table_rows(&mut self) -> Vec<DailyReport> {
        self.table_rows(DEFAULT_TABLE_LIMIT)
    }

    /// Writes the filtered rows as CSV.
    pub fn export_csv<W: io::Write>(&mut self, writer: W) -> Result<usize, csv::Error> {
        let rows = self.filtered_rows();
        write_csv(&rows, writer)?;
        logging::info(
            Component::Engine,
            None,
            &format!("Exported {} rows", rows.len()),
        );
        Ok(rows.len())
    }

    /// Suggested file name for an export made on `today`.
    pub fn export_name(&self, today: NaiveDate) -> String {
        export_file_name(today)
    }

    /// The index for the installed dataset, if any.
    pub fn index(&self) -> Option<&PreAggregationIndex> {
        self.dataset.as_ref().map(|d| d.index.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(date: &str, code: &str, region: &str, cum: i64) -> DailyReport {
        DailyReport {
            date_reported: date.to_string(),
            country_code: code.to_string(),
            country: code.to_string(),
            who_region: region.to_string(),
            new_cases: cum / 10,
            cumulative_cases: cum,
            new_deaths: 0,
            cumulative_deaths: cum / 10,
        }
    }

    fn dataset(rows: Vec<DailyReport>, generation: u64) -> LoadedDataset {
        let index = PreAggregationIndex::build(&rows);
        LoadedDataset {
            rows: Arc::new(rows),
            index: Arc::new(index),
            origin: LoadOrigin::Source,
            generation,
        }
    }

    fn sample() -> Vec<DailyReport> {
        vec![
            report("2024-01-01", "FR", "EUR", 100),
            report("2024-01-01", "ZA", "AFR", 50),
        ]
    }

    #[test]
    fn test_region_filter_feeds_stats() {
        let mut dash = Dashboard::new(FilterState::unrestricted());
        assert!(dash.install(Ok(dataset(sample(), 1))));
        dash.set_region(RegionFilter::Only(WhoRegion::Eur));

        let filtered = dash.filtered_rows();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].country_code, "FR");

        let stats = dash.stats();
        assert_eq!(stats.total_cases, 100);
        assert_eq!(stats.total_deaths, 10);
        assert!((stats.cfr - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_region_and_date_spellings_agree_across_views() {
        let text = "Date_reported,Country_code,Country,WHO_region,New_cases,Cumulative_cases,New_deaths,Cumulative_deaths
2024-01-31,FR,France,EUR,1000,1000,0,0
2024-01-31T00:00:00Z,DE,Germany, eur ,500,500,0,0
";
        let rows = crate::ingest::flat_file::parse_csv(text).unwrap().rows;
        let mut dash = Dashboard::new(FilterState::unrestricted());
        dash.install(Ok(dataset(rows, 1)));
        dash.set_chart_time_range(ChartTimeRange::OneMonth);

        let trend = dash.trend_series();
        assert_eq!(trend.len(), 1, "one calendar day is one bucket");
        assert_eq!(trend[0].bucket, "2024-01-31");
        assert_eq!(trend[0].totals.cases, 1500);
        assert_eq!(trend[0].by_region.len(), 1);
        assert_eq!(trend[0].by_region["EUR"].cases, 1500);

        let shares = dash.region_distribution(None);
        assert_eq!(shares.len(), 1);
        assert_eq!((shares[0].region.as_str(), shares[0].total_cases), ("EUR", 1500));
        assert_eq!(shares[0].name, "Europe");

        let ages = dash.age_distribution();
        assert_eq!(ages[0].cases, 60);
        assert_eq!(ages[0].by_region[&WhoRegion::Eur], 60);

        assert_eq!(dash.table_rows(10).len(), 2);
        assert_eq!(dash.stats().total_cases, 1500);

        dash.set_region(RegionFilter::Only(WhoRegion::Eur));
        assert_eq!(dash.filtered_rows().len(), 2);
        assert_eq!(dash.stats().total_cases, 1500);
        assert_eq!(dash.trend_series()[0].totals.cases, 1500);
    }

    #[test]
    fn test_memo_returns_same_rows_until_filters_change() {
        let mut dash = Dashboard::new(FilterState::unrestricted());
        dash.install(Ok(dataset(sample(), 1)));

        let first = dash.filtered_rows();
        let second = dash.filtered_rows();
        assert!(Arc::ptr_eq(&first, &second), "unchanged inputs must reuse the memo");

        dash.set_region(RegionFilter::Only(WhoRegion::Afr));
        let third = dash.filtered_rows();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.len(), 1);
    }

    #[test]
    fn test_chart_window_change_keeps_filtered_memo() {
        let mut dash = Dashboard::new(FilterState::unrestricted());
        dash.install(Ok(dataset(sample(), 1)));
        let before = dash.filtered_rows();
        dash.set_chart_time_range(ChartTimeRange::OneMonth);
        assert!(Arc::ptr_eq(&before, &dash.filtered_rows()));
    }

    #[test]
    fn test_stale_result_is_dropped() {
        let mut dash = Dashboard::new(FilterState::unrestricted());
        assert!(dash.install(Ok(dataset(sample(), 2))));
        let stale = vec![report("2023-01-01", "XX", "WPR", 1)];
        assert!(!dash.install(Ok(dataset(stale, 1))), "older generation must be ignored");
        assert_eq!(dash.rows().len(), 2);

        let superseded = Err(LoadError::Superseded { generation: 3, current: 4 });
        assert!(!dash.install(superseded));
        assert_eq!(dash.state(), &LoadState::Ready);
    }

    #[test]
    fn test_failure_surfaces_error_and_empties_rows() {
        let mut dash = Dashboard::new(FilterState::unrestricted());
        dash.install(Ok(dataset(sample(), 1)));
        assert_eq!(dash.filtered_rows().len(), 2);

        assert!(dash.install(Err(LoadError::HttpError(404))));
        assert_eq!(dash.error(), Some("HTTP error: 404"));
        assert!(dash.rows().is_empty());
        assert!(dash.filtered_rows().is_empty(), "no stale rows after a failure");
        assert_eq!(dash.stats(), Stats::default());
        assert!(dash.trend_series().is_empty());
    }

    #[test]
    fn test_breakdown_uses_every_region_and_table_ignores_region() {
        let mut dash = Dashboard::new(FilterState::unrestricted());
        dash.install(Ok(dataset(sample(), 1)));

        let trend = dash.trend_series();
        assert_eq!(trend[0].by_region.len(), 2);

        dash.set_region(RegionFilter::Only(WhoRegion::Eur));
        let trend = dash.trend_series();
        assert!(trend[0].by_region.is_empty());
        assert_eq!(trend[0].totals.cases, 10);

        let table = dash.default_table_rows();
        assert_eq!(table.len(), 2, "table is not narrowed by region");
        assert_eq!(table[0].country_code, "FR");
    }

    #[test]
    fn test_reset_restores_initial_filters() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let initial = FilterState::default_at(today);
        let mut dash = Dashboard::new(initial.clone());
        dash.set_region(RegionFilter::Only(WhoRegion::Sear));
        dash.set_date_range(None);
        dash.reset_filters();
        assert_eq!(dash.filters(), &initial);
    }

    #[test]
    fn test_export_writes_filtered_rows() {
        let mut dash = Dashboard::new(FilterState::unrestricted());
        dash.install(Ok(dataset(sample(), 1)));
        dash.set_region(RegionFilter::Only(WhoRegion::Afr));

        let mut buf = Vec::new();
        let written = dash.export_csv(&mut buf).unwrap();
        assert_eq!(written, 1);
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("2024-01-01,ZA,ZA,AFR,5,50,0,5"));
        assert!(!text.contains(",FR,"));
    }

    #[test]
    fn test_loading_state_before_first_install() {
        let dash = Dashboard::new(FilterState::unrestricted());
        assert!(dash.is_loading());
        assert!(dash.rows().is_empty());
        assert!(dash.index().is_none());
    }
}
