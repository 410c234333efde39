/// End-to-end tests for the load → filter → aggregate pipeline
///
/// These tests verify:
/// 1. A flat file on disk loads through the cache-first loader
/// 2. A second load within the TTL is served from the on-disk cache
/// 3. Region and date filters drive stats, series and the snapshot table
/// 4. Export of the filtered rows parses back to the same rows
/// 5. The audit flags the fixture's deliberate defects
///
/// The fixture (tests/fixtures/who_sample.csv) holds 16 days of reports for
/// France and Germany (EUR), South Africa (AFR) and Brazil (AMR), plus one
/// row with a blank region and one with an unparseable date.
///
/// Run with: cargo test --test pipeline_integration

use chrono::{Duration, NaiveDate};
use std::path::PathBuf;

use covmon::analysis::series::SeriesMode;
use covmon::audit::{audit_dataset, AuditStatus};
use covmon::cache::{FileRowCache, RowCache};
use covmon::dashboard::Dashboard;
use covmon::filters::FilterState;
use covmon::ingest::flat_file::{parse_csv, FileLocation, FlatFileSource};
use covmon::ingest::loader::{DatasetLoader, LoadOrigin};
use covmon::model::{ChartTimeRange, DateRange, LoadError, RegionFilter, WhoRegion};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/who_sample.csv")
}

fn loader_with_cache(cache_dir: &std::path::Path) -> DatasetLoader {
    let source = FlatFileSource::new(
        FileLocation::Path(fixture_path()),
        std::time::Duration::from_secs(5),
    );
    let cache = FileRowCache::new(cache_dir, Duration::hours(24));
    DatasetLoader::new(Box::new(source), Box::new(cache))
}

fn loaded_dashboard() -> Dashboard {
    let dir = tempfile::tempdir().expect("temp dir");
    let loader = loader_with_cache(dir.path());
    let mut dashboard = Dashboard::new(FilterState::unrestricted());
    assert!(dashboard.install(loader.load()));
    dashboard
}

fn d(day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(2024, 1, day)
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[test]
fn test_fixture_loads_then_serves_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let loader = loader_with_cache(dir.path());

    let first = loader.load().expect("fixture should load");
    assert_eq!(first.origin, LoadOrigin::Source);
    assert_eq!(first.rows.len(), 66);
    assert!(
        dir.path().join("covidData.json").exists(),
        "successful load should write the cache entry"
    );

    let second = loader.load().expect("cached load should succeed");
    assert_eq!(second.origin, LoadOrigin::Cache);
    assert_eq!(second.rows, first.rows);
    assert_eq!(second.index.len(), first.index.len());
}

#[test]
fn test_cache_survives_a_new_loader() {
    let dir = tempfile::tempdir().unwrap();
    loader_with_cache(dir.path()).load().unwrap();

    let cache = FileRowCache::new(dir.path(), Duration::hours(24));
    let entry = cache.get().expect("entry should be readable by a fresh cache");
    assert_eq!(entry.rows.len(), 66);

    let reloaded = loader_with_cache(dir.path()).load().unwrap();
    assert_eq!(reloaded.origin, LoadOrigin::Cache);
}

#[test]
fn test_missing_file_surfaces_error_with_empty_rows() {
    let dir = tempfile::tempdir().unwrap();
    let source = FlatFileSource::new(
        FileLocation::Path(dir.path().join("absent.csv")),
        std::time::Duration::from_secs(5),
    );
    let loader = DatasetLoader::new(
        Box::new(source),
        Box::new(FileRowCache::new(dir.path(), Duration::hours(24))),
    );

    let mut dashboard = Dashboard::new(FilterState::unrestricted());
    let result = loader.load();
    assert!(matches!(result, Err(LoadError::Io(_))));
    dashboard.install(result);

    assert!(dashboard.error().is_some());
    assert!(dashboard.rows().is_empty());
    assert!(dashboard.filtered_rows().is_empty());
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

#[test]
fn test_all_regions_stats() {
    let mut dashboard = loaded_dashboard();
    let stats = dashboard.stats();

    // Latest date 2024-01-16: BR 480, DE 320, FR 230, ZA 80, XX 1
    assert_eq!(stats.total_cases, 1111);
    assert_eq!(stats.total_deaths, 96);
    assert!(
        (stats.cases_trend - 15.604395604395604).abs() < 1e-9,
        "cases trend was {}",
        stats.cases_trend
    );
}

#[test]
fn test_single_region_stats() {
    let mut dashboard = loaded_dashboard();
    dashboard.set_region(RegionFilter::Only(WhoRegion::Eur));
    let stats = dashboard.stats();

    assert_eq!(stats.total_cases, 550);
    assert_eq!(stats.total_deaths, 48);
    assert!((stats.cfr - 48.0 / 550.0 * 100.0).abs() < 1e-9);
    assert!(
        (stats.cases_trend - 100.0 / 3.0).abs() < 1e-9,
        "EUR went from 210 to 280 new cases week over week, trend was {}",
        stats.cases_trend
    );
}

#[test]
fn test_date_range_moves_the_snapshot() {
    let mut dashboard = loaded_dashboard();
    dashboard.set_date_range(Some(DateRange::new(d(1), d(10))));
    dashboard.set_region(RegionFilter::Only(WhoRegion::Afr));

    let stats = dashboard.stats();
    assert_eq!(stats.total_cases, 50, "ZA on 2024-01-10 has 10 days of 5 cases");

    let filtered = dashboard.filtered_rows();
    assert_eq!(filtered.len(), 10);
    assert!(filtered.iter().all(|r| r.who_region == "AFR"));
}

#[test]
fn test_series_follow_region_mode() {
    let mut dashboard = loaded_dashboard();
    dashboard.set_chart_time_range(ChartTimeRange::OneMonth);

    let trend = dashboard.trend_series();
    assert_eq!(trend.len(), 16, "one bucket per day in the one-month view");
    assert_eq!(trend[0].bucket, "2024-01-01");
    assert_eq!(trend[0].label, "1 Jan");
    assert_eq!(trend[0].by_region["EUR"].cases, 30);
    assert_eq!(trend[15].by_region["Unknown"].cases, 1);

    let regions = dashboard.region_distribution(None);
    let pairs: Vec<(&str, i64)> = regions
        .iter()
        .map(|r| (r.region.as_str(), r.total_cases))
        .collect();
    assert_eq!(pairs, vec![("EUR", 550), ("AMR", 480), ("AFR", 80), ("Unknown", 1)]);

    dashboard.set_region(RegionFilter::Only(WhoRegion::Eur));
    assert_eq!(SeriesMode::for_region(dashboard.filters().region()), SeriesMode::Aggregate);
    let ages = dashboard.age_distribution();
    assert_eq!(ages[0].cases, 22);
    assert_eq!(ages[3].cases, 187);
    assert!(ages[0].by_region.is_empty());
}

#[test]
fn test_table_shows_latest_date_for_every_region() {
    let mut dashboard = loaded_dashboard();
    dashboard.set_region(RegionFilter::Only(WhoRegion::Afr));

    let table = dashboard.table_rows(3);
    let codes: Vec<&str> = table.iter().map(|r| r.country_code.as_str()).collect();
    assert_eq!(codes, vec!["BR", "DE", "FR"]);
    assert!(table.iter().all(|r| r.date_reported == "2024-01-16"));
}

// ---------------------------------------------------------------------------
// Export and audit
// ---------------------------------------------------------------------------

#[test]
fn test_export_round_trips_filtered_rows() {
    let mut dashboard = loaded_dashboard();
    dashboard.set_region(RegionFilter::Only(WhoRegion::Eur));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(dashboard.export_name(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()));
    assert!(path.ends_with("covid19-data-2024-02-01.csv"));

    let file = std::fs::File::create(&path).unwrap();
    let written = dashboard.export_csv(file).unwrap();
    assert_eq!(written, 32);

    let text = std::fs::read_to_string(&path).unwrap();
    let reparsed = parse_csv(&text).unwrap();
    assert_eq!(reparsed.rows, *dashboard.filtered_rows());
}

#[test]
fn test_audit_flags_fixture_defects() {
    let dashboard = loaded_dashboard();
    let audit = audit_dataset(dashboard.rows());

    assert_eq!(audit.status, AuditStatus::Warnings);
    assert_eq!(audit.total_rows, 66);
    assert_eq!(audit.distinct_dates, 16);
    assert_eq!(audit.issues.unparseable_dates, 1);
    assert_eq!(audit.issues.unknown_regions, 1);
    assert_eq!(audit.issues.duplicate_pairs, 0);
    assert_eq!(audit.issues.cumulative_regressions, 0);
}
