/// covmon: print a COVID-19 dashboard snapshot to the terminal.
///
/// Usage:
///   covmon [--config PATH] [--region CODE|all] [--range 1m|3m|6m|1y|all]
///          [--from YYYY-MM-DD] [--to YYYY-MM-DD] [--all-dates]
///          [--export PATH] [--audit] [--refresh] [--json]
///
/// Without `--config`, `covmon.toml` is used if present, defaults otherwise.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process;

use covmon::analysis::series::{label_visible, share_percent, AgeBracket, RegionShare, TrendPoint};
use covmon::audit;
use covmon::config::{self, Config, DEFAULT_CONFIG_PATH};
use covmon::dashboard::Dashboard;
use covmon::filters::FilterState;
use covmon::ingest::loader::DatasetLoader;
use covmon::logging::{self, Component};
use covmon::model::{ChartTimeRange, DailyReport, DateRange, RegionFilter, Stats, DATE_FORMAT};
use covmon::regions;

const USAGE: &str = "usage: covmon [--config PATH] [--region CODE|all] [--range 1m|3m|6m|1y|all]
              [--from YYYY-MM-DD] [--to YYYY-MM-DD] [--all-dates]
              [--export PATH] [--audit] [--refresh] [--json]";

#[derive(Debug, Default)]
struct Options {
    config: Option<PathBuf>,
    region: Option<RegionFilter>,
    range: Option<ChartTimeRange>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    all_dates: bool,
    export: Option<PathBuf>,
    audit: bool,
    refresh: bool,
    json: bool,
}

fn parse_date(flag: &str, value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| format!("{} expects YYYY-MM-DD, got '{}'", flag, value))
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Options, String> {
    let mut opts = Options::default();

    while let Some(flag) = args.next() {
        let mut value = || {
            args.next()
                .ok_or_else(|| format!("{} requires a value", flag))
        };
        match flag.as_str() {
            "--config" => opts.config = Some(PathBuf::from(value()?)),
            "--region" => opts.region = Some(value()?.parse()?),
            "--range" => opts.range = Some(value()?.parse()?),
            "--from" => opts.from = Some(parse_date("--from", &value()?)?),
            "--to" => opts.to = Some(parse_date("--to", &value()?)?),
            "--export" => opts.export = Some(PathBuf::from(value()?)),
            "--all-dates" => opts.all_dates = true,
            "--audit" => opts.audit = true,
            "--refresh" => opts.refresh = true,
            "--json" => opts.json = true,
            "-h" | "--help" => return Err(String::new()),
            other => return Err(format!("unknown argument '{}'", other)),
        }
    }

    Ok(opts)
}

fn load_config(opts: &Options) -> Result<Config, config::ConfigError> {
    match &opts.config {
        Some(path) => config::load_config(path),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => config::load_config(DEFAULT_CONFIG_PATH),
        None => Ok(Config::default()),
    }
}

/// Applies command-line filters on top of the mount-time defaults.
fn apply_filters(dashboard: &mut Dashboard, opts: &Options) {
    if let Some(region) = opts.region {
        dashboard.set_region(region);
    }
    if let Some(range) = opts.range {
        dashboard.set_chart_time_range(range);
    }
    if opts.all_dates {
        dashboard.set_date_range(None);
    } else if opts.from.is_some() || opts.to.is_some() {
        let current = dashboard.filters().date_range().copied().unwrap_or_default();
        dashboard.set_date_range(Some(DateRange::new(
            opts.from.or(current.from),
            opts.to.or(current.to),
        )));
    }
}

#[derive(Serialize)]
struct Snapshot {
    stats: Stats,
    trend: Vec<TrendPoint>,
    regions: Vec<RegionShare>,
    ages: Vec<AgeBracket>,
    table: Vec<DailyReport>,
}

fn print_snapshot(dashboard: &Dashboard, snapshot: &Snapshot) {
    let filters = dashboard.filters();
    let range = filters
        .date_range()
        .map(|r| {
            format!(
                "{} to {}",
                r.from.map(|d| d.to_string()).unwrap_or_else(|| "start".into()),
                r.to.map(|d| d.to_string()).unwrap_or_else(|| "end".into())
            )
        })
        .unwrap_or_else(|| "all dates".into());

    println!("═══════════════════════════════════════════════════════════");
    println!(
        "COVID-19 SNAPSHOT  region={}  dates={}  window={}",
        filters.region(),
        range,
        filters.chart_time_range().as_str()
    );
    println!("═══════════════════════════════════════════════════════════");

    let s = &snapshot.stats;
    println!("Total cases:      {:>14}   ({:+.1}% week over week)", s.total_cases, s.cases_trend);
    println!("Total deaths:     {:>14}   ({:+.1}% week over week)", s.total_deaths, s.deaths_trend);
    println!("Est. recovered:   {:>14}", s.total_recovered);
    println!("CFR:              {:>13.2}%", s.cfr);

    println!("\nNew cases by region:");
    let total: i64 = snapshot.regions.iter().map(|r| r.total_cases).sum();
    for share in &snapshot.regions {
        let pct = share_percent(share.total_cases, total);
        let label = if label_visible(share.total_cases, total) {
            format!("{:.1}%", pct)
        } else {
            String::new()
        };
        println!("  {:<24} {:>12}  {}", share.name, share.total_cases, label);
    }

    println!("\nTrend:");
    for point in &snapshot.trend {
        println!(
            "  {:<10} {:>12} cases {:>10} deaths",
            point.label, point.totals.cases, point.totals.deaths
        );
    }

    println!("\nEstimated cases by age:");
    for bracket in &snapshot.ages {
        println!("  {:<6} {:>12}", bracket.age, bracket.cases);
    }

    println!("\nLatest reports:");
    for row in &snapshot.table {
        println!(
            "  {} {:<32} {:<24} {:>12} {:>10}",
            row.date_reported,
            row.country,
            regions::display_name(&row.who_region),
            row.cumulative_cases,
            row.cumulative_deaths
        );
    }
}

fn export(dashboard: &mut Dashboard, target: &Path) -> Result<PathBuf, String> {
    let path = if target.is_dir() {
        target.join(dashboard.export_name(Utc::now().date_naive()))
    } else {
        target.to_path_buf()
    };
    let file = std::fs::File::create(&path)
        .map_err(|e| format!("cannot create {}: {}", path.display(), e))?;
    dashboard
        .export_csv(file)
        .map_err(|e| format!("export to {} failed: {}", path.display(), e))?;
    Ok(path)
}

fn main() {
    dotenv::dotenv().ok();

    let opts = match parse_args(std::env::args().skip(1)) {
        Ok(opts) => opts,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {}", msg);
            }
            eprintln!("{}", USAGE);
            process::exit(2);
        }
    };

    let config = match load_config(&opts) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(2);
        }
    };

    let level = match config.log_level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(2);
        }
    };
    logging::init_logger(level, config.log_file(), config.logging.timestamps);

    let loader = match DatasetLoader::from_config(&config) {
        Ok(loader) => loader,
        Err(e) => {
            logging::error(Component::System, None, &e.to_string());
            eprintln!("error: {}", e);
            process::exit(2);
        }
    };

    let mut dashboard = Dashboard::new(FilterState::mount());
    apply_filters(&mut dashboard, &opts);

    let result = if opts.refresh { loader.refresh() } else { loader.load() };
    dashboard.install(result);
    if let Some(msg) = dashboard.error() {
        eprintln!("error: {}", msg);
        process::exit(1);
    }

    if opts.audit {
        audit::print_summary(&audit::audit_dataset(dashboard.rows()));
    }

    let snapshot = Snapshot {
        stats: dashboard.stats(),
        trend: dashboard.trend_series(),
        regions: dashboard.region_distribution(None),
        ages: dashboard.age_distribution(),
        table: dashboard.table_rows(config.dashboard.table_limit),
    };

    if opts.json {
        match serde_json::to_string_pretty(&snapshot) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("error: {}", e);
                process::exit(1);
            }
        }
    } else {
        print_snapshot(&dashboard, &snapshot);
    }

    if let Some(target) = &opts.export {
        match export(&mut dashboard, target) {
            Ok(path) => logging::info(
                Component::System,
                Some(&path.display().to_string()),
                "Export written",
            ),
            Err(msg) => {
                eprintln!("error: {}", msg);
                process::exit(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covmon::model::WhoRegion;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn test_parse_args_reads_filters() {
        let opts = parse_args(args(&[
            "--region", "eur", "--range", "3m", "--from", "2024-01-01", "--audit",
        ]))
        .unwrap();
        assert_eq!(opts.region, Some(RegionFilter::Only(WhoRegion::Eur)));
        assert_eq!(opts.range, Some(ChartTimeRange::ThreeMonths));
        assert_eq!(opts.from, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert!(opts.audit);
        assert!(!opts.refresh);
    }

    #[test]
    fn test_parse_args_rejects_bad_input() {
        assert!(parse_args(args(&["--region"])).is_err());
        assert!(parse_args(args(&["--region", "MARS"])).is_err());
        assert!(parse_args(args(&["--from", "01/02/2024"])).is_err());
        assert!(parse_args(args(&["--bogus"])).is_err());
    }

    #[test]
    fn test_from_flag_keeps_default_upper_bound() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let mut dashboard = Dashboard::new(FilterState::default_at(today));
        let opts = parse_args(args(&["--from", "2024-01-01"])).unwrap();
        apply_filters(&mut dashboard, &opts);
        let range = dashboard.filters().date_range().copied().unwrap();
        assert_eq!(range.from, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(range.to, Some(today));
    }
}
