//! Dataset Audit Module
//!
//! Checks a loaded row set for the data-quality problems the aggregation
//! tolerates silently: duplicate country reports on the same date,
//! unparseable dates, region codes outside the six WHO symbols, and
//! cumulative counts that go backwards.
//!
//! Nothing here changes the rows. Use it to judge a new source before
//! trusting its dashboard numbers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::model::{DailyReport, UNKNOWN};

// ============================================================================
// Audit Results
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetAudit {
    pub timestamp: String,
    pub total_rows: usize,
    pub distinct_dates: usize,
    pub distinct_countries: usize,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
    pub issues: AuditIssues,
    pub status: AuditStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditIssues {
    /// (date, country) pairs reported more than once.
    pub duplicate_pairs: usize,
    pub unparseable_dates: usize,
    /// Rows whose region was blank in the source.
    pub unknown_regions: usize,
    /// Region values outside the six WHO symbols, with row counts.
    pub non_canonical_regions: BTreeMap<String, usize>,
    /// Negative daily counts. These are source corrections, not errors.
    pub negative_new_cases: usize,
    pub negative_new_deaths: usize,
    /// Consecutive reports where a country's cumulative cases decreased.
    pub cumulative_regressions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AuditStatus {
    Clean,
    Warnings,
    Empty,
}

// ============================================================================
// Audit
// ============================================================================

pub fn audit_dataset_at(rows: &[DailyReport], now: DateTime<Utc>) -> DatasetAudit {
    let mut issues = AuditIssues::default();
    let mut dates: BTreeSet<&str> = BTreeSet::new();
    let mut pairs: HashMap<(&str, &str), usize> = HashMap::new();
    let mut by_country: HashMap<&str, Vec<(&str, i64)>> = HashMap::new();

    for row in rows {
        match row.date() {
            Some(_) => {
                dates.insert(row.date_reported.as_str());
                by_country
                    .entry(row.country_key())
                    .or_default()
                    .push((row.date_reported.as_str(), row.cumulative_cases));
            }
            None => issues.unparseable_dates += 1,
        }

        *pairs
            .entry((row.date_reported.as_str(), row.country_key()))
            .or_default() += 1;

        if row.who_region == UNKNOWN {
            issues.unknown_regions += 1;
        } else if row.region().is_none() {
            *issues
                .non_canonical_regions
                .entry(row.who_region.clone())
                .or_default() += 1;
        }

        if row.new_cases < 0 {
            issues.negative_new_cases += 1;
        }
        if row.new_deaths < 0 {
            issues.negative_new_deaths += 1;
        }
    }

    issues.duplicate_pairs = pairs.values().filter(|&&n| n > 1).count();

    for reports in by_country.values_mut() {
        reports.sort_by(|a, b| a.0.cmp(b.0));
        issues.cumulative_regressions += reports
            .windows(2)
            .filter(|w| w[0].0 != w[1].0 && w[1].1 < w[0].1)
            .count();
    }

    let distinct_countries = rows
        .iter()
        .map(|r| r.country_key())
        .collect::<BTreeSet<_>>()
        .len();

    let status = if rows.is_empty() {
        AuditStatus::Empty
    } else if issues.duplicate_pairs > 0
        || issues.unparseable_dates > 0
        || issues.unknown_regions > 0
        || !issues.non_canonical_regions.is_empty()
        || issues.cumulative_regressions > 0
    {
        AuditStatus::Warnings
    } else {
        AuditStatus::Clean
    };

    DatasetAudit {
        timestamp: now.to_rfc3339(),
        total_rows: rows.len(),
        distinct_dates: dates.len(),
        distinct_countries,
        first_date: dates.first().map(|d| d.to_string()),
        last_date: dates.last().map(|d| d.to_string()),
        issues,
        status,
    }
}

pub fn audit_dataset(rows: &[DailyReport]) -> DatasetAudit {
    audit_dataset_at(rows, Utc::now())
}

pub fn print_summary(audit: &DatasetAudit) {
    println!("\n═══════════════════════════════════════════════════════════");
    println!("DATASET AUDIT");
    println!("═══════════════════════════════════════════════════════════");
    println!();
    println!("Rows:        {}", audit.total_rows);
    println!("Countries:   {}", audit.distinct_countries);
    println!(
        "Dates:       {} ({} to {})",
        audit.distinct_dates,
        audit.first_date.as_deref().unwrap_or("-"),
        audit.last_date.as_deref().unwrap_or("-")
    );
    println!();

    let issues = &audit.issues;
    println!("Duplicate date/country pairs:  {}", issues.duplicate_pairs);
    println!("Unparseable dates:             {}", issues.unparseable_dates);
    println!("Blank regions:                 {}", issues.unknown_regions);
    for (region, count) in &issues.non_canonical_regions {
        println!("Non-canonical region '{}':     {}", region, count);
    }
    println!("Cumulative regressions:        {}", issues.cumulative_regressions);
    println!(
        "Negative corrections:          {} cases, {} deaths",
        issues.negative_new_cases, issues.negative_new_deaths
    );
    println!();

    match audit.status {
        AuditStatus::Clean => println!("✓ Clean"),
        AuditStatus::Warnings => println!("⚠ Warnings found"),
        AuditStatus::Empty => println!("✗ Dataset is empty"),
    }
    println!("═══════════════════════════════════════════════════════════");
}
