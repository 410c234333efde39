//! COVID-19 dashboard aggregation engine.
//!
//! Loads the WHO global daily report dataset from a flat file or a hosted
//! table, caches it, indexes it by (date, region), and derives the filtered
//! rows, summary statistics and chart series a dashboard displays.

pub mod analysis;
pub mod audit;
pub mod cache;
pub mod config;
pub mod dashboard;
pub mod filters;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod regions;
