//! Dashboard filter state.
//!
//! The only user-driven input to the engine. A `FilterState` is created with
//! the mount-time default, changed only through its setters, and never
//! persisted.

use chrono::{Months, NaiveDate, Utc};

use crate::model::{ChartTimeRange, DataType, DateRange, RegionFilter};

/// Length of the default date range, ending today.
pub const DEFAULT_RANGE_YEARS: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterState {
    date_range: Option<DateRange>,
    region: RegionFilter,
    data_type: DataType,
    chart_time_range: ChartTimeRange,
}

impl FilterState {
    /// Default filters for a dashboard mounted on `today`: every region,
    /// COVID data, one-year chart window, and a date range covering the last
    /// two calendar years through today.
    pub fn default_at(today: NaiveDate) -> Self {
        // Feb 29 minus two years clamps to Feb 28
        let from = today
            .checked_sub_months(Months::new(12 * DEFAULT_RANGE_YEARS))
            .unwrap_or(NaiveDate::MIN);
        Self {
            date_range: Some(DateRange::new(Some(from), Some(today))),
            region: RegionFilter::All,
            data_type: DataType::Covid,
            chart_time_range: ChartTimeRange::OneYear,
        }
    }

    /// `default_at` for the current UTC date.
    pub fn mount() -> Self {
        Self::default_at(Utc::now().date_naive())
    }

    /// No date restriction, every region.
    pub fn unrestricted() -> Self {
        Self {
            date_range: None,
            ..Self::default_at(NaiveDate::MIN)
        }
    }

    pub fn date_range(&self) -> Option<&DateRange> {
        self.date_range.as_ref()
    }

    pub fn region(&self) -> RegionFilter {
        self.region
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn chart_time_range(&self) -> ChartTimeRange {
        self.chart_time_range
    }

    pub fn set_date_range(&mut self, date_range: Option<DateRange>) {
        self.date_range = date_range;
    }

    pub fn set_region(&mut self, region: RegionFilter) {
        self.region = region;
    }

    pub fn set_data_type(&mut self, data_type: DataType) {
        self.data_type = data_type;
    }

    pub fn set_chart_time_range(&mut self, chart_time_range: ChartTimeRange) {
        self.chart_time_range = chart_time_range;
    }
}
