/// Pre-aggregation index
///
/// Groups the loaded rows by (report date, region) so a region-scoped query
/// touches only that region's groups instead of scanning every row. Groups
/// hold row positions into the dataset the index was built from; an index is
/// only meaningful alongside that exact row sequence.
///
/// Built once per successful load and read-only afterwards.

use std::collections::BTreeMap;
use std::fmt;

use crate::model::DailyReport;

/// Group key. Rows with an unparseable date or a non-canonical region still
/// get a group under their raw values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexKey {
    pub date: String,
    pub region: String,
}

impl IndexKey {
    pub fn of(row: &DailyReport) -> Self {
        Self {
            date: row.date_reported.clone(),
            region: row.who_region.clone(),
        }
    }

    /// Single-string form of the key, "<date>_<region>".
    pub fn composite(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.date, self.region)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreAggregationIndex {
    // Ordered so iteration runs oldest date first
    groups: BTreeMap<IndexKey, Vec<usize>>,
    row_count: usize,
}

impl PreAggregationIndex {
    /// Builds the index. Every position `0..rows.len()` lands in exactly one
    /// group, in source order within the group.
    pub fn build(rows: &[DailyReport]) -> Self {
        let mut groups: BTreeMap<IndexKey, Vec<usize>> = BTreeMap::new();
        for (pos, row) in rows.iter().enumerate() {
            groups.entry(IndexKey::of(row)).or_default().push(pos);
        }
        Self {
            groups,
            row_count: rows.len(),
        }
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of rows the index was built from.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Returns `true` if this index was built from a row sequence of this
    /// length. A cheap guard against pairing an index with the wrong rows.
    pub fn covers(&self, rows: &[DailyReport]) -> bool {
        self.row_count == rows.len()
    }

    pub fn group(&self, date: &str, region: &str) -> &[usize] {
        let key = IndexKey {
            date: date.to_string(),
            region: region.to_string(),
        };
        self.groups.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All groups, ordered by date then region.
    pub fn groups(&self) -> impl Iterator<Item = (&IndexKey, &[usize])> {
        self.groups.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Groups for one region, ordered by date.
    pub fn region_groups<'a>(
        &'a self,
        region: &'a str,
    ) -> impl Iterator<Item = (&'a IndexKey, &'a [usize])> + 'a {
        self.groups().filter(move |(key, _)| key.region == region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(date: &str, code: &str, region: &str) -> DailyReport {
        DailyReport {
            date_reported: date.to_string(),
            country_code: code.to_string(),
            country: code.to_string(),
            who_region: region.to_string(),
            new_cases: 1,
            cumulative_cases: 1,
            new_deaths: 0,
            cumulative_deaths: 0,
        }
    }

    #[test]
    fn test_every_row_lands_in_exactly_one_group() {
        let rows = vec![
            row("2024-01-02", "FR", "EUR"),
            row("2024-01-01", "FR", "EUR"),
            row("2024-01-01", "DE", "EUR"),
            row("2024-01-01", "ZA", "AFR"),
            row("bad", "XX", "Unknown"),
        ];
        let index = PreAggregationIndex::build(&rows);

        let mut seen: Vec<usize> = index.groups().flat_map(|(_, p)| p.iter().copied()).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4], "positions must partition the rows");
        assert_eq!(index.len(), 4);
        assert_eq!(index.row_count(), 5);
        assert!(index.covers(&rows));
    }

    #[test]
    fn test_group_members_share_key_and_keep_source_order() {
        let rows = vec![
            row("2024-01-01", "FR", "EUR"),
            row("2024-01-01", "ZA", "AFR"),
            row("2024-01-01", "DE", "EUR"),
        ];
        let index = PreAggregationIndex::build(&rows);
        assert_eq!(index.group("2024-01-01", "EUR"), &[0, 2]);
        assert_eq!(index.group("2024-01-01", "AFR"), &[1]);
        assert!(index.group("2024-01-01", "WPR").is_empty());
    }

    #[test]
    fn test_region_groups_are_date_ordered() {
        let rows = vec![
            row("2024-01-03", "FR", "EUR"),
            row("2024-01-01", "FR", "EUR"),
            row("2024-01-02", "ZA", "AFR"),
        ];
        let index = PreAggregationIndex::build(&rows);
        let dates: Vec<&str> = index
            .region_groups("EUR")
            .map(|(k, _)| k.date.as_str())
            .collect();
        assert_eq!(dates, vec!["2024-01-01", "2024-01-03"]);
    }

    #[test]
    fn test_composite_key_format() {
        let key = IndexKey::of(&row("2024-01-01", "FR", "EUR"));
        assert_eq!(key.composite(), "2024-01-01_EUR");
        assert_eq!(key.to_string(), key.composite());
    }

    #[test]
    fn test_empty_rows_build_empty_index() {
        let index = PreAggregationIndex::build(&[]);
        assert!(index.is_empty());
        assert!(index.covers(&[]));
    }
}
