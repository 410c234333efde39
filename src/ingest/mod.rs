/// Dataset ingestion.
///
/// Submodules:
/// - `flat_file`: WHO CSV over HTTP or from disk; also CSV export.
/// - `table`: hosted relational table (snake_case columns).
/// - `loader`: cache-first load orchestration and load generations.
///
/// Each source normalizes its own field naming into `model::DailyReport`
/// before returning, so the rest of the pipeline sees one row shape.

pub mod flat_file;
pub mod loader;
pub mod table;

use crate::model::{DailyReport, LoadError};

/// A collaborator that produces the full raw row sequence.
///
/// A fetch is all-or-nothing: either every row is returned or an error is.
pub trait DatasetSource: Send + Sync {
    /// Human-readable location, used as the log subject.
    fn describe(&self) -> String;

    fn fetch(&self) -> Result<Vec<DailyReport>, LoadError>;
}
