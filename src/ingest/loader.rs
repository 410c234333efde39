/// Dataset loader
///
/// Cache-first orchestration of a single dataset load:
///
///   1. a fresh cache entry is returned as-is (no fetch, no re-stamp)
///   2. otherwise the source is fetched and parsed
///   3. the fetched rows are written to the cache
///   4. the pre-aggregation index is built
///
/// Every load takes a generation number when it starts. A load that finishes
/// after a newer one has started is reported as `LoadError::Superseded` and
/// its rows are neither cached nor returned, so a slow stale fetch can never
/// overwrite fresher data.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::analysis::index::PreAggregationIndex;
use crate::cache::{FileRowCache, NullRowCache, RowCache};
use crate::config::{Config, ConfigError, SourceKind};
use crate::ingest::flat_file::{FileLocation, FlatFileSource};
use crate::ingest::table::TableSource;
use crate::ingest::DatasetSource;
use crate::logging::{self, Component};
use crate::model::{DailyReport, LoadError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOrigin {
    Cache,
    Source,
}

/// A successfully loaded dataset and its index. Cloning shares the rows.
#[derive(Debug, Clone)]
pub struct LoadedDataset {
    pub rows: Arc<Vec<DailyReport>>,
    pub index: Arc<PreAggregationIndex>,
    pub origin: LoadOrigin,
    pub generation: u64,
}

/// Proof that a load was started, carrying its generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
}

impl LoadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

pub struct DatasetLoader {
    source: Box<dyn DatasetSource>,
    cache: Box<dyn RowCache>,
    generation: AtomicU64,
}

impl DatasetLoader {
    pub fn new(source: Box<dyn DatasetSource>, cache: Box<dyn RowCache>) -> Self {
        Self {
            source,
            cache,
            generation: AtomicU64::new(0),
        }
    }

    /// Builds the source and cache named by `config`. A table source reads
    /// its connection string from the environment.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let source: Box<dyn DatasetSource> = match config.source.kind {
            SourceKind::FlatFile => Box::new(FlatFileSource::new(
                FileLocation::parse(&config.source.location),
                config.fetch_timeout(),
            )),
            SourceKind::Table => Box::new(
                TableSource::new(
                    config.database_url()?,
                    config.source.table.clone(),
                    config.source.row_cap,
                )
                .map_err(|e| ConfigError::Invalid(e.to_string()))?,
            ),
        };

        let cache: Box<dyn RowCache> = if config.cache.enabled {
            Box::new(FileRowCache::new(&config.cache.directory, config.cache_ttl()?))
        } else {
            Box::new(NullRowCache)
        };

        Ok(Self::new(source, cache))
    }

    pub fn describe(&self) -> String {
        self.source.describe()
    }

    /// Starts a load, superseding any load already in flight.
    pub fn begin(&self) -> LoadTicket {
        LoadTicket {
            generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
        }
    }

    /// Generation of the most recently started load.
    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, ticket: LoadTicket) -> bool {
        ticket.generation == self.current_generation()
    }

    fn check_current(&self, ticket: LoadTicket) -> Result<(), LoadError> {
        let current = self.current_generation();
        if ticket.generation == current {
            Ok(())
        } else {
            Err(LoadError::Superseded {
                generation: ticket.generation,
                current,
            })
        }
    }

    /// Starts and runs a load.
    pub fn load(&self) -> Result<LoadedDataset, LoadError> {
        let ticket = self.begin();
        self.load_with(ticket)
    }

    /// Drops the cache entry, then loads from the source.
    pub fn refresh(&self) -> Result<LoadedDataset, LoadError> {
        self.clear_cache();
        self.load()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        logging::info(Component::Loader, Some(&self.describe()), "Cache cleared");
    }

    /// Runs the load for `ticket`.
    pub fn load_with(&self, ticket: LoadTicket) -> Result<LoadedDataset, LoadError> {
        let location = self.describe();
        let result = self.run(ticket, &location);
        if let Err(e) = &result {
            logging::log_load_failure(Component::Loader, &location, e);
        }
        result
    }

    fn run(&self, ticket: LoadTicket, location: &str) -> Result<LoadedDataset, LoadError> {
        if let Some(entry) = self.cache.get() {
            logging::info(
                Component::Loader,
                Some(location),
                &format!(
                    "Using cached dataset from {} ({} rows)",
                    entry.timestamp,
                    entry.rows.len()
                ),
            );
            self.check_current(ticket)?;
            return Ok(self.finish(ticket, entry.rows, LoadOrigin::Cache, location));
        }

        let started = Instant::now();
        let fetched = self.source.fetch();
        // A stale load reports only that it was superseded
        self.check_current(ticket)?;
        let rows = fetched?;

        self.cache.set(&rows);
        logging::info(
            Component::Loader,
            Some(location),
            &format!(
                "Loaded {} rows from source in {:.2}s",
                rows.len(),
                started.elapsed().as_secs_f64()
            ),
        );
        Ok(self.finish(ticket, rows, LoadOrigin::Source, location))
    }

    fn finish(
        &self,
        ticket: LoadTicket,
        rows: Vec<DailyReport>,
        origin: LoadOrigin,
        location: &str,
    ) -> LoadedDataset {
        let started = Instant::now();
        let index = PreAggregationIndex::build(&rows);
        logging::debug(
            Component::Loader,
            Some(location),
            &format!(
                "Indexed {} rows into {} groups in {:.3}s",
                rows.len(),
                index.len(),
                started.elapsed().as_secs_f64()
            ),
        );
        LoadedDataset {
            rows: Arc::new(rows),
            index: Arc::new(index),
            origin,
            generation: ticket.generation,
        }
    }
}
