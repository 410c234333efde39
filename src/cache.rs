//! Durable row cache for the loaded dataset.
//!
//! Holds a single entry (the last fetched dataset plus the instant it was
//! stored) under a fixed key. An entry is usable for a fixed TTL, 24 hours
//! by default, measured from its timestamp.
//!
//! Every backend fails soft: storage errors and corrupt entries are logged
//! and reported as a cache miss. Nothing here can block a dataset load.
//!
//! # Clock injection
//! `get_at` and `set_at` take `now` explicitly; `get` and `set` are thin
//! wrappers that use the wall clock. Tests use the `_at` forms.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::logging::{self, Component};
use crate::model::DailyReport;

/// Logical key of the single cache entry.
pub const CACHE_KEY: &str = "covidData";

/// Default entry lifetime.
pub const DEFAULT_TTL_HOURS: i64 = 24;

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedDataset {
    pub timestamp: DateTime<Utc>,
    pub rows: Vec<DailyReport>,
}

/// Borrowed form of `CachedDataset` so writes don't clone the row set.
#[derive(Serialize)]
struct CachedDatasetRef<'a> {
    timestamp: DateTime<Utc>,
    rows: &'a [DailyReport],
}

/// Returns `true` while an entry stamped at `timestamp` is still usable.
///
/// Freshness is strictly less than the TTL:
///   age <  ttl  →  fresh
///   age >= ttl  →  expired
pub fn is_fresh_at(timestamp: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(timestamp) < ttl
}

// ---------------------------------------------------------------------------
// Cache interface
// ---------------------------------------------------------------------------

/// Injectable cache store. Implementations must never panic or return errors
/// to the caller; a failed read is a miss and a failed write is dropped.
pub trait RowCache: Send + Sync {
    /// Returns the stored entry if one exists and is fresh at `now`. The
    /// entry's original timestamp is returned untouched.
    fn get_at(&self, now: DateTime<Utc>) -> Option<CachedDataset>;

    /// Overwrites the single entry, stamping it with `now`.
    fn set_at(&self, rows: &[DailyReport], now: DateTime<Utc>);

    /// Removes the entry, if any.
    fn clear(&self);

    fn get(&self) -> Option<CachedDataset> {
        self.get_at(Utc::now())
    }

    fn set(&self, rows: &[DailyReport]) {
        self.set_at(rows, Utc::now())
    }
}

fn log_expired(timestamp: DateTime<Utc>, now: DateTime<Utc>) {
    let age_minutes = now.signed_duration_since(timestamp).num_minutes();
    logging::info(
        Component::Cache,
        Some(CACHE_KEY),
        &format!("Cache expired ({} minutes old)", age_minutes),
    );
}

// ---------------------------------------------------------------------------
// File-backed cache
// ---------------------------------------------------------------------------

/// Stores the entry as a JSON document named after `CACHE_KEY` inside a
/// cache directory. Writes go to a temporary file that is then renamed over
/// the entry, so a crash mid-write leaves the previous entry intact.
pub struct FileRowCache {
    path: PathBuf,
    ttl: Duration,
}

impl FileRowCache {
    pub fn new(directory: impl AsRef<Path>, ttl: Duration) -> Self {
        Self {
            path: directory.as_ref().join(format!("{}.json", CACHE_KEY)),
            ttl,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_entry(&self, rows: &[DailyReport], now: DateTime<Utc>) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| format!("create {}: {}", parent.display(), e))?;
        }
        let body = serde_json::to_vec(&CachedDatasetRef { timestamp: now, rows })
            .map_err(|e| format!("serialize: {}", e))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(|e| format!("write {}: {}", tmp.display(), e))?;
        fs::rename(&tmp, &self.path).map_err(|e| format!("rename {}: {}", tmp.display(), e))?;
        Ok(())
    }
}

impl RowCache for FileRowCache {
    fn get_at(&self, now: DateTime<Utc>) -> Option<CachedDataset> {
        let body = match fs::read(&self.path) {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                logging::debug(Component::Cache, Some(CACHE_KEY), "No cache entry");
                return None;
            }
            Err(e) => {
                logging::warn(
                    Component::Cache,
                    Some(CACHE_KEY),
                    &format!("Cache read failed, treating as miss: {}", e),
                );
                return None;
            }
        };

        let entry: CachedDataset = match serde_json::from_slice(&body) {
            Ok(entry) => entry,
            Err(e) => {
                logging::warn(
                    Component::Cache,
                    Some(CACHE_KEY),
                    &format!("Corrupt cache entry, treating as miss: {}", e),
                );
                return None;
            }
        };

        if !is_fresh_at(entry.timestamp, self.ttl, now) {
            log_expired(entry.timestamp, now);
            return None;
        }

        logging::info(
            Component::Cache,
            Some(CACHE_KEY),
            &format!("Loaded {} rows from cache", entry.rows.len()),
        );
        Some(entry)
    }

    fn set_at(&self, rows: &[DailyReport], now: DateTime<Utc>) {
        match self.write_entry(rows, now) {
            Ok(()) => logging::info(
                Component::Cache,
                Some(CACHE_KEY),
                &format!("Cached {} rows", rows.len()),
            ),
            Err(e) => logging::warn(
                Component::Cache,
                Some(CACHE_KEY),
                &format!("Cache write failed, continuing without cache: {}", e),
            ),
        }
    }

    fn clear(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => logging::info(Component::Cache, Some(CACHE_KEY), "Cache cleared"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => logging::warn(
                Component::Cache,
                Some(CACHE_KEY),
                &format!("Cache clear failed: {}", e),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory cache
// ---------------------------------------------------------------------------

/// Process-local cache. Same TTL semantics as the file cache, no durability.
pub struct MemoryRowCache {
    entry: Mutex<Option<CachedDataset>>,
    ttl: Duration,
}

impl MemoryRowCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entry: Mutex::new(None),
            ttl,
        }
    }
}

impl RowCache for MemoryRowCache {
    fn get_at(&self, now: DateTime<Utc>) -> Option<CachedDataset> {
        let slot = self.entry.lock().ok()?;
        let entry = slot.as_ref()?;
        if !is_fresh_at(entry.timestamp, self.ttl, now) {
            log_expired(entry.timestamp, now);
            return None;
        }
        Some(entry.clone())
    }

    fn set_at(&self, rows: &[DailyReport], now: DateTime<Utc>) {
        match self.entry.lock() {
            Ok(mut slot) => {
                *slot = Some(CachedDataset {
                    timestamp: now,
                    rows: rows.to_vec(),
                })
            }
            Err(_) => logging::warn(Component::Cache, Some(CACHE_KEY), "Cache lock poisoned, write dropped"),
        }
    }

    fn clear(&self) {
        if let Ok(mut slot) = self.entry.lock() {
            *slot = None;
        }
    }
}

// ---------------------------------------------------------------------------
// Disabled cache
// ---------------------------------------------------------------------------

/// Always misses. Used when caching is turned off in configuration.
pub struct NullRowCache;

impl RowCache for NullRowCache {
    fn get_at(&self, _now: DateTime<Utc>) -> Option<CachedDataset> {
        None
    }

    fn set_at(&self, _rows: &[DailyReport], _now: DateTime<Utc>) {}

    fn clear(&self) {}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
