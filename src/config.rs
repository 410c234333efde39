/// Runtime configuration
///
/// Loaded from a TOML file (default `covmon.toml`). Every section and key is
/// optional; omitted values take the defaults below. The hosted-table
/// connection string is never stored in the file: it comes from the
/// `DATABASE_URL` environment variable, which `main` populates from `.env`
/// via dotenv.
///
/// ```toml
/// [source]
/// kind = "flat_file"          # or "table"
/// location = "https://srhdpeuwpubsa.blob.core.windows.net/whdh/COVID/WHO-COVID-19-global-daily-data.csv"
/// fetch_timeout_secs = 30
///
/// [cache]
/// directory = ".covmon-cache"
/// ttl_hours = 24
/// ```

use chrono::Duration;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::analysis::series::DEFAULT_TABLE_LIMIT;
use crate::cache::DEFAULT_TTL_HOURS;
use crate::ingest::table::{is_valid_identifier, DEFAULT_ROW_CAP, DEFAULT_TABLE};
use crate::logging::LogLevel;

pub const DEFAULT_CONFIG_PATH: &str = "covmon.toml";

/// WHO's published daily CSV.
pub const DEFAULT_LOCATION: &str =
    "https://srhdpeuwpubsa.blob.core.windows.net/whdh/COVID/WHO-COVID-19-global-daily-data.csv";

pub const DATABASE_URL_VAR: &str = "DATABASE_URL";

/// Longest accepted cache lifetime: one year.
pub const MAX_TTL_HOURS: i64 = 24 * 366;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "Config I/O error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Config parse error: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    FlatFile,
    Table,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// URL or local path of the flat file.
    pub location: String,
    pub table: String,
    pub row_cap: i64,
    pub fetch_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::FlatFile,
            location: DEFAULT_LOCATION.to_string(),
            table: DEFAULT_TABLE.to_string(),
            row_cap: DEFAULT_ROW_CAP,
            fetch_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub directory: PathBuf,
    pub ttl_hours: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from(".covmon-cache"),
            ttl_hours: DEFAULT_TTL_HOURS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Empty means console only.
    pub file: String,
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: String::new(),
            timestamps: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub table_limit: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            table_limit: DEFAULT_TABLE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
    pub dashboard: DashboardConfig,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Parses and validates TOML text.
pub fn parse_config(text: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Reads, parses and validates a config file.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
    parse_config(&text)
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.log_level()?;
        if self.source.location.trim().is_empty() && self.source.kind == SourceKind::FlatFile {
            return Err(ConfigError::Invalid("source.location is empty".into()));
        }
        if self.source.kind == SourceKind::Table && !is_valid_identifier(&self.source.table) {
            return Err(ConfigError::Invalid(format!(
                "source.table '{}' is not a plain identifier",
                self.source.table
            )));
        }
        if self.source.row_cap <= 0 {
            return Err(ConfigError::Invalid("source.row_cap must be positive".into()));
        }
        if self.source.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "source.fetch_timeout_secs must be positive".into(),
            ));
        }
        if self.cache.ttl_hours <= 0 {
            return Err(ConfigError::Invalid("cache.ttl_hours must be positive".into()));
        }
        if self.cache.ttl_hours > MAX_TTL_HOURS {
            return Err(ConfigError::Invalid(format!(
                "cache.ttl_hours must be at most {}",
                MAX_TTL_HOURS
            )));
        }
        if self.dashboard.table_limit == 0 {
            return Err(ConfigError::Invalid(
                "dashboard.table_limit must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn log_level(&self) -> Result<LogLevel, ConfigError> {
        self.logging
            .level
            .parse()
            .map_err(|e: String| ConfigError::Invalid(format!("logging.level: {}", e)))
    }

    pub fn log_file(&self) -> Option<&str> {
        Some(self.logging.file.trim()).filter(|f| !f.is_empty())
    }

    pub fn cache_ttl(&self) -> Result<Duration, ConfigError> {
        Duration::try_hours(self.cache.ttl_hours).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "cache.ttl_hours {} is out of range",
                self.cache.ttl_hours
            ))
        })
    }

    pub fn fetch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.source.fetch_timeout_secs)
    }

    /// Connection string for the hosted table, from the environment.
    pub fn database_url(&self) -> Result<String, ConfigError> {
        std::env::var(DATABASE_URL_VAR)
            .map_err(|_| ConfigError::Invalid(format!("{} must be set", DATABASE_URL_VAR)))
    }
}
