use crate::constants::*;
use crate::error::{IngestError, Result};
use crate::storage::validate_table_name;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub store: StoreConfig,
    pub schedule: ScheduleConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    Http,
    File,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub mode: SourceMode,
    pub base_url: String,
    pub data_dir: PathBuf,
    pub file_suffix: String,
    pub header_offset: usize,
    /// Closures on top of the national holidays.
    pub holidays: Vec<NaiveDate>,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            mode: SourceMode::Http,
            base_url: DEFAULT_BASE_URL.to_string(),
            data_dir: PathBuf::from("data"),
            file_suffix: DEFAULT_FILE_SUFFIX.to_string(),
            header_offset: DEFAULT_HEADER_OFFSET,
            holidays: Vec::new(),
            max_retries: 3,
            retry_delay_ms: 2_000,
            timeout_secs: 60,
        }
    }
}

impl SourceConfig {
    pub fn holiday_set(&self) -> HashSet<NaiveDate> {
        self.holidays.iter().copied().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Libsql,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub path: PathBuf,
    pub table: String,
    pub batch_size: usize,
    pub lease_ttl_secs: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            path: PathBuf::from(DEFAULT_STORE_PATH),
            table: DEFAULT_TABLE.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            lease_ttl_secs: DEFAULT_LEASE_TTL_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub interval_secs: u64,
    pub utc_offset_hours: i32,
    pub label: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            utc_offset_hours: DEFAULT_UTC_OFFSET_HOURS,
            label: "medsupply".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct MetricsConfig {
    pub port: Option<u16>,
}

impl Config {
    /// A missing file means defaults; a malformed one is an error.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config: Config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                IngestError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
            })?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment-style overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("BASE_URL") {
            self.source.base_url = v;
        }
        if let Some(v) = get("MEDSUPPLY_SOURCE_MODE") {
            self.source.mode = match v.trim().to_ascii_lowercase().as_str() {
                "http" => SourceMode::Http,
                "file" => SourceMode::File,
                other => {
                    return Err(IngestError::Config(format!(
                        "MEDSUPPLY_SOURCE_MODE must be 'http' or 'file', got '{other}'"
                    )))
                }
            };
        }
        if let Some(v) = get("MEDSUPPLY_DATA_DIR") {
            self.source.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get("MEDSUPPLY_STORE_PATH") {
            self.store.path = PathBuf::from(v);
        }
        if let Some(v) = get("MEDSUPPLY_TABLE") {
            self.store.table = v;
        }
        if let Some(v) = get("SCHEDULE_INTERVAL_SECS") {
            self.schedule.interval_secs = parse_var("SCHEDULE_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = get("UTC_OFFSET_HOURS") {
            self.schedule.utc_offset_hours = parse_var("UTC_OFFSET_HOURS", &v)?;
        }
        if let Some(v) = get("MEDSUPPLY_METRICS_PORT") {
            self.metrics.port = Some(parse_var("MEDSUPPLY_METRICS_PORT", &v)?);
        }
        if get("LIBSQL_URL").is_some() {
            self.store.backend = StoreBackend::Libsql;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        validate_table_name(&self.store.table).map_err(|e| IngestError::Config(e.to_string()))?;
        if self.store.batch_size == 0 {
            return Err(IngestError::Config("store.batch_size must be positive".into()));
        }
        if self.store.lease_ttl_secs <= 0 {
            return Err(IngestError::Config("store.lease_ttl_secs must be positive".into()));
        }
        if !(-14..=14).contains(&self.schedule.utc_offset_hours) {
            return Err(IngestError::Config(format!(
                "schedule.utc_offset_hours must be within ±14, got {}",
                self.schedule.utc_offset_hours
            )));
        }
        if self.schedule.interval_secs == 0 {
            return Err(IngestError::Config("schedule.interval_secs must be positive".into()));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| IngestError::Config(format!("{key} has an invalid value: '{value}'")))
}
