//! Runtime configuration
//!
//! Values come from a TOML file, then `REPORT_INGEST_*` environment
//! variables (a `.env` file is honoured), then validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::ingest::batch::DEFAULT_BATCH_SIZE;
use crate::ingest::session::DEFAULT_IDLE_TIMEOUT;

const ENV_DATABASE_URL: &str = "REPORT_INGEST_DATABASE_URL";
const ENV_BATCH_SIZE: &str = "REPORT_INGEST_BATCH_SIZE";
const ENV_IDLE_TIMEOUT: &str = "REPORT_INGEST_SESSION_IDLE_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub database_url: String,
    pub batch_size: usize,
    pub session_idle_timeout_secs: u64,
    /// Period of the background session reaper
    pub reaper_interval_secs: u64,
    pub max_connections: u32,
    /// Create report tables on startup
    pub create_tables: bool,
    /// Log level when `RUST_LOG` is unset
    pub log_level: String,
    /// Extra `[[schema]]` TOML files loaded over the built-in catalogue
    pub schema_files: Vec<PathBuf>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://report_ingest.db".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            session_idle_timeout_secs: DEFAULT_IDLE_TIMEOUT.as_secs(),
            reaper_interval_secs: 60,
            max_connections: 5,
            create_tables: true,
            log_level: "info".to_string(),
            schema_files: Vec::new(),
        }
    }
}

impl IngestConfig {
    /// Default config file location (`~/.config/report-ingest/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("report-ingest").join("config.toml"))
    }

    /// Load the effective configuration
    ///
    /// An explicit path must exist; the default path is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(e).context("Failed to load .env file");
            }
        }

        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    log::debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file without overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::parse_toml(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse_toml(source: &str) -> Result<Self> {
        toml::from_str(source).context("Failed to parse TOML config")
    }

    /// Apply `REPORT_INGEST_*` variables from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_DATABASE_URL) {
            self.database_url = v;
        }
        if let Some(v) = lookup(ENV_BATCH_SIZE) {
            self.batch_size = v
                .trim()
                .parse()
                .with_context(|| format!("{} must be a positive integer, got '{}'", ENV_BATCH_SIZE, v))?;
        }
        if let Some(v) = lookup(ENV_IDLE_TIMEOUT) {
            self.session_idle_timeout_secs = v
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number of seconds, got '{}'", ENV_IDLE_TIMEOUT, v))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if self.max_connections == 0 {
            bail!("max_connections must be at least 1");
        }
        if self.database_url.trim().is_empty() {
            bail!("database_url must not be empty");
        }
        self.level_filter()?;
        Ok(())
    }

    pub fn level_filter(&self) -> Result<LevelFilter> {
        self.log_level
            .trim()
            .parse()
            .with_context(|| format!("Invalid log_level: {}", self.log_level))
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = IngestConfig::default();
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.session_idle_timeout(), Duration::from_secs(900));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = IngestConfig::parse_toml(
            r#"
            database_url = "sqlite::memory:"
            schema_files = ["extra.toml"]
            "#,
        )
        .unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.schema_files, vec![PathBuf::from("extra.toml")]);
        assert_eq!(config.batch_size, 1000);
        assert!(config.create_tables);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_DATABASE_URL, "sqlite://other.db"),
            (ENV_BATCH_SIZE, " 250 "),
        ]);
        let mut config = IngestConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.database_url, "sqlite://other.db");
        assert_eq!(config.batch_size, 250);
        assert_eq!(config.session_idle_timeout_secs, 900);
    }

    #[test]
    fn test_invalid_override() {
        let mut config = IngestConfig::default();
        let err = config
            .apply_overrides(|key| (key == ENV_BATCH_SIZE).then(|| "lots".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_BATCH_SIZE));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = IngestConfig::parse_toml("batch_size = 0").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_parsed() {
        let config = IngestConfig::parse_toml("log_level = \"Debug\"").unwrap();
        assert_eq!(config.level_filter().unwrap(), LevelFilter::Debug);

        let config = IngestConfig::parse_toml("log_level = \"chatty\"").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "batch_size = 50\nmax_connections = 2\n").unwrap();

        let config = IngestConfig::from_file(&path).unwrap();
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.max_connections, 2);

        let missing = IngestConfig::from_file(&dir.path().join("nope.toml"));
        assert!(missing.is_err());
    }
}
