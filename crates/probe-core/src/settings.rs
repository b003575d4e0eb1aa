//! Runtime settings read from the environment

use crate::error::{ProbeError, Result};
use crate::resource::ResourceKind;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_TEST_DATA_DIR: &str = "test-data";

/// Postgres connection parameters shared by every logical database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbSettings {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    /// Optional allow-list from `AVAILABLE_DATABASES`.
    pub available: Vec<String>,
}

impl DbSettings {
    pub fn connection_url(&self, database: &str) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, database
        )
    }

    pub fn check_database(&self, database: &str) -> Result<()> {
        if database.is_empty() {
            return Err(ProbeError::invalid("Database name is required"));
        }
        if !self.available.is_empty() && !self.available.iter().any(|db| db == database) {
            return Err(ProbeError::Config {
                reason: format!(
                    "Unknown database: {}. Available databases: {}",
                    database,
                    self.available.join(", ")
                ),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: Option<String>,
    pub access_token: Option<String>,
    pub invalid_access_token: Option<String>,
    pub http_timeout: Duration,
    pub test_data_dir: PathBuf,
    /// Every `*_ENDPOINT` variable, keyed by variable name.
    pub endpoints: BTreeMap<String, String>,
    pub db: Option<DbSettings>,
    pub allure_verbosity: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let vars: BTreeMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    pub fn from_vars(vars: &BTreeMap<String, String>) -> Result<Self> {
        let get = |key: &str| vars.get(key).filter(|v| !v.trim().is_empty()).cloned();

        let http_timeout = match get("HTTP_TIMEOUT_MS") {
            Some(raw) => Duration::from_millis(raw.trim().parse().map_err(|_| ProbeError::Config {
                reason: format!("HTTP_TIMEOUT_MS must be a number of milliseconds, got '{}'", raw),
            })?),
            None => Duration::from_millis(DEFAULT_HTTP_TIMEOUT_MS),
        };

        let endpoints = vars
            .iter()
            .filter(|(key, _)| key.ends_with("_ENDPOINT"))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Self {
            base_url: get("BASE_URL"),
            access_token: get("ACCESS_TOKEN"),
            invalid_access_token: get("INVALID_ACCESS_TOKEN"),
            http_timeout,
            test_data_dir: get("TEST_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TEST_DATA_DIR)),
            endpoints,
            db: Self::db_from_vars(vars)?,
            allure_verbosity: get("ALLURE_VERBOSITY"),
        })
    }

    fn db_from_vars(vars: &BTreeMap<String, String>) -> Result<Option<DbSettings>> {
        let required = ["DB_USER", "DB_PASSWORD", "DB_HOST", "DB_PORT"];
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|key| vars.get(*key).map_or(true, |v| v.is_empty()))
            .collect();

        if missing.len() == required.len() {
            return Ok(None);
        }
        if !missing.is_empty() {
            return Err(ProbeError::Config {
                reason: format!("Missing required environment variables: {}", missing.join(", ")),
            });
        }

        let port_raw = &vars["DB_PORT"];
        let port = port_raw.trim().parse().map_err(|_| ProbeError::Config {
            reason: format!("DB_PORT must be a port number, got '{}'", port_raw),
        })?;

        let available = vars
            .get("AVAILABLE_DATABASES")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|db| !db.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(DbSettings {
            user: vars["DB_USER"].clone(),
            password: vars["DB_PASSWORD"].clone(),
            host: vars["DB_HOST"].clone(),
            port,
            available,
        }))
    }

    pub fn endpoint(&self, var: &str) -> Result<&str> {
        self.endpoints
            .get(var)
            .map(String::as_str)
            .ok_or_else(|| ProbeError::Config {
                reason: format!("{} environment variable is not defined", var),
            })
    }

    pub fn endpoint_for(&self, kind: ResourceKind) -> Result<&str> {
        self.endpoint(kind.config().endpoint_var)
    }

    /// Default `tracing` filter derived from `ALLURE_VERBOSITY`.
    pub fn default_log_filter(&self) -> &'static str {
        match self.allure_verbosity.as_deref() {
            Some("debug") | Some("verbose") => "debug",
            Some("quiet") | Some("minimal") => "warn",
            _ => "info",
        }
    }
}
