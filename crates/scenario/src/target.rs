//! Which system a run is pointed at
//!
//! `PROBE_TARGET=live` drives the deployed API at `BASE_URL` and verifies
//! against Postgres built from the `DB_*` variables. Anything else, or no
//! value at all, keeps the in-process mock backend.

use probe_core::{ProbeError, Result, Settings};
use record_verifier::{PgRecordSource, RecordSource};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

pub const TARGET_VAR: &str = "PROBE_TARGET";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    #[default]
    Mock,
    Live,
}

impl Target {
    pub fn from_env() -> Result<Self> {
        let vars: BTreeMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    pub fn from_vars(vars: &BTreeMap<String, String>) -> Result<Self> {
        match vars.get(TARGET_VAR).map(|raw| raw.trim()) {
            None | Some("") => Ok(Target::Mock),
            Some(raw) => raw.parse(),
        }
    }
}

impl FromStr for Target {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mock" => Ok(Target::Mock),
            "live" => Ok(Target::Live),
            other => Err(ProbeError::Config {
                reason: format!("{} must be 'mock' or 'live', got '{}'", TARGET_VAR, other),
            }),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Mock => write!(f, "mock"),
            Target::Live => write!(f, "live"),
        }
    }
}

/// Postgres record source for a live run. Pools open lazily, so nothing
/// connects until the first verification step.
pub fn live_record_source(settings: &Settings) -> Result<Arc<dyn RecordSource>> {
    if settings.base_url.is_none() {
        return Err(ProbeError::Config {
            reason: format!("{}=live needs BASE_URL", TARGET_VAR),
        });
    }
    let db = settings.db.clone().ok_or_else(|| ProbeError::Config {
        reason: format!(
            "{}=live needs DB_USER, DB_PASSWORD, DB_HOST and DB_PORT",
            TARGET_VAR
        ),
    })?;

    info!("Verifying against Postgres at {}:{}", db.host, db.port);
    Ok(Arc::new(PgRecordSource::new(db)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_target_defaults_to_mock() {
        assert_eq!(Target::from_vars(&vars(&[])).unwrap(), Target::Mock);
        assert_eq!(Target::from_vars(&vars(&[(TARGET_VAR, " ")])).unwrap(), Target::Mock);
        assert_eq!(Target::from_vars(&vars(&[(TARGET_VAR, "LIVE")])).unwrap(), Target::Live);
        assert!(Target::from_vars(&vars(&[(TARGET_VAR, "staging")])).is_err());
    }

    #[test]
    fn test_live_source_needs_base_url_and_database() {
        let no_db = Settings::from_vars(&vars(&[("BASE_URL", "http://api.local")])).unwrap();
        let err = live_record_source(&no_db).err().expect("database settings are required");
        assert!(err.to_string().contains("DB_HOST"));

        let db_only = vars(&[
            ("DB_USER", "qa"),
            ("DB_PASSWORD", "secret"),
            ("DB_HOST", "localhost"),
            ("DB_PORT", "5432"),
        ]);
        let no_url = Settings::from_vars(&db_only).unwrap();
        let err = live_record_source(&no_url).err().expect("BASE_URL is required");
        assert!(err.to_string().contains("BASE_URL"));

        let mut full = db_only;
        full.insert("BASE_URL".into(), "http://api.local".into());
        assert!(live_record_source(&Settings::from_vars(&full).unwrap()).is_ok());
    }
}
