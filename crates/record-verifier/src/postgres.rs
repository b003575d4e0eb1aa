//! Postgres-backed [`RecordSource`]
//!
//! Rows are read as `to_jsonb(t)` so every column comes back with its JSON
//! type, and filters are applied with jsonb containment (`@>`). One pool is
//! created per logical database on first use.

use crate::source::{Record, RecordSource};
use async_trait::async_trait;
use dashmap::DashMap;
use probe_core::{DbSettings, ProbeError, Result};
use regex::Regex;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, instrument};

static TABLE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").expect("table name pattern is valid"));

const MAX_CONNECTIONS: u32 = 5;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct PgRecordSource {
    settings: DbSettings,
    pools: DashMap<String, PgPool>,
}

impl PgRecordSource {
    pub fn new(settings: DbSettings) -> Self {
        Self {
            settings,
            pools: DashMap::new(),
        }
    }

    async fn pool(&self, database: &str) -> Result<PgPool> {
        if let Some(pool) = self.pools.get(database) {
            return Ok(pool.value().clone());
        }
        self.settings.check_database(database)?;

        info!("Connecting to database {}", database);
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(&self.settings.connection_url(database))
            .await
            .map_err(|e| ProbeError::Database {
                reason: format!("cannot connect to {}: {}", database, e),
            })?;

        Ok(self
            .pools
            .entry(database.to_string())
            .or_insert(pool)
            .value()
            .clone())
    }

    /// Closes every pool opened so far.
    pub async fn close(&self) {
        let pools: Vec<PgPool> = self.pools.iter().map(|p| p.value().clone()).collect();
        self.pools.clear();
        for pool in pools {
            pool.close().await;
        }
    }
}

fn checked_table(table: &str) -> Result<&str> {
    if TABLE_NAME.is_match(table) {
        Ok(table)
    } else {
        Err(ProbeError::invalid(format!("Invalid table name: {}", table)))
    }
}

fn db_error(database: &str, table: &str, e: sqlx::Error) -> ProbeError {
    ProbeError::Database {
        reason: format!("query on {}.{} failed: {}", database, table, e),
    }
}

#[async_trait]
impl RecordSource for PgRecordSource {
    #[instrument(skip(self, filter))]
    async fn fetch_rows(&self, database: &str, table: &str, filter: &Record) -> Result<Vec<Record>> {
        let sql = format!(
            "SELECT to_jsonb(t) AS record FROM {} t WHERE to_jsonb(t) @> $1",
            checked_table(table)?
        );
        let pool = self.pool(database).await?;

        let rows: Vec<Json<Value>> = sqlx::query_scalar(&sql)
            .bind(Json(Value::Object(filter.clone())))
            .fetch_all(&pool)
            .await
            .map_err(|e| db_error(database, table, e))?;

        debug!("{}.{} returned {} rows", database, table, rows.len());
        Ok(rows
            .into_iter()
            .filter_map(|Json(value)| match value {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect())
    }

    #[instrument(skip(self, filter))]
    async fn delete_rows(&self, database: &str, table: &str, filter: &Record) -> Result<u64> {
        if filter.is_empty() {
            return Err(ProbeError::invalid(format!(
                "Refusing to delete every row of {} without a filter",
                table
            )));
        }
        let sql = format!(
            "DELETE FROM {} t WHERE to_jsonb(t) @> $1",
            checked_table(table)?
        );
        let pool = self.pool(database).await?;

        let result = sqlx::query(&sql)
            .bind(Json(Value::Object(filter.clone())))
            .execute(&pool)
            .await
            .map_err(|e| db_error(database, table, e))?;

        info!("Deleted {} rows from {}.{}", result.rows_affected(), database, table);
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names_are_validated() {
        assert!(checked_table("faq_categories").is_ok());
        assert!(checked_table("public.quotes").is_ok());
        assert!(checked_table("quotes; DROP TABLE x").is_err());
        assert!(checked_table("").is_err());
    }

    #[tokio::test]
    async fn test_unlisted_database_is_rejected_before_connecting() {
        let source = PgRecordSource::new(DbSettings {
            user: "qa".into(),
            password: "secret".into(),
            host: "127.0.0.1".into(),
            port: 1,
            available: vec!["support_engagement".into()],
        });
        let err = source
            .fetch_rows("iamdb", "users", &Record::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Config { .. }));
    }
}
