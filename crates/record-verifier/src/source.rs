//! Where database rows come from

use crate::compare::values_match;
use async_trait::async_trait;
use parking_lot::RwLock;
use probe_core::Result;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// One database row as a JSON object keyed by column name.
pub type Record = Map<String, Value>;

/// Read and cleanup access to the tables a resource is persisted in.
///
/// A filter is a column → value object; a row matches when every filter
/// column equals the row's column. An empty filter matches every row.
#[async_trait]
pub trait RecordSource: std::fmt::Debug + Send + Sync {
    async fn fetch_rows(&self, database: &str, table: &str, filter: &Record) -> Result<Vec<Record>>;

    /// Deletes matching rows and returns how many went.
    async fn delete_rows(&self, database: &str, table: &str, filter: &Record) -> Result<u64>;
}

pub fn row_matches(row: &Record, filter: &Record) -> bool {
    filter
        .iter()
        .all(|(column, expected)| row.get(column).is_some_and(|actual| values_match(expected, actual)))
}

/// In-memory tables keyed by `(database, table)`.
#[derive(Debug, Default)]
pub struct MemoryRecordSource {
    tables: RwLock<BTreeMap<(String, String), Vec<Record>>>,
}

impl MemoryRecordSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_row(&self, database: &str, table: &str, row: Record) {
        self.tables
            .write()
            .entry((database.to_string(), table.to_string()))
            .or_default()
            .push(row);
    }

    pub fn rows(&self, database: &str, table: &str) -> Vec<Record> {
        self.tables
            .read()
            .get(&(database.to_string(), table.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Applies `update` to every matching row and returns the updated rows.
    pub fn update_rows<F>(&self, database: &str, table: &str, filter: &Record, mut update: F) -> Vec<Record>
    where
        F: FnMut(&mut Record),
    {
        let mut tables = self.tables.write();
        let Some(rows) = tables.get_mut(&(database.to_string(), table.to_string())) else {
            return Vec::new();
        };

        rows.iter_mut()
            .filter(|row| row_matches(row, filter))
            .map(|row| {
                update(row);
                row.clone()
            })
            .collect()
    }

    fn select(&self, database: &str, table: &str, filter: &Record) -> Vec<Record> {
        self.tables
            .read()
            .get(&(database.to_string(), table.to_string()))
            .map(|rows| {
                rows.iter()
                    .filter(|row| row_matches(row, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Synchronous form of [`RecordSource::delete_rows`].
    pub fn delete_matching(&self, database: &str, table: &str, filter: &Record) -> u64 {
        let mut tables = self.tables.write();
        let Some(rows) = tables.get_mut(&(database.to_string(), table.to_string())) else {
            return 0;
        };
        let before = rows.len();
        rows.retain(|row| !row_matches(row, filter));
        (before - rows.len()) as u64
    }
}

#[async_trait]
impl RecordSource for MemoryRecordSource {
    async fn fetch_rows(&self, database: &str, table: &str, filter: &Record) -> Result<Vec<Record>> {
        let rows = self.select(database, table, filter);
        debug!("{}.{} returned {} rows", database, table, rows.len());
        Ok(rows)
    }

    async fn delete_rows(&self, database: &str, table: &str, filter: &Record) -> Result<u64> {
        Ok(self.delete_matching(database, table, filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn seeded() -> MemoryRecordSource {
        let source = MemoryRecordSource::new();
        source.insert_row("support_engagement", "quotes", record(json!({ "quote_id": 1, "is_active": true })));
        source.insert_row("support_engagement", "quotes", record(json!({ "quote_id": 2, "is_active": false })));
        source
    }

    #[tokio::test]
    async fn test_filtering_and_deletion() {
        let source = seeded();
        let active = source
            .fetch_rows("support_engagement", "quotes", &record(json!({ "is_active": true })))
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0]["quote_id"], json!(1));

        let removed = source
            .delete_rows("support_engagement", "quotes", &record(json!({ "quote_id": 2 })))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(source.rows("support_engagement", "quotes").len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_table_is_empty() {
        let rows = seeded()
            .fetch_rows("support_engagement", "nope", &Record::new())
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_update_rows_returns_updated_copies() {
        let source = seeded();
        let updated = source.update_rows(
            "support_engagement",
            "quotes",
            &record(json!({ "quote_id": 1 })),
            |row| {
                row.insert("is_active".into(), json!(false));
            },
        );
        assert_eq!(updated.len(), 1);
        assert_eq!(source.rows("support_engagement", "quotes")[0]["is_active"], json!(false));
    }
}
