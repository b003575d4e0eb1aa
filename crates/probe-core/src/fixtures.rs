//! Fixture store: request-body templates, global test data and users
//!
//! Files are parsed on first use and kept for the lifetime of the store.
//! Templates are handed out as deep clones so callers can mutate freely.

use crate::error::{ProbeError, Result};
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const REQUEST_BODIES_FILE: &str = "apiRequestBodies.json";
pub const TEST_DATA_FILE: &str = "testData.json";
pub const USERS_FILE: &str = "users.json";

/// Read-through cache over the `test-data/` directory.
#[derive(Debug)]
pub struct FixtureStore {
    dir: PathBuf,
    documents: DashMap<String, Arc<Value>>,
}

impl FixtureStore {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        info!("Opening fixture store at {}", dir.display());
        Self {
            dir,
            documents: DashMap::new(),
        }
    }

    /// Store backed by in-memory documents instead of files.
    pub fn from_documents(request_bodies: Value, test_data: Value, users: Value) -> Self {
        let documents = DashMap::new();
        documents.insert(REQUEST_BODIES_FILE.to_string(), Arc::new(request_bodies));
        documents.insert(TEST_DATA_FILE.to_string(), Arc::new(test_data));
        documents.insert(USERS_FILE.to_string(), Arc::new(users));
        Self {
            dir: PathBuf::new(),
            documents,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn document(&self, file: &str) -> Result<Arc<Value>> {
        if let Some(doc) = self.documents.get(file) {
            return Ok(doc.value().clone());
        }

        let path = self.dir.join(file);
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            ProbeError::fixture(format!("cannot read {}: {}", path.display(), e))
        })?;
        let parsed: Value = serde_json::from_str(&raw)?;
        debug!("Loaded fixture document {}", path.display());

        let doc = self
            .documents
            .entry(file.to_string())
            .or_insert_with(|| Arc::new(parsed))
            .value()
            .clone();
        Ok(doc)
    }

    /// Deep clone of the named request-body template.
    pub fn template(&self, key: &str) -> Result<Value> {
        let bodies = self.document(REQUEST_BODIES_FILE)?;
        bodies
            .get(key)
            .cloned()
            .ok_or_else(|| ProbeError::fixture(format!("request body '{}' not found", key)))
    }

    pub fn template_names(&self) -> Result<Vec<String>> {
        let bodies = self.document(REQUEST_BODIES_FILE)?;
        Ok(bodies
            .as_object()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default())
    }

    pub fn test_data(&self) -> Result<TestData> {
        let doc = self.document(TEST_DATA_FILE)?;
        match doc.as_ref() {
            Value::Object(map) => Ok(TestData::new(map.clone())),
            _ => Err(ProbeError::fixture(format!(
                "{} must contain a JSON object",
                TEST_DATA_FILE
            ))),
        }
    }

    pub fn users(&self) -> Result<UserDirectory> {
        let doc = self.document(USERS_FILE)?;
        Ok(UserDirectory::new(doc.as_ref().clone()))
    }
}

/// Global key/value test data (`testData.json`).
#[derive(Debug, Clone, Default)]
pub struct TestData {
    values: Map<String, Value>,
}

impl TestData {
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// String form of a scalar entry.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.values.get(key).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Entry of a nested map such as `user_id_to_username_mapping`.
    pub fn lookup(&self, mapping: &str, key: &str) -> Option<&Value> {
        self.values.get(mapping).and_then(|m| m.get(key))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }
}

/// User profiles (`users.json`): `{ data: { alias: {...} }, organisation_codes: {...} }`.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    doc: Value,
}

impl UserDirectory {
    pub fn new(doc: Value) -> Self {
        Self { doc }
    }

    fn entries(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.doc
            .get("data")
            .and_then(Value::as_object)
            .into_iter()
            .flat_map(|map| map.iter())
    }

    /// Profile by alias (`admin_1`) or by username.
    pub fn user_details(&self, alias_or_username: &str) -> Option<&Value> {
        if let Some(user) = self.doc.get("data").and_then(|d| d.get(alias_or_username)) {
            return Some(user);
        }
        self.entries()
            .map(|(_, user)| user)
            .find(|user| user.get("username").and_then(Value::as_str) == Some(alias_or_username))
    }

    /// Username for an alias; unknown names are returned unchanged.
    pub fn fetch_username(&self, alias_or_username: &str) -> String {
        self.user_details(alias_or_username)
            .and_then(|user| user.get("username"))
            .and_then(Value::as_str)
            .unwrap_or(alias_or_username)
            .to_string()
    }

    pub fn organisation_code(&self, name: &str) -> String {
        self.doc
            .get("organisation_codes")
            .and_then(|codes| codes.get(name))
            .map(|code| match code {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| "default".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> FixtureStore {
        FixtureStore::from_documents(
            json!({
                "saveDevice": {
                    "mobile_number": "9999999999",
                    "device_configuration": { "os": "android", "version": 1 }
                }
            }),
            json!({
                "organisation_code": "ORG1",
                "user_id_to_username_mapping": { "42": "admin.one" }
            }),
            json!({
                "data": { "admin_1": { "username": "admin.one", "user_id": 42 } },
                "organisation_codes": { "north": "N-01" }
            }),
        )
    }

    #[test]
    fn test_template_is_a_deep_clone() {
        let store = store();
        let mut first = store.template("saveDevice").unwrap();
        first["device_configuration"]["os"] = json!("ios");

        let second = store.template("saveDevice").unwrap();
        assert_eq!(second["device_configuration"]["os"], json!("android"));
    }

    #[test]
    fn test_missing_template_is_a_fixture_error() {
        let err = store().template("nope").unwrap_err();
        assert!(matches!(err, ProbeError::Fixture { .. }));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_test_data_lookups() {
        let data = store().test_data().unwrap();
        assert_eq!(data.get_str("organisation_code").as_deref(), Some("ORG1"));
        assert_eq!(
            data.lookup("user_id_to_username_mapping", "42"),
            Some(&json!("admin.one"))
        );
        assert!(!data.contains("missing"));
    }

    #[test]
    fn test_user_directory_resolution() {
        let users = store().users().unwrap();
        assert_eq!(users.fetch_username("admin_1"), "admin.one");
        assert_eq!(users.fetch_username("admin.one"), "admin.one");
        assert_eq!(users.fetch_username("ghost"), "ghost");
        assert_eq!(users.user_details("admin.one").unwrap()["user_id"], json!(42));
        assert_eq!(users.organisation_code("north"), "N-01");
        assert_eq!(users.organisation_code("south"), "default");
    }

    #[test]
    fn test_files_are_read_once_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(REQUEST_BODIES_FILE),
            r#"{"categories": {"category_name": "General"}}"#,
        )
        .unwrap();

        let store = FixtureStore::open(dir.path());
        assert_eq!(
            store.template("categories").unwrap()["category_name"],
            json!("General")
        );

        // Cached: later edits on disk are not observed.
        std::fs::write(dir.path().join(REQUEST_BODIES_FILE), "{}").unwrap();
        assert!(store.template("categories").is_ok());
        assert_eq!(store.template_names().unwrap(), vec!["categories".to_string()]);
    }
}
