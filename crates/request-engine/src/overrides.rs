//! Override application onto request-body templates
//!
//! An override set is an ordered list of `field.path → value` entries taken
//! from a step table. Applying it to a cloned template produces the body that
//! goes over the wire.

use crate::resolver::{placeholder_name, Resolver};
use probe_core::{FixtureStore, ProbeError, Result, TestData, REMOVE_SENTINEL};
use serde_json::{Map, Value};
use tracing::{debug, info};

/// Ordered `field path → value` overrides. Later inserts of the same key
/// replace the earlier value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideSet {
    entries: Vec<(String, Value)>,
}

impl OverrideSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    /// Builds the set from two-column table rows. Cells are JSON-parsed when
    /// they can be (`3`, `true`, `[1,2]`), otherwise kept as strings.
    pub fn from_rows<R, C>(rows: R) -> Result<Self>
    where
        R: IntoIterator<Item = C>,
        C: AsRef<[String]>,
    {
        let mut set = Self::new();
        let mut row_count = 0;

        for row in rows {
            row_count += 1;
            let cells = row.as_ref();
            let (Some(key), Some(raw)) = (cells.first(), cells.get(1)) else {
                continue;
            };
            if key.trim().is_empty() {
                continue;
            }
            set.insert(key.trim(), parse_cell(raw));
        }

        if row_count == 0 {
            return Err(ProbeError::invalid("Table data must be a non-empty array"));
        }
        Ok(set)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// String values naming a global test-data key are replaced by that entry.
    pub fn resolve_test_data(&mut self, data: &TestData) {
        for (key, value) in self.entries.iter_mut() {
            if let Value::String(name) = value {
                if let Some(resolved) = data.get(name) {
                    debug!("Override {} resolved from test data key {}", key, name);
                    *value = resolved.clone();
                }
            }
        }
    }

    /// `{name}` string values are replaced through the resolver.
    pub fn resolve_placeholders(&mut self, resolver: &Resolver<'_>) -> Result<()> {
        for (key, value) in self.entries.iter_mut() {
            if let Value::String(raw) = value {
                if placeholder_name(raw).is_some() {
                    *value = resolver.resolve_value(key, raw)?;
                }
            }
        }
        Ok(())
    }

    /// Overrides as a flat JSON object (dot-path keys kept verbatim).
    pub fn to_map(&self) -> Map<String, Value> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

fn parse_cell(raw: &str) -> Value {
    if raw == REMOVE_SENTINEL {
        return Value::String(raw.to_string());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub fn is_remove_sentinel(value: &Value) -> bool {
    value.as_str() == Some(REMOVE_SENTINEL)
}

/// Applies `overrides` to `base` and returns it. `base` is the caller's own
/// copy; the template it came from is untouched.
///
/// Setting through a non-object intermediate replaces it with an empty
/// object. Removing through a missing or non-object intermediate does nothing.
pub fn apply_overrides(mut base: Value, overrides: &OverrideSet) -> Value {
    for (key, value) in overrides.iter() {
        if is_remove_sentinel(value) {
            remove_path(&mut base, key);
        } else {
            set_path(&mut base, key, value.clone());
        }
    }
    base
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was replaced by an object above"),
    }
}

fn set_path(target: &mut Value, path: &str, value: Value) {
    let mut parts: Vec<&str> = path.split('.').collect();
    let leaf = parts.pop().unwrap_or(path);

    let mut cursor = target;
    for part in parts {
        cursor = ensure_object(cursor)
            .entry(part.to_string())
            .or_insert(Value::Null);
    }
    ensure_object(cursor).insert(leaf.to_string(), value);
}

fn remove_path(target: &mut Value, path: &str) {
    let mut parts: Vec<&str> = path.split('.').collect();
    let leaf = parts.pop().unwrap_or(path);

    let mut cursor = target;
    for part in parts {
        match cursor.get_mut(part) {
            Some(next) if next.is_object() => cursor = next,
            _ => {
                debug!("Nothing to remove at {}: '{}' is not an object", path, part);
                return;
            }
        }
    }
    if let Some(map) = cursor.as_object_mut() {
        map.remove(leaf);
    }
}

/// Loads `key` from the store (or starts from `{}` when `key` is `None`) and
/// applies the table overrides, if any.
pub fn final_request_body(
    store: &FixtureStore,
    key: Option<&str>,
    overrides: Option<&OverrideSet>,
) -> Result<Value> {
    let base = match key {
        Some(key) => store.template(key)?,
        None => Value::Object(Map::new()),
    };

    let body = match overrides {
        Some(overrides) => apply_overrides(base, overrides),
        None => base,
    };
    info!("Final request body: {}", body);
    Ok(body)
}
