//! Created-resource registry
//!
//! Remembers the last record created for every resource type so later
//! steps can address it by id, inject it as a parent, or resolve
//! `{placeholder}` values against it.

use probe_core::{normalize_type_name, ProbeError, ResourceKind, Result};
use request_engine::Source;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Key added to every stored record, mirroring its configured id column.
pub const PRIMARY_ID: &str = "primary_id";

/// The part of a response body that carries the resource: the nested
/// `data` envelope when present, else the body itself.
pub fn payload_of(data: &Value) -> &Value {
    data.get("data").filter(|inner| !inner.is_null()).unwrap_or(data)
}

/// Locates the record for `id_field` in a payload object, looking one level
/// down for keyed shapes such as `{ "faq": { ... } }`.
pub fn primary_record<'a>(payload: &'a Value, id_field: &str) -> Option<&'a Map<String, Value>> {
    let object = match payload {
        Value::Array(items) => items.first()?.as_object()?,
        Value::Object(map) => map,
        _ => return None,
    };
    if object.contains_key(id_field) {
        return Some(object);
    }
    object
        .values()
        .filter_map(Value::as_object)
        .find(|nested| nested.contains_key(id_field))
}

#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    records: BTreeMap<String, Map<String, Value>>,
    dependents: BTreeMap<String, Vec<Map<String, Value>>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.dependents.is_empty()
    }

    /// Records `payload` as the current `kind` resource and returns its id.
    ///
    /// An array payload holds the primary record first; for kinds with a
    /// dependent kind the remaining elements are appended to the dependent
    /// list. Payloads without the configured id field are ignored.
    pub fn store(&mut self, kind: ResourceKind, payload: &Value) -> Option<Value> {
        let id_field = kind.id_field();
        let Some(record) = primary_record(payload, id_field) else {
            warn!("No {} found in {} response, nothing stored", id_field, kind);
            return None;
        };
        let id = record.get(id_field).filter(|id| !id.is_null())?.clone();

        self.insert(kind, record.clone());
        info!("Stored {} with ID: {}", kind, id);

        if let (Some(dependent), Value::Array(items)) = (kind.config().dependent, payload) {
            for item in items.iter().skip(1).filter_map(Value::as_object) {
                self.push_dependent(dependent, item.clone());
            }
        }
        Some(id)
    }

    /// Overwrites the current `kind` record.
    pub fn insert(&mut self, kind: ResourceKind, mut record: Map<String, Value>) {
        let id = record.get(kind.id_field()).cloned().unwrap_or(Value::Null);
        record.insert(PRIMARY_ID.to_string(), id);
        self.records.insert(kind.registry_key(), record);
    }

    fn push_dependent(&mut self, kind: ResourceKind, mut record: Map<String, Value>) {
        let Some(id) = record.get(kind.id_field()).filter(|id| !id.is_null()).cloned() else {
            return;
        };
        info!("Stored {} with ID: {}", kind, id);
        record.insert(PRIMARY_ID.to_string(), id);
        self.dependents
            .entry(kind.registry_key())
            .or_default()
            .push(record);
    }

    /// Current record by type name in any spelling (`FAQ Category`, `FAQ_CATEGORY`).
    pub fn get(&self, type_name: &str) -> Option<&Map<String, Value>> {
        let key = normalize_type_name(type_name);
        self.records
            .get(&key)
            .or_else(|| self.dependents.get(&key).and_then(|list| list.last()))
    }

    pub fn record(&self, kind: ResourceKind) -> Option<&Map<String, Value>> {
        self.get(&kind.registry_key())
    }

    pub fn dependents(&self, kind: ResourceKind) -> &[Map<String, Value>] {
        self.dependents
            .get(&kind.registry_key())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Registered type keys, records first, then dependent lists.
    pub fn registered(&self) -> Vec<&str> {
        self.records
            .keys()
            .chain(self.dependents.keys())
            .map(String::as_str)
            .collect()
    }

    /// Id of the current record of `type_name`.
    pub fn primary_id(&self, type_name: &str) -> Result<Value> {
        self.get(type_name)
            .and_then(|record| record.get(PRIMARY_ID))
            .filter(|id| !id.is_null())
            .cloned()
            .ok_or_else(|| ProbeError::MissingResource {
                resource_type: type_name.to_string(),
                registered: self.registered().join(", "),
            })
    }
}

impl Source for ResourceRegistry {
    fn name(&self) -> &str {
        "created resources"
    }

    /// A type name yields that type's id, an id column yields the id of the
    /// kind it belongs to, and any other key is looked up in the stored
    /// records.
    fn try_get(&self, key: &str) -> Option<Value> {
        if let Ok(id) = self.primary_id(key) {
            return Some(id);
        }
        if let Some(kind) = ResourceKind::from_id_field(key) {
            if let Ok(id) = self.primary_id(&kind.registry_key()) {
                return Some(id);
            }
        }
        self.records.values().find_map(|record| record.get(key).cloned())
    }
}
