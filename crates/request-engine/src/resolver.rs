//! `{placeholder}` resolution over an ordered list of named sources

use probe_core::{ProbeError, Result, TestData};
use serde_json::{Map, Value};
use tracing::{debug, info};

/// A provider of previously stored values.
pub trait Source {
    fn name(&self) -> &str;
    fn try_get(&self, key: &str) -> Option<Value>;
}

/// Source over a borrowed JSON object.
pub struct MapSource<'a> {
    name: &'a str,
    map: &'a Map<String, Value>,
}

impl<'a> MapSource<'a> {
    pub fn new(name: &'a str, map: &'a Map<String, Value>) -> Self {
        Self { name, map }
    }
}

impl Source for MapSource<'_> {
    fn name(&self) -> &str {
        self.name
    }

    fn try_get(&self, key: &str) -> Option<Value> {
        self.map.get(key).cloned()
    }
}

/// Source over a JSON value that is only consulted when it is an object.
pub struct ValueSource<'a> {
    name: &'a str,
    value: Option<&'a Value>,
}

impl<'a> ValueSource<'a> {
    pub fn new(name: &'a str, value: Option<&'a Value>) -> Self {
        Self { name, value }
    }
}

impl Source for ValueSource<'_> {
    fn name(&self) -> &str {
        self.name
    }

    fn try_get(&self, key: &str) -> Option<Value> {
        self.value.and_then(|v| v.get(key)).cloned()
    }
}

impl Source for TestData {
    fn name(&self) -> &str {
        "test data"
    }

    fn try_get(&self, key: &str) -> Option<Value> {
        self.get(key).cloned()
    }
}

/// Returns `name` for a `{name}` value.
pub fn placeholder_name(raw: &str) -> Option<&str> {
    raw.strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .filter(|name| !name.is_empty())
}

/// Ordered composition of sources; the first source holding a key wins.
#[derive(Default)]
pub struct Resolver<'a> {
    sources: Vec<&'a dyn Source>,
}

impl<'a> Resolver<'a> {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: &'a dyn Source) -> Self {
        self.sources.push(source);
        self
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// First source holding `name`, with the value it holds.
    pub fn lookup(&self, name: &str) -> Option<(&str, Value)> {
        self.sources
            .iter()
            .find_map(|source| source.try_get(name).map(|value| (source.name(), value)))
    }

    /// Resolves the raw table value for `key`. Values that are not
    /// placeholders come back as strings.
    pub fn resolve_value(&self, key: &str, raw: &str) -> Result<Value> {
        let Some(saved_key) = placeholder_name(raw) else {
            debug!("Using hardcoded value for {}: {}", key, raw);
            return Ok(Value::String(raw.to_string()));
        };

        match self.lookup(saved_key) {
            Some((source, value)) => {
                info!(
                    "Resolved {} from saved value {} in {}: {}",
                    key, saved_key, source, value
                );
                Ok(value)
            }
            None => Err(ProbeError::Unresolved {
                key: saved_key.to_string(),
            }),
        }
    }
}
