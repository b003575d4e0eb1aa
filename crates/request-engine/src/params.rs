//! Splitting step tables into path and query parameters

use crate::resolver::Resolver;
use probe_core::{ProbeError, Result};
use regex::Regex;
use serde_json::{Map, Value};
use std::str::FromStr;
use std::sync::LazyLock;

static PATH_PARAM_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(id|resource_id|carousel_id|category_id|subcategory_id|quote_id|issue_id|faq_id|user_id|device_id)$",
    )
    .expect("path parameter pattern is valid")
});

/// How a parameter table should be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamMode {
    /// Every row is a path parameter.
    Path,
    /// Every row is a query parameter.
    Query,
    /// Id-like keys go to the path, everything else to the query.
    Mixed,
}

impl FromStr for ParamMode {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "path parameters" | "path" => Ok(ParamMode::Path),
            "query parameters" | "query" => Ok(ParamMode::Query),
            "parameters" | "params" => Ok(ParamMode::Mixed),
            other => Err(ProbeError::invalid(format!(
                "Unknown parameter type: {}",
                other
            ))),
        }
    }
}

pub fn is_path_param_key(key: &str) -> bool {
    PATH_PARAM_KEY.is_match(key)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitParams {
    pub path: Map<String, Value>,
    pub query: Map<String, Value>,
}

/// Resolves each `key | value` row and routes it by `mode`.
pub fn split_params<R, C>(rows: R, resolver: &Resolver<'_>, mode: ParamMode) -> Result<SplitParams>
where
    R: IntoIterator<Item = C>,
    C: AsRef<[String]>,
{
    let mut split = SplitParams::default();

    for row in rows {
        let cells = row.as_ref();
        let (Some(key), Some(raw)) = (cells.first(), cells.get(1)) else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }

        let value = resolver.resolve_value(key, raw.trim())?;
        let to_path = match mode {
            ParamMode::Path => true,
            ParamMode::Query => false,
            ParamMode::Mixed => is_path_param_key(key),
        };

        if to_path {
            split.path.insert(key.to_string(), value);
        } else {
            split.query.insert(key.to_string(), value);
        }
    }

    Ok(split)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::MapSource;
    use serde_json::json;

    fn rows(pairs: &[(&str, &str)]) -> Vec<Vec<String>> {
        pairs
            .iter()
            .map(|(k, v)| vec![k.to_string(), v.to_string()])
            .collect()
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("path parameters".parse::<ParamMode>().unwrap(), ParamMode::Path);
        assert_eq!("Query Parameters".parse::<ParamMode>().unwrap(), ParamMode::Query);
        assert_eq!("parameters".parse::<ParamMode>().unwrap(), ParamMode::Mixed);
        assert!("headers".parse::<ParamMode>().is_err());
    }

    #[test]
    fn test_mixed_mode_routes_id_keys_to_path() {
        let saved = match json!({ "faq_id": 31 }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let source = MapSource::new("created resources", &saved);
        let resolver = Resolver::new().with_source(&source);

        let split = split_params(
            rows(&[("faq_id", "{faq_id}"), ("is_active", "true"), ("page", "2")]),
            &resolver,
            ParamMode::Mixed,
        )
        .unwrap();

        assert_eq!(split.path.get("faq_id"), Some(&json!(31)));
        assert_eq!(split.query.get("is_active"), Some(&json!("true")));
        assert_eq!(split.query.get("page"), Some(&json!("2")));
        assert!(!split.query.contains_key("faq_id"));
    }

    #[test]
    fn test_path_mode_keeps_everything_in_path() {
        let split = split_params(
            rows(&[("organisation_code", "ORG1"), ("limit", "5")]),
            &Resolver::new(),
            ParamMode::Path,
        )
        .unwrap();
        assert_eq!(split.path.len(), 2);
        assert!(split.query.is_empty());
    }

    #[test]
    fn test_id_key_pattern_is_anchored() {
        assert!(is_path_param_key("category_id"));
        assert!(!is_path_param_key("sub_category_id_list"));
        assert!(!is_path_param_key("paid"));
    }
}
