//! Endpoint templating: `{placeholder}` substitution and query strings
//!
//! Substitution is deliberately permissive. Missing or null replacements
//! leave the placeholder in the URL and only produce a warning, so negative
//! scenarios can send malformed paths on purpose.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use probe_core::{ProbeError, Result};
use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Characters escaped by `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^}]+\}").expect("placeholder pattern is valid"));

/// A substituted endpoint plus the warnings produced while building it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltEndpoint {
    pub url: String,
    pub warnings: Vec<String>,
}

impl BuiltEndpoint {
    pub fn into_string(self) -> String {
        self.url
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn has_unreplaced_placeholders(&self) -> bool {
        PLACEHOLDER.is_match(&self.url)
    }
}

impl fmt::Display for BuiltEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

pub fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, COMPONENT).to_string()
}

/// Text form of a replacement or query value. `None` for null.
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Substitutes every `{name}` in `template` with the percent-encoded
/// replacement. Empty strings are substituted as-is.
pub fn build_endpoint(template: &str, replacements: &Map<String, Value>) -> Result<BuiltEndpoint> {
    if template.trim().is_empty() {
        return Err(ProbeError::invalid(
            "Endpoint template must be a valid non-empty string",
        ));
    }

    let mut url = template.to_string();
    let mut warnings = Vec::new();
    debug!("Building endpoint from template: {}", template);

    for (name, value) in replacements {
        let Some(text) = value_text(value) else {
            let warning = format!("Replacement value for '{}' is null, skipping", name);
            warn!("{}", warning);
            warnings.push(warning);
            continue;
        };

        if text.is_empty() {
            debug!("Empty string for placeholder '{}' kept for negative testing", name);
        }
        let encoded = encode_component(&text);
        url = url.replace(&format!("{{{}}}", name), &encoded);
    }

    let unreplaced: Vec<&str> = PLACEHOLDER.find_iter(&url).map(|m| m.as_str()).collect();
    if !unreplaced.is_empty() {
        let warning = format!(
            "Unreplaced placeholders found in endpoint '{}': {}",
            url,
            unreplaced.join(", ")
        );
        warn!("{}", warning);
        warnings.push(warning);
    }

    debug!("Final built endpoint: {}", url);
    Ok(BuiltEndpoint { url, warnings })
}

/// Appends `key=value` for every param that is neither null nor empty.
pub fn add_query_params(endpoint: &str, params: &Map<String, Value>) -> String {
    let pairs: Vec<String> = params
        .iter()
        .filter_map(|(key, value)| {
            value_text(value)
                .filter(|text| !text.is_empty())
                .map(|text| format!("{}={}", encode_component(key), encode_component(&text)))
        })
        .collect();

    if pairs.is_empty() {
        return endpoint.to_string();
    }

    let separator = if endpoint.contains('?') { '&' } else { '?' };
    format!("{}{}{}", endpoint, separator, pairs.join("&"))
}
