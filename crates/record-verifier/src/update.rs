//! Before/after checks for update (PATCH) scenarios
//!
//! Three contracts: requested fields took the new value, untouched fields
//! kept the old one, and the timestamps moved the right way. Each check
//! reports every discrepancy it finds.

use crate::compare::{display_value, instant, is_date_field, values_match};
use probe_core::{ProbeError, Result, REMOVE_SENTINEL};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info};

/// Fields that always change on update and are never held constant.
const VOLATILE_FIELDS: [&str; 2] = ["retrieved_at", "updated_at"];

fn finish(errors: Vec<String>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ProbeError::VerificationFailed { failures: errors })
    }
}

fn is_remove(value: &Value) -> bool {
    value.as_str() == Some(REMOVE_SENTINEL)
}

/// Date part of an expected (`2024-03-05 10:00`) or actual
/// (`2024-03-05T10:00:00Z`) value.
fn date_part(value: &Value) -> String {
    let text = display_value(value);
    let head = text.split(' ').next().unwrap_or_default();
    head.split('T').next().unwrap_or_default().to_string()
}

fn verify_array(field: &str, expected: &[Value], actual: &Value, errors: &mut Vec<String>) {
    let Some(actual) = actual.as_array() else {
        errors.push(format!(
            "{} not updated correctly. Expected: array, Got: {}",
            field,
            display_value(actual)
        ));
        return;
    };

    if expected.len() != actual.len() {
        errors.push(format!(
            "{} array length not updated correctly. Expected: {}, Got: {}",
            field,
            expected.len(),
            actual.len()
        ));
        return;
    }

    for (i, (want, got)) in expected.iter().zip(actual).enumerate() {
        match want.as_object() {
            Some(want_fields) => {
                for (key, want_value) in want_fields {
                    let got_value = got.get(key).unwrap_or(&Value::Null);
                    if !values_match(want_value, got_value) {
                        errors.push(format!(
                            "{}[{}].{} not updated correctly. Expected: {}, Got: {}",
                            field,
                            i,
                            key,
                            display_value(want_value),
                            display_value(got_value)
                        ));
                    }
                }
            }
            None if !values_match(want, got) => errors.push(format!(
                "{}[{}] not updated correctly. Expected: {}, Got: {}",
                field,
                i,
                display_value(want),
                display_value(got)
            )),
            None => {}
        }
    }
}

/// Every requested field present after the update carries the requested
/// value. `__REMOVE__` entries are left to [`verify_unchanged_fields`].
pub fn verify_updated_fields(expected: &Map<String, Value>, after: &Map<String, Value>) -> Result<()> {
    let mut errors = Vec::new();

    for (field, want) in expected {
        let Some(got) = after.get(field) else {
            debug!("{} not in the updated record, skipping", field);
            continue;
        };
        if is_remove(want) {
            continue;
        }

        match want {
            Value::Array(items) => verify_array(field, items, got, &mut errors),
            Value::Bool(_) if want != got => errors.push(format!(
                "{} not updated correctly. Expected: {}, Got: {}",
                field,
                want,
                display_value(got)
            )),
            Value::Bool(_) => {}
            _ if is_date_field(field) => {
                let (want_day, got_day) = (date_part(want), date_part(got));
                if want_day != got_day {
                    errors.push(format!(
                        "{} date part not updated correctly. Expected: {}, Got: {}",
                        field, want_day, got_day
                    ));
                }
            }
            _ if !values_match(want, got) => errors.push(format!(
                "{} not updated correctly. Expected: {}, Got: {}",
                field,
                display_value(want),
                display_value(got)
            )),
            _ => {}
        }
    }

    finish(errors)?;
    info!("All requested fields updated");
    Ok(())
}

/// Fields outside the update request are identical before and after.
///
/// Object-valued fields are compared key by key, skipping timestamp-like
/// keys and keys that the request body sets. A `resources: __REMOVE__`
/// entry requires `resources` to be empty afterwards.
pub fn verify_unchanged_fields(
    before: &Map<String, Value>,
    after: &Map<String, Value>,
    expected: &Map<String, Value>,
    request_body: &Map<String, Value>,
) -> Result<()> {
    let mut errors = Vec::new();

    for (field, want) in expected {
        if VOLATILE_FIELDS.contains(&field.as_str()) || !is_remove(want) {
            continue;
        }
        let got = after.get(field).unwrap_or(&Value::Null);
        if field == "resources" {
            if got.as_array().map_or(true, |items| !items.is_empty()) {
                errors.push(format!(
                    "{} should be removed (empty array) when marked for removal. After: {}",
                    field, got
                ));
            }
        } else if before.get(field).unwrap_or(&Value::Null) != got {
            errors.push(format!(
                "{} should remain unchanged when marked for removal. Before: {}, After: {}",
                field,
                before.get(field).map(display_value).unwrap_or_default(),
                display_value(got)
            ));
        }
    }

    for (field, old) in before {
        if VOLATILE_FIELDS.contains(&field.as_str()) || expected.contains_key(field) {
            continue;
        }
        let Some(new) = after.get(field) else {
            debug!("{} not present after update, skipping", field);
            continue;
        };

        match (old, new) {
            (Value::Object(old_fields), Value::Object(new_fields)) => {
                for (key, old_value) in old_fields {
                    let Some(new_value) = new_fields.get(key) else {
                        continue;
                    };
                    if request_body.contains_key(key) || is_date_field(key) {
                        continue;
                    }
                    if old_value != new_value {
                        errors.push(format!(
                            "{}.{} should remain unchanged. Before: {}, After: {}",
                            field,
                            key,
                            display_value(old_value),
                            display_value(new_value)
                        ));
                    }
                }
            }
            _ if request_body.contains_key(field) => {}
            _ if old != new => errors.push(format!(
                "{} should remain unchanged. Before: {}, After: {}",
                field,
                display_value(old),
                display_value(new)
            )),
            _ => {}
        }
    }

    finish(errors)?;
    info!("Fields outside the update remained unchanged");
    Ok(())
}

/// `created_at` is unchanged; `updated_at` changed, moved forward, and is
/// later than `created_at`. A timestamp that cannot be read as an instant
/// is a failure, since its ordering cannot be checked.
pub fn verify_timestamps(before: &Map<String, Value>, after: &Map<String, Value>) -> Result<()> {
    let mut errors = Vec::new();

    if let (Some(old), Some(new)) = (before.get("created_at"), after.get("created_at")) {
        if old != new {
            errors.push(format!(
                "created_at should not change. Before: {}, After: {}",
                display_value(old),
                display_value(new)
            ));
        }
    }

    if let (Some(old), Some(new)) = (before.get("updated_at"), after.get("updated_at")) {
        let new_at = readable_instant("updated_at", new, &mut errors);

        if old == new {
            errors.push(format!(
                "updated_at should change. Before: {}, After: {}",
                display_value(old),
                display_value(new)
            ));
        } else if let (Some(old_at), Some(new_at)) = (readable_instant("updated_at", old, &mut errors), new_at) {
            if new_at <= old_at {
                errors.push(format!(
                    "updated_at should move forward. Before: {}, After: {}",
                    display_value(old),
                    display_value(new)
                ));
            }
        }

        if let Some(created) = after.get("created_at") {
            if let (Some(created_at), Some(updated_at)) = (readable_instant("created_at", created, &mut errors), new_at) {
                if updated_at <= created_at {
                    errors.push(format!(
                        "updated_at should be more recent than created_at. created_at: {}, updated_at: {}",
                        display_value(created),
                        display_value(new)
                    ));
                }
            }
        }
    }

    finish(errors)
}

fn readable_instant(field: &str, value: &Value, errors: &mut Vec<String>) -> Option<DateTime<Utc>> {
    let parsed = instant(value);
    if parsed.is_none() {
        errors.push(format!("{} is not a valid timestamp: {}", field, display_value(value)));
    }
    parsed
}
