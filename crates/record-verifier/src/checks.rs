//! Response-level assertions that need no database

use crate::compare::{display_value, instant};
use chrono::{DateTime, Utc};
use probe_core::{ProbeError, Result};
use serde_json::Value;
use tracing::info;

fn failed(message: String) -> ProbeError {
    ProbeError::VerificationFailed {
        failures: vec![message],
    }
}

/// Checks `data[name]` exists and, when `expected` is given, equals it.
/// String expectations are coerced: `"true"`/`"false"` compare as booleans
/// and numeric strings as numbers. Returns the actual value.
pub fn verify_field<'a>(data: &'a Value, name: &str, expected: Option<&Value>) -> Result<&'a Value> {
    let actual = data
        .get(name)
        .ok_or_else(|| failed(format!("Response does not have property {}", name)))?;

    let Some(expected) = expected else {
        info!("Found {}: {}", name, actual);
        return Ok(actual);
    };

    let matches = match expected {
        Value::String(raw) if raw.is_empty() => true,
        Value::String(raw) if raw == "true" || raw == "false" => {
            actual.as_bool() == Some(raw == "true")
        }
        Value::String(raw) => match raw.trim().parse::<f64>() {
            Ok(number) if !raw.trim().is_empty() => actual.as_f64() == Some(number),
            _ => display_value(actual) == *raw,
        },
        Value::Number(n) => actual.as_f64() == n.as_f64(),
        other => actual == other,
    };

    if !matches {
        return Err(failed(format!(
            "{} mismatch. Expected: {}, Got: {}",
            name,
            display_value(expected),
            display_value(actual)
        )));
    }
    info!("Verified {}: {} equals expected value", name, actual);
    Ok(actual)
}

/// Depth-first search for the first property called `key`.
pub fn find_key_deep<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map
            .get(key)
            .or_else(|| map.values().find_map(|child| find_key_deep(child, key))),
        Value::Array(items) => items.iter().find_map(|child| find_key_deep(child, key)),
        _ => None,
    }
}

/// Every item has `active_from < active_to` with `now` inside the window.
pub fn verify_active_window(
    resource_name: &str,
    id_field: &str,
    items: &[Value],
    now: DateTime<Utc>,
) -> Result<()> {
    let errors: Vec<String> = items
        .iter()
        .filter_map(|item| {
            let id = item.get(id_field).map(display_value).unwrap_or_default();
            let (from, to) = match (item.get("active_from"), item.get("active_to")) {
                (Some(from), Some(to)) if !from.is_null() && !to.is_null() => (from, to),
                _ => {
                    return Some(format!(
                        "{} {} missing active_from or active_to dates",
                        resource_name, id
                    ))
                }
            };

            let (Some(from_at), Some(to_at)) = (instant(from), instant(to)) else {
                return Some(format!(
                    "{} {} has unparseable active dates: {} / {}",
                    resource_name,
                    id,
                    display_value(from),
                    display_value(to)
                ));
            };

            if from_at >= to_at {
                Some(format!(
                    "{} {} has invalid date range. active_from ({}) should be before active_to ({})",
                    resource_name,
                    id,
                    display_value(from),
                    display_value(to)
                ))
            } else if now < from_at {
                Some(format!(
                    "{} {} is not yet active. active_from: {}, current: {}",
                    resource_name,
                    id,
                    display_value(from),
                    now.to_rfc3339()
                ))
            } else if now > to_at {
                Some(format!(
                    "{} {} has expired. active_to: {}, current: {}",
                    resource_name,
                    id,
                    display_value(to),
                    now.to_rfc3339()
                ))
            } else {
                None
            }
        })
        .collect();

    if errors.is_empty() {
        info!("All {} {} items are currently active", items.len(), resource_name);
        Ok(())
    } else {
        Err(ProbeError::VerificationFailed { failures: errors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_verify_field_coercion() {
        let data = json!({ "is_active": true, "count": 3, "name": "Ada", "code": 7 });

        verify_field(&data, "is_active", Some(&json!("true"))).unwrap();
        verify_field(&data, "count", Some(&json!("3"))).unwrap();
        verify_field(&data, "name", Some(&json!("Ada"))).unwrap();
        verify_field(&data, "code", Some(&json!(7))).unwrap();
        verify_field(&data, "name", None).unwrap();

        assert!(verify_field(&data, "is_active", Some(&json!("false"))).is_err());
        assert!(verify_field(&data, "missing", None).is_err());
    }

    #[test]
    fn test_find_key_deep() {
        let data = json!({ "data": { "items": [{ "device_id": "d-1" }] } });
        assert_eq!(find_key_deep(&data, "device_id"), Some(&json!("d-1")));
        assert_eq!(find_key_deep(&data, "nope"), None);
    }

    #[test]
    fn test_active_window() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        let items = [
            json!({ "carousel_id": 1, "active_from": "2024-06-01T00:00:00Z", "active_to": "2024-07-01T00:00:00Z" }),
            json!({ "carousel_id": 2, "active_from": "2024-07-01T00:00:00Z", "active_to": "2024-08-01T00:00:00Z" }),
            json!({ "carousel_id": 3, "active_from": "2024-05-01T00:00:00Z", "active_to": "2024-06-01T00:00:00Z" }),
            json!({ "carousel_id": 4, "active_from": "2024-06-10T00:00:00Z", "active_to": "2024-06-01T00:00:00Z" }),
            json!({ "carousel_id": 5 }),
        ];

        verify_active_window("Marketing Carousel", "carousel_id", &items[..1], now).unwrap();

        let ProbeError::VerificationFailed { failures } =
            verify_active_window("Marketing Carousel", "carousel_id", &items, now).unwrap_err()
        else {
            panic!("expected verification failure");
        };
        assert_eq!(failures.len(), 4);
        assert!(failures[0].contains("not yet active"));
        assert!(failures[1].contains("has expired"));
        assert!(failures[2].contains("invalid date range"));
        assert!(failures[3].contains("missing active_from"));
    }
}
