//! Field-level comparison between API and database records

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::debug;

/// Fields that are never compared between API and database.
pub const METADATA_FIELDS: [&str; 4] = ["created_at", "updated_at", "resources", "retrieved_at"];

static DATE_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(_from|_to|_at)$|date").expect("date field pattern is valid"));

static PLAIN_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("plain date pattern is valid"));

pub fn is_metadata_field(field: &str) -> bool {
    METADATA_FIELDS.contains(&field)
}

pub fn is_date_field(field: &str) -> bool {
    DATE_FIELD.is_match(field)
}

/// Human-readable form: strings without quotes, everything else as JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Key used to match ids across sources, so `"5"` and `5` are the same id.
pub fn id_key(value: &Value) -> String {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => display_value(other),
    }
}

/// Calendar date of a timestamp in local time. Bare `YYYY-MM-DD` strings are
/// taken as already local.
pub fn local_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::String(raw) => {
            let raw = raw.trim();
            if PLAIN_DATE.is_match(raw) {
                return NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok();
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
                return Some(dt.with_timezone(&Local).date_naive());
            }
            for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
                    return Some(naive.date());
                }
            }
            DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z")
                .ok()
                .map(|dt| dt.with_timezone(&Local).date_naive())
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Local.timestamp_millis_opt(millis).single())
            .map(|dt| dt.date_naive()),
        _ => None,
    }
}

/// Instant of a timestamp value, for ordering `created_at` / `updated_at`.
/// Bare `YYYY-MM-DD` strings are taken as midnight UTC.
pub fn instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(raw) => {
            let raw = raw.trim();
            if PLAIN_DATE.is_match(raw) {
                return NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
                    .map(|midnight| midnight.and_utc());
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
                return Some(dt.with_timezone(&Utc));
            }
            for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
                    return Some(naive.and_utc());
                }
            }
            None
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| DateTime::from_timestamp_millis(millis)),
        _ => None,
    }
}

fn joined(items: &[Value]) -> String {
    items.iter().map(display_value).collect::<Vec<_>>().join(",")
}

/// Non-date equality: numbers numerically, arrays against delimited strings
/// as joined text, everything else strictly.
pub fn values_match(api: &Value, db: &Value) -> bool {
    match (api, db) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => a.as_f64() == b.as_f64(),
        },
        (Value::Array(a), Value::String(b)) => joined(a) == *b,
        (Value::String(a), Value::Array(b)) => *a == joined(b),
        (Value::Array(a), Value::Array(b)) => joined(a) == joined(b),
        _ => api == db,
    }
}

fn comparable_text(value: &Value) -> String {
    match value {
        Value::Array(items) => joined(items),
        other => display_value(other),
    }
}

/// Compares every non-metadata field of `api` against `db`, pushing one
/// message per discrepancy.
pub fn compare_record(
    api: &Map<String, Value>,
    db: &Map<String, Value>,
    id_field: &str,
    resource_name: &str,
    errors: &mut Vec<String>,
) {
    let id = api.get(id_field).map(display_value).unwrap_or_default();

    for (field, api_value) in api {
        if is_metadata_field(field) {
            continue;
        }

        let Some(db_value) = db.get(field) else {
            errors.push(format!(
                "{} {} missing field in DB: {}",
                resource_name, id, field
            ));
            continue;
        };

        if field == id_field {
            if id_key(api_value) != id_key(db_value) {
                errors.push(format!(
                    "{} {} field mismatch: {} API=\"{}\" DB=\"{}\"",
                    resource_name,
                    id,
                    field,
                    display_value(api_value),
                    display_value(db_value)
                ));
            }
        } else if is_date_field(field) {
            compare_dates(field, api_value, db_value, resource_name, &id, errors);
        } else if !values_match(api_value, db_value) {
            debug!(
                "Field {} comparison failed: API {} DB {}",
                field, api_value, db_value
            );
            errors.push(format!(
                "{} {} field mismatch: {} API=\"{}\" DB=\"{}\"",
                resource_name,
                id,
                field,
                comparable_text(api_value),
                comparable_text(db_value)
            ));
        }
    }
}

fn compare_dates(
    field: &str,
    api: &Value,
    db: &Value,
    resource_name: &str,
    id: &str,
    errors: &mut Vec<String>,
) {
    if api.is_null() && db.is_null() {
        return;
    }

    let (api_text, db_text) = match (local_date(api), local_date(db)) {
        (Some(a), Some(d)) if a == d => return,
        (Some(a), Some(d)) => (a.to_string(), d.to_string()),
        _ if api == db => return,
        _ => (display_value(api), display_value(db)),
    };

    errors.push(format!(
        "{} {} field mismatch: {} API=\"{}\" DB=\"{}\"",
        resource_name, id, field, api_text, db_text
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_date_field_pattern() {
        for field in ["active_from", "active_to", "created_at", "quote_date", "dateOfBirth"] {
            assert!(is_date_field(field), "{} should be a date field", field);
        }
        for field in ["category_name", "from_user", "to_do"] {
            assert!(!is_date_field(field), "{} should not be a date field", field);
        }
    }

    #[test]
    fn test_same_instant_in_different_offsets_is_the_same_day() {
        let api = json!("2024-03-05T10:00:00Z");
        let db = json!("2024-03-05T15:30:00+05:30");
        assert_eq!(local_date(&api), local_date(&db));
    }

    #[test]
    fn test_plain_dates_are_kept() {
        assert_eq!(
            local_date(&json!("2024-03-05")),
            NaiveDate::from_ymd_opt(2024, 3, 5)
        );
    }

    #[test]
    fn test_values_match_rules() {
        assert!(values_match(&json!(5), &json!(5.0)));
        assert!(values_match(&json!(["a", "b"]), &json!("a,b")));
        assert!(values_match(&json!("a,b"), &json!(["a", "b"])));
        assert!(!values_match(&json!(["b", "a"]), &json!(["a", "b"])));
        assert!(!values_match(&json!("5"), &json!(5)));
        assert!(values_match(&json!(true), &json!(true)));
    }

    #[test]
    fn test_id_key_unifies_numeric_and_text_ids() {
        assert_eq!(id_key(&json!(5)), id_key(&json!("5")));
        assert_eq!(id_key(&json!("abc-1")), "abc-1");
    }

    #[test]
    fn test_compare_record_collects_every_mismatch() {
        let api = object(json!({
            "category_id": 3,
            "category_name": "Billing",
            "description": "old",
            "tags": ["x", "y"],
            "created_at": "ignored",
            "extra": 1,
            "active_from": "2024-03-05T10:00:00Z"
        }));
        let db = object(json!({
            "category_id": 3,
            "category_name": "Billing",
            "description": "new",
            "tags": "x,y",
            "active_from": "2024-03-09"
        }));

        let mut errors = Vec::new();
        compare_record(&api, &db, "category_id", "FAQ Category", &mut errors);

        assert_eq!(errors.len(), 3, "{:?}", errors);
        assert!(errors.contains(&"FAQ Category 3 field mismatch: description API=\"old\" DB=\"new\"".to_string()));
        assert!(errors.contains(&"FAQ Category 3 missing field in DB: extra".to_string()));
        assert!(errors.iter().any(|e| e.contains("active_from")));
    }

    #[test]
    fn test_instant_ordering() {
        let created = instant(&json!("2024-03-05T10:00:00Z")).unwrap();
        let updated = instant(&json!("2024-03-05 10:00:01")).unwrap();
        assert!(updated > created);
    }

    #[test]
    fn test_instant_of_plain_date_is_midnight_utc() {
        let day = instant(&json!("2024-03-05")).unwrap();
        assert_eq!(day, instant(&json!("2024-03-05T00:00:00Z")).unwrap());
        assert!(instant(&json!("Mar 5 2024")).is_none());
        assert!(instant(&Value::Null).is_none());
    }
}
