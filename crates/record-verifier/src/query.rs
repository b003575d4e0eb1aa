use serde_json::{Map, Number, Value};

/// Coerces query-string values to the types the database columns hold:
/// `"true"`/`"false"` become booleans and numeric strings become numbers.
pub fn normalize_query_params(params: &Map<String, Value>) -> Map<String, Value> {
    params
        .iter()
        .map(|(key, value)| (key.clone(), normalize_value(value)))
        .collect()
}

fn normalize_value(value: &Value) -> Value {
    let Value::String(raw) = value else {
        return value.clone();
    };

    match raw.as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return value.clone();
    }
    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::Number(int.into());
    }
    match trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
        Some(number) if trimmed.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-') => {
            Value::Number(number)
        }
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalization() {
        let params = match json!({
            "is_active": "true",
            "is_popular": "false",
            "page": "2",
            "ratio": "0.5",
            "author": "Ada",
            "code": "1e3",
            "limit": 10
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };

        let normalized = normalize_query_params(&params);
        assert_eq!(normalized["is_active"], json!(true));
        assert_eq!(normalized["is_popular"], json!(false));
        assert_eq!(normalized["page"], json!(2));
        assert_eq!(normalized["ratio"], json!(0.5));
        assert_eq!(normalized["author"], json!("Ada"));
        assert_eq!(normalized["code"], json!("1e3"));
        assert_eq!(normalized["limit"], json!(10));
    }
}
