//! Key-case translation at the wire boundary.
//!
//! Tool argument objects arrive with camelCase keys and are translated to
//! snake_case before validation; structured result payloads are translated
//! back to camelCase before serialization. Internal identifiers never
//! change — only object keys at encode/decode time do. A leading
//! underscore (as in `_meta`) is preserved.

use serde_json::{Map, Value};

/// Converts a snake_case identifier to camelCase.
#[must_use]
pub fn snake_to_camel(input: &str) -> String {
    if let Some(rest) = input.strip_prefix('_') {
        return format!("_{}", snake_to_camel(rest));
    }

    let mut out = String::with_capacity(input.len());
    let mut upper_next = false;
    for ch in input.chars() {
        if ch == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Converts a camelCase identifier to snake_case.
#[must_use]
pub fn camel_to_snake(input: &str) -> String {
    if let Some(rest) = input.strip_prefix('_') {
        return format!("_{}", camel_to_snake(rest));
    }

    let mut out = String::with_capacity(input.len() + 4);
    for (i, ch) in input.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Recursively rewrites all object keys to camelCase.
#[must_use]
pub fn keys_to_camel(value: &Value) -> Value {
    translate(value, &snake_to_camel)
}

/// Recursively rewrites all object keys to snake_case.
#[must_use]
pub fn keys_to_snake(value: &Value) -> Value {
    translate(value, &camel_to_snake)
}

fn translate(value: &Value, convert: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, inner) in map {
                out.insert(convert(key), translate(inner, convert));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| translate(v, convert)).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snake_to_camel() {
        assert_eq!(snake_to_camel("user_input"), "userInput");
        assert_eq!(snake_to_camel("exec_ms"), "execMs");
        assert_eq!(snake_to_camel("already"), "already");
        assert_eq!(snake_to_camel("_meta"), "_meta");
        assert_eq!(snake_to_camel("_request_id"), "_requestId");
    }

    #[test]
    fn test_camel_to_snake() {
        assert_eq!(camel_to_snake("userInput"), "user_input");
        assert_eq!(camel_to_snake("maxAmountRequired"), "max_amount_required");
        assert_eq!(camel_to_snake("plain"), "plain");
        assert_eq!(camel_to_snake("_meta"), "_meta");
    }

    #[test]
    fn test_nested_translation() {
        let wire = json!({
            "businessIntent": "transfer",
            "securityRequirements": ["multi-party"],
            "nestedBlock": {"innerField": 1, "deepList": [{"leafValue": true}]}
        });
        let internal = keys_to_snake(&wire);
        assert_eq!(internal["business_intent"], json!("transfer"));
        assert_eq!(internal["nested_block"]["deep_list"][0]["leaf_value"], json!(true));
    }

    #[test]
    fn test_roundtrip_stability() {
        let internal = json!({
            "output_data": "hi",
            "items_found": 3,
            "inner": {"field_one": [1, 2], "_meta": {"trace_id": "x"}}
        });
        let wire = keys_to_camel(&internal);
        assert_eq!(keys_to_snake(&wire), internal);
    }

    #[test]
    fn test_non_objects_untouched() {
        assert_eq!(keys_to_camel(&json!("a_string")), json!("a_string"));
        assert_eq!(keys_to_snake(&json!([1, 2, 3])), json!([1, 2, 3]));
        assert_eq!(keys_to_camel(&Value::Null), Value::Null);
    }
}
