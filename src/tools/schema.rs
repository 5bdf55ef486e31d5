//! Parameter validation against a tool's declared JSON Schema.
//!
//! Supports the subset tools actually declare: `type`, `enum`, `minimum` /
//! `maximum`, `minLength` / `maxLength`, `required`, nested `properties`
//! and array `items`. Unknown fields are ignored. Every error names the
//! dotted path of the offending field so the decision-maker can fix it.

use serde_json::Value;

/// Validate `params` against `schema`, returning every problem found.
///
/// The root must be an object; an empty result means the call is valid.
pub fn validate(schema: &Value, params: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    if !params.is_object() {
        errors.push(format!("parameters should be object, got {}", type_name(params)));
        return errors;
    }
    check(schema, params, "", &mut errors);
    errors
}

fn check(schema: &Value, value: &Value, path: &str, errors: &mut Vec<String>) {
    let label = if path.is_empty() { "parameters" } else { path };

    if let Some(expected) = schema.get("type").and_then(|t| t.as_str())
        && !matches_type(expected, value)
    {
        errors.push(format!("{} should be {}", label, expected));
        return;
    }

    if let Some(allowed) = schema.get("enum").and_then(|e| e.as_array())
        && !allowed.contains(value)
    {
        let options: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
        errors.push(format!("{} must be one of [{}]", label, options.join(", ")));
    }

    match value {
        Value::Number(n) => {
            let Some(n) = n.as_f64() else { return };
            if let Some(min) = schema.get("minimum").and_then(|m| m.as_f64())
                && n < min
            {
                errors.push(format!("{} must be >= {}", label, format_bound(min)));
            }
            if let Some(max) = schema.get("maximum").and_then(|m| m.as_f64())
                && n > max
            {
                errors.push(format!("{} must be <= {}", label, format_bound(max)));
            }
        }
        Value::String(s) => {
            let len = s.chars().count() as u64;
            if let Some(min) = schema.get("minLength").and_then(|m| m.as_u64())
                && len < min
            {
                errors.push(format!("{} must be at least {} chars", label, min));
            }
            if let Some(max) = schema.get("maxLength").and_then(|m| m.as_u64())
                && len > max
            {
                errors.push(format!("{} must be at most {} chars", label, max));
            }
        }
        Value::Object(map) => {
            if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
                for key in required.iter().filter_map(|k| k.as_str()) {
                    if !map.contains_key(key) {
                        errors.push(format!("missing required {}", join(path, key)));
                    }
                }
            }
            if let Some(props) = schema.get("properties").and_then(|p| p.as_object()) {
                for (key, sub) in props {
                    if let Some(child) = map.get(key) {
                        check(sub, child, &join(path, key), errors);
                    }
                }
            }
        }
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    check(item_schema, item, &format!("{}[{}]", label, i), errors);
                }
            }
        }
        Value::Null | Value::Bool(_) => {}
    }
}

/// Booleans never satisfy numeric types, and strings are never coerced.
/// Integral floats (`2.0`) count as integers.
fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => match value {
            Value::Number(n) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            _ => false,
        },
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn format_bound(bound: f64) -> String {
    if bound.fract() == 0.0 {
        format!("{}", bound as i64)
    } else {
        bound.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "minLength": 2},
                "count": {"type": "integer", "minimum": 1, "maximum": 10},
                "mode": {"type": "string", "enum": ["fast", "full"]},
                "meta": {
                    "type": "object",
                    "properties": {
                        "tag": {"type": "string"},
                        "flags": {"type": "array", "items": {"type": "string"}}
                    },
                    "required": ["tag"]
                }
            },
            "required": ["query", "count"]
        })
    }

    #[test]
    fn test_missing_required() {
        let errors = validate(&sample_schema(), &json!({"query": "hi"}));
        assert!(errors.join("; ").contains("missing required count"));
    }

    #[test]
    fn test_type_and_range() {
        let schema = sample_schema();
        let errors = validate(&schema, &json!({"query": "hi", "count": 0}));
        assert!(errors.iter().any(|e| e.contains("count must be >= 1")));

        let errors = validate(&schema, &json!({"query": "hi", "count": "2"}));
        assert!(errors.iter().any(|e| e.contains("count should be integer")));

        let errors = validate(&schema, &json!({"query": "hi", "count": true}));
        assert!(errors.iter().any(|e| e.contains("count should be integer")));

        assert!(validate(&schema, &json!({"query": "hi", "count": 2.0})).is_empty());
    }

    #[test]
    fn test_enum_and_min_length() {
        let errors = validate(
            &sample_schema(),
            &json!({"query": "h", "count": 2, "mode": "slow"}),
        );
        assert!(errors.iter().any(|e| e.contains("query must be at least 2 chars")));
        assert!(errors.iter().any(|e| e.contains("mode must be one of")));
    }

    #[test]
    fn test_nested_object_and_array() {
        let errors = validate(
            &sample_schema(),
            &json!({"query": "hi", "count": 2, "meta": {"flags": [1, "ok"]}}),
        );
        assert!(errors.iter().any(|e| e.contains("missing required meta.tag")));
        assert!(errors.iter().any(|e| e.contains("meta.flags[0] should be string")));
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let errors = validate(
            &sample_schema(),
            &json!({"query": "hi", "count": 2, "extra": "x"}),
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn test_non_object_root_rejected() {
        let errors = validate(&sample_schema(), &json!(["hi"]));
        assert_eq!(errors, vec!["parameters should be object, got array".to_string()]);
    }
}
