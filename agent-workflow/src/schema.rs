// src/schema.rs
//! Structural JSON Schema checks.
//!
//! Covers the keywords tool parameter schemas and output schemas use in
//! practice: `type` (string or list), `properties`, `required`,
//! `additionalProperties: false`, `items`, `enum`, `const`,
//! `minLength`/`maxLength`, `minimum`/`maximum`, `minItems`/`maxItems`.
//! Unknown keywords are ignored.

use serde_json::{Map, Value};

/// A single schema violation, located by JSON pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Validate `instance` against `schema`, collecting every violation.
pub fn validate(instance: &Value, schema: &Value) -> Vec<SchemaViolation> {
    let mut violations = Vec::new();
    check(instance, schema, "", &mut violations);
    violations
}

/// Convenience wrapper joining all violations into one message.
pub fn check_instance(instance: &Value, schema: &Value) -> Result<(), String> {
    let violations = validate(instance, schema);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; "))
    }
}

fn check(instance: &Value, schema: &Value, path: &str, out: &mut Vec<SchemaViolation>) {
    let schema = match schema {
        Value::Object(map) => map,
        // `true` / absent schemas accept everything
        Value::Bool(false) => {
            push(out, path, "no value is allowed here");
            return;
        }
        _ => return,
    };

    if let Some(expected) = schema.get("type") {
        if !type_matches(instance, expected) {
            push(
                out,
                path,
                format!("expected type {}, got {}", describe_type(expected), json_type(instance)),
            );
            // Further keywords would only repeat the mismatch
            return;
        }
    }

    if let Some(Value::Array(options)) = schema.get("enum") {
        if !options.contains(instance) {
            push(out, path, format!("{} is not one of {}", instance, Value::Array(options.clone())));
        }
    }

    if let Some(expected) = schema.get("const") {
        if expected != instance {
            push(out, path, format!("{} does not equal {}", instance, expected));
        }
    }

    match instance {
        Value::Object(object) => check_object(object, schema, path, out),
        Value::Array(items) => check_array(items, schema, path, out),
        Value::String(text) => check_string(text, schema, path, out),
        Value::Number(number) => {
            if let Some(value) = number.as_f64() {
                check_number(value, schema, path, out);
            }
        }
        _ => {}
    }
}

fn check_object(
    object: &Map<String, Value>,
    schema: &Map<String, Value>,
    path: &str,
    out: &mut Vec<SchemaViolation>,
) {
    if let Some(Value::Array(required)) = schema.get("required") {
        for key in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(key) {
                push(out, path, format!("'{}' is a required property", key));
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);

    if let Some(properties) = properties {
        for (key, subschema) in properties {
            if let Some(value) = object.get(key) {
                check(value, subschema, &child(path, key), out);
            }
        }
    }

    match schema.get("additionalProperties") {
        Some(Value::Bool(false)) => {
            for key in object.keys() {
                let declared = properties.map(|p| p.contains_key(key)).unwrap_or(false);
                if !declared {
                    push(out, path, format!("additional property '{}' is not allowed", key));
                }
            }
        }
        Some(extra @ Value::Object(_)) => {
            for (key, value) in object {
                let declared = properties.map(|p| p.contains_key(key)).unwrap_or(false);
                if !declared {
                    check(value, extra, &child(path, key), out);
                }
            }
        }
        _ => {}
    }
}

fn check_array(
    items: &[Value],
    schema: &Map<String, Value>,
    path: &str,
    out: &mut Vec<SchemaViolation>,
) {
    if let Some(min) = schema.get("minItems").and_then(Value::as_u64) {
        if (items.len() as u64) < min {
            push(out, path, format!("expected at least {} items, got {}", min, items.len()));
        }
    }
    if let Some(max) = schema.get("maxItems").and_then(Value::as_u64) {
        if (items.len() as u64) > max {
            push(out, path, format!("expected at most {} items, got {}", max, items.len()));
        }
    }
    if let Some(item_schema) = schema.get("items") {
        for (index, item) in items.iter().enumerate() {
            check(item, item_schema, &child(path, &index.to_string()), out);
        }
    }
}

fn check_string(text: &str, schema: &Map<String, Value>, path: &str, out: &mut Vec<SchemaViolation>) {
    let length = text.chars().count() as u64;
    if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
        if length < min {
            push(out, path, format!("string shorter than {} characters", min));
        }
    }
    if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
        if length > max {
            push(out, path, format!("string longer than {} characters", max));
        }
    }
}

fn check_number(value: f64, schema: &Map<String, Value>, path: &str, out: &mut Vec<SchemaViolation>) {
    if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
        if value < min {
            push(out, path, format!("{} is less than the minimum of {}", value, min));
        }
    }
    if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
        if value > max {
            push(out, path, format!("{} is greater than the maximum of {}", value, max));
        }
    }
}

fn type_matches(instance: &Value, expected: &Value) -> bool {
    match expected {
        Value::String(name) => single_type_matches(instance, name),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| single_type_matches(instance, name)),
        _ => true,
    }
}

fn single_type_matches(instance: &Value, name: &str) -> bool {
    match name {
        "object" => instance.is_object(),
        "array" => instance.is_array(),
        "string" => instance.is_string(),
        "boolean" => instance.is_boolean(),
        "null" => instance.is_null(),
        "number" => instance.is_number(),
        "integer" => match instance {
            Value::Number(n) => n.is_i64() || n.is_u64() || n.as_f64().map(|f| f.fract() == 0.0).unwrap_or(false),
            _ => false,
        },
        _ => true,
    }
}

fn describe_type(expected: &Value) -> String {
    match expected {
        Value::String(name) => name.clone(),
        other => other.to_string(),
    }
}

fn json_type(instance: &Value) -> &'static str {
    match instance {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn child(path: &str, key: &str) -> String {
    format!("{}/{}", path, key)
}

fn push(out: &mut Vec<SchemaViolation>, path: &str, message: impl Into<String>) {
    out.push(SchemaViolation {
        path: path.to_string(),
        message: message.into(),
    });
}
