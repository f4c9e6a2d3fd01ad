use super::{string_list, type_names};
use regex::Regex;
use serde_json::{Map, Value};

pub fn validate_instance(schema: &Value, instance: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    validate_at(schema, instance, "$", &mut errors);
    errors
}

fn validate_at(schema: &Value, instance: &Value, path: &str, errors: &mut Vec<String>) {
    let schema = match schema {
        Value::Object(fields) => fields,
        Value::Bool(false) => {
            errors.push(format!("{path}: no value is allowed here"));
            return;
        }
        _ => return,
    };

    if let Some(expected) = type_names(schema) {
        if !expected.iter().any(|name| type_matches(name, instance)) {
            errors.push(format!(
                "{path}: expected {}, got {}",
                expected.join(" or "),
                json_type_name(instance)
            ));
            return;
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(instance) {
            errors.push(format!(
                "{path}: value {instance} is not one of {}",
                Value::Array(allowed.clone())
            ));
        }
    }

    match instance {
        Value::String(text) => validate_string(schema, text, path, errors),
        Value::Array(items) => validate_array(schema, items, path, errors),
        Value::Object(fields) => validate_object(schema, fields, path, errors),
        _ => {}
    }
}

fn validate_string(schema: &Map<String, Value>, text: &str, path: &str, errors: &mut Vec<String>) {
    if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
        if (text.chars().count() as u64) < min {
            errors.push(format!("{path}: string is shorter than {min} characters"));
        }
    }
    if let Some(pattern) = schema.get("pattern").and_then(Value::as_str) {
        match Regex::new(pattern) {
            Ok(regex) if regex.is_match(text) => {}
            Ok(_) => errors.push(format!("{path}: `{text}` does not match pattern `{pattern}`")),
            Err(err) => errors.push(format!("{path}: invalid pattern `{pattern}`: {err}")),
        }
    }
}

fn validate_array(
    schema: &Map<String, Value>,
    items: &[Value],
    path: &str,
    errors: &mut Vec<String>,
) {
    if let Some(min) = schema.get("minItems").and_then(Value::as_u64) {
        if (items.len() as u64) < min {
            errors.push(format!("{path}: expected at least {min} item(s), got {}", items.len()));
        }
    }
    if let Some(item_schema) = schema.get("items") {
        for (index, item) in items.iter().enumerate() {
            validate_at(item_schema, item, &format!("{path}[{index}]"), errors);
        }
    }
}

fn validate_object(
    schema: &Map<String, Value>,
    fields: &Map<String, Value>,
    path: &str,
    errors: &mut Vec<String>,
) {
    for key in string_list(schema.get("required")) {
        if !fields.contains_key(key) {
            errors.push(format!("{path}: missing required property `{key}`"));
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    let additional = schema.get("additionalProperties");
    for (key, value) in fields {
        let child_path = format!("{path}.{key}");
        if let Some(property_schema) = properties.and_then(|props| props.get(key)) {
            validate_at(property_schema, value, &child_path, errors);
            continue;
        }
        match additional {
            Some(Value::Bool(false)) => {
                errors.push(format!("{path}: unexpected property `{key}`"));
            }
            Some(extra @ Value::Object(_)) => validate_at(extra, value, &child_path, errors),
            _ => {}
        }
    }
}

fn type_matches(name: &str, instance: &Value) -> bool {
    match name {
        "string" => instance.is_string(),
        "object" => instance.is_object(),
        "array" => instance.is_array(),
        "boolean" => instance.is_boolean(),
        "null" => instance.is_null(),
        "number" => instance.is_number(),
        "integer" => match instance {
            Value::Number(number) => {
                number.is_i64()
                    || number.is_u64()
                    || number.as_f64().map(|f| f.fract() == 0.0).unwrap_or(false)
            }
            _ => false,
        },
        _ => false,
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
