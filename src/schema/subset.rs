use super::{string_list, type_names};
use serde_json::{Map, Value};

pub fn is_schema_subset(required: &Value, available: &Value) -> bool {
    subset_mismatches(required, available).is_empty()
}

/// Compares a required schema against an available one and lists every
/// incompatibility, keyed by the path where it was found.
///
/// The relation is one-directional: the available schema may accept more
/// values, declare more optional properties, or leave facets unconstrained.
/// It may not drop a requiredness the step relies on, require keys the step
/// does not guarantee, or narrow an enum.
pub fn subset_mismatches(required: &Value, available: &Value) -> Vec<String> {
    let mut mismatches = Vec::new();
    compare_at(required, available, "$", &mut mismatches);
    mismatches
}

fn compare_at(required: &Value, available: &Value, path: &str, out: &mut Vec<String>) {
    let unconstrained = Map::new();
    let required = required.as_object().unwrap_or(&unconstrained);
    let available = available.as_object().unwrap_or(&unconstrained);

    if let (Some(required_types), Some(available_types)) =
        (type_names(required), type_names(available))
    {
        let covered = required_types.iter().all(|name| {
            available_types.contains(name)
                || (*name == "integer" && available_types.contains(&"number"))
        });
        if !covered {
            out.push(format!(
                "{path}: type {} is not accepted by available type {}",
                required_types.join("|"),
                available_types.join("|")
            ));
            return;
        }
    }

    compare_object(required, available, path, out);

    if let (Some(required_items), Some(available_items)) =
        (required.get("items"), available.get("items"))
    {
        compare_at(required_items, available_items, &format!("{path}[]"), out);
    }

    if let (Some(required_enum), Some(available_enum)) = (
        required.get("enum").and_then(Value::as_array),
        available.get("enum").and_then(Value::as_array),
    ) {
        for value in required_enum {
            if !available_enum.contains(value) {
                out.push(format!("{path}: enum value {value} is not accepted"));
            }
        }
    }
}

fn compare_object(
    required: &Map<String, Value>,
    available: &Map<String, Value>,
    path: &str,
    out: &mut Vec<String>,
) {
    let required_keys = string_list(required.get("required"));
    let available_keys = string_list(available.get("required"));

    for key in &required_keys {
        if !available_keys.contains(key) {
            out.push(format!(
                "{path}: `{key}` is required but the available schema does not require it"
            ));
        }
    }
    for key in &available_keys {
        if !required_keys.contains(key) {
            out.push(format!(
                "{path}: available schema requires `{key}` which is not required here (excess required)"
            ));
        }
    }

    let Some(required_props) = required.get("properties").and_then(Value::as_object) else {
        return;
    };
    let available_props = available.get("properties").and_then(Value::as_object);
    for (key, required_prop) in required_props {
        let child_path = format!("{path}.{key}");
        match available_props.and_then(|props| props.get(key)) {
            Some(available_prop) => compare_at(required_prop, available_prop, &child_path, out),
            None => out.push(format!("{child_path}: property is missing from available schema")),
        }
    }
}
