mod manifest_schema;
mod subset;
mod validate;

pub use manifest_schema::{builtin_manifest_schema, BUILTIN_MANIFEST_SCHEMA_PATH};
pub use subset::{is_schema_subset, subset_mismatches};
pub use validate::validate_instance;
pub(crate) use validate::json_type_name;

use serde_json::{Map, Value};

pub fn is_object_schema(schema: &Value) -> bool {
    schema
        .as_object()
        .and_then(|fields| fields.get("type"))
        .and_then(Value::as_str)
        == Some("object")
}

pub(crate) fn type_names(schema: &Map<String, Value>) -> Option<Vec<&str>> {
    match schema.get("type")? {
        Value::String(name) => Some(vec![name.as_str()]),
        Value::Array(names) => Some(names.iter().filter_map(Value::as_str).collect()),
        _ => None,
    }
}

pub(crate) fn string_list(value: Option<&Value>) -> Vec<&str> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}
