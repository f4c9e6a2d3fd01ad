use serde_json::{json, Value};

pub const BUILTIN_MANIFEST_SCHEMA_PATH: &str = "builtin:tool-manifest.schema.json";

pub fn builtin_manifest_schema() -> Value {
    json!({
        "type": "object",
        "required": [
            "name",
            "version",
            "capabilities",
            "input_schema",
            "output_schema",
            "entrypoint"
        ],
        "additionalProperties": false,
        "properties": {
            "name": {
                "type": "string",
                "minLength": 1,
                "pattern": "^[a-z0-9][a-z0-9-]*$"
            },
            "version": { "type": "string", "minLength": 5 },
            "description": { "type": "string" },
            "capabilities": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "string",
                    "pattern": "^[a-z0-9_]+(\\.[a-z0-9_]+)+$"
                }
            },
            "input_schema": { "type": "object" },
            "output_schema": { "type": "object" },
            "entrypoint": {
                "type": "object",
                "required": ["type", "command"],
                "additionalProperties": false,
                "properties": {
                    "type": { "type": "string", "enum": ["shell"] },
                    "command": { "type": "string", "minLength": 1 }
                }
            },
            "idempotency": { "type": "string", "enum": ["safe", "unsafe", "unknown"] },
            "stability": { "type": "string", "enum": ["stable", "experimental"] }
        }
    })
}
