use super::ranking::parse_semver;
use super::{io_error, json_error, RegistryError};
use crate::schema::{builtin_manifest_schema, validate_instance, BUILTIN_MANIFEST_SCHEMA_PATH};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const MANIFEST_FILE_NAMES: [&str; 3] = ["manifest.json", "manifest.yaml", "manifest.yml"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Idempotency {
    Safe,
    Unsafe,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stability {
    Stable,
    #[default]
    Experimental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrypointKind {
    Shell,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entrypoint {
    #[serde(rename = "type")]
    pub kind: EntrypointKind,
    pub command: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ToolManifest {
    name: String,
    version: String,
    #[serde(default)]
    description: String,
    capabilities: Vec<String>,
    input_schema: Value,
    output_schema: Value,
    entrypoint: Entrypoint,
    #[serde(default)]
    idempotency: Idempotency,
    #[serde(default)]
    stability: Stability,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRecord {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub capabilities: Vec<String>,
    pub input_schema: Value,
    pub output_schema: Value,
    pub entrypoint: Entrypoint,
    pub idempotency: Idempotency,
    pub stability: Stability,
    pub source_path: String,
}

impl ToolRecord {
    fn from_manifest(manifest: ToolManifest, source_path: &Path) -> Self {
        Self {
            id: format!("{}@{}", manifest.name, manifest.version),
            name: manifest.name,
            version: manifest.version,
            description: manifest.description,
            capabilities: manifest.capabilities,
            input_schema: manifest.input_schema,
            output_schema: manifest.output_schema,
            entrypoint: manifest.entrypoint,
            idempotency: manifest.idempotency,
            stability: manifest.stability,
            source_path: source_path.display().to_string(),
        }
    }

    pub fn tool_dir(&self) -> PathBuf {
        Path::new(&self.source_path)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn provides(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ManifestValidation {
    pub manifests: Vec<ToolRecord>,
    pub errors: Vec<String>,
}

impl ManifestValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

pub fn load_manifest_schema(path: Option<&Path>) -> Result<(Value, String), RegistryError> {
    let Some(path) = path else {
        return Ok((
            builtin_manifest_schema(),
            BUILTIN_MANIFEST_SCHEMA_PATH.to_string(),
        ));
    };
    let raw = fs::read_to_string(path).map_err(|err| io_error(path, err))?;
    let schema = serde_json::from_str(&raw).map_err(|err| json_error(path, err))?;
    Ok((schema, path.display().to_string()))
}

pub fn discover_manifest_paths(tools_root: &Path) -> Result<Vec<PathBuf>, RegistryError> {
    let mut found = Vec::new();
    let mut pending = vec![tools_root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir).map_err(|err| io_error(&dir, err))?;
        for entry in entries {
            let entry = entry.map_err(|err| io_error(&dir, err))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|err| io_error(&path, err))?;
            if file_type.is_dir() {
                pending.push(path);
            } else if path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| MANIFEST_FILE_NAMES.contains(&name))
            {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

fn read_manifest_value(path: &Path) -> Result<Value, String> {
    let raw = fs::read_to_string(path).map_err(|err| format!("failed to read: {err}"))?;
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == "yaml" || ext == "yml");
    if is_yaml {
        serde_yaml::from_str::<Value>(&raw).map_err(|err| format!("invalid yaml: {err}"))
    } else {
        serde_json::from_str::<Value>(&raw).map_err(|err| format!("invalid json: {err}"))
    }
}

pub fn validate_manifests(
    tools_root: &Path,
    schema: &Value,
) -> Result<ManifestValidation, RegistryError> {
    let mut result = ManifestValidation::default();
    let mut seen_names: BTreeMap<String, String> = BTreeMap::new();

    for path in discover_manifest_paths(tools_root)? {
        let label = path.display().to_string();
        let value = match read_manifest_value(&path) {
            Ok(value) => value,
            Err(err) => {
                result.errors.push(format!("{label}: {err}"));
                continue;
            }
        };

        let schema_errors = validate_instance(schema, &value);
        if !schema_errors.is_empty() {
            result
                .errors
                .extend(schema_errors.into_iter().map(|err| format!("{label}: {err}")));
            continue;
        }

        let manifest: ToolManifest = match serde_json::from_value(value) {
            Ok(manifest) => manifest,
            Err(err) => {
                result.errors.push(format!("{label}: {err}"));
                continue;
            }
        };

        let mut valid = true;
        if parse_semver(&manifest.version).is_none() {
            result.errors.push(format!(
                "{label}: version `{}` must match \\d+.\\d+.\\d+",
                manifest.version
            ));
            valid = false;
        }
        let mut capabilities: Vec<&str> = Vec::with_capacity(manifest.capabilities.len());
        for capability in &manifest.capabilities {
            if capabilities.contains(&capability.as_str()) {
                result
                    .errors
                    .push(format!("{label}: duplicate capability `{capability}`"));
                valid = false;
            } else {
                capabilities.push(capability);
            }
        }
        if let Some(first) = seen_names.get(&manifest.name) {
            result.errors.push(format!(
                "{label}: tool name `{}` is already declared by {first}",
                manifest.name
            ));
            valid = false;
        } else {
            seen_names.insert(manifest.name.clone(), label.clone());
        }

        if valid {
            result.manifests.push(ToolRecord::from_manifest(manifest, &path));
        }
    }

    Ok(result)
}
