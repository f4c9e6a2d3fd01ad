use super::manifest::{validate_manifests, ToolRecord};
use super::{io_error, RegistryError};
use crate::shared::fs_atomic::atomic_write_json;
use crate::shared::time::rfc3339;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryIndex {
    pub by_capability: BTreeMap<String, Vec<String>>,
    pub by_id: BTreeMap<String, ToolRecord>,
}

impl RegistryIndex {
    pub fn from_records(records: &[ToolRecord]) -> Self {
        let mut index = RegistryIndex::default();
        for record in records {
            for capability in &record.capabilities {
                index
                    .by_capability
                    .entry(capability.clone())
                    .or_default()
                    .push(record.id.clone());
            }
            index.by_id.insert(record.id.clone(), record.clone());
        }
        for ids in index.by_capability.values_mut() {
            ids.sort();
            ids.dedup();
        }
        index
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryCache {
    pub generated_at: String,
    pub schema_path: String,
    pub tools: Vec<ToolRecord>,
    pub index: RegistryIndex,
}

pub fn build_registry(
    tools_root: &Path,
    schema: &Value,
    schema_path: &str,
    output: &Path,
    now: i64,
) -> Result<RegistryCache, RegistryError> {
    let validation = validate_manifests(tools_root, schema)?;
    if !validation.is_valid() {
        return Err(RegistryError::InvalidManifests {
            errors: validation.errors,
        });
    }

    let mut tools = validation.manifests;
    tools.sort_by(|left, right| left.id.cmp(&right.id));
    let cache = RegistryCache {
        generated_at: rfc3339(now),
        schema_path: schema_path.to_string(),
        index: RegistryIndex::from_records(&tools),
        tools,
    };
    atomic_write_json(output, &cache).map_err(|err| io_error(output, err))?;
    tracing::info!(
        tools = cache.tools.len(),
        capabilities = cache.index.by_capability.len(),
        path = %output.display(),
        "registry cache written"
    );
    Ok(cache)
}
