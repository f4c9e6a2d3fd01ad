mod index;
mod manifest;
mod ranking;

pub use index::{build_registry, RegistryCache, RegistryIndex};
pub use manifest::{
    discover_manifest_paths, load_manifest_schema, validate_manifests, Entrypoint,
    EntrypointKind, Idempotency, ManifestValidation, Stability, ToolRecord,
};
pub use ranking::{parse_semver, pick_best_tool};

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("manifest validation failed with {} error(s): {}", errors.len(), errors.join("; "))]
    InvalidManifests { errors: Vec<String> },
    #[error("capability `{capability}` is not provided by any registered tool")]
    CapabilityNotFound { capability: String },
    #[error("registry cache {path} is inconsistent: {reason}")]
    InvalidCache { path: String, reason: String },
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("json error at {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl RegistryError {
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::InvalidManifests { .. } => "validation.manifest",
            RegistryError::CapabilityNotFound { .. } => "registry.capability_not_found",
            RegistryError::InvalidCache { .. } => "registry.invalid_cache",
            RegistryError::Io { .. } => "io",
            RegistryError::Json { .. } => "json",
        }
    }
}

pub(crate) fn io_error(path: &Path, source: std::io::Error) -> RegistryError {
    RegistryError::Io {
        path: path.display().to_string(),
        source,
    }
}

pub(crate) fn json_error(path: &Path, source: serde_json::Error) -> RegistryError {
    RegistryError::Json {
        path: path.display().to_string(),
        source,
    }
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    by_id: BTreeMap<String, ToolRecord>,
    by_capability: BTreeMap<String, Vec<String>>,
}

impl Registry {
    pub fn from_records(records: Vec<ToolRecord>) -> Self {
        let index = RegistryIndex::from_records(&records);
        Self {
            by_id: index.by_id,
            by_capability: index.by_capability,
        }
    }

    pub fn from_cache(cache: RegistryCache) -> Self {
        Self {
            by_id: cache.index.by_id,
            by_capability: cache.index.by_capability,
        }
    }

    pub fn load(cache_path: &Path) -> Result<Self, RegistryError> {
        let raw = fs::read_to_string(cache_path).map_err(|err| io_error(cache_path, err))?;
        let cache: RegistryCache =
            serde_json::from_str(&raw).map_err(|err| json_error(cache_path, err))?;
        for (capability, ids) in &cache.index.by_capability {
            if let Some(missing) = ids.iter().find(|id| !cache.index.by_id.contains_key(*id)) {
                return Err(RegistryError::InvalidCache {
                    path: cache_path.display().to_string(),
                    reason: format!("capability `{capability}` lists unknown tool `{missing}`"),
                });
            }
        }
        Ok(Self::from_cache(cache))
    }

    pub fn candidates(&self, capability: &str) -> Vec<&ToolRecord> {
        self.by_capability
            .get(capability)
            .map(|ids| ids.iter().filter_map(|id| self.by_id.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn tool(&self, tool_id: &str) -> Option<&ToolRecord> {
        self.by_id.get(tool_id)
    }

    pub fn tools(&self) -> impl Iterator<Item = &ToolRecord> {
        self.by_id.values()
    }

    pub fn capabilities(&self) -> Vec<&str> {
        self.by_capability.keys().map(String::as_str).collect()
    }

    pub fn resolve(&self, capability: &str) -> Result<&ToolRecord, RegistryError> {
        pick_best_tool(self.candidates(capability)).ok_or_else(|| {
            RegistryError::CapabilityNotFound {
                capability: capability.to_string(),
            }
        })
    }
}
