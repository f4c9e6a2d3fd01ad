use super::error::{io_error, ExecutionError};
use crate::plan::Step;
use crate::shared::fs_atomic::atomic_write_json;
use crate::shared::ids::generate_id;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const RUN_ID_ATTEMPTS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Ok,
    Failed,
    DryRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Ok,
    DryRun,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Ok => write!(f, "ok"),
            RunStatus::DryRun => write!(f, "dry-run"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub capability: String,
    pub tool: Option<String>,
    pub status: StepStatus,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub resolved_inputs: Map<String, Value>,
    pub attempts: u32,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub outputs: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
    pub duration_ms: u64,
}

impl StepResult {
    pub(crate) fn pending(step: &Step, status: StepStatus) -> Self {
        Self {
            step_id: step.step_id.clone(),
            capability: step.capability.clone(),
            tool: step.tool.clone(),
            status,
            command: Vec::new(),
            working_dir: None,
            resolved_inputs: Map::new(),
            attempts: 0,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            outputs: Map::new(),
            error: None,
            duration_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunArtifact {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub dry_run: bool,
    pub plan_id: String,
    pub request_id: String,
    pub status: RunStatus,
    pub steps: Vec<StepResult>,
    pub final_outputs: BTreeMap<String, Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
}

#[derive(Debug, Clone)]
pub struct RunStore {
    runs_dir: PathBuf,
}

impl RunStore {
    pub fn new(runs_dir: impl Into<PathBuf>) -> Self {
        Self {
            runs_dir: runs_dir.into(),
        }
    }

    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    pub fn artifact_path(&self, run_id: &str) -> PathBuf {
        self.runs_dir.join(format!("{run_id}.json"))
    }

    pub fn allocate_run_id(&self, now: i64) -> Result<String, ExecutionError> {
        for _ in 0..RUN_ID_ATTEMPTS {
            let run_id = generate_id("run", now).map_err(ExecutionError::RunId)?;
            if !self.artifact_path(&run_id).exists() {
                return Ok(run_id);
            }
        }
        Err(ExecutionError::RunId(format!(
            "no free run id after {RUN_ID_ATTEMPTS} attempts"
        )))
    }

    pub fn persist(&self, artifact: &RunArtifact) -> Result<PathBuf, ExecutionError> {
        let path = self.artifact_path(&artifact.run_id);
        if path.exists() {
            return Err(ExecutionError::ArtifactExists {
                path: path.display().to_string(),
            });
        }
        atomic_write_json(&path, artifact).map_err(|err| io_error(&path, err))?;
        Ok(path)
    }

    pub fn load(&self, run_id: &str) -> Result<RunArtifact, ExecutionError> {
        let path = self.artifact_path(run_id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(ExecutionError::UnknownRun {
                    run_id: run_id.to_string(),
                    path: path.display().to_string(),
                })
            }
            Err(err) => return Err(io_error(&path, err)),
        };
        serde_json::from_str(&raw).map_err(|source| ExecutionError::Json {
            path: path.display().to_string(),
            source,
        })
    }
}

pub fn load_run_artifact(runs_dir: &Path, run_id: &str) -> Result<RunArtifact, ExecutionError> {
    RunStore::new(runs_dir).load(run_id)
}
