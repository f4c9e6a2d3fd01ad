use super::run_store::StepResult;
use crate::plan::PlanStatus;
use serde_json::{json, Value};
use std::path::PathBuf;

fn exit_label(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepFailureCause {
    #[error("tool exited with status {}: {message}", exit_label(.exit_code))]
    ToolFailed {
        exit_code: Option<i32>,
        message: String,
    },
    #[error("tool timed out after {timeout_ms}ms")]
    ToolTimeout { timeout_ms: u64 },
    #[error("tool output is invalid: {message}")]
    ToolInvalidOutput { message: String },
    #[error("input resolution failed: {message}")]
    InputResolution { message: String },
    #[error("invalid tool arguments: {message}")]
    InvalidArguments { message: String },
    #[error("tool could not be started: {message}")]
    ToolUnavailable { message: String },
}

impl StepFailureCause {
    pub fn code(&self) -> &'static str {
        match self {
            StepFailureCause::ToolFailed { .. } => "execution.tool_failed",
            StepFailureCause::ToolTimeout { .. } => "execution.tool_timeout",
            StepFailureCause::ToolInvalidOutput { .. } => "execution.tool_invalid_output",
            StepFailureCause::InputResolution { .. } => "validation.reference",
            StepFailureCause::InvalidArguments { .. } => "validation.arguments",
            StepFailureCause::ToolUnavailable { .. } => "execution.tool_unavailable",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StepFailureCause::ToolFailed { .. }
                | StepFailureCause::ToolTimeout { .. }
                | StepFailureCause::ToolInvalidOutput { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct PartialFailure {
    pub run_id: String,
    pub executed_steps: Vec<StepResult>,
    pub failed_step_id: String,
    pub failed_tool: Option<String>,
    pub failed_capability: String,
    pub remaining_steps: Vec<String>,
    pub cause: StepFailureCause,
    pub artifact_path: PathBuf,
}

impl PartialFailure {
    pub fn report(&self) -> Value {
        json!({
            "run_id": self.run_id,
            "executed_steps": self
                .executed_steps
                .iter()
                .map(|step| json!({"step_id": step.step_id, "outputs": step.outputs}))
                .collect::<Vec<_>>(),
            "failed_step_id": self.failed_step_id,
            "failed_tool": self.failed_tool,
            "failed_capability": self.failed_capability,
            "remaining_steps": self.remaining_steps,
            "error": {"code": self.cause.code(), "message": self.cause.to_string()},
            "artifact_path": self.artifact_path.display().to_string(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("plan `{plan_id}` is {status}; only complete plans can run outside dry-run")]
    PlanNotComplete { plan_id: String, status: PlanStatus },
    #[error("plan validation failed: {0}")]
    InvalidPlan(String),
    #[error("run `{}` stopped at step `{}`: {}", .0.run_id, .0.failed_step_id, .0.cause)]
    Partial(Box<PartialFailure>),
    #[error("run artifact {path} already exists")]
    ArtifactExists { path: String },
    #[error("run `{run_id}` not found at {path}")]
    UnknownRun { run_id: String, path: String },
    #[error("failed to allocate run id: {0}")]
    RunId(String),
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

impl ExecutionError {
    pub fn code(&self) -> &'static str {
        match self {
            ExecutionError::PlanNotComplete { .. } => "execution.plan_not_complete",
            ExecutionError::InvalidPlan(_) => "validation.plan",
            ExecutionError::Partial(_) => "execution.partial_failure",
            ExecutionError::ArtifactExists { .. } => "execution.artifact_exists",
            ExecutionError::UnknownRun { .. } => "execution.unknown_run",
            ExecutionError::RunId(_) => "internal.id",
            ExecutionError::Io { .. } => "io",
            ExecutionError::Json { .. } => "json",
        }
    }

    pub fn partial(&self) -> Option<&PartialFailure> {
        match self {
            ExecutionError::Partial(failure) => Some(failure),
            _ => None,
        }
    }
}

pub(crate) fn io_error(path: &std::path::Path, source: std::io::Error) -> ExecutionError {
    ExecutionError::Io {
        path: path.display().to_string(),
        source,
    }
}
