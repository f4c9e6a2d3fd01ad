use crate::plan::WorkflowPlan;
use crate::registry::{Idempotency, Registry};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("failed to read policy {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid policy document {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("policy validation failed: {0}")]
    Invalid(String),
}

impl PolicyError {
    pub fn code(&self) -> &'static str {
        match self {
            PolicyError::Read { .. } => "io",
            PolicyError::Parse { .. } | PolicyError::Invalid(_) => "validation.policy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Policy {
    pub allowed_capabilities: Vec<String>,
    pub denied_capabilities: Vec<String>,
    pub max_steps: usize,
    pub max_tool_retries: u32,
    pub max_run_seconds: u64,
    pub max_llm_calls: u32,
    pub require_idempotent_for_auto: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            allowed_capabilities: Vec::new(),
            denied_capabilities: Vec::new(),
            max_steps: 20,
            max_tool_retries: 2,
            max_run_seconds: 3600,
            max_llm_calls: 3,
            require_idempotent_for_auto: false,
        }
    }
}

impl Policy {
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.max_steps == 0 {
            return Err(PolicyError::Invalid("max_steps must be >= 1".to_string()));
        }
        if self.max_run_seconds == 0 {
            return Err(PolicyError::Invalid(
                "max_run_seconds must be >= 1".to_string(),
            ));
        }
        for capability in self
            .allowed_capabilities
            .iter()
            .chain(&self.denied_capabilities)
        {
            if capability.trim().is_empty() {
                return Err(PolicyError::Invalid(
                    "capability lists must not contain empty entries".to_string(),
                ));
            }
        }
        Ok(())
    }
}

pub fn load_policy(path: &Path) -> Result<Policy, PolicyError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Policy::default()),
        Err(source) => {
            return Err(PolicyError::Read {
                path: path.display().to_string(),
                source,
            })
        }
    };
    if raw.trim().is_empty() {
        return Ok(Policy::default());
    }
    let policy: Policy = serde_yaml::from_str(&raw).map_err(|source| PolicyError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    policy.validate()?;
    Ok(policy)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyMode {
    Execute,
    Preview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    Allowed,
    BlockedByPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyResult {
    pub status: PolicyStatus,
    pub violations: Vec<PolicyViolation>,
}

impl PolicyResult {
    pub fn is_allowed(&self) -> bool {
        self.status == PolicyStatus::Allowed
    }
}

fn step_violation(
    code: &str,
    step_id: &str,
    capability: &str,
    message: String,
) -> PolicyViolation {
    PolicyViolation {
        code: code.to_string(),
        step_id: Some(step_id.to_string()),
        capability: Some(capability.to_string()),
        message,
    }
}

pub fn check_policy(
    plan: &WorkflowPlan,
    policy: &Policy,
    registry: &Registry,
    mode: PolicyMode,
) -> PolicyResult {
    let mut violations = Vec::new();

    if plan.steps.len() > policy.max_steps {
        violations.push(PolicyViolation {
            code: "max_steps_exceeded".to_string(),
            step_id: None,
            capability: None,
            message: format!(
                "plan has {} steps, policy allows at most {}",
                plan.steps.len(),
                policy.max_steps
            ),
        });
    }

    let check_idempotency = mode == PolicyMode::Execute && policy.require_idempotent_for_auto;
    for step in &plan.steps {
        let capability = step.capability.as_str();
        if policy.denied_capabilities.iter().any(|c| c == capability) {
            violations.push(step_violation(
                "capability_denied",
                &step.step_id,
                capability,
                format!("capability `{capability}` is denied by policy"),
            ));
        } else if !policy.allowed_capabilities.is_empty()
            && !policy.allowed_capabilities.iter().any(|c| c == capability)
        {
            violations.push(step_violation(
                "capability_not_allowed",
                &step.step_id,
                capability,
                format!("capability `{capability}` is not in the allow list"),
            ));
        }

        if !check_idempotency {
            continue;
        }
        match step.tool.as_deref().and_then(|id| registry.tool(id)) {
            Some(tool) if tool.idempotency == Idempotency::Safe => {}
            Some(tool) => violations.push(step_violation(
                "tool_not_idempotent",
                &step.step_id,
                capability,
                format!(
                    "tool `{}` is not declared idempotent; unattended runs require `safe`",
                    tool.id
                ),
            )),
            None => violations.push(step_violation(
                "tool_unresolved",
                &step.step_id,
                capability,
                "step has no resolved tool to check idempotency against".to_string(),
            )),
        }
    }

    let status = if violations.is_empty() {
        PolicyStatus::Allowed
    } else {
        PolicyStatus::BlockedByPolicy
    };
    PolicyResult { status, violations }
}
