use crate::shared::ids::generate_id;
use crate::shared::time::rfc3339;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDocument {
    #[serde(default)]
    pub request_id: Option<String>,
    pub user_goal: String,
    #[serde(default)]
    pub inputs: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub request_id: String,
    pub user_goal: String,
    #[serde(default)]
    pub inputs: Map<String, Value>,
}

impl Request {
    pub fn new(
        user_goal: impl Into<String>,
        inputs: Map<String, Value>,
        now: i64,
    ) -> Result<Self, String> {
        Ok(Self {
            request_id: generate_id("req", now)?,
            user_goal: user_goal.into(),
            inputs,
        })
    }

    pub fn from_document(document: RequestDocument, now: i64) -> Result<Self, String> {
        let request_id = match document.request_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => id,
            None => generate_id("req", now)?,
        };
        Ok(Self {
            request_id,
            user_goal: document.user_goal,
            inputs: document.inputs,
        })
    }

    pub fn from_path(path: &Path, now: i64) -> Result<Self, String> {
        let raw = fs::read_to_string(path)
            .map_err(|err| format!("failed to read request {}: {err}", path.display()))?;
        let document: RequestDocument = serde_json::from_str(&raw)
            .map_err(|err| format!("invalid request document {}: {err}", path.display()))?;
        Self::from_document(document, now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanStatus {
    Planned,
    Complete,
    PartialComplete,
    Unroutable,
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanStatus::Planned => write!(f, "planned"),
            PlanStatus::Complete => write!(f, "complete"),
            PlanStatus::PartialComplete => write!(f, "partial-complete"),
            PlanStatus::Unroutable => write!(f, "unroutable"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannerSource {
    Rule,
    Llm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// A pointer from a step input to request data or to an earlier step output.
///
/// Canonical text forms are `request.inputs.<key>` and
/// `steps.<id>.outputs.<key>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Reference {
    RequestInput { key: String },
    StepOutput { step_id: String, key: String },
}

impl Reference {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if let Some(key) = raw.strip_prefix("request.inputs.") {
            if key.is_empty() {
                return Err(format!("reference `{raw}` is missing an input key"));
            }
            return Ok(Reference::RequestInput {
                key: key.to_string(),
            });
        }
        if let Some(rest) = raw.strip_prefix("steps.") {
            let Some((step_id, key)) = rest.split_once(".outputs.") else {
                return Err(format!(
                    "reference `{raw}` must have the form steps.<id>.outputs.<key>"
                ));
            };
            if step_id.is_empty() || step_id.contains('.') || key.is_empty() {
                return Err(format!(
                    "reference `{raw}` must have the form steps.<id>.outputs.<key>"
                ));
            }
            return Ok(Reference::StepOutput {
                step_id: step_id.to_string(),
                key: key.to_string(),
            });
        }
        Err(format!(
            "reference `{raw}` must start with `request.inputs.` or `steps.`"
        ))
    }

    pub fn canonical(&self) -> String {
        match self {
            Reference::RequestInput { key } => format!("request.inputs.{key}"),
            Reference::StepOutput { step_id, key } => format!("steps.{step_id}.outputs.{key}"),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl TryFrom<String> for Reference {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Reference> for String {
    fn from(value: Reference) -> Self {
        value.canonical()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepInput {
    Reference {
        #[serde(rename = "$ref")]
        reference: Reference,
    },
    Literal(Value),
}

impl StepInput {
    pub fn reference(reference: Reference) -> Self {
        StepInput::Reference { reference }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        StepInput::Literal(value.into())
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            StepInput::Reference { reference } => Some(reference),
            StepInput::Literal(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityContract {
    pub input_schema: Value,
    pub output_schema: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub version: String,
    pub source_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub step_id: String,
    pub capability: String,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_metadata: Option<ToolMetadata>,
    #[serde(default)]
    pub inputs: BTreeMap<String, StepInput>,
    pub capability_contract: CapabilityContract,
    pub coverage_confidence: f64,
    pub coverage_rationale: String,
    pub planner_source: PlannerSource,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub approval_required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapReason {
    NoCapabilityMatch,
    SchemaIncompatible,
    LowConfidence,
    InvalidCapability,
}

impl GapReason {
    pub fn as_str(self) -> &'static str {
        match self {
            GapReason::NoCapabilityMatch => "no_capability_match",
            GapReason::SchemaIncompatible => "schema_incompatible",
            GapReason::LowConfidence => "low_confidence",
            GapReason::InvalidCapability => "invalid_capability",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapEntry {
    pub step_id: String,
    pub missing_capability: String,
    pub reason: GapReason,
    pub reason_message: String,
    #[serde(default)]
    pub reason_details: Value,
    pub proposed_tool_name: String,
    pub proposed_input_schema: Value,
    pub proposed_output_schema: Value,
    pub priority: GapPriority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPlan {
    pub plan_id: String,
    pub request_id: String,
    pub user_goal: String,
    pub created_at: String,
    pub(crate) status: PlanStatus,
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gap_report: Vec<GapEntry>,
}

impl WorkflowPlan {
    pub(crate) fn planned(request: &Request, steps: Vec<Step>, now: i64) -> Result<Self, String> {
        Ok(Self {
            plan_id: generate_id("plan", now)?,
            request_id: request.request_id.clone(),
            user_goal: request.user_goal.clone(),
            created_at: rfc3339(now),
            status: PlanStatus::Planned,
            steps,
            gap_report: Vec::new(),
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, String> {
        let raw = fs::read_to_string(path)
            .map_err(|err| format!("failed to read plan {}: {err}", path.display()))?;
        let plan: WorkflowPlan = serde_json::from_str(&raw)
            .map_err(|err| format!("invalid plan document {}: {err}", path.display()))?;
        plan.validate_structure()?;
        Ok(plan)
    }

    pub fn status(&self) -> PlanStatus {
        self.status
    }

    pub fn is_complete(&self) -> bool {
        self.status == PlanStatus::Complete
    }

    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.step_id == step_id)
    }

    pub fn validate_structure(&self) -> Result<(), String> {
        let mut seen: Vec<&str> = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            crate::shared::ids::validate_identifier_value("step id", &step.step_id)?;
            if seen.contains(&step.step_id.as_str()) {
                return Err(format!("duplicate step id `{}`", step.step_id));
            }
            for (input, value) in &step.inputs {
                if let StepInput::Literal(Value::Object(fields)) = value {
                    if fields.contains_key("$ref") {
                        return Err(format!(
                            "step `{}` input `{input}` has a malformed reference",
                            step.step_id
                        ));
                    }
                }
                if let Some(Reference::StepOutput { step_id, .. }) = value.as_reference() {
                    if !seen.contains(&step_id.as_str()) {
                        return Err(format!(
                            "step `{}` input `{input}` references `{step_id}`, which does not precede it",
                            step.step_id
                        ));
                    }
                }
            }
            seen.push(step.step_id.as_str());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_inputs_deserialize_references_and_literals() {
        let inputs: BTreeMap<String, StepInput> = serde_json::from_value(json!({
            "url": {"$ref": "request.inputs.url"},
            "file_path": {"$ref": "steps.step-1.outputs.file_path"},
            "name": "clip.mp4",
            "options": {"jobs": 2}
        }))
        .expect("inputs");

        assert_eq!(
            inputs["url"],
            StepInput::reference(Reference::RequestInput {
                key: "url".to_string()
            })
        );
        assert_eq!(
            inputs["file_path"].as_reference().map(Reference::canonical),
            Some("steps.step-1.outputs.file_path".to_string())
        );
        assert_eq!(inputs["name"], StepInput::literal("clip.mp4"));
        assert_eq!(inputs["options"], StepInput::literal(json!({"jobs": 2})));
    }

    #[test]
    fn malformed_reference_text_is_rejected() {
        assert!(Reference::parse("steps.step-1.file_path").is_err());
        assert!(Reference::parse("request.inputs.").is_err());
        assert!(Reference::parse("inputs.url").is_err());
    }

    #[test]
    fn request_document_without_id_gets_generated_id() {
        let request = Request::from_document(
            RequestDocument {
                request_id: None,
                user_goal: "goal".to_string(),
                inputs: Map::new(),
            },
            100,
        )
        .expect("request");
        assert!(request.request_id.starts_with("req-"));
    }
}
