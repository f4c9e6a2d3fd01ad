use super::normalize::DraftStep;
use super::PlanningError;
use crate::plan::{CapabilityContract, PlannerSource, RiskLevel};
use crate::schema::is_object_schema;
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("inference transport failed: {0}")]
    Transport(String),
    #[error("inference endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("inference response is invalid: {0}")]
    InvalidResponse(String),
}

pub trait PlanInference {
    fn plan_workflow(&self, goal: &str, context: &Value) -> Result<Value, InferenceError>;
}

fn field_str<'a>(step: &'a Map<String, Value>, key: &str) -> Result<Option<&'a str>, String> {
    match step.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(_) => Err(format!("`{key}` must be a string")),
    }
}

fn parse_contract(step: &Map<String, Value>) -> Result<CapabilityContract, String> {
    let contract = step
        .get("capability_contract")
        .and_then(Value::as_object)
        .ok_or_else(|| "missing `capability_contract`".to_string())?;
    let input_schema = contract
        .get("input_schema")
        .filter(|schema| schema.is_object())
        .ok_or_else(|| "`capability_contract.input_schema` must be an object".to_string())?;
    let output_schema = contract
        .get("output_schema")
        .filter(|schema| schema.is_object())
        .ok_or_else(|| "`capability_contract.output_schema` must be an object".to_string())?;
    if !is_object_schema(input_schema) || !is_object_schema(output_schema) {
        tracing::debug!("inferred contract is not object-typed; gap detection will flag it");
    }
    Ok(CapabilityContract {
        input_schema: input_schema.clone(),
        output_schema: output_schema.clone(),
    })
}

fn parse_step(step: &Value) -> Result<DraftStep, String> {
    let step = step
        .as_object()
        .ok_or_else(|| "step must be an object".to_string())?;
    let inputs = match step.get("inputs") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(inputs)) => inputs.clone(),
        Some(_) => return Err("`inputs` must be an object".to_string()),
    };
    let confidence = match step.get("coverage_confidence") {
        None | Some(Value::Null) => 0.0,
        Some(value) => value
            .as_f64()
            .ok_or_else(|| "`coverage_confidence` must be a number".to_string())?,
    };
    let risk_level = match field_str(step, "risk_level")? {
        None => None,
        Some(raw) => Some(
            serde_json::from_value::<RiskLevel>(Value::String(raw.to_string()))
                .map_err(|_| format!("unknown risk_level `{raw}`"))?,
        ),
    };
    Ok(DraftStep {
        step_id: field_str(step, "step_id")?.map(str::to_string),
        capability: field_str(step, "capability")?.unwrap_or_default().to_string(),
        inputs,
        contract: parse_contract(step)?,
        confidence,
        rationale: field_str(step, "coverage_rationale")?.map(str::to_string),
        source: PlannerSource::Llm,
        risk_level,
        approval_required: step.get("approval_required").and_then(Value::as_bool),
    })
}

pub(crate) fn parse_inference_steps(payload: &Value) -> Result<Vec<DraftStep>, PlanningError> {
    let steps = payload
        .get("steps")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            PlanningError::Validation("inferred plan must contain a `steps` array".to_string())
        })?;
    steps
        .iter()
        .enumerate()
        .map(|(index, step)| {
            parse_step(step).map_err(|err| {
                PlanningError::Validation(format!("inferred step {}: {err}", index + 1))
            })
        })
        .collect()
}
