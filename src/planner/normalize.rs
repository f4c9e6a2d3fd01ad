use super::contracts::{DRIVE_UPLOAD, YANDEX_DISK_UPLOAD};
use crate::plan::{CapabilityContract, PlannerSource, Reference, RiskLevel, Step, StepInput};
use crate::shared::ids::validate_identifier_value;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub(crate) const MISSING_RATIONALE: &str = "no rationale provided";

#[derive(Debug, Clone)]
pub(crate) struct DraftStep {
    pub step_id: Option<String>,
    pub capability: String,
    pub inputs: Map<String, Value>,
    pub contract: CapabilityContract,
    pub confidence: f64,
    pub rationale: Option<String>,
    pub source: PlannerSource,
    pub risk_level: Option<RiskLevel>,
    pub approval_required: Option<bool>,
}

fn default_risk(capability: &str) -> RiskLevel {
    match capability {
        DRIVE_UPLOAD | YANDEX_DISK_UPLOAD => RiskLevel::Medium,
        _ => RiskLevel::Low,
    }
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

pub(crate) fn normalize_steps(drafts: Vec<DraftStep>) -> Result<Vec<Step>, String> {
    let mut steps: Vec<Step> = Vec::with_capacity(drafts.len());
    for (index, draft) in drafts.into_iter().enumerate() {
        let step_id = match draft.step_id.map(|id| id.trim().to_string()) {
            Some(id) if !id.is_empty() => id,
            _ => format!("step-{}", index + 1),
        };
        validate_identifier_value("step id", &step_id)?;
        if steps.iter().any(|step| step.step_id == step_id) {
            return Err(format!("duplicate step id `{step_id}`"));
        }

        let prior: Vec<&str> = steps.iter().map(|step| step.step_id.as_str()).collect();
        let mut inputs = BTreeMap::new();
        for (name, value) in draft.inputs {
            let input = normalize_input(value, &prior)
                .map_err(|err| format!("step `{step_id}` input `{name}`: {err}"))?;
            inputs.insert(name, input);
        }

        let risk_level = draft
            .risk_level
            .unwrap_or_else(|| default_risk(&draft.capability));
        let rationale = draft
            .rationale
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| MISSING_RATIONALE.to_string());
        steps.push(Step {
            step_id,
            capability: draft.capability.trim().to_string(),
            tool: None,
            tool_metadata: None,
            inputs,
            capability_contract: draft.contract,
            coverage_confidence: clamp_confidence(draft.confidence),
            coverage_rationale: rationale,
            planner_source: draft.source,
            risk_level,
            approval_required: draft
                .approval_required
                .unwrap_or(risk_level == RiskLevel::High),
        });
    }
    Ok(steps)
}

fn normalize_input(value: Value, prior: &[&str]) -> Result<StepInput, String> {
    match value {
        Value::Object(fields) if fields.contains_key("$ref") => {
            if fields.len() != 1 {
                return Err("a `$ref` object must not carry other fields".to_string());
            }
            let Some(raw) = fields.get("$ref").and_then(Value::as_str) else {
                return Err("`$ref` must be a string".to_string());
            };
            let reference = rewrite_reference(raw, prior, true)?
                .ok_or_else(|| format!("`{raw}` is not a reference"))?;
            Ok(StepInput::reference(reference))
        }
        Value::String(text) => {
            let (body, wrapped) = unwrap_expression(&text);
            match rewrite_reference(body, prior, wrapped)? {
                Some(reference) => Ok(StepInput::reference(reference)),
                None => Ok(StepInput::Literal(Value::String(text))),
            }
        }
        other => Ok(StepInput::Literal(other)),
    }
}

fn unwrap_expression(text: &str) -> (&str, bool) {
    let trimmed = text.trim();
    if let Some(inner) = trimmed
        .strip_prefix("{{")
        .and_then(|rest| rest.strip_suffix("}}"))
    {
        return (inner.trim(), true);
    }
    if let Some(inner) = trimmed
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
    {
        return (inner.trim(), true);
    }
    if let Some(inner) = trimmed.strip_prefix('$') {
        let starts_like_name = inner
            .chars()
            .next()
            .is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '_');
        if starts_like_name && inner.contains('.') && !inner.contains(char::is_whitespace) {
            return (inner, true);
        }
    }
    (trimmed, false)
}

fn is_reference_key(key: &str) -> bool {
    !key.is_empty() && !key.contains(char::is_whitespace)
}

fn step_output(step_id: &str, key: &str, prior: &[&str]) -> Result<Reference, String> {
    if !prior.contains(&step_id) {
        return Err(format!(
            "reference to step `{step_id}`, which is unknown or does not precede this step"
        ));
    }
    if !is_reference_key(key) {
        return Err(format!("reference to step `{step_id}` has an invalid key `{key}`"));
    }
    Ok(Reference::StepOutput {
        step_id: step_id.to_string(),
        key: key.to_string(),
    })
}

pub(crate) fn rewrite_reference(
    body: &str,
    prior: &[&str],
    wrapped: bool,
) -> Result<Option<Reference>, String> {
    if body.contains(char::is_whitespace) {
        return if wrapped {
            Err(format!("`{body}` is not a valid reference"))
        } else {
            Ok(None)
        };
    }
    if let Some(key) = body.strip_prefix("request.inputs.") {
        if !is_reference_key(key) {
            return Err(format!("`{body}` is missing an input key"));
        }
        return Ok(Some(Reference::RequestInput {
            key: key.to_string(),
        }));
    }
    if wrapped {
        if let Some(key) = body.strip_prefix("inputs.") {
            if !is_reference_key(key) {
                return Err(format!("`{body}` is missing an input key"));
            }
            return Ok(Some(Reference::RequestInput {
                key: key.to_string(),
            }));
        }
    }
    if let Some(rest) = body.strip_prefix("steps.") {
        if let Some((step_id, key)) = rest.split_once(".outputs.") {
            return step_output(step_id, key, prior).map(Some);
        }
        match rest.split_once('.') {
            Some((step_id, key)) if wrapped || prior.contains(&step_id) => {
                return step_output(step_id, key, prior).map(Some);
            }
            None if wrapped => return Err(format!("`{body}` must name a step output")),
            _ => return Ok(None),
        }
    }
    if let Some((step_id, key)) = body.split_once(".outputs.") {
        if prior.contains(&step_id) || wrapped {
            return step_output(step_id, key, prior).map(Some);
        }
        return Ok(None);
    }
    if let Some((step_id, key)) = body.split_once('.') {
        if wrapped || prior.contains(&step_id) {
            return step_output(step_id, key, prior).map(Some);
        }
    }
    if wrapped {
        return Err(format!("`{body}` is not a valid reference"));
    }
    Ok(None)
}
