use crate::plan::{Reference, Step, StepInput};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    }
}

fn lookup<'a>(
    reference: &Reference,
    request_inputs: &'a Map<String, Value>,
    step_outputs: &'a BTreeMap<String, Map<String, Value>>,
) -> Option<&'a Value> {
    let value = match reference {
        Reference::RequestInput { key } => request_inputs.get(key),
        Reference::StepOutput { step_id, key } => step_outputs.get(step_id)?.get(key),
    };
    value.filter(|value| !is_blank(value))
}

pub(crate) fn resolve_inputs(
    step: &Step,
    request_inputs: &Map<String, Value>,
    step_outputs: &BTreeMap<String, Map<String, Value>>,
    dry_run: bool,
) -> Result<Map<String, Value>, String> {
    let mut resolved = Map::new();
    for (name, input) in &step.inputs {
        let value = match input {
            StepInput::Literal(value) => value.clone(),
            StepInput::Reference { reference } => {
                match lookup(reference, request_inputs, step_outputs) {
                    Some(value) => value.clone(),
                    None if dry_run => Value::String(reference.canonical()),
                    None => {
                        return Err(format!(
                            "input `{name}` references `{reference}`, which is missing or blank"
                        ))
                    }
                }
            }
        };
        resolved.insert(name.clone(), value);
    }
    Ok(resolved)
}
