use super::contracts::{
    contract_for, DRIVE_UPLOAD, VIDEO_CONVERT, YANDEX_DISK_UPLOAD, YOUTUBE_DOWNLOAD,
};
use super::normalize::DraftStep;
use super::signals::RequestSignals;
use super::PlanningError;
use crate::plan::{PlannerSource, Request};
use serde_json::{json, Map, Value};

fn request_ref(key: &str) -> Value {
    json!({ "$ref": format!("request.inputs.{key}") })
}

fn input_or(request: &Request, key: &str, extracted: Option<Value>) -> Option<Value> {
    if request.inputs.contains_key(key) {
        return Some(request_ref(key));
    }
    extracted
}

fn rule_step(
    step_id: &str,
    capability: &str,
    inputs: Map<String, Value>,
    rationale: &str,
) -> Result<DraftStep, PlanningError> {
    let contract = contract_for(capability).ok_or_else(|| {
        PlanningError::Validation(format!("no contract is defined for `{capability}`"))
    })?;
    Ok(DraftStep {
        step_id: Some(step_id.to_string()),
        capability: capability.to_string(),
        inputs,
        contract,
        confidence: 1.0,
        rationale: Some(rationale.to_string()),
        source: PlannerSource::Rule,
        risk_level: None,
        approval_required: None,
    })
}

pub(crate) fn plan_from_rules(
    request: &Request,
    signals: &RequestSignals,
) -> Result<Option<Vec<DraftStep>>, PlanningError> {
    let has_source = signals.youtube_url.is_some() || request.inputs.contains_key("url");
    let wants_drive = signals.mentions_drive || request.inputs.contains_key("folder_id");
    let wants_yandex = signals.mentions_yandex || request.inputs.contains_key("folder_path");
    let transfer = has_source || (signals.mentions_upload && (wants_drive || wants_yandex));
    let convert = signals.mentions_conversion
        || !signals.webm_files.is_empty()
        || request.inputs.contains_key("files");

    if convert && transfer {
        return Err(PlanningError::ConflictingIntents {
            intents: "video conversion together with download/upload".to_string(),
        });
    }
    if convert {
        return conversion_plan(request, signals).map(Some);
    }
    if transfer {
        return transfer_plan(request, signals, has_source, wants_drive, wants_yandex);
    }
    Ok(None)
}

fn conversion_plan(
    request: &Request,
    signals: &RequestSignals,
) -> Result<Vec<DraftStep>, PlanningError> {
    let mut inputs = Map::new();
    let files = if signals.webm_files.is_empty() {
        None
    } else {
        Some(json!(signals.webm_files))
    };
    match input_or(request, "files", files) {
        Some(files) if !signals.convert_all => {
            inputs.insert("mode".to_string(), json!("selected"));
            inputs.insert("files".to_string(), files);
        }
        _ => {
            inputs.insert("mode".to_string(), json!("all"));
        }
    }
    for key in ["input_dir", "output_dir", "jobs"] {
        if let Some(value) = input_or(request, key, None) {
            inputs.insert(key.to_string(), value);
        }
    }
    Ok(vec![rule_step(
        "step-1",
        VIDEO_CONVERT,
        inputs,
        "goal asks to convert webm videos to mp4",
    )?])
}

fn transfer_plan(
    request: &Request,
    signals: &RequestSignals,
    has_source: bool,
    wants_drive: bool,
    wants_yandex: bool,
) -> Result<Option<Vec<DraftStep>>, PlanningError> {
    let mut steps = Vec::new();
    let file_path = if has_source {
        let mut inputs = Map::new();
        if let Some(url) = input_or(request, "url", signals.youtube_url.clone().map(Value::from)) {
            inputs.insert("url".to_string(), url);
        }
        if let Some(height) = input_or(request, "min_height", signals.min_height.map(Value::from)) {
            inputs.insert("min_height".to_string(), height);
        }
        for key in ["quality_policy", "cookies_from_browser"] {
            if let Some(value) = input_or(request, key, None) {
                inputs.insert(key.to_string(), value);
            }
        }
        steps.push(rule_step(
            "step-1",
            YOUTUBE_DOWNLOAD,
            inputs,
            "goal contains a youtube video source",
        )?);
        Some(json!({ "$ref": "steps.step-1.outputs.file_path" }))
    } else {
        input_or(request, "file_path", None)
    };

    let Some(file_path) = file_path else {
        return Ok(None);
    };

    let mut unresolved_target = false;
    if wants_drive {
        if let Some(folder_id) = input_or(
            request,
            "folder_id",
            signals.drive_folder_id.clone().map(Value::from),
        ) {
            let mut inputs = Map::new();
            inputs.insert("file_path".to_string(), file_path.clone());
            inputs.insert("folder_id".to_string(), folder_id);
            for key in ["name", "mime_type"] {
                if let Some(value) = input_or(request, key, None) {
                    inputs.insert(key.to_string(), value);
                }
            }
            let step_id = format!("step-{}", steps.len() + 1);
            steps.push(rule_step(
                &step_id,
                DRIVE_UPLOAD,
                inputs,
                "goal targets a google drive folder",
            )?);
        } else {
            unresolved_target = true;
        }
    }
    if wants_yandex {
        if let Some(folder_path) = input_or(
            request,
            "folder_path",
            signals.yandex_folder_path.clone().map(Value::from),
        ) {
            let mut inputs = Map::new();
            inputs.insert("file_path".to_string(), file_path.clone());
            inputs.insert("folder_path".to_string(), folder_path);
            if let Some(value) = input_or(request, "overwrite", None) {
                inputs.insert("overwrite".to_string(), value);
            }
            let step_id = format!("step-{}", steps.len() + 1);
            steps.push(rule_step(
                &step_id,
                YANDEX_DISK_UPLOAD,
                inputs,
                "goal targets a yandex disk folder",
            )?);
        } else {
            unresolved_target = true;
        }
    }

    if unresolved_target || steps.is_empty() {
        return Ok(None);
    }
    Ok(Some(steps))
}
