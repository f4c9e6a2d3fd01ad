use capflow::plan::{PlanStatus, PlannerSource, Reference, Request, RiskLevel, StepInput};
use capflow::planner::{
    InferenceError, PlanInference, Planner, PlanningError, DRIVE_UPLOAD, VIDEO_CONVERT,
    YOUTUBE_DOWNLOAD,
};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

const NOW: i64 = 1_700_000_000;

fn request(goal: &str, inputs: Value) -> Request {
    let inputs: Map<String, Value> = inputs.as_object().cloned().expect("inputs object");
    Request::new(goal, inputs, NOW).expect("request")
}

fn step_output(step_id: &str, key: &str) -> StepInput {
    StepInput::reference(Reference::StepOutput {
        step_id: step_id.to_string(),
        key: key.to_string(),
    })
}

fn request_input(key: &str) -> StepInput {
    StepInput::reference(Reference::RequestInput {
        key: key.to_string(),
    })
}

fn object_contract() -> Value {
    json!({
        "input_schema": {"type": "object"},
        "output_schema": {"type": "object"}
    })
}

struct ScriptedInference {
    calls: Arc<AtomicU32>,
    contexts: Arc<Mutex<Vec<Value>>>,
    reply: Result<Value, String>,
}

impl ScriptedInference {
    fn replying(reply: Value) -> Self {
        Self {
            calls: Arc::new(AtomicU32::new(0)),
            contexts: Arc::new(Mutex::new(Vec::new())),
            reply: Ok(reply),
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            calls: Arc::new(AtomicU32::new(0)),
            contexts: Arc::new(Mutex::new(Vec::new())),
            reply: Err(message.to_string()),
        }
    }
}

impl PlanInference for ScriptedInference {
    fn plan_workflow(&self, _goal: &str, context: &Value) -> Result<Value, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.contexts
            .lock()
            .expect("contexts lock")
            .push(context.clone());
        self.reply
            .clone()
            .map_err(InferenceError::Transport)
    }
}

#[test]
fn youtube_to_drive_goal_routes_through_rules() {
    let planner = Planner::rules_only();
    let request = request(
        "Download https://www.youtube.com/watch?v=abc123 in 1080p and upload it to https://drive.google.com/drive/folders/1AbCdEfGhIjK",
        json!({}),
    );

    let plan = planner.route(&request, NOW).expect("route");

    assert_eq!(plan.status(), PlanStatus::Planned);
    assert_eq!(plan.request_id, request.request_id);
    assert!(plan.plan_id.starts_with("plan-"));
    assert_eq!(plan.steps.len(), 2);

    let download = &plan.steps[0];
    assert_eq!(download.step_id, "step-1");
    assert_eq!(download.capability, YOUTUBE_DOWNLOAD);
    assert_eq!(download.planner_source, PlannerSource::Rule);
    assert_eq!(download.coverage_confidence, 1.0);
    assert_eq!(download.risk_level, RiskLevel::Low);
    assert_eq!(
        download.inputs["url"],
        StepInput::literal("https://www.youtube.com/watch?v=abc123")
    );
    assert_eq!(download.inputs["min_height"], StepInput::literal(1080));

    let upload = &plan.steps[1];
    assert_eq!(upload.capability, DRIVE_UPLOAD);
    assert_eq!(upload.risk_level, RiskLevel::Medium);
    assert!(!upload.approval_required);
    assert_eq!(upload.inputs["file_path"], step_output("step-1", "file_path"));
    assert_eq!(upload.inputs["folder_id"], StepInput::literal("1AbCdEfGhIjK"));
    assert!(upload.tool.is_none());

    let encoded = serde_json::to_value(&plan).expect("encode plan");
    assert_eq!(
        encoded["steps"][1]["inputs"]["file_path"],
        json!({"$ref": "steps.step-1.outputs.file_path"})
    );
    assert_eq!(encoded["status"], json!("planned"));
}

#[test]
fn request_inputs_take_precedence_over_goal_text() {
    let planner = Planner::rules_only();
    let request = request(
        "download the video and upload to google drive",
        json!({"url": "https://youtu.be/zzz", "folder_id": "FOLDER123"}),
    );

    let plan = planner.route(&request, NOW).expect("route");

    assert_eq!(plan.steps.len(), 2);
    assert_eq!(plan.steps[0].inputs["url"], request_input("url"));
    assert_eq!(plan.steps[1].inputs["folder_id"], request_input("folder_id"));
}

#[test]
fn webm_conversion_selects_named_files() {
    let planner = Planner::rules_only();
    let plan = planner
        .route(
            &request("convert intro.webm and outro.webm to mp4", json!({})),
            NOW,
        )
        .expect("route");

    assert_eq!(plan.steps.len(), 1);
    let step = &plan.steps[0];
    assert_eq!(step.capability, VIDEO_CONVERT);
    assert_eq!(step.inputs["mode"], StepInput::literal("selected"));
    assert_eq!(
        step.inputs["files"],
        StepInput::literal(json!(["intro.webm", "outro.webm"]))
    );

    let all = planner
        .route(
            &request("convert all webm files to mp4", json!({"jobs": 4})),
            NOW,
        )
        .expect("route all");
    assert_eq!(all.steps[0].inputs["mode"], StepInput::literal("all"));
    assert_eq!(all.steps[0].inputs["jobs"], request_input("jobs"));
}

#[test]
fn conversion_mixed_with_transfer_is_a_conflict() {
    let planner = Planner::rules_only();
    let err = planner
        .route(
            &request(
                "convert clip.webm to mp4 and upload https://youtu.be/abc to drive",
                json!({}),
            ),
            NOW,
        )
        .expect_err("conflict");
    match err {
        PlanningError::ConflictingIntents { .. } => {}
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn unmatched_goal_without_backend_fails_closed() {
    let planner = Planner::rules_only();
    let err = planner
        .route(&request("summarize the quarterly report", json!({})), NOW)
        .expect_err("no backend");
    assert_eq!(err.code(), "routing.no_inference_backend");
}

#[test]
fn inferred_steps_are_normalized() {
    let inference = ScriptedInference::replying(json!({
        "steps": [
            {
                "step_id": "transcribe",
                "capability": "audio.transcribe",
                "inputs": {"audio": "{{inputs.audio_path}}", "language": "en"},
                "capability_contract": object_contract(),
                "coverage_confidence": 0.9,
                "coverage_rationale": "speech to text"
            },
            {
                "capability": "text.translate",
                "inputs": {"text": "${transcribe.transcript}", "price": "$5.00"},
                "capability_contract": object_contract(),
                "coverage_confidence": 1.4,
                "risk_level": "high"
            }
        ]
    }));
    let contexts = Arc::clone(&inference.contexts);
    let planner = Planner::new(Some(Box::new(inference)), 3)
        .with_known_capabilities(vec!["audio.transcribe".to_string()]);
    assert!(planner.has_inference());

    let plan = planner
        .route(
            &request(
                "transcribe the meeting recording and translate it",
                json!({"audio_path": "/tmp/meeting.wav"}),
            ),
            NOW,
        )
        .expect("route");

    assert_eq!(plan.steps.len(), 2);
    let first = &plan.steps[0];
    assert_eq!(first.planner_source, PlannerSource::Llm);
    assert_eq!(first.inputs["audio"], request_input("audio_path"));
    assert_eq!(first.inputs["language"], StepInput::literal("en"));

    let second = &plan.steps[1];
    assert_eq!(second.step_id, "step-2");
    assert_eq!(second.coverage_confidence, 1.0);
    assert_eq!(second.coverage_rationale, "no rationale provided");
    assert!(second.approval_required);
    assert_eq!(second.inputs["text"], step_output("transcribe", "transcript"));
    assert_eq!(second.inputs["price"], StepInput::literal("$5.00"));

    let contexts = contexts.lock().expect("contexts lock");
    assert_eq!(contexts.len(), 1);
    assert_eq!(contexts[0]["capabilities"], json!(["audio.transcribe"]));
    assert_eq!(contexts[0]["inputs"]["audio_path"], json!("/tmp/meeting.wav"));
}

#[test]
fn inference_failures_are_retried_up_to_the_call_budget() {
    let inference = ScriptedInference::failing("connection refused");
    let calls = Arc::clone(&inference.calls);
    let planner = Planner::new(Some(Box::new(inference)), 3);

    let err = planner
        .route(&request("summarize the quarterly report", json!({})), NOW)
        .expect_err("inference failure");

    match err {
        PlanningError::Inference { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn invalid_inferred_plans_are_rejected() {
    let forward = ScriptedInference::replying(json!({
        "steps": [
            {
                "capability": "text.summarize",
                "inputs": {"text": "{{ steps.later.outputs.text }}"},
                "capability_contract": object_contract()
            },
            {
                "step_id": "later",
                "capability": "text.extract",
                "capability_contract": object_contract()
            }
        ]
    }));
    let err = Planner::new(Some(Box::new(forward)), 1)
        .route(&request("summarize the notes", json!({})), NOW)
        .expect_err("forward reference");
    assert_eq!(err.code(), "validation.plan");
    assert!(err.to_string().contains("later"));

    let missing_contract = ScriptedInference::replying(json!({
        "steps": [{"capability": "text.summarize"}]
    }));
    let err = Planner::new(Some(Box::new(missing_contract)), 1)
        .route(&request("summarize the notes", json!({})), NOW)
        .expect_err("missing contract");
    match err {
        PlanningError::Validation(message) => assert!(message.contains("capability_contract")),
        other => panic!("unexpected error: {other:?}"),
    }

    let empty = ScriptedInference::replying(json!({"steps": []}));
    let err = Planner::new(Some(Box::new(empty)), 1)
        .route(&request("summarize the notes", json!({})), NOW)
        .expect_err("empty plan");
    assert_eq!(err.code(), "routing.no_match");
}

#[test]
fn dotted_literals_survive_normalization() {
    let inference = ScriptedInference::replying(json!({
        "steps": [
            {
                "step_id": "archive",
                "capability": "files.archive",
                "inputs": {"output": "steps.txt", "target": "steps.backup"},
                "capability_contract": object_contract(),
                "coverage_confidence": 0.9,
                "coverage_rationale": "bundle notes"
            },
            {
                "capability": "files.upload",
                "inputs": {"file": "archive.path", "name": "archive-notes.tar"},
                "capability_contract": object_contract(),
                "coverage_confidence": 0.9,
                "coverage_rationale": "ship bundle"
            }
        ]
    }));
    let plan = Planner::new(Some(Box::new(inference)), 1)
        .route(&request("archive my notes and upload them", json!({})), NOW)
        .expect("route");

    let archive = &plan.steps[0];
    assert_eq!(archive.inputs["output"], StepInput::literal("steps.txt"));
    assert_eq!(archive.inputs["target"], StepInput::literal("steps.backup"));
    let upload = &plan.steps[1];
    assert_eq!(upload.inputs["file"], step_output("archive", "path"));
    assert_eq!(upload.inputs["name"], StepInput::literal("archive-notes.tar"));
}
