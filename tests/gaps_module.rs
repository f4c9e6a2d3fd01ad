use capflow::gaps::{detect_gaps, GapDetectorConfig};
use capflow::plan::{GapPriority, GapReason, PlanStatus, WorkflowPlan};
use capflow::registry::{
    Entrypoint, EntrypointKind, Idempotency, Registry, Stability, ToolRecord,
};
use serde_json::{json, Value};

fn download_input() -> Value {
    json!({
        "type": "object",
        "required": ["url"],
        "properties": {"url": {"type": "string"}, "min_height": {"type": "integer"}}
    })
}

fn download_output() -> Value {
    json!({
        "type": "object",
        "required": ["file_path"],
        "properties": {"file_path": {"type": "string"}}
    })
}

fn tool(name: &str, version: &str, capability: &str, input: Value, output: Value) -> ToolRecord {
    ToolRecord {
        id: format!("{name}@{version}"),
        name: name.to_string(),
        version: version.to_string(),
        description: String::new(),
        capabilities: vec![capability.to_string()],
        input_schema: input,
        output_schema: output,
        entrypoint: Entrypoint {
            kind: EntrypointKind::Shell,
            command: "sh tool.sh".to_string(),
        },
        idempotency: Idempotency::Safe,
        stability: Stability::Stable,
        source_path: format!("/opt/tools/{name}/manifest.json"),
    }
}

fn step(step_id: &str, capability: &str, source: &str, confidence: f64) -> Value {
    json!({
        "step_id": step_id,
        "capability": capability,
        "inputs": {"url": {"$ref": "request.inputs.url"}},
        "capability_contract": {
            "input_schema": download_input(),
            "output_schema": download_output()
        },
        "coverage_confidence": confidence,
        "coverage_rationale": "test step",
        "planner_source": source,
        "risk_level": "low"
    })
}

fn plan(steps: Vec<Value>) -> WorkflowPlan {
    serde_json::from_value(json!({
        "plan_id": "plan-test",
        "request_id": "req-test",
        "user_goal": "fetch a video",
        "created_at": "2024-01-01T00:00:00Z",
        "status": "planned",
        "steps": steps
    }))
    .expect("decode plan")
}

#[test]
fn compatible_tools_are_bound_and_plan_is_complete() {
    let registry = Registry::from_records(vec![
        tool("fetch-a", "1.0.0", "youtube.download", download_input(), download_output()),
        tool("fetch-b", "2.1.0", "youtube.download", download_input(), download_output()),
    ]);
    let gated = detect_gaps(
        &plan(vec![step("step-1", "youtube.download", "rule", 1.0)]),
        &registry,
        &GapDetectorConfig::default(),
    );

    assert_eq!(gated.status(), PlanStatus::Complete);
    assert!(gated.gap_report.is_empty());
    let step = &gated.steps[0];
    assert_eq!(step.tool.as_deref(), Some("fetch-b@2.1.0"));
    let metadata = step.tool_metadata.as_ref().expect("tool metadata");
    assert_eq!(metadata.name, "fetch-b");
    assert_eq!(metadata.version, "2.1.0");
    assert_eq!(metadata.source_path, "/opt/tools/fetch-b/manifest.json");
}

#[test]
fn missing_capabilities_become_prioritized_gaps() {
    let registry = Registry::from_records(vec![tool(
        "fetch-a",
        "1.0.0",
        "youtube.download",
        download_input(),
        download_output(),
    )]);
    let gated = detect_gaps(
        &plan(vec![
            step("step-1", "yandex.disk.upload", "rule", 1.0),
            step("step-2", "youtube.download", "rule", 1.0),
            step("step-3", "pdf.merge", "rule", 1.0),
        ]),
        &registry,
        &GapDetectorConfig::default(),
    );

    assert_eq!(gated.status(), PlanStatus::PartialComplete);
    assert_eq!(gated.gap_report.len(), 2);
    let first = &gated.gap_report[0];
    assert_eq!(first.step_id, "step-1");
    assert_eq!(first.reason, GapReason::NoCapabilityMatch);
    assert_eq!(first.priority, GapPriority::High);
    assert_eq!(first.proposed_tool_name, "yandex-disk-uploader");
    assert_eq!(first.proposed_input_schema, download_input());
    assert_eq!(first.proposed_output_schema, download_output());

    let last = &gated.gap_report[1];
    assert_eq!(last.step_id, "step-3");
    assert_eq!(last.priority, GapPriority::Medium);
    assert_eq!(last.proposed_tool_name, "pdf-merger");

    assert_eq!(gated.steps[1].tool.as_deref(), Some("fetch-a@1.0.0"));
    assert!(gated.steps[0].tool.is_none());
}

#[test]
fn contract_mismatches_skip_incompatible_candidates() {
    let needs_cookies = json!({
        "type": "object",
        "required": ["url", "cookies"],
        "properties": {"url": {"type": "string"}, "cookies": {"type": "string"}}
    });
    let narrow_output = json!({
        "type": "object",
        "properties": {"file_path": {"type": "string"}}
    });

    let only_incompatible = Registry::from_records(vec![
        tool(
            "fetch-cookies",
            "3.0.0",
            "youtube.download",
            needs_cookies.clone(),
            download_output(),
        ),
        tool("fetch-loose", "3.0.0", "youtube.download", download_input(), narrow_output),
    ]);
    let gated = detect_gaps(
        &plan(vec![step("step-1", "youtube.download", "rule", 1.0)]),
        &only_incompatible,
        &GapDetectorConfig::default(),
    );
    assert_eq!(gated.status(), PlanStatus::PartialComplete);
    let gap = &gated.gap_report[0];
    assert_eq!(gap.reason, GapReason::SchemaIncompatible);
    let candidates = gap.reason_details["candidates"]
        .as_object()
        .expect("candidate details");
    assert!(candidates["fetch-cookies@3.0.0"]["input"][0]
        .as_str()
        .expect("input mismatch")
        .contains("cookies"));
    assert!(candidates["fetch-loose@3.0.0"]["output"][0]
        .as_str()
        .expect("output mismatch")
        .contains("file_path"));

    let with_fallback = Registry::from_records(vec![
        tool("fetch-cookies", "3.0.0", "youtube.download", needs_cookies, download_output()),
        tool("fetch-basic", "1.0.0", "youtube.download", download_input(), download_output()),
    ]);
    let gated = detect_gaps(
        &plan(vec![step("step-1", "youtube.download", "rule", 1.0)]),
        &with_fallback,
        &GapDetectorConfig::default(),
    );
    assert_eq!(gated.status(), PlanStatus::Complete);
    assert_eq!(gated.steps[0].tool.as_deref(), Some("fetch-basic@1.0.0"));
}

#[test]
fn non_object_contracts_are_schema_incompatible() {
    let registry = Registry::from_records(vec![tool(
        "fetch-a",
        "1.0.0",
        "youtube.download",
        download_input(),
        download_output(),
    )]);
    let mut broken = step("step-1", "youtube.download", "llm", 0.95);
    broken["capability_contract"]["input_schema"] = json!({"type": "string"});

    let gated = detect_gaps(&plan(vec![broken]), &registry, &GapDetectorConfig::default());
    let gap = &gated.gap_report[0];
    assert_eq!(gap.reason, GapReason::SchemaIncompatible);
    assert_eq!(gap.reason_details["contract_invalid"], json!(true));
}

#[test]
fn confidence_gate_applies_only_to_inferred_steps() {
    let registry = Registry::from_records(vec![tool(
        "fetch-a",
        "1.0.0",
        "youtube.download",
        download_input(),
        download_output(),
    )]);
    let steps = plan(vec![
        step("inferred", "youtube.download", "llm", 0.6),
        step("ruled", "youtube.download", "rule", 0.1),
    ]);

    let gated = detect_gaps(&steps, &registry, &GapDetectorConfig::default());
    assert_eq!(gated.gap_report.len(), 1);
    let gap = &gated.gap_report[0];
    assert_eq!(gap.step_id, "inferred");
    assert_eq!(gap.reason, GapReason::LowConfidence);
    assert_eq!(gap.reason_details["threshold"], json!(0.75));
    assert!(gated.steps[0].tool.is_none());
    assert_eq!(gated.steps[1].tool.as_deref(), Some("fetch-a@1.0.0"));

    let lenient = detect_gaps(
        &steps,
        &registry,
        &GapDetectorConfig {
            confidence_threshold: 0.5,
        },
    );
    assert_eq!(lenient.status(), PlanStatus::Complete);
}

#[test]
fn rerunning_detection_discards_stale_bindings() {
    let registry = Registry::from_records(vec![tool(
        "fetch-a",
        "1.0.0",
        "youtube.download",
        download_input(),
        download_output(),
    )]);
    let mut stale = step("step-1", "drive.upload", "rule", 1.0);
    stale["tool"] = json!("retired-uploader@0.1.0");
    let input = plan(vec![step("step-0", "youtube.download", "rule", 1.0), stale]);

    let once = detect_gaps(&input, &registry, &GapDetectorConfig::default());
    let twice = detect_gaps(&once, &registry, &GapDetectorConfig::default());

    assert_eq!(once, twice);
    assert!(once.steps[1].tool.is_none());
    assert_eq!(once.gap_report.len(), 1);
    assert_eq!(once.gap_report[0].reason, GapReason::NoCapabilityMatch);
}

#[test]
fn tightening_the_contract_moves_a_bound_step_into_a_gap() {
    let registry = Registry::from_records(vec![tool(
        "fetch-a",
        "1.0.0",
        "youtube.download",
        download_input(),
        download_output(),
    )]);
    let relaxed = plan(vec![step("step-1", "youtube.download", "llm", 0.9)]);
    let gated = detect_gaps(&relaxed, &registry, &GapDetectorConfig::default());
    assert_eq!(gated.status(), PlanStatus::Complete);

    let mut tightened_step = step("step-1", "youtube.download", "llm", 0.9);
    tightened_step["capability_contract"]["input_schema"] = json!({
        "type": "object",
        "required": ["url", "token"],
        "properties": {"url": {"type": "string"}, "token": {"type": "string"}}
    });
    let gated = detect_gaps(
        &plan(vec![tightened_step]),
        &registry,
        &GapDetectorConfig::default(),
    );
    assert_eq!(gated.status(), PlanStatus::PartialComplete);
    assert_eq!(gated.gap_report[0].reason, GapReason::SchemaIncompatible);
    assert!(gated.steps[0].tool.is_none());
}
