use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;

fn run(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_capflow"))
        .args(args)
        .env("CAPFLOW_HOME", home)
        .env_remove("CAPFLOW_CONFIG")
        .env_remove("CAPFLOW_LOG")
        .output()
        .expect("run capflow")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn assert_ok(output: &Output) {
    assert!(
        output.status.success(),
        "stdout:\n{}\nstderr:\n{}",
        stdout(output),
        stderr(output)
    );
}

fn assert_err_contains(output: &Output, needle: &str) {
    assert!(
        !output.status.success(),
        "expected failure, stdout:\n{}\nstderr:\n{}",
        stdout(output),
        stderr(output)
    );
    let text = format!("{}{}", stdout(output), stderr(output));
    assert!(
        text.contains(needle),
        "expected output to contain `{needle}`, got:\n{text}"
    );
}

fn json_stdout(output: &Output) -> Value {
    assert_ok(output);
    serde_json::from_str(&stdout(output)).expect("stdout is json")
}

fn install_tool(home: &Path, name: &str, capability: &str, script: &str, output_schema: Value) {
    let tool_dir = home.join("tools").join(name);
    fs::create_dir_all(&tool_dir).expect("create tool dir");
    fs::write(tool_dir.join("tool.sh"), script).expect("write script");
    let manifest = json!({
        "name": name,
        "version": "1.0.0",
        "capabilities": [capability],
        "input_schema": {
            "type": "object",
            "required": ["url"],
            "properties": {
                "url": {"type": "string", "minLength": 1},
                "min_height": {"type": "integer"},
                "quality_policy": {"type": "string", "enum": ["strict", "best_available"]},
                "cookies_from_browser": {"type": "string"}
            }
        },
        "output_schema": output_schema,
        "entrypoint": {"type": "shell", "command": "sh tool.sh"},
        "idempotency": "safe"
    });
    fs::write(
        tool_dir.join("manifest.json"),
        serde_json::to_vec_pretty(&manifest).expect("encode manifest"),
    )
    .expect("write manifest");
}

fn install_downloader(home: &Path) {
    install_tool(
        home,
        "yt-fetch",
        "youtube.download",
        "echo \"$1\" > last-url.txt\necho 'Saved: /tmp/capflow-cli/clip.mp4'\n",
        json!({
            "type": "object",
            "required": ["file_path"],
            "properties": {"file_path": {"type": "string", "minLength": 1}}
        }),
    );
}

fn write_request(home: &Path, goal: &str, inputs: Value) -> String {
    let path = home.join("request.json");
    fs::write(
        &path,
        serde_json::to_vec(&json!({"user_goal": goal, "inputs": inputs})).expect("encode request"),
    )
    .expect("write request");
    path.display().to_string()
}

#[test]
fn help_and_unknown_commands() {
    let home = tempdir().expect("tempdir");

    let help = run(home.path(), &["help"]);
    assert_ok(&help);
    let text = stdout(&help);
    for verb in [
        "validate",
        "build-registry",
        "resolve",
        "route",
        "gaps",
        "policy",
        "execute",
        "run",
    ] {
        assert!(text.contains(verb), "help is missing `{verb}`:\n{text}");
    }

    let unknown = run(home.path(), &["deploy"]);
    assert_err_contains(&unknown, "error[usage]: unknown command `deploy`");
}

#[test]
fn registry_commands_validate_build_and_resolve() {
    let home = tempdir().expect("tempdir");
    install_downloader(home.path());

    let validated = json_stdout(&run(home.path(), &["validate"]));
    assert_eq!(validated["valid"], json!(true));
    assert_eq!(validated["tools"], json!(["yt-fetch@1.0.0"]));

    let built = json_stdout(&run(home.path(), &["build-registry"]));
    assert_eq!(built["tools"], json!(1));
    assert!(home.path().join("registry/registry.json").exists());

    let resolved = json_stdout(&run(home.path(), &["resolve", "youtube.download"]));
    assert_eq!(resolved["id"], json!("yt-fetch@1.0.0"));

    let missing = run(home.path(), &["resolve", "pdf.merge"]);
    assert_err_contains(&missing, "error[registry.capability_not_found]");

    let usage = run(home.path(), &["resolve"]);
    assert_err_contains(&usage, "usage: capflow resolve <capability>");
}

#[test]
fn invalid_manifest_fails_validation() {
    let home = tempdir().expect("tempdir");
    install_tool(
        home.path(),
        "Bad_Name",
        "youtube.download",
        "exit 0\n",
        json!({"type": "object"}),
    );

    assert_err_contains(&run(home.path(), &["validate"]), "error[validation.manifest]");
    assert_err_contains(
        &run(home.path(), &["build-registry"]),
        "error[validation.manifest]",
    );
    assert!(!home.path().join("registry/registry.json").exists());
}

#[test]
fn staged_route_gaps_policy_execute() {
    let home = tempdir().expect("tempdir");
    install_downloader(home.path());
    assert_ok(&run(home.path(), &["build-registry"]));
    let request = write_request(
        home.path(),
        "download this video",
        json!({"url": "https://youtu.be/cli"}),
    );

    let routed = run(home.path(), &["route", &request]);
    let planned = json_stdout(&routed);
    assert_eq!(planned["status"], json!("planned"));
    assert_eq!(
        planned["steps"][0]["inputs"]["url"],
        json!({"$ref": "request.inputs.url"})
    );
    let planned_path = home.path().join("planned.json");
    fs::write(&planned_path, stdout(&routed)).expect("write plan");
    let planned_arg = planned_path.display().to_string();

    let execute_unbound = run(home.path(), &["execute", &planned_arg]);
    assert_err_contains(&execute_unbound, "error[execution.plan_not_complete]");

    let gated = run(home.path(), &["gaps", &planned_arg]);
    let gated_plan = json_stdout(&gated);
    assert_eq!(gated_plan["status"], json!("complete"));
    assert_eq!(gated_plan["steps"][0]["tool"], json!("yt-fetch@1.0.0"));
    let gated_path = home.path().join("gated.json");
    fs::write(&gated_path, stdout(&gated)).expect("write gated plan");
    let gated_arg = gated_path.display().to_string();

    let policy = json_stdout(&run(home.path(), &["policy", &gated_arg]));
    assert_eq!(policy["status"], json!("allowed"));

    let artifact = json_stdout(&run(
        home.path(),
        &["execute", &gated_arg, "--request", &request],
    ));
    assert_eq!(artifact["status"], json!("ok"));
    assert_eq!(
        artifact["final_outputs"]["step-1"]["file_path"],
        json!("/tmp/capflow-cli/clip.mp4")
    );
    let last_url =
        fs::read_to_string(home.path().join("tools/yt-fetch/last-url.txt")).expect("tool ran");
    assert_eq!(last_url.trim(), "https://youtu.be/cli");
    let run_id = artifact["run_id"].as_str().expect("run id");
    assert!(home.path().join("runs").join(format!("{run_id}.json")).exists());
}

#[test]
fn run_command_previews_and_reports_gaps() {
    let home = tempdir().expect("tempdir");
    install_downloader(home.path());
    assert_ok(&run(home.path(), &["build-registry"]));

    let preview_request = write_request(
        home.path(),
        "download https://youtu.be/preview in 720p",
        json!({}),
    );
    let preview = json_stdout(&run(home.path(), &["run", &preview_request, "--dry-run"]));
    assert_eq!(preview["status"], json!("dry-run"));
    assert_eq!(
        preview["steps"][0]["command"],
        json!(["sh tool.sh", "https://youtu.be/preview", "--min-height", "720"])
    );
    assert!(!home.path().join("tools/yt-fetch/last-url.txt").exists());

    let gap_request = write_request(
        home.path(),
        "download https://youtu.be/abc and upload to drive folder 1xYzAbCdEf0123",
        json!({}),
    );
    let incomplete = run(home.path(), &["run", &gap_request]);
    assert_err_contains(&incomplete, "error[execution.plan_not_complete]");
    assert_err_contains(&incomplete, "drive-uploader");
}

#[test]
fn policy_file_blocks_denied_capabilities() {
    let home = tempdir().expect("tempdir");
    install_downloader(home.path());
    assert_ok(&run(home.path(), &["build-registry"]));
    fs::write(
        home.path().join("policy.yaml"),
        "denied_capabilities: [youtube.download]\n",
    )
    .expect("write policy");
    let request = write_request(home.path(), "download https://youtu.be/abc", json!({}));

    let blocked = run(home.path(), &["run", &request]);
    assert_err_contains(&blocked, "error[policy.blocked]");
    assert_err_contains(&blocked, "capability_denied");
    assert!(!home.path().join("tools/yt-fetch/last-url.txt").exists());

    fs::write(home.path().join("policy.yaml"), "max_steps: nope\n").expect("write policy");
    assert_err_contains(&run(home.path(), &["run", &request]), "error[validation.policy]");
}
