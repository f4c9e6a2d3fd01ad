use super::cli::{help_text, parse_cli_verb, CliVerb};
use crate::config::{load_settings, Settings};
use crate::executor::{ExecutionError, ExecutionEvent, ExecutionObserver};
use crate::gaps::detect_gaps;
use crate::pipeline::{build_planner, Pipeline, PipelineError, PipelineOutcome};
use crate::plan::{Request, WorkflowPlan};
use crate::policy::{load_policy, PolicyMode};
use crate::registry::{build_registry, load_manifest_schema, validate_manifests, Registry};
use crate::shared::time::now_secs;
use serde::Serialize;
use serde_json::{json, Map};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliError {
    pub code: String,
    pub message: String,
}

impl CliError {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }

    fn usage(message: impl Into<String>) -> Self {
        Self::new("usage", message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error[{}]: {}", self.code, self.message)
    }
}

impl std::error::Error for CliError {}

impl From<PipelineError> for CliError {
    fn from(err: PipelineError) -> Self {
        if let PipelineError::Execution(ExecutionError::Partial(failure)) = &err {
            let report = pretty(&failure.report()).unwrap_or_else(|e| e.message);
            return Self::new(err.code(), report);
        }
        Self::new(err.code(), err.to_string())
    }
}

macro_rules! impl_from_subsystem {
    ($($error:ty),*) => {
        $(impl From<$error> for CliError {
            fn from(err: $error) -> Self {
                PipelineError::from(err).into()
            }
        })*
    };
}

impl_from_subsystem!(
    crate::config::ConfigError,
    crate::registry::RegistryError,
    crate::planner::PlanningError,
    crate::policy::PolicyError,
    ExecutionError
);

fn pretty<T: Serialize>(value: &T) -> Result<String, CliError> {
    serde_json::to_string_pretty(value).map_err(|err| CliError::new("json", err.to_string()))
}

struct TracingObserver;

impl ExecutionObserver for TracingObserver {
    fn on_event(&mut self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::StepAttemptFailed {
                step_id,
                attempt,
                message,
                will_retry,
                ..
            } => tracing::warn!(step_id = %step_id, attempt, will_retry, "{message}"),
            ExecutionEvent::StepFailed {
                step_id, message, ..
            } => tracing::error!(step_id = %step_id, "{message}"),
            other => tracing::info!(event = ?other, "execution progress"),
        }
    }
}

struct CommandArgs<'a> {
    positional: Vec<&'a str>,
    dry_run: bool,
    preview: bool,
    request: Option<&'a str>,
}

fn parse_command_args(args: &[String]) -> Result<CommandArgs<'_>, CliError> {
    let mut parsed = CommandArgs {
        positional: Vec::new(),
        dry_run: false,
        preview: false,
        request: None,
    };
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--dry-run" => parsed.dry_run = true,
            "--preview" => parsed.preview = true,
            "--request" => {
                let value = iter
                    .next()
                    .ok_or_else(|| CliError::usage("`--request` requires a file path"))?;
                parsed.request = Some(value);
            }
            flag if flag.starts_with("--") => {
                return Err(CliError::usage(format!("unknown flag `{flag}`")))
            }
            value => parsed.positional.push(value),
        }
    }
    Ok(parsed)
}

fn single_positional<'a>(parsed: &CommandArgs<'a>, usage: &str) -> Result<&'a str, CliError> {
    match parsed.positional.as_slice() {
        [value] => Ok(*value),
        _ => Err(CliError::usage(format!("usage: capflow {usage}"))),
    }
}

fn read_request(path: &str) -> Result<Request, CliError> {
    Request::from_path(Path::new(path), now_secs())
        .map_err(|message| CliError::new("validation.request", message))
}

fn read_plan(path: &str) -> Result<WorkflowPlan, CliError> {
    WorkflowPlan::from_path(Path::new(path))
        .map_err(|message| CliError::new("validation.plan", message))
}

pub fn run_cli(args: Vec<String>) -> Result<String, CliError> {
    if args.is_empty() {
        return Ok(help_text());
    }
    let rest = &args[1..];
    match parse_cli_verb(args[0].as_str()) {
        CliVerb::Help => Ok(help_text()),
        CliVerb::Validate => cmd_validate(&load_settings()?),
        CliVerb::BuildRegistry => cmd_build_registry(&load_settings()?),
        CliVerb::Resolve => cmd_resolve(&load_settings()?, rest),
        CliVerb::Route => cmd_route(load_settings()?, rest),
        CliVerb::Gaps => cmd_gaps(load_settings()?, rest),
        CliVerb::Policy => cmd_policy(load_settings()?, rest),
        CliVerb::Execute => cmd_execute(load_settings()?, rest),
        CliVerb::Run => cmd_run(load_settings()?, rest),
        CliVerb::Unknown => Err(CliError::usage(format!("unknown command `{}`", args[0]))),
    }
}

fn cmd_validate(settings: &Settings) -> Result<String, CliError> {
    let (schema, _) = load_manifest_schema(settings.manifest_schema_path.as_deref())?;
    let validation = validate_manifests(&settings.tools_root, &schema)?;
    if !validation.is_valid() {
        return Err(CliError::new(
            "validation.manifest",
            validation.errors.join("\n"),
        ));
    }
    pretty(&json!({
        "valid": true,
        "tools": validation
            .manifests
            .iter()
            .map(|tool| tool.id.as_str())
            .collect::<Vec<_>>(),
    }))
}

fn cmd_build_registry(settings: &Settings) -> Result<String, CliError> {
    let (schema, schema_path) = load_manifest_schema(settings.manifest_schema_path.as_deref())?;
    let cache = build_registry(
        &settings.tools_root,
        &schema,
        &schema_path,
        &settings.registry_path,
        now_secs(),
    )?;
    pretty(&json!({
        "registry_path": settings.registry_path.display().to_string(),
        "generated_at": cache.generated_at,
        "tools": cache.tools.len(),
        "capabilities": cache.index.by_capability.keys().collect::<Vec<_>>(),
    }))
}

fn cmd_resolve(settings: &Settings, args: &[String]) -> Result<String, CliError> {
    let parsed = parse_command_args(args)?;
    let capability = single_positional(&parsed, "resolve <capability>")?;
    let registry = Registry::load(&settings.registry_path)?;
    let tool = registry.resolve(capability)?;
    pretty(tool)
}

fn cmd_route(settings: Settings, args: &[String]) -> Result<String, CliError> {
    let parsed = parse_command_args(args)?;
    let request = read_request(single_positional(&parsed, "route <request.json>")?)?;
    let policy = load_policy(&settings.policy_path)?;
    let capabilities = match Registry::load(&settings.registry_path) {
        Ok(registry) => registry
            .capabilities()
            .into_iter()
            .map(str::to_string)
            .collect(),
        Err(err) => {
            tracing::debug!(error = %err, "routing without registry capabilities");
            Vec::new()
        }
    };
    let planner = build_planner(&settings, &policy, capabilities)?;
    let plan = planner.route(&request, now_secs())?;
    pretty(&plan)
}

fn cmd_gaps(settings: Settings, args: &[String]) -> Result<String, CliError> {
    let parsed = parse_command_args(args)?;
    let plan = read_plan(single_positional(&parsed, "gaps <plan.json>")?)?;
    let pipeline = Pipeline::from_settings(settings)?;
    let gated = detect_gaps(&plan, pipeline.registry(), &pipeline.gap_config());
    pretty(&gated)
}

fn cmd_policy(settings: Settings, args: &[String]) -> Result<String, CliError> {
    let parsed = parse_command_args(args)?;
    let plan = read_plan(single_positional(&parsed, "policy <plan.json> [--preview]")?)?;
    let pipeline = Pipeline::from_settings(settings)?;
    let mode = if parsed.preview {
        PolicyMode::Preview
    } else {
        PolicyMode::Execute
    };
    pretty(&pipeline.check(&plan, mode))
}

fn render_outcome(outcome: PipelineOutcome) -> Result<String, CliError> {
    match outcome {
        PipelineOutcome::Executed { artifact, .. } => pretty(&artifact),
        PipelineOutcome::Incomplete { plan } => Err(CliError::new(
            "execution.plan_not_complete",
            format!(
                "plan `{}` is {} with {} gap(s):\n{}",
                plan.plan_id,
                plan.status(),
                plan.gap_report.len(),
                pretty(&plan.gap_report)?
            ),
        )),
        PipelineOutcome::BlockedByPolicy { policy } => Err(CliError::new(
            "policy.blocked",
            pretty(&policy.violations)?,
        )),
    }
}

fn cmd_execute(settings: Settings, args: &[String]) -> Result<String, CliError> {
    let parsed = parse_command_args(args)?;
    let usage = "execute <plan.json> [--request <request.json>] [--dry-run]";
    let plan = read_plan(single_positional(&parsed, usage)?)?;
    let inputs = match parsed.request {
        Some(path) => read_request(path)?.inputs,
        None => Map::new(),
    };
    let pipeline = Pipeline::from_settings(settings)?;
    let outcome = pipeline.run(
        &plan,
        &inputs,
        parsed.dry_run,
        &mut TracingObserver,
        now_secs(),
    )?;
    render_outcome(outcome)
}

fn cmd_run(settings: Settings, args: &[String]) -> Result<String, CliError> {
    let parsed = parse_command_args(args)?;
    let request = read_request(single_positional(&parsed, "run <request.json> [--dry-run]")?)?;
    let pipeline = Pipeline::from_settings(settings)?;
    let outcome = pipeline.handle(&request, parsed.dry_run, &mut TracingObserver, now_secs())?;
    render_outcome(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn command_args_split_flags_from_positionals() {
        let args = strings(&["plan.json", "--dry-run", "--request", "req.json"]);
        let parsed = parse_command_args(&args).expect("parse");
        assert_eq!(parsed.positional, vec!["plan.json"]);
        assert!(parsed.dry_run);
        assert_eq!(parsed.request, Some("req.json"));
    }

    #[test]
    fn unknown_flags_and_missing_values_are_usage_errors() {
        let err = parse_command_args(&strings(&["--fast"])).err().expect("unknown flag");
        assert_eq!(err.code, "usage");
        let err = parse_command_args(&strings(&["--request"])).err().expect("missing value");
        assert!(err.message.contains("--request"));
    }

    #[test]
    fn cli_error_renders_code_prefix() {
        let err = CliError::new("routing.no_match", "nothing matched");
        assert_eq!(err.to_string(), "error[routing.no_match]: nothing matched");
    }
}
