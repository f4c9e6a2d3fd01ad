mod arguments;
mod error;
mod events;
mod output_parse;
mod process;
mod references;
mod run_store;

pub use arguments::{build_arguments, CapabilityKind};
pub use error::{ExecutionError, PartialFailure, StepFailureCause};
pub use events::{ExecutionEvent, ExecutionObserver, NoopObserver};
pub use run_store::{
    load_run_artifact, ErrorRecord, RunArtifact, RunStatus, RunStore, StepResult, StepStatus,
};

use crate::config::ExecutionSettings;
use crate::gaps::{detect_gaps, GapDetectorConfig};
use crate::plan::{PlanStatus, Step, WorkflowPlan};
use crate::policy::Policy;
use crate::registry::{Registry, ToolRecord};
use crate::schema::validate_instance;
use crate::shared::logging::append_engine_log;
use crate::shared::time::rfc3339;
use output_parse::{parse_tool_output, OutputError};
use process::{run_tool_process, ProcessSpec};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOptions {
    pub dry_run: bool,
    pub max_attempts: u32,
    pub step_timeout: Duration,
    pub kill_grace: Duration,
    pub run_timeout: Duration,
    pub stream_stderr: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            max_attempts: 3,
            step_timeout: Duration::from_secs(900),
            kill_grace: Duration::from_secs(5),
            run_timeout: Duration::from_secs(3600),
            stream_stderr: false,
        }
    }
}

impl ExecutionOptions {
    pub fn from_policy(policy: &Policy, settings: &ExecutionSettings) -> Self {
        Self {
            dry_run: false,
            max_attempts: policy.max_tool_retries.saturating_add(1),
            step_timeout: Duration::from_secs(settings.step_timeout_seconds),
            kill_grace: Duration::from_secs(settings.kill_grace_seconds),
            run_timeout: Duration::from_secs(policy.max_run_seconds),
            stream_stderr: settings.stream_stderr,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

type StepOutputs = BTreeMap<String, Map<String, Value>>;

struct RunContext<'a> {
    run_id: &'a str,
    request_inputs: &'a Map<String, Value>,
    started: Instant,
}

pub struct WorkflowExecutor<'r> {
    registry: &'r Registry,
    store: RunStore,
    options: ExecutionOptions,
    gap_config: GapDetectorConfig,
    state_root: Option<PathBuf>,
}

impl<'r> WorkflowExecutor<'r> {
    pub fn new(
        registry: &'r Registry,
        runs_dir: impl Into<PathBuf>,
        options: ExecutionOptions,
    ) -> Self {
        Self {
            registry,
            store: RunStore::new(runs_dir),
            options,
            gap_config: GapDetectorConfig::default(),
            state_root: None,
        }
    }

    pub fn with_gap_config(mut self, gap_config: GapDetectorConfig) -> Self {
        self.gap_config = gap_config;
        self
    }

    pub fn with_engine_log(mut self, state_root: impl Into<PathBuf>) -> Self {
        self.state_root = Some(state_root.into());
        self
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    pub fn store(&self) -> &RunStore {
        &self.store
    }

    fn log(&self, now: i64, level: &str, event: &str, run_id: &str, message: &str) {
        if let Some(root) = &self.state_root {
            append_engine_log(root, now, level, event, run_id, message);
        }
    }

    fn preflight(&self, plan: &WorkflowPlan) -> Result<(), ExecutionError> {
        if !self.options.dry_run && !plan.is_complete() {
            return Err(ExecutionError::PlanNotComplete {
                plan_id: plan.plan_id.clone(),
                status: plan.status(),
            });
        }
        plan
            .validate_structure()
            .map_err(ExecutionError::InvalidPlan)?;
        if self.options.dry_run {
            return Ok(());
        }
        if !plan.gap_report.is_empty() {
            return Err(ExecutionError::PlanNotComplete {
                plan_id: plan.plan_id.clone(),
                status: PlanStatus::PartialComplete,
            });
        }
        // Bindings in a plan document are only trusted once they re-derive
        // from the live registry.
        let verified = detect_gaps(plan, self.registry, &self.gap_config);
        if !verified.is_complete() {
            return Err(ExecutionError::PlanNotComplete {
                plan_id: plan.plan_id.clone(),
                status: verified.status(),
            });
        }
        for (step, expected) in plan.steps.iter().zip(&verified.steps) {
            let Some(tool_id) = step.tool.as_deref() else {
                return Err(ExecutionError::InvalidPlan(format!(
                    "step `{}` has no resolved tool",
                    step.step_id
                )));
            };
            if expected.tool.as_deref() != Some(tool_id) {
                return Err(ExecutionError::InvalidPlan(format!(
                    "step `{}` is bound to `{tool_id}`, but the registry resolves `{}`",
                    step.step_id,
                    expected.tool.as_deref().unwrap_or("nothing")
                )));
            }
        }
        Ok(())
    }

    pub fn execute(
        &self,
        plan: &WorkflowPlan,
        request_inputs: &Map<String, Value>,
        observer: &mut dyn ExecutionObserver,
        now: i64,
    ) -> Result<RunArtifact, ExecutionError> {
        self.preflight(plan)?;
        let run_id = self.store.allocate_run_id(now)?;
        let ctx = RunContext {
            run_id: &run_id,
            request_inputs,
            started: Instant::now(),
        };
        let clock = |ctx: &RunContext<'_>| now + ctx.started.elapsed().as_secs() as i64;

        observer.on_event(&ExecutionEvent::RunStarted {
            run_id: run_id.clone(),
            plan_id: plan.plan_id.clone(),
            dry_run: self.options.dry_run,
            total_steps: plan.steps.len(),
        });
        self.log(
            now,
            "info",
            "run.started",
            &run_id,
            &format!("plan {} with {} step(s)", plan.plan_id, plan.steps.len()),
        );
        tracing::info!(
            run_id = %run_id,
            plan_id = %plan.plan_id,
            dry_run = self.options.dry_run,
            "run started"
        );

        let mut step_outputs = StepOutputs::new();
        let mut results: Vec<StepResult> = Vec::with_capacity(plan.steps.len());
        for (index, step) in plan.steps.iter().enumerate() {
            let outcome = if self.options.dry_run {
                Ok(self.preview_step(&ctx, step, &step_outputs, observer))
            } else {
                self.run_step(&ctx, step, &step_outputs, observer)
            };

            match outcome {
                Ok(result) => {
                    observer.on_event(&ExecutionEvent::StepSucceeded {
                        run_id: run_id.clone(),
                        step_id: step.step_id.clone(),
                        attempts: result.attempts,
                        outputs: result.outputs.clone(),
                    });
                    if !result.outputs.is_empty() {
                        step_outputs.insert(step.step_id.clone(), result.outputs.clone());
                    }
                    results.push(result);
                }
                Err((result, cause)) => {
                    observer.on_event(&ExecutionEvent::StepFailed {
                        run_id: run_id.clone(),
                        step_id: step.step_id.clone(),
                        code: cause.code().to_string(),
                        message: cause.to_string(),
                    });
                    self.log(
                        clock(&ctx),
                        "error",
                        "step.failed",
                        &run_id,
                        &format!("step {}: {cause}", step.step_id),
                    );
                    let executed_steps = results.clone();
                    results.push(result);
                    let artifact = RunArtifact {
                        run_id: run_id.clone(),
                        started_at: rfc3339(now),
                        finished_at: rfc3339(clock(&ctx)),
                        dry_run: false,
                        plan_id: plan.plan_id.clone(),
                        request_id: plan.request_id.clone(),
                        status: RunStatus::Failed,
                        steps: results,
                        final_outputs: step_outputs,
                        error: Some(ErrorRecord {
                            code: cause.code().to_string(),
                            message: cause.to_string(),
                        }),
                    };
                    let artifact_path = self.finish(&artifact, clock(&ctx), observer)?;
                    return Err(ExecutionError::Partial(Box::new(PartialFailure {
                        run_id,
                        executed_steps,
                        failed_step_id: step.step_id.clone(),
                        failed_tool: step.tool.clone(),
                        failed_capability: step.capability.clone(),
                        remaining_steps: plan.steps[index..]
                            .iter()
                            .map(|step| step.step_id.clone())
                            .collect(),
                        cause,
                        artifact_path,
                    })));
                }
            }
        }

        let artifact = RunArtifact {
            run_id: run_id.clone(),
            started_at: rfc3339(now),
            finished_at: rfc3339(clock(&ctx)),
            dry_run: self.options.dry_run,
            plan_id: plan.plan_id.clone(),
            request_id: plan.request_id.clone(),
            status: if self.options.dry_run {
                RunStatus::DryRun
            } else {
                RunStatus::Ok
            },
            steps: results,
            final_outputs: step_outputs,
            error: None,
        };
        self.finish(&artifact, clock(&ctx), observer)?;
        Ok(artifact)
    }

    fn finish(
        &self,
        artifact: &RunArtifact,
        now: i64,
        observer: &mut dyn ExecutionObserver,
    ) -> Result<PathBuf, ExecutionError> {
        let path = self.store.persist(artifact)?;
        observer.on_event(&ExecutionEvent::RunFinished {
            run_id: artifact.run_id.clone(),
            status: artifact.status,
            artifact_path: path.display().to_string(),
        });
        self.log(
            now,
            if artifact.status == RunStatus::Failed {
                "error"
            } else {
                "info"
            },
            "run.finished",
            &artifact.run_id,
            &format!("status {} ({})", artifact.status, path.display()),
        );
        tracing::info!(run_id = %artifact.run_id, status = %artifact.status, "run finished");
        Ok(path)
    }

    fn preview_step(
        &self,
        ctx: &RunContext<'_>,
        step: &Step,
        step_outputs: &StepOutputs,
        observer: &mut dyn ExecutionObserver,
    ) -> StepResult {
        observer.on_event(&ExecutionEvent::StepStarted {
            run_id: ctx.run_id.to_string(),
            step_id: step.step_id.clone(),
            capability: step.capability.clone(),
            tool: step.tool.clone(),
            attempt: 0,
        });
        let mut result = StepResult::pending(step, StepStatus::DryRun);
        let tool = step.tool.as_deref().and_then(|id| self.registry.tool(id));
        result.working_dir = tool.map(|tool| tool.tool_dir().display().to_string());

        let resolved =
            match references::resolve_inputs(step, ctx.request_inputs, step_outputs, true) {
                Ok(resolved) => resolved,
                Err(message) => {
                    result.error = Some(ErrorRecord {
                        code: "validation.reference".to_string(),
                        message,
                    });
                    return result;
                }
            };
        let kind = CapabilityKind::from_capability(&step.capability);
        match (tool, build_arguments(kind, &step.capability, &resolved)) {
            (Some(tool), Ok(args)) => result.command = display_command(tool, &args),
            (None, _) => {}
            (_, Err(message)) => {
                result.error = Some(ErrorRecord {
                    code: "validation.arguments".to_string(),
                    message,
                })
            }
        }
        result.resolved_inputs = resolved;
        result
    }

    fn run_step(
        &self,
        ctx: &RunContext<'_>,
        step: &Step,
        step_outputs: &StepOutputs,
        observer: &mut dyn ExecutionObserver,
    ) -> Result<StepResult, (StepResult, StepFailureCause)> {
        let step_started = Instant::now();
        let mut result = StepResult::pending(step, StepStatus::Failed);
        let fail = |mut result: StepResult, cause: StepFailureCause| {
            result.status = StepStatus::Failed;
            result.error = Some(ErrorRecord {
                code: cause.code().to_string(),
                message: cause.to_string(),
            });
            result.duration_ms = step_started.elapsed().as_millis() as u64;
            Err((result, cause))
        };

        let Some(tool) = step.tool.as_deref().and_then(|id| self.registry.tool(id)) else {
            return fail(
                result,
                StepFailureCause::ToolUnavailable {
                    message: "step has no registered tool".to_string(),
                },
            );
        };
        result.working_dir = Some(tool.tool_dir().display().to_string());

        let resolved =
            match references::resolve_inputs(step, ctx.request_inputs, step_outputs, false) {
                Ok(resolved) => resolved,
                Err(message) => {
                    return fail(result, StepFailureCause::InputResolution { message })
                }
            };
        result.resolved_inputs = resolved.clone();

        let kind = CapabilityKind::from_capability(&step.capability);
        let args = match build_arguments(kind, &step.capability, &resolved) {
            Ok(args) => args,
            Err(message) => return fail(result, StepFailureCause::InvalidArguments { message }),
        };
        result.command = display_command(tool, &args);

        let tool_dir = tool.tool_dir();
        let max_attempts = self.options.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            result.attempts = attempt;
            let remaining = self.options.run_timeout.saturating_sub(ctx.started.elapsed());
            if remaining.is_zero() {
                let cause = StepFailureCause::ToolTimeout {
                    timeout_ms: self.options.run_timeout.as_millis() as u64,
                };
                return fail(result, cause);
            }
            let timeout = self.options.step_timeout.min(remaining);

            observer.on_event(&ExecutionEvent::StepStarted {
                run_id: ctx.run_id.to_string(),
                step_id: step.step_id.clone(),
                capability: step.capability.clone(),
                tool: Some(tool.id.clone()),
                attempt,
            });
            tracing::debug!(
                run_id = %ctx.run_id,
                step_id = %step.step_id,
                tool = %tool.id,
                attempt,
                "step attempt"
            );

            let spec = ProcessSpec {
                entrypoint: &tool.entrypoint.command,
                tool_name: &tool.name,
                args: &args,
                working_dir: &tool_dir,
                timeout,
                kill_grace: self.options.kill_grace,
                stream_stderr: self.options.stream_stderr,
            };
            let cause = match run_tool_process(&spec) {
                Err(err) => {
                    return fail(
                        result,
                        StepFailureCause::ToolUnavailable {
                            message: err.to_string(),
                        },
                    )
                }
                Ok(output) => {
                    result.exit_code = output.exit_code;
                    result.stdout = output.stdout.clone();
                    result.stderr = output.stderr.clone();
                    if output.timed_out {
                        StepFailureCause::ToolTimeout {
                            timeout_ms: timeout.as_millis() as u64,
                        }
                    } else if !output.success() {
                        StepFailureCause::ToolFailed {
                            exit_code: output.exit_code,
                            message: last_line(&output.stderr),
                        }
                    } else {
                        match check_outputs(kind, step, &output.stdout) {
                            Ok(outputs) => {
                                result.status = StepStatus::Ok;
                                result.outputs = outputs;
                                result.duration_ms = step_started.elapsed().as_millis() as u64;
                                return Ok(result);
                            }
                            Err(cause) => cause,
                        }
                    }
                }
            };

            let will_retry = cause.is_retryable() && attempt < max_attempts;
            observer.on_event(&ExecutionEvent::StepAttemptFailed {
                run_id: ctx.run_id.to_string(),
                step_id: step.step_id.clone(),
                attempt,
                code: cause.code().to_string(),
                message: cause.to_string(),
                will_retry,
            });
            tracing::warn!(
                run_id = %ctx.run_id,
                step_id = %step.step_id,
                attempt,
                error = %cause,
                will_retry,
                "step attempt failed"
            );
            if !will_retry {
                return fail(result, cause);
            }
        }

        fail(
            result,
            StepFailureCause::ToolFailed {
                exit_code: None,
                message: "no attempts were made".to_string(),
            },
        )
    }
}

fn check_outputs(
    kind: CapabilityKind,
    step: &Step,
    stdout: &str,
) -> Result<Map<String, Value>, StepFailureCause> {
    let outputs = parse_tool_output(kind, stdout).map_err(|err| match err {
        OutputError::Unparseable(message) => StepFailureCause::ToolFailed {
            exit_code: Some(0),
            message,
        },
        OutputError::NotAnObject(message) => StepFailureCause::ToolInvalidOutput { message },
    })?;
    let errors = validate_instance(
        &step.capability_contract.output_schema,
        &Value::Object(outputs.clone()),
    );
    if !errors.is_empty() {
        return Err(StepFailureCause::ToolInvalidOutput {
            message: errors.join("; "),
        });
    }
    Ok(outputs)
}

fn display_command(tool: &ToolRecord, args: &[String]) -> Vec<String> {
    let mut command = vec![tool.entrypoint.command.clone()];
    command.extend(args.iter().cloned());
    command
}

fn last_line(text: &str) -> String {
    text.lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("no stderr output")
        .to_string()
}
