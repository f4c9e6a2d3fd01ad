use crate::config::{ConfigError, Settings};
use crate::executor::{
    ExecutionError, ExecutionObserver, ExecutionOptions, RunArtifact, WorkflowExecutor,
};
use crate::gaps::{detect_gaps, GapDetectorConfig};
use crate::plan::{Request, WorkflowPlan};
use crate::planner::{HttpPlanInference, PlanInference, Planner, PlanningError};
use crate::policy::{check_policy, load_policy, Policy, PolicyError, PolicyMode, PolicyResult};
use crate::registry::{Registry, RegistryError};
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Planning(#[from] PlanningError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl PipelineError {
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Config(err) => err.code(),
            PipelineError::Registry(err) => err.code(),
            PipelineError::Planning(err) => err.code(),
            PipelineError::Policy(err) => err.code(),
            PipelineError::Execution(err) => err.code(),
        }
    }
}

pub fn build_planner(
    settings: &Settings,
    policy: &Policy,
    known_capabilities: Vec<String>,
) -> Result<Planner, PipelineError> {
    let inference: Option<Box<dyn PlanInference>> = match &settings.llm {
        Some(llm) => Some(Box::new(HttpPlanInference::new(llm.inference_config()?))),
        None => None,
    };
    Ok(Planner::new(inference, policy.max_llm_calls).with_known_capabilities(known_capabilities))
}

#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    Executed {
        artifact: Box<RunArtifact>,
        policy: PolicyResult,
    },
    Incomplete { plan: Box<WorkflowPlan> },
    BlockedByPolicy { policy: PolicyResult },
}

pub struct Pipeline {
    settings: Settings,
    registry: Registry,
    policy: Policy,
    planner: Planner,
}

impl Pipeline {
    pub fn new(settings: Settings, registry: Registry, policy: Policy, planner: Planner) -> Self {
        Self {
            settings,
            registry,
            policy,
            planner,
        }
    }

    pub fn from_settings(settings: Settings) -> Result<Self, PipelineError> {
        let registry = Registry::load(&settings.registry_path)?;
        let policy = load_policy(&settings.policy_path)?;
        let capabilities = registry
            .capabilities()
            .into_iter()
            .map(str::to_string)
            .collect();
        let planner = build_planner(&settings, &policy, capabilities)?;
        Ok(Self::new(settings, registry, policy, planner))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn gap_config(&self) -> GapDetectorConfig {
        GapDetectorConfig {
            confidence_threshold: self.settings.execution.confidence_threshold,
        }
    }

    pub fn plan(&self, request: &Request, now: i64) -> Result<WorkflowPlan, PipelineError> {
        let planned = self.planner.route(request, now)?;
        Ok(detect_gaps(&planned, &self.registry, &self.gap_config()))
    }

    pub fn check(&self, plan: &WorkflowPlan, mode: PolicyMode) -> PolicyResult {
        check_policy(plan, &self.policy, &self.registry, mode)
    }

    pub fn executor(&self, dry_run: bool) -> WorkflowExecutor<'_> {
        let options =
            ExecutionOptions::from_policy(&self.policy, &self.settings.execution).dry_run(dry_run);
        WorkflowExecutor::new(&self.registry, &self.settings.runs_dir, options)
            .with_gap_config(self.gap_config())
            .with_engine_log(&self.settings.state_root)
    }

    pub fn run(
        &self,
        plan: &WorkflowPlan,
        request_inputs: &Map<String, Value>,
        dry_run: bool,
        observer: &mut dyn ExecutionObserver,
        now: i64,
    ) -> Result<PipelineOutcome, PipelineError> {
        if !dry_run && !plan.is_complete() {
            return Ok(PipelineOutcome::Incomplete {
                plan: Box::new(plan.clone()),
            });
        }
        let plan = &detect_gaps(plan, &self.registry, &self.gap_config());
        if !dry_run && !plan.is_complete() {
            return Ok(PipelineOutcome::Incomplete {
                plan: Box::new(plan.clone()),
            });
        }
        let mode = if dry_run {
            PolicyMode::Preview
        } else {
            PolicyMode::Execute
        };
        let policy = self.check(plan, mode);
        if !dry_run && !policy.is_allowed() {
            tracing::warn!(
                plan_id = %plan.plan_id,
                violations = policy.violations.len(),
                "plan blocked by policy"
            );
            return Ok(PipelineOutcome::BlockedByPolicy { policy });
        }
        let artifact = self
            .executor(dry_run)
            .execute(plan, request_inputs, observer, now)?;
        Ok(PipelineOutcome::Executed {
            artifact: Box::new(artifact),
            policy,
        })
    }

    pub fn handle(
        &self,
        request: &Request,
        dry_run: bool,
        observer: &mut dyn ExecutionObserver,
        now: i64,
    ) -> Result<PipelineOutcome, PipelineError> {
        let plan = self.plan(request, now)?;
        self.run(&plan, &request.inputs, dry_run, observer, now)
    }
}
