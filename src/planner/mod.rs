mod contracts;
mod http_inference;
mod llm;
mod normalize;
mod rules;
mod signals;

pub use contracts::{
    contract_for, rule_capabilities, DRIVE_UPLOAD, VIDEO_CONVERT, YANDEX_DISK_UPLOAD,
    YOUTUBE_DOWNLOAD,
};
pub use http_inference::{HttpInferenceConfig, HttpPlanInference};
pub use llm::{InferenceError, PlanInference};
pub use signals::{extract_signals, RequestSignals};

use crate::plan::{Request, WorkflowPlan};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum PlanningError {
    #[error("no rule matched `{goal}` and no inference backend is configured")]
    NoInferenceBackend { goal: String },
    #[error("no route matched the request: {reason}")]
    NoRouteMatched { reason: String },
    #[error("request mixes incompatible intents: {intents}")]
    ConflictingIntents { intents: String },
    #[error("inference failed after {attempts} call(s): {source}")]
    Inference {
        attempts: u32,
        #[source]
        source: InferenceError,
    },
    #[error("plan validation failed: {0}")]
    Validation(String),
    #[error("failed to allocate plan id: {0}")]
    Id(String),
}

impl PlanningError {
    pub fn code(&self) -> &'static str {
        match self {
            PlanningError::NoInferenceBackend { .. } => "routing.no_inference_backend",
            PlanningError::NoRouteMatched { .. } => "routing.no_match",
            PlanningError::ConflictingIntents { .. } => "routing.conflicting_intents",
            PlanningError::Inference { .. } => "routing.inference_failed",
            PlanningError::Validation(_) => "validation.plan",
            PlanningError::Id(_) => "internal.id",
        }
    }
}

pub struct Planner {
    inference: Option<Box<dyn PlanInference>>,
    max_llm_calls: u32,
    known_capabilities: Vec<String>,
}

impl Planner {
    pub fn new(inference: Option<Box<dyn PlanInference>>, max_llm_calls: u32) -> Self {
        Self {
            inference,
            max_llm_calls,
            known_capabilities: Vec::new(),
        }
    }

    pub fn rules_only() -> Self {
        Self::new(None, 0)
    }

    pub fn with_known_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.known_capabilities = capabilities;
        self
    }

    pub fn has_inference(&self) -> bool {
        self.inference.is_some() && self.max_llm_calls > 0
    }

    pub fn route(&self, request: &Request, now: i64) -> Result<WorkflowPlan, PlanningError> {
        let signals = extract_signals(&request.user_goal);
        let drafts = match rules::plan_from_rules(request, &signals)? {
            Some(drafts) => {
                tracing::debug!(
                    request_id = %request.request_id,
                    steps = drafts.len(),
                    "rule route matched"
                );
                drafts
            }
            None => self.infer(request)?,
        };
        if drafts.is_empty() {
            return Err(PlanningError::NoRouteMatched {
                reason: "inference returned no steps".to_string(),
            });
        }
        let steps = normalize::normalize_steps(drafts).map_err(PlanningError::Validation)?;
        WorkflowPlan::planned(request, steps, now).map_err(PlanningError::Id)
    }

    fn infer(&self, request: &Request) -> Result<Vec<normalize::DraftStep>, PlanningError> {
        let inference = match self.inference.as_deref() {
            Some(inference) if self.max_llm_calls > 0 => inference,
            _ => {
                return Err(PlanningError::NoInferenceBackend {
                    goal: request.user_goal.clone(),
                })
            }
        };
        let context = json!({
            "request_id": request.request_id,
            "inputs": request.inputs,
            "capabilities": self.known_capabilities,
        });

        let mut attempts = 0;
        let payload = loop {
            attempts += 1;
            match inference.plan_workflow(&request.user_goal, &context) {
                Ok(payload) => break payload,
                Err(err) if attempts < self.max_llm_calls => {
                    tracing::warn!(attempts, error = %err, "plan inference failed, retrying");
                }
                Err(source) => return Err(PlanningError::Inference { attempts, source }),
            }
        };
        tracing::debug!(request_id = %request.request_id, attempts, "plan inferred");
        llm::parse_inference_steps(&payload)
    }
}
