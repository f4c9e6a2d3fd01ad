use super::run_store::RunStatus;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    RunStarted {
        run_id: String,
        plan_id: String,
        dry_run: bool,
        total_steps: usize,
    },
    StepStarted {
        run_id: String,
        step_id: String,
        capability: String,
        tool: Option<String>,
        attempt: u32,
    },
    StepAttemptFailed {
        run_id: String,
        step_id: String,
        attempt: u32,
        code: String,
        message: String,
        will_retry: bool,
    },
    StepSucceeded {
        run_id: String,
        step_id: String,
        attempts: u32,
        outputs: Map<String, Value>,
    },
    StepFailed {
        run_id: String,
        step_id: String,
        code: String,
        message: String,
    },
    RunFinished {
        run_id: String,
        status: RunStatus,
        artifact_path: String,
    },
}

pub trait ExecutionObserver {
    fn on_event(&mut self, event: &ExecutionEvent);
}

impl ExecutionObserver for Vec<ExecutionEvent> {
    fn on_event(&mut self, event: &ExecutionEvent) {
        self.push(event.clone());
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ExecutionObserver for NoopObserver {
    fn on_event(&mut self, _event: &ExecutionEvent) {}
}
