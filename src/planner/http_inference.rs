use super::llm::{InferenceError, PlanInference};
use serde_json::{json, Value};
use std::thread;
use std::time::Duration;

const SYSTEM_PROMPT: &str = "You plan workflows over capability-typed tools. \
Reply with one JSON object {\"steps\": [...]}. Every step has `capability` \
(domain.action), `inputs` (literals or {\"$ref\": \"request.inputs.<key>\"} / \
{\"$ref\": \"steps.<id>.outputs.<key>\"}), `capability_contract` with object \
`input_schema` and `output_schema`, `coverage_confidence` between 0 and 1, and \
`coverage_rationale`.";

#[derive(Debug, Clone, PartialEq)]
pub struct HttpInferenceConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct HttpPlanInference {
    config: HttpInferenceConfig,
    agent: ureq::Agent,
}

impl HttpPlanInference {
    pub fn new(config: HttpInferenceConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self { config, agent }
    }

    fn request_body(&self, goal: &str, context: &Value) -> Value {
        json!({
            "model": self.config.model,
            "temperature": 0,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": json!({"goal": goal, "context": context}).to_string()}
            ]
        })
    }

    fn send_once(&self, body: &Value) -> Result<Value, InferenceError> {
        let mut request = self
            .agent
            .post(&self.config.endpoint)
            .set("Content-Type", "application/json");
        if let Some(key) = self.config.api_key.as_deref() {
            request = request.set("Authorization", &format!("Bearer {key}"));
        }
        match request.send_json(body.clone()) {
            Ok(response) => response
                .into_json::<Value>()
                .map_err(|err| InferenceError::InvalidResponse(err.to_string())),
            Err(ureq::Error::Status(status, response)) => Err(InferenceError::Status {
                status,
                body: response.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(transport)) => {
                Err(InferenceError::Transport(transport.to_string()))
            }
        }
    }
}

fn is_retryable(err: &InferenceError) -> bool {
    match err {
        InferenceError::Transport(_) => true,
        InferenceError::Status { status, .. } => *status == 429 || *status >= 500,
        InferenceError::InvalidResponse(_) => false,
    }
}

pub(crate) fn extract_plan_payload(response: &Value) -> Result<Value, InferenceError> {
    let content = response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            InferenceError::InvalidResponse("missing choices[0].message.content".to_string())
        })?;
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);
    let payload: Value = serde_json::from_str(unfenced.trim())
        .map_err(|err| InferenceError::InvalidResponse(format!("content is not json: {err}")))?;
    if !payload.is_object() {
        return Err(InferenceError::InvalidResponse(
            "content must be a json object".to_string(),
        ));
    }
    Ok(payload)
}

impl PlanInference for HttpPlanInference {
    fn plan_workflow(&self, goal: &str, context: &Value) -> Result<Value, InferenceError> {
        let body = self.request_body(goal, context);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.send_once(&body) {
                Ok(response) => return extract_plan_payload(&response),
                Err(err) if is_retryable(&err) && attempt <= self.config.max_retries => {
                    tracing::warn!(attempt, error = %err, "inference request failed, retrying");
                    thread::sleep(self.config.retry_backoff * attempt);
                }
                Err(err) => return Err(err),
            }
        }
    }
}
