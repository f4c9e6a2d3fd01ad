use crate::plan::{
    GapEntry, GapPriority, GapReason, PlanStatus, PlannerSource, Step, ToolMetadata, WorkflowPlan,
};
use crate::registry::{pick_best_tool, Registry, ToolRecord};
use crate::schema::{is_object_schema, subset_mismatches};
use serde_json::{json, Value};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GapDetectorConfig {
    pub confidence_threshold: f64,
}

impl Default for GapDetectorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

struct Gap {
    reason: GapReason,
    message: String,
    details: Value,
}

/// Re-evaluates every step of `plan` against `registry`. Previous bindings
/// and gap entries are discarded, so the result depends only on the inputs.
pub fn detect_gaps(
    plan: &WorkflowPlan,
    registry: &Registry,
    config: &GapDetectorConfig,
) -> WorkflowPlan {
    let mut result = plan.clone();
    result.gap_report.clear();

    for (index, step) in result.steps.iter_mut().enumerate() {
        step.tool = None;
        step.tool_metadata = None;
        match evaluate_step(step, registry, config) {
            Ok(tool) => {
                step.tool = Some(tool.id.clone());
                step.tool_metadata = Some(ToolMetadata {
                    name: tool.name.clone(),
                    version: tool.version.clone(),
                    source_path: tool.source_path.clone(),
                });
            }
            Err(gap) => {
                tracing::debug!(
                    step_id = %step.step_id,
                    reason = gap.reason.as_str(),
                    "step left unresolved"
                );
                result.gap_report.push(GapEntry {
                    step_id: step.step_id.clone(),
                    missing_capability: step.capability.clone(),
                    reason: gap.reason,
                    reason_message: gap.message,
                    reason_details: gap.details,
                    proposed_tool_name: proposed_tool_name(&step.capability),
                    proposed_input_schema: step.capability_contract.input_schema.clone(),
                    proposed_output_schema: step.capability_contract.output_schema.clone(),
                    priority: if index == 0 {
                        GapPriority::High
                    } else {
                        GapPriority::Medium
                    },
                });
            }
        }
    }

    result.status = if result.gap_report.is_empty() {
        PlanStatus::Complete
    } else {
        PlanStatus::PartialComplete
    };
    result
}

fn evaluate_step<'r>(
    step: &Step,
    registry: &'r Registry,
    config: &GapDetectorConfig,
) -> Result<&'r ToolRecord, Gap> {
    if step.capability.trim().is_empty() {
        return Err(Gap {
            reason: GapReason::InvalidCapability,
            message: "step has an empty capability".to_string(),
            details: json!({}),
        });
    }

    let candidates = registry.candidates(&step.capability);
    if candidates.is_empty() {
        return Err(Gap {
            reason: GapReason::NoCapabilityMatch,
            message: format!("no registered tool provides `{}`", step.capability),
            details: json!({ "capability": step.capability }),
        });
    }

    let contract = &step.capability_contract;
    if !is_object_schema(&contract.input_schema) || !is_object_schema(&contract.output_schema) {
        return Err(Gap {
            reason: GapReason::SchemaIncompatible,
            message: "step contract must declare object-typed input and output schemas"
                .to_string(),
            details: json!({ "contract_invalid": true }),
        });
    }

    let mut compatible = Vec::new();
    let mut mismatches = serde_json::Map::new();
    for candidate in &candidates {
        let input = subset_mismatches(&contract.input_schema, &candidate.input_schema);
        let output = subset_mismatches(&contract.output_schema, &candidate.output_schema);
        if input.is_empty() && output.is_empty() {
            compatible.push(*candidate);
        } else {
            mismatches.insert(
                candidate.id.clone(),
                json!({ "input": input, "output": output }),
            );
        }
    }
    let Some(best) = pick_best_tool(compatible.iter().copied()) else {
        return Err(Gap {
            reason: GapReason::SchemaIncompatible,
            message: format!(
                "none of {} candidate(s) satisfy the step contract",
                candidates.len()
            ),
            details: json!({ "candidates": mismatches }),
        });
    };

    if step.planner_source == PlannerSource::Llm
        && step.coverage_confidence < config.confidence_threshold
    {
        return Err(Gap {
            reason: GapReason::LowConfidence,
            message: format!(
                "coverage confidence {:.2} is below threshold {:.2}",
                step.coverage_confidence, config.confidence_threshold
            ),
            details: json!({
                "confidence": step.coverage_confidence,
                "threshold": config.confidence_threshold,
                "candidates": compatible.iter().map(|tool| tool.id.as_str()).collect::<Vec<_>>(),
            }),
        });
    }

    Ok(best)
}

const ACTION_SYNONYMS: [(&str, &str); 8] = [
    ("download", "downloader"),
    ("upload", "uploader"),
    ("convert", "converter"),
    ("scrape", "scraper"),
    ("export", "exporter"),
    ("transcribe", "transcriber"),
    ("extract", "extractor"),
    ("run", "runner"),
];

pub fn proposed_tool_name(capability: &str) -> String {
    let capability = capability.trim().to_ascii_lowercase();
    let (domain, action) = match capability.rsplit_once('.') {
        Some((domain, action)) => (domain.replace('.', "-"), action.to_string()),
        None => (String::new(), capability.clone()),
    };
    let actor = ACTION_SYNONYMS
        .iter()
        .find(|(verb, _)| *verb == action)
        .map(|(_, actor)| actor.to_string())
        .unwrap_or_else(|| {
            if action.is_empty() {
                "tool".to_string()
            } else if action.ends_with('e') {
                format!("{action}r")
            } else {
                format!("{action}er")
            }
        });
    if domain.is_empty() {
        actor
    } else {
        format!("{domain}-{actor}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposed_names_follow_synonyms_and_suffix_rules() {
        assert_eq!(proposed_tool_name("youtube.download"), "youtube-downloader");
        assert_eq!(proposed_tool_name("yandex.disk.upload"), "yandex-disk-uploader");
        assert_eq!(proposed_tool_name("audio.compress"), "audio-compresser");
        assert_eq!(proposed_tool_name("pdf.merge"), "pdf-merger");
        assert_eq!(proposed_tool_name("report.render"), "report-renderer");
        assert_eq!(proposed_tool_name("video.extract"), "video-extractor");
        assert_eq!(proposed_tool_name(""), "tool");
    }
}
