// Goal decomposition - plan prompt and response parsing

use serde_json::Value;

use super::types::PlanError;
use crate::assistant::command::{json_slice, strip_markdown_fences};
use crate::assistant::prompts;
use crate::context::SystemInfo;
use crate::providers::{GenerationRequest, GenerationSettings};

/// One step as proposed by the model, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftStep {
    pub description: String,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftPlan {
    pub steps: Vec<DraftStep>,
    pub notes: Option<String>,
}

/// Build the decomposition request for `goal`.
pub fn plan_request(settings: &GenerationSettings, system: &SystemInfo, goal: &str) -> GenerationRequest {
    settings
        .request(goal.trim())
        .with_system(prompts::plan_prompt(system))
}

/// Parse the model's answer into draft steps.
///
/// Accepts `{"plan": [...], "notes": ...}` (or `"steps"`), a bare array, code
/// fences and chatter around the JSON. Each item needs a `cmd` (or `command`)
/// string; `thought` (or `description`) becomes the step description. Items
/// with a blank command are dropped. An empty list, an item without a command
/// or no usable command at all is an error.
pub fn parse_plan_response(text: &str) -> Result<DraftPlan, PlanError> {
    let stripped = strip_markdown_fences(text);
    if stripped.is_empty() {
        return Err(PlanError::Decomposition("model returned an empty response".to_string()));
    }

    let value = parse_json(stripped)
        .ok_or_else(|| PlanError::Decomposition("response is not valid plan JSON".to_string()))?;

    let (items, notes) = match &value {
        Value::Array(items) => (items, None),
        Value::Object(obj) => {
            let items = obj
                .get("plan")
                .or_else(|| obj.get("steps"))
                .and_then(Value::as_array)
                .ok_or_else(|| PlanError::Decomposition("response has no \"plan\" array".to_string()))?;
            let notes = obj
                .get("notes")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string);
            (items, notes)
        }
        _ => {
            return Err(PlanError::Decomposition(
                "response is neither a plan object nor a step list".to_string(),
            ))
        }
    };

    if items.is_empty() {
        return Err(PlanError::Decomposition("plan has no steps".to_string()));
    }

    let mut steps = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let command = string_field(item, &["cmd", "command"]).ok_or_else(|| {
            PlanError::Decomposition(format!("step {} has no command", i + 1))
        })?;
        let command = command.trim();
        if command.is_empty() {
            tracing::warn!("Dropping plan step {} with a blank command", i + 1);
            continue;
        }
        let description = string_field(item, &["thought", "description", "step"])
            .unwrap_or_default()
            .trim()
            .to_string();
        steps.push(DraftStep {
            description,
            command: command.to_string(),
        });
    }

    if steps.is_empty() {
        return Err(PlanError::Decomposition("plan has no valid commands".to_string()));
    }

    tracing::debug!("Parsed plan with {} step(s)", steps.len());
    Ok(DraftPlan { steps, notes })
}

fn parse_json(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Some(value);
    }
    let parse = |slice: &str| serde_json::from_str::<Value>(slice).ok();
    // An array of step objects also contains a `{...}` span, so each shape
    // is tried on its own
    json_slice(text, '{', '}')
        .and_then(parse)
        .or_else(|| json_slice(text, '[', ']').and_then(parse))
}

fn string_field<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| item.get(*key).and_then(Value::as_str))
}
