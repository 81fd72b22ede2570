use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{check_list_len, check_max_chars, parse_args, ResearchTool, ToolDescriptor, ToolEnv};
use crate::context::ResearchContext;
use crate::error::AgentError;

/// The schema-guided reasoning block: a step-by-step assessment of the
/// current situation and the remaining plan, produced by the LLM on every
/// iteration and never mutated after capture.
///
/// Doubles as a standalone tool in the tool-calling flavour, where the
/// reasoning phase forces a call to it before the action is selected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reasoning {
    pub reasoning_steps:   Vec<String>,
    pub current_situation: String,
    pub plan_status:       String,
    #[serde(default)]
    pub enough_data:       bool,
    pub remaining_steps:   Vec<String>,
    pub task_completed:    bool,
}

impl Reasoning {
    pub const NAME: &'static str = "reasoningtool";

    /// First remaining step, used as the assistant-message content that
    /// accompanies the selected tool call.
    pub fn next_step_hint(&self) -> &str {
        self.remaining_steps
            .first()
            .map(String::as_str)
            .unwrap_or("Completing")
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        check_list_len(Self::NAME, "reasoning_steps", self.reasoning_steps.len(), 2, 3)?;
        check_max_chars(Self::NAME, "current_situation", &self.current_situation, 300)?;
        check_max_chars(Self::NAME, "plan_status", &self.plan_status, 150)?;
        check_list_len(Self::NAME, "remaining_steps", self.remaining_steps.len(), 1, 3)?;
        Ok(())
    }
}

#[async_trait]
impl ResearchTool for Reasoning {
    fn tool_name(&self) -> &'static str {
        Self::NAME
    }

    fn as_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    async fn invoke(&self, _context: &mut ResearchContext, _env: &ToolEnv)
        -> Result<String, AgentError>
    {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "reasoning_steps": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Step-by-step reasoning (brief, 1 sentence each)",
                "minItems": 2,
                "maxItems": 3
            },
            "current_situation": {
                "type": "string",
                "description": "Current research situation (2-3 sentences MAX)",
                "maxLength": 300
            },
            "plan_status": {
                "type": "string",
                "description": "Status of current plan (1 sentence)",
                "maxLength": 150
            },
            "enough_data": {
                "type": "boolean",
                "description": "Sufficient data collected for comprehensive report?"
            },
            "remaining_steps": {
                "type": "array",
                "items": {"type": "string"},
                "description": "1-3 remaining steps (brief, action-oriented)",
                "minItems": 1,
                "maxItems": 3
            },
            "task_completed": {
                "type": "boolean",
                "description": "Is the research task finished?"
            }
        },
        "required": [
            "reasoning_steps",
            "current_situation",
            "plan_status",
            "enough_data",
            "remaining_steps",
            "task_completed"
        ],
        "additionalProperties": false
    })
}

fn parse(value: Value) -> Result<Box<dyn ResearchTool>, AgentError> {
    let tool: Reasoning = parse_args(Reasoning::NAME, value)?;
    tool.validate()?;
    Ok(Box::new(tool))
}

pub const REASONING: ToolDescriptor = ToolDescriptor {
    name:        Reasoning::NAME,
    description: "Determines the next reasoning step with adaptive planning. \
                  Keep all text fields concise and focused.",
    schema,
    parse,
};
