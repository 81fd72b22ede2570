use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{check_list_len, parse_args, ResearchTool, ToolDescriptor, ToolEnv};
use crate::context::{AgentState, ResearchContext};
use crate::error::AgentError;

/// Terminal status a session may finish with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    Completed,
    Failed,
}

impl From<FinalStatus> for AgentState {
    fn from(status: FinalStatus) -> Self {
        match status {
            FinalStatus::Completed => AgentState::Completed,
            FinalStatus::Failed => AgentState::Failed,
        }
    }
}

/// Finalize the research task and complete agent execution.
///
/// Sets the context's execution result and moves it into the terminal
/// state carried in `status`, which exits the loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub reasoning:       String,
    pub completed_steps: Vec<String>,
    pub answer:          String,
    pub status:          FinalStatus,
}

impl FinalAnswer {
    pub const NAME: &'static str = "finalanswertool";

    /// Synthetic completion used when the LLM answers with plain content
    /// instead of a tool call.
    pub fn from_content(content: String) -> Self {
        Self {
            reasoning:       "Agent responded with a direct answer instead of a tool call"
                .to_string(),
            completed_steps: vec!["Responded directly with the final answer".to_string()],
            answer:          content,
            status:          FinalStatus::Completed,
        }
    }

    fn validate(&self) -> Result<(), AgentError> {
        check_list_len(Self::NAME, "completed_steps", self.completed_steps.len(), 1, 5)
    }
}

#[async_trait]
impl ResearchTool for FinalAnswer {
    fn tool_name(&self) -> &'static str {
        Self::NAME
    }

    fn as_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    async fn invoke(&self, context: &mut ResearchContext, _env: &ToolEnv)
        -> Result<String, AgentError>
    {
        context.state = self.status.into();
        context.execution_result = Some(self.answer.clone());
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "reasoning": {
                "type": "string",
                "description": "Why task is now complete and how answer was verified"
            },
            "completed_steps": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Summary of completed steps including verification",
                "minItems": 1,
                "maxItems": 5
            },
            "answer": {
                "type": "string",
                "description": "Comprehensive final answer with EXACT factual details \
                                (dates, numbers, names)"
            },
            "status": {
                "type": "string",
                "enum": ["completed", "failed"],
                "description": "Task completion status"
            }
        },
        "required": ["reasoning", "completed_steps", "answer", "status"],
        "additionalProperties": false
    })
}

fn parse(value: Value) -> Result<Box<dyn ResearchTool>, AgentError> {
    let tool: FinalAnswer = parse_args(FinalAnswer::NAME, value)?;
    tool.validate()?;
    Ok(Box::new(tool))
}

pub const FINAL_ANSWER: ToolDescriptor = ToolDescriptor {
    name:        FinalAnswer::NAME,
    description: "Finalize the research task and complete agent execution after all \
                  steps are completed. Call after the research task is done.",
    schema,
    parse,
};
