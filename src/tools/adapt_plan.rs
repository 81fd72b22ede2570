use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{check_list_len, parse_args, pretty_json_excluding, ResearchTool, ToolDescriptor, ToolEnv};
use crate::context::ResearchContext;
use crate::error::AgentError;

/// Adapt the research plan based on new findings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptPlan {
    pub reasoning:     String,
    pub original_goal: String,
    pub new_goal:      String,
    pub plan_changes:  Vec<String>,
    pub next_steps:    Vec<String>,
}

impl AdaptPlan {
    pub const NAME: &'static str = "adaptplantool";

    fn validate(&self) -> Result<(), AgentError> {
        check_list_len(Self::NAME, "plan_changes", self.plan_changes.len(), 1, 3)?;
        check_list_len(Self::NAME, "next_steps", self.next_steps.len(), 2, 4)?;
        Ok(())
    }
}

#[async_trait]
impl ResearchTool for AdaptPlan {
    fn tool_name(&self) -> &'static str {
        Self::NAME
    }

    fn as_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    async fn invoke(&self, _context: &mut ResearchContext, _env: &ToolEnv)
        -> Result<String, AgentError>
    {
        pretty_json_excluding(self, &["reasoning"])
    }
}

fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "reasoning": {
                "type": "string",
                "description": "Why plan needs adaptation based on new data"
            },
            "original_goal": {
                "type": "string",
                "description": "Original research goal"
            },
            "new_goal": {
                "type": "string",
                "description": "Updated research goal"
            },
            "plan_changes": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Specific changes made to plan",
                "minItems": 1,
                "maxItems": 3
            },
            "next_steps": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Updated remaining steps",
                "minItems": 2,
                "maxItems": 4
            }
        },
        "required": ["reasoning", "original_goal", "new_goal", "plan_changes", "next_steps"],
        "additionalProperties": false
    })
}

fn parse(value: Value) -> Result<Box<dyn ResearchTool>, AgentError> {
    let tool: AdaptPlan = parse_args(AdaptPlan::NAME, value)?;
    tool.validate()?;
    Ok(Box::new(tool))
}

pub const ADAPT_PLAN: ToolDescriptor = ToolDescriptor {
    name:        AdaptPlan::NAME,
    description: "Adapt the research plan based on new findings.",
    schema,
    parse,
};
