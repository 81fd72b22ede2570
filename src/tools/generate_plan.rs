use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{check_list_len, parse_args, pretty_json_excluding, ResearchTool, ToolDescriptor, ToolEnv};
use crate::context::ResearchContext;
use crate::error::AgentError;

/// Generate a research plan, splitting a complex request into steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratePlan {
    pub reasoning:         String,
    pub research_goal:     String,
    pub planned_steps:     Vec<String>,
    pub search_strategies: Vec<String>,
}

impl GeneratePlan {
    pub const NAME: &'static str = "generateplantool";

    fn validate(&self) -> Result<(), AgentError> {
        check_list_len(Self::NAME, "planned_steps", self.planned_steps.len(), 3, 4)?;
        check_list_len(Self::NAME, "search_strategies", self.search_strategies.len(), 2, 3)?;
        Ok(())
    }
}

#[async_trait]
impl ResearchTool for GeneratePlan {
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
                "description": "Justification for research approach"
            },
            "research_goal": {
                "type": "string",
                "description": "Primary research objective"
            },
            "planned_steps": {
                "type": "array",
                "items": {"type": "string"},
                "description": "List of 3-4 planned steps",
                "minItems": 3,
                "maxItems": 4
            },
            "search_strategies": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Information search strategies",
                "minItems": 2,
                "maxItems": 3
            }
        },
        "required": ["reasoning", "research_goal", "planned_steps", "search_strategies"],
        "additionalProperties": false
    })
}

fn parse(value: Value) -> Result<Box<dyn ResearchTool>, AgentError> {
    let tool: GeneratePlan = parse_args(GeneratePlan::NAME, value)?;
    tool.validate()?;
    Ok(Box::new(tool))
}

pub const GENERATE_PLAN: ToolDescriptor = ToolDescriptor {
    name:        GeneratePlan::NAME,
    description: "Generate a research plan. Useful to split a complex request \
                  into manageable steps.",
    schema,
    parse,
};
