use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{check_list_len, check_max_chars, parse_args, ResearchTool, ToolDescriptor, ToolEnv};
use crate::context::ResearchContext;
use crate::error::AgentError;

/// Ask clarifying questions when facing an ambiguous request.
///
/// Selecting this tool suspends the loop until the caller delivers an
/// answer through the clarification endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clarification {
    pub reasoning:     String,
    pub unclear_terms: Vec<String>,
    pub assumptions:   Vec<String>,
    pub questions:     Vec<String>,
}

impl Clarification {
    pub const NAME: &'static str = "clarificationtool";

    fn validate(&self) -> Result<(), AgentError> {
        check_max_chars(Self::NAME, "reasoning", &self.reasoning, 200)?;
        check_list_len(Self::NAME, "unclear_terms", self.unclear_terms.len(), 1, 3)?;
        check_list_len(Self::NAME, "assumptions", self.assumptions.len(), 2, 3)?;
        check_list_len(Self::NAME, "questions", self.questions.len(), 1, 3)?;
        Ok(())
    }
}

#[async_trait]
impl ResearchTool for Clarification {
    fn tool_name(&self) -> &'static str {
        Self::NAME
    }

    fn as_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    async fn invoke(&self, _context: &mut ResearchContext, _env: &ToolEnv)
        -> Result<String, AgentError>
    {
        Ok(self.questions.join("\n"))
    }
}

fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "reasoning": {
                "type": "string",
                "description": "Why clarification is needed (1-2 sentences MAX)",
                "maxLength": 200
            },
            "unclear_terms": {
                "type": "array",
                "items": {"type": "string"},
                "description": "List of unclear terms (brief, 1-3 words each)",
                "minItems": 1,
                "maxItems": 3
            },
            "assumptions": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Possible interpretations (short, 1 sentence each)",
                "minItems": 2,
                "maxItems": 3
            },
            "questions": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Specific clarifying questions (short and direct)",
                "minItems": 1,
                "maxItems": 3
            }
        },
        "required": ["reasoning", "unclear_terms", "assumptions", "questions"],
        "additionalProperties": false
    })
}

fn parse(value: Value) -> Result<Box<dyn ResearchTool>, AgentError> {
    let tool: Clarification = parse_args(Clarification::NAME, value)?;
    tool.validate()?;
    Ok(Box::new(tool))
}

pub const CLARIFICATION: ToolDescriptor = ToolDescriptor {
    name:        Clarification::NAME,
    description: "Ask clarifying questions when the request is ambiguous. \
                  Keep all fields concise - brief reasoning, short terms, and clear questions. \
                  Execution pauses until the user answers.",
    schema,
    parse,
};
