//! Builds the composite "next step" schema the LLM must obey for one
//! reason/select decision, and parses its output back into a typed
//! reasoning block plus a live tool instance.
//!
//! The schema is assembled as a runtime `serde_json::Value` rather than a
//! host-language type: the allowed toolset changes per iteration, so the
//! discriminated union over tool argument schemas has to be built
//! dynamically from the narrowed descriptor list.

use serde_json::{json, Map, Value};

use crate::error::AgentError;
use crate::tools::{Reasoning, ResearchTool, ToolDescriptor, REASONING};

/// Field that tags each union variant with its tool name. LLMs reliably
/// choose among tagged variants but drift when given a raw union.
pub const DISCRIMINATOR_FIELD: &str = "tool_name_discriminator";

/// Function name used when the composite schema is exposed through the
/// legacy function-calling strategy.
pub const NEXT_STEP_FUNCTION: &str = "plan_next_step";

/// One parsed next-step decision: the reasoning block and the chosen tool.
pub struct NextStepDecision {
    pub reasoning: Reasoning,
    pub tool:      Box<dyn ResearchTool>,
}

/// Composite schema: the reasoning block's fields at the top level plus a
/// `function` field holding the discriminated union over `tools`.
pub fn build_next_step_schema(tools: &[ToolDescriptor]) -> Value {
    // Reuse the reasoning tool's schema verbatim so the block stays
    // identical between the SGR and tool-calling flavours.
    let reasoning_schema = (REASONING.schema)();

    let mut properties = reasoning_schema
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    properties.insert(
        "function".to_string(),
        tool_union_schema(tools),
    );

    let mut required: Vec<Value> = reasoning_schema
        .get("required")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    required.push(json!("function"));

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

/// Discriminated union over the allowed tools. A single-element toolset
/// collapses to that tool's schema with the discriminator attached.
fn tool_union_schema(tools: &[ToolDescriptor]) -> Value {
    let mut variants: Vec<Value> = tools.iter().map(discriminant_schema).collect();
    match variants.len() {
        1 => variants.remove(0),
        _ => json!({
            "description": "Select the appropriate tool for the next step",
            "anyOf": variants
        }),
    }
}

/// The tool's argument schema with a literal-typed discriminator field
/// spliced in.
fn discriminant_schema(tool: &ToolDescriptor) -> Value {
    let mut schema = (tool.schema)();

    let properties = schema
        .get_mut("properties")
        .and_then(Value::as_object_mut);
    if let Some(properties) = properties {
        properties.insert(
            DISCRIMINATOR_FIELD.to_string(),
            json!({
                "type": "string",
                "enum": [tool.name],
                "description": "Tool name discriminator"
            }),
        );
    }
    if let Some(required) = schema.get_mut("required").and_then(Value::as_array_mut) {
        required.insert(0, json!(DISCRIMINATOR_FIELD));
    }
    schema
}

/// Splits a next-step payload into the reasoning block and the selected
/// tool, dispatching on the discriminator against the offered toolset.
pub fn parse_next_step(
    value: Value,
    allowed: &[ToolDescriptor],
) -> Result<NextStepDecision, AgentError> {
    let mut fields: Map<String, Value> = match value {
        Value::Object(fields) => fields,
        other => {
            return Err(AgentError::LlmOutput(format!(
                "next step payload is not an object: {}",
                other
            )))
        }
    };

    let function = fields.remove("function").ok_or_else(|| {
        AgentError::LlmOutput("next step payload is missing the required `function` field".to_string())
    })?;

    let reasoning: Reasoning = serde_json::from_value(Value::Object(fields))
        .map_err(|e| AgentError::LlmOutput(format!("invalid reasoning block: {}", e)))?;
    reasoning.validate()?;

    let tool = parse_tool_choice(function, allowed)?;
    Ok(NextStepDecision { reasoning, tool })
}

/// Parses a discriminated tool variant into a live tool instance.
pub fn parse_tool_choice(
    function: Value,
    allowed: &[ToolDescriptor],
) -> Result<Box<dyn ResearchTool>, AgentError> {
    let mut fields = match function {
        Value::Object(fields) => fields,
        other => {
            return Err(AgentError::LlmOutput(format!(
                "tool choice is not an object: {}",
                other
            )))
        }
    };

    let discriminator = fields
        .remove(DISCRIMINATOR_FIELD)
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or_else(|| {
            AgentError::LlmOutput(format!("tool choice is missing `{}`", DISCRIMINATOR_FIELD))
        })?;

    let descriptor = allowed
        .iter()
        .find(|d| d.name.eq_ignore_ascii_case(&discriminator))
        .ok_or_else(|| {
            AgentError::LlmOutput(format!(
                "tool '{}' is not in the offered toolset",
                discriminator
            ))
        })?;

    (descriptor.parse)(Value::Object(fields))
}
