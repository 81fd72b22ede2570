use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{ExecutionConfig, SearchConfig};
use crate::context::ResearchContext;
use crate::error::AgentError;
use crate::search::SearchProvider;

mod adapt_plan;
mod clarification;
mod create_report;
mod extract_page;
mod final_answer;
mod generate_plan;
mod reasoning;
mod web_search;

pub use adapt_plan::{AdaptPlan, ADAPT_PLAN};
pub use clarification::{Clarification, CLARIFICATION};
pub use create_report::{Confidence, CreateReport, CREATE_REPORT};
pub use extract_page::{ExtractPageContent, EXTRACT_PAGE_CONTENT};
pub use final_answer::{FinalAnswer, FinalStatus, FINAL_ANSWER};
pub use generate_plan::{GeneratePlan, GENERATE_PLAN};
pub use reasoning::{Reasoning, REASONING};
pub use web_search::{WebSearch, WEB_SEARCH};

/// Collaborators a tool may need besides the research context.
///
/// Built once per session from the resolved agent definition and injected
/// into every `invoke` call; tools must not retain it across invocations.
#[derive(Clone)]
pub struct ToolEnv {
    pub search:        Option<Arc<dyn SearchProvider>>,
    pub search_config: SearchConfig,
    pub execution:     ExecutionConfig,
}

impl ToolEnv {
    /// Environment with no search provider — enough for the planning,
    /// clarification and terminal tools.
    pub fn offline(execution: ExecutionConfig) -> Self {
        Self {
            search: None,
            search_config: SearchConfig::default(),
            execution,
        }
    }
}

/// A parsed tool invocation requested by the LLM.
///
/// # Contract
/// - `invoke` may mutate the context and returns either plain text or a
///   JSON-encoded string, appended verbatim as the tool-result message.
/// - Provider failures (network, bad upstream data) are reported as an
///   error *string* in `Ok` so the loop continues and the LLM can plan
///   around them. `Err` is reserved for faults that must fail the session.
#[async_trait]
pub trait ResearchTool: Send + Sync {
    /// Registry key and LLM-visible discriminator.
    fn tool_name(&self) -> &'static str;

    /// Full argument record, used for conversation history and step logs.
    fn as_json(&self) -> Value;

    async fn invoke(&self, context: &mut ResearchContext, env: &ToolEnv)
        -> Result<String, AgentError>;
}

/// Static description of a tool type: its name, the description shown to
/// the LLM, the JSON Schema of its arguments, and the parser that turns
/// LLM-produced arguments into a live [`ResearchTool`].
#[derive(Clone, Copy)]
pub struct ToolDescriptor {
    pub name:        &'static str,
    pub description: &'static str,
    pub schema:      fn() -> Value,
    pub parse:       fn(Value) -> Result<Box<dyn ResearchTool>, AgentError>,
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor").field("name", &self.name).finish()
    }
}

impl PartialEq for ToolDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// All tools shipped with the crate, in presentation order.
pub fn builtin_tools() -> Vec<ToolDescriptor> {
    vec![
        CLARIFICATION,
        GENERATE_PLAN,
        ADAPT_PLAN,
        WEB_SEARCH,
        EXTRACT_PAGE_CONTENT,
        CREATE_REPORT,
        FINAL_ANSWER,
        REASONING,
    ]
}

/// Names of the default research toolkit used by the built-in agent
/// definitions (everything except the reasoning tool, which the
/// tool-calling flavour adds itself).
pub fn default_toolkit_names() -> Vec<String> {
    vec![
        Clarification::NAME.to_string(),
        GeneratePlan::NAME.to_string(),
        AdaptPlan::NAME.to_string(),
        FinalAnswer::NAME.to_string(),
        WebSearch::NAME.to_string(),
        ExtractPageContent::NAME.to_string(),
        CreateReport::NAME.to_string(),
    ]
}

// ── Post-parse validation helpers ────────────────────────────────────────
// Bounds mirror the constraints advertised in each tool's schema; the LLM
// occasionally ignores them, so they are enforced again after parsing.

pub(crate) fn check_list_len(
    tool: &'static str,
    field: &str,
    len: usize,
    min: usize,
    max: usize,
) -> Result<(), AgentError> {
    if len < min || len > max {
        return Err(AgentError::ToolArguments {
            name:   tool.to_string(),
            reason: format!("{} must have {}..{} items, got {}", field, min, max, len),
        });
    }
    Ok(())
}

pub(crate) fn check_max_chars(
    tool: &'static str,
    field: &str,
    value: &str,
    max: usize,
) -> Result<(), AgentError> {
    if value.chars().count() > max {
        return Err(AgentError::ToolArguments {
            name:   tool.to_string(),
            reason: format!("{} exceeds {} characters", field, max),
        });
    }
    Ok(())
}

/// Deserializes and validates tool arguments into `T`.
pub(crate) fn parse_args<T>(tool: &'static str, value: Value) -> Result<T, AgentError>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_value(value).map_err(|e| AgentError::ToolArguments {
        name:   tool.to_string(),
        reason: e.to_string(),
    })
}

/// Serializes a record to a pretty JSON string with the given top-level
/// fields removed. Plan tools use it to keep `reasoning` out of results.
pub(crate) fn pretty_json_excluding<T: serde::Serialize>(
    record: &T,
    exclude: &[&str],
) -> Result<String, AgentError> {
    let mut value = serde_json::to_value(record)?;
    if let Some(map) = value.as_object_mut() {
        for field in exclude {
            map.remove(*field);
        }
    }
    Ok(serde_json::to_string_pretty(&value)?)
}
