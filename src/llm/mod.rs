use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::TokenUsage;
use crate::error::AgentError;
use crate::stream::OpenAiStreamingGenerator;
use crate::tools::ToolDescriptor;

mod mock;
mod openai;

pub use mock::{MockBackend, MockReply};
pub use openai::OpenAiBackend;

/// One conversation entry in the LLM transport schema. Serialized to the
/// provider's wire format at the adapter boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCallRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRecord>>,
}

/// Legacy function-call payload carried by assistant messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallRecord {
    pub name:      String,
    /// JSON-encoded arguments, as the wire format requires.
    pub arguments: String,
}

/// One entry of an assistant message's tool-calls array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id:       String,
    pub r#type:   String,
    pub function: FunctionCallRecord,
}

impl ChatMessage {
    fn bare(role: &str, content: Option<String>) -> Self {
        Self {
            role:          role.to_string(),
            content,
            name:          None,
            tool_call_id:  None,
            function_call: None,
            tool_calls:    None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::bare("system", Some(content.into()))
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::bare("user", Some(content.into()))
    }

    /// Assistant message recording a selected tool in legacy function-call
    /// form.
    pub fn assistant_function_call(
        content: impl Into<String>,
        name: &str,
        arguments: &str,
    ) -> Self {
        let mut message = Self::bare("assistant", Some(content.into()));
        message.function_call = Some(FunctionCallRecord {
            name:      name.to_string(),
            arguments: arguments.to_string(),
        });
        message
    }

    /// Assistant message recording a selected tool in tool-calls form.
    pub fn assistant_tool_call(
        content: impl Into<String>,
        call_id: &str,
        name: &str,
        arguments: &str,
    ) -> Self {
        let mut message = Self::bare("assistant", Some(content.into()));
        message.tool_calls = Some(vec![ToolCallRecord {
            id:       call_id.to_string(),
            r#type:   "function".to_string(),
            function: FunctionCallRecord {
                name:      name.to_string(),
                arguments: arguments.to_string(),
            },
        }]);
        message
    }

    /// Legacy `function` role result message.
    pub fn function_result(name: &str, content: impl Into<String>) -> Self {
        let mut message = Self::bare("function", Some(content.into()));
        message.name = Some(name.to_string());
        message
    }

    /// `tool` role result message referencing a tool-call id.
    pub fn tool_result(call_id: &str, name: &str, content: impl Into<String>) -> Self {
        let mut message = Self::bare("tool", Some(content.into()));
        message.name = Some(name.to_string());
        message.tool_call_id = Some(call_id.to_string());
        message
    }
}

/// A function exposed to the LLM: name, description and argument schema.
#[derive(Debug, Clone)]
pub struct FunctionSpec {
    pub name:        String,
    pub description: String,
    pub parameters:  Value,
}

impl FunctionSpec {
    pub fn from_descriptor(descriptor: &ToolDescriptor) -> Self {
        Self {
            name:        descriptor.name.to_string(),
            description: descriptor.description.to_string(),
            parameters:  (descriptor.schema)(),
        }
    }
}

/// Outcome of a free-choice function call.
#[derive(Debug, Clone)]
pub enum FunctionChoice {
    /// The model called a function with the given JSON arguments.
    Call { name: String, arguments: Value },
    /// The model answered in prose instead of calling a function.
    Content(String),
}

/// Structured payload plus the token usage reported for the call.
#[derive(Debug, Clone)]
pub struct BackendReply {
    pub value: Value,
    pub usage: Option<TokenUsage>,
}

/// A free-choice selection plus the token usage reported for the call.
#[derive(Debug, Clone)]
pub struct SelectionReply {
    pub choice: FunctionChoice,
    pub usage:  Option<TokenUsage>,
}

/// The single interface between the agent loop and any LLM provider.
///
/// # Contract
/// - Must be Send + Sync (used behind `Arc<dyn ChatBackend>`)
/// - `Err` means this step cannot proceed: transport failure, or the model
///   failed to emit the required structured output / function call.
/// - `structured_next_step` must forward every received chunk to `stream`
///   so the caller's SSE consumer sees the thought text as it is produced.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Streaming completion constrained to `schema`; the accumulated
    /// response is parsed into the schema and returned as a JSON value.
    async fn structured_next_step(
        &self,
        messages: &[ChatMessage],
        schema: &Value,
        stream: &OpenAiStreamingGenerator,
    ) -> Result<BackendReply, AgentError>;

    /// Unary completion forced to call exactly `function`; returns its
    /// parsed arguments.
    async fn forced_function_call(
        &self,
        messages: &[ChatMessage],
        function: &FunctionSpec,
    ) -> Result<BackendReply, AgentError>;

    /// Unary completion with a free choice among `functions`.
    async fn select_function_call(
        &self,
        messages: &[ChatMessage],
        functions: &[FunctionSpec],
    ) -> Result<SelectionReply, AgentError>;
}
