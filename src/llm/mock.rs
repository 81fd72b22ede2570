use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::TokenUsage;
use crate::error::AgentError;
use crate::llm::{
    BackendReply, ChatBackend, ChatMessage, FunctionChoice, FunctionSpec, SelectionReply,
};
use crate::stream::OpenAiStreamingGenerator;

/// One programmed backend response.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Structured payload returned by `structured_next_step` or
    /// `forced_function_call`.
    Payload(Value),
    /// A named function call returned by `select_function_call`.
    Function { name: String, arguments: Value },
    /// Prose content returned by `select_function_call`.
    Content(String),
    /// Fails the call with an LLM-output error.
    Failure(String),
}

/// Scripted [`ChatBackend`] — consumes its programmed replies in order and
/// records which adapter method served each call. No network access.
pub struct MockBackend {
    replies:  Mutex<VecDeque<MockReply>>,
    call_log: Mutex<Vec<String>>,
    usage:    Option<TokenUsage>,
}

impl MockBackend {
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies:  Mutex::new(replies.into()),
            call_log: Mutex::new(Vec::new()),
            usage:    Some(TokenUsage::new(100, 50)),
        }
    }

    /// Mock that reports no token usage.
    pub fn without_usage(replies: Vec<MockReply>) -> Self {
        Self { usage: None, ..Self::new(replies) }
    }

    /// Returns the number of adapter calls made so far.
    pub fn call_count(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }

    /// Returns the adapter method used by the Nth call (0-indexed).
    pub fn method_for_call(&self, n: usize) -> Option<String> {
        self.call_log.lock().unwrap().get(n).cloned()
    }

    fn next_reply(&self, method: &str) -> Result<MockReply, AgentError> {
        self.call_log.lock().unwrap().push(method.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AgentError::LlmOutput("MockBackend: no more programmed replies".to_string()))
    }

    fn payload(&self, method: &str) -> Result<BackendReply, AgentError> {
        match self.next_reply(method)? {
            MockReply::Payload(value) => Ok(BackendReply { value, usage: self.usage }),
            MockReply::Failure(message) => Err(AgentError::LlmOutput(message)),
            other => Err(AgentError::LlmOutput(format!(
                "MockBackend: {} got incompatible reply {:?}",
                method, other
            ))),
        }
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn structured_next_step(
        &self,
        _messages: &[ChatMessage],
        _schema: &Value,
        stream: &OpenAiStreamingGenerator,
    ) -> Result<BackendReply, AgentError> {
        let reply = self.payload("structured_next_step")?;
        // a real backend streams the thought text as it is produced
        stream.add_chunk_from_str(&reply.value.to_string());
        Ok(reply)
    }

    async fn forced_function_call(
        &self,
        _messages: &[ChatMessage],
        _function: &FunctionSpec,
    ) -> Result<BackendReply, AgentError> {
        self.payload("forced_function_call")
    }

    async fn select_function_call(
        &self,
        _messages: &[ChatMessage],
        _functions: &[FunctionSpec],
    ) -> Result<SelectionReply, AgentError> {
        match self.next_reply("select_function_call")? {
            MockReply::Function { name, arguments } => Ok(SelectionReply {
                choice: FunctionChoice::Call { name, arguments },
                usage:  self.usage,
            }),
            MockReply::Content(content) => Ok(SelectionReply {
                choice: FunctionChoice::Content(content),
                usage:  self.usage,
            }),
            MockReply::Failure(message) => Err(AgentError::LlmOutput(message)),
            other => Err(AgentError::LlmOutput(format!(
                "MockBackend: select_function_call got incompatible reply {:?}",
                other
            ))),
        }
    }
}
