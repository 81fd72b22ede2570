use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionNamedToolChoice,
        ChatCompletionRequestMessage,
        ChatCompletionTool,
        ChatCompletionToolChoiceOption,
        ChatCompletionToolType,
        ChatCompletionResponseMessage,
        CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs,
        FunctionName,
        FunctionObject,
        ResponseFormat,
        ResponseFormatJsonSchema,
    },
    Client,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;

use crate::config::LLMConfig;
use crate::context::TokenUsage;
use crate::error::AgentError;
use crate::llm::{
    BackendReply, ChatBackend, ChatMessage, FunctionChoice, FunctionSpec, SelectionReply,
};
use crate::stream::OpenAiStreamingGenerator;

/// [`ChatBackend`] implementation over any OpenAI-compatible API.
///
/// Two strategies live here, chosen by the agent at configuration time:
/// [`structured_next_step`](ChatBackend::structured_next_step) uses
/// constrained structured output with streaming, while
/// [`forced_function_call`](ChatBackend::forced_function_call) simulates it
/// for backends without structured-output support by forcing a single named
/// function. Forced and free selection accept both the modern tool-calls
/// answer shape and the legacy `function_call` one.
pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
    config: LLMConfig,
}

impl OpenAiBackend {
    /// Client against `config.base_url` with the configured key.
    /// Proxy settings are honored through reqwest's standard proxy
    /// environment variables.
    pub fn new(config: &LLMConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_base(&config.base_url);
        if let Some(api_key) = &config.api_key {
            openai_config = openai_config.with_api_key(api_key);
        }
        Self {
            client: Client::with_config(openai_config),
            config: config.clone(),
        }
    }

    /// Convert our message records into async-openai's typed messages.
    /// Serde round-trip: our records serialize to the exact wire format.
    fn request_messages(
        messages: &[ChatMessage],
    ) -> Result<Vec<ChatCompletionRequestMessage>, AgentError> {
        let value = serde_json::to_value(messages)?;
        serde_json::from_value(value)
            .map_err(|e| AgentError::LlmTransport(format!("failed to build messages: {}", e)))
    }

    fn build_tools(functions: &[FunctionSpec]) -> Vec<ChatCompletionTool> {
        functions
            .iter()
            .map(|spec| ChatCompletionTool {
                r#type:   ChatCompletionToolType::Function,
                function: FunctionObject {
                    name:        spec.name.clone(),
                    description: Some(spec.description.clone()),
                    parameters:  Some(spec.parameters.clone()),
                    strict:      None,
                },
            })
            .collect()
    }

    fn base_request(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
    ) -> CreateChatCompletionRequestArgs {
        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&self.config.model)
            .messages(messages)
            .max_tokens(self.config.max_tokens)
            .temperature(self.config.temperature);
        builder
    }

    async fn create(
        &self,
        request: CreateChatCompletionRequest,
    ) -> Result<(ChatCompletionResponseMessage, Option<TokenUsage>), AgentError> {
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| AgentError::LlmTransport(e.to_string()))?;

        let usage = response
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens));

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::LlmOutput("empty response from LLM".to_string()))?;
        Ok((choice.message, usage))
    }

    fn parse_arguments(name: &str, arguments: &str) -> Result<Value, AgentError> {
        serde_json::from_str(arguments).map_err(|e| {
            AgentError::LlmOutput(format!("arguments of '{}' are not valid JSON: {}", name, e))
        })
    }

    /// Extracts the arguments of the forced function from either answer
    /// shape, tool-calls first.
    fn forced_arguments(
        message: &ChatCompletionResponseMessage,
        name: &str,
    ) -> Option<Result<Value, AgentError>> {
        if let Some(tool_calls) = &message.tool_calls {
            for tc in tool_calls {
                if tc.function.name == name {
                    return Some(Self::parse_arguments(name, &tc.function.arguments));
                }
            }
        }
        if let Some(function_call) = &message.function_call {
            if function_call.name == name {
                return Some(Self::parse_arguments(name, &function_call.arguments));
            }
        }
        None
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    async fn structured_next_step(
        &self,
        messages: &[ChatMessage],
        schema: &Value,
        stream: &OpenAiStreamingGenerator,
    ) -> Result<BackendReply, AgentError> {
        let messages = Self::request_messages(messages)?;
        let response_format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: Some("Plan the next step and select a tool".to_string()),
                name:        "next_step".to_string(),
                schema:      Some(schema.clone()),
                strict:      Some(false),
            },
        };

        let mut builder = self.base_request(messages);
        builder.response_format(response_format).stream(true);
        let request = builder
            .build()
            .map_err(|e| AgentError::LlmTransport(format!("failed to build request: {}", e)))?;

        let mut chunk_stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| AgentError::LlmTransport(e.to_string()))?;

        let mut accumulated = String::new();
        while let Some(result) = chunk_stream.next().await {
            let chunk = result.map_err(|e| AgentError::LlmTransport(e.to_string()))?;
            if let Some(choice) = chunk.choices.first() {
                if let Some(content) = &choice.delta.content {
                    accumulated.push_str(content);
                }
            }
            stream.add_chunk(chunk);
        }

        let value: Value = serde_json::from_str(&accumulated).map_err(|e| {
            AgentError::LlmOutput(format!("structured response is not valid JSON: {}", e))
        })?;
        Ok(BackendReply { value, usage: None })
    }

    async fn forced_function_call(
        &self,
        messages: &[ChatMessage],
        function: &FunctionSpec,
    ) -> Result<BackendReply, AgentError> {
        let messages = Self::request_messages(messages)?;
        let mut builder = self.base_request(messages);
        builder
            .tools(Self::build_tools(std::slice::from_ref(function)))
            .tool_choice(ChatCompletionToolChoiceOption::Named(
                ChatCompletionNamedToolChoice {
                    r#type:   ChatCompletionToolType::Function,
                    function: FunctionName { name: function.name.clone() },
                },
            ));
        let request = builder
            .build()
            .map_err(|e| AgentError::LlmTransport(format!("failed to build request: {}", e)))?;

        let (message, usage) = self.create(request).await?;

        match Self::forced_arguments(&message, &function.name) {
            Some(value) => Ok(BackendReply { value: value?, usage }),
            None => Err(AgentError::LlmOutput(format!(
                "model did not call '{}'; content: {:?}",
                function.name, message.content
            ))),
        }
    }

    async fn select_function_call(
        &self,
        messages: &[ChatMessage],
        functions: &[FunctionSpec],
    ) -> Result<SelectionReply, AgentError> {
        let messages = Self::request_messages(messages)?;
        let mut builder = self.base_request(messages);
        builder.tools(Self::build_tools(functions));
        let request = builder
            .build()
            .map_err(|e| AgentError::LlmTransport(format!("failed to build request: {}", e)))?;

        let (message, usage) = self.create(request).await?;

        if let Some(tc) = message.tool_calls.as_ref().and_then(|calls| calls.first()) {
            let arguments = Self::parse_arguments(&tc.function.name, &tc.function.arguments)?;
            return Ok(SelectionReply {
                choice: FunctionChoice::Call { name: tc.function.name.clone(), arguments },
                usage,
            });
        }
        if let Some(fc) = &message.function_call {
            let arguments = Self::parse_arguments(&fc.name, &fc.arguments)?;
            return Ok(SelectionReply {
                choice: FunctionChoice::Call { name: fc.name.clone(), arguments },
                usage,
            });
        }
        if let Some(content) = message.content {
            return Ok(SelectionReply { choice: FunctionChoice::Content(content), usage });
        }
        Err(AgentError::LlmOutput(
            "model produced neither a function call nor content".to_string(),
        ))
    }
}
