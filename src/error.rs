use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("agent class '{0}' not found in registry")]
    UnknownAgent(String),

    #[error("tool '{0}' not found in registry")]
    UnknownTool(String),

    #[error("prompt template error: {0}")]
    PromptTemplate(String),

    #[error("LLM transport error: {0}")]
    LlmTransport(String),

    #[error("LLM failed to produce structured output: {0}")]
    LlmOutput(String),

    #[error("tool '{name}' rejected arguments: {reason}")]
    ToolArguments { name: String, reason: String },

    #[error("search provider error: {0}")]
    Search(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
