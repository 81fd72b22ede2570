pub mod agent;
pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod llm;
pub mod prompts;
pub mod registry;
pub mod schema;
pub mod search;
pub mod stream;
pub mod tools;

// Convenience re-exports at crate root
pub use agent::{DecisionMode, ResearchAgent, StepRecord};
pub use config::{
    AgentDefinition, ExecutionConfig, GlobalConfig, LLMConfig, PromptsConfig,
    ResolvedAgentDefinition, SearchConfig, ServerConfig,
};
pub use context::{
    AgentState, ContextSnapshot, ResearchContext, SearchResult, SourceData, SourceMap, TokenUsage,
};
pub use error::AgentError;
pub use llm::{ChatBackend, ChatMessage, MockBackend, MockReply, OpenAiBackend};
pub use registry::{AgentArchetype, AgentRegistry, ToolRegistry};
pub use schema::{build_next_step_schema, parse_next_step, NextStepDecision};
pub use search::{SearchProvider, TavilySearch};
pub use stream::{OpenAiStreamingGenerator, StreamingGenerator};
pub use tools::{ResearchTool, ToolDescriptor, ToolEnv};
