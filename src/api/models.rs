//! OpenAI-compatible request/response records for the API endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::{AgentState, ContextSnapshot};
use crate::tools::Reasoning;

/// Incoming chat message. Only role and content matter to the server; a
/// session derives its task from the last user entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiChatMessage {
    #[serde(default = "default_role")]
    pub role:    String,
    #[serde(default)]
    pub content: String,
}

fn default_role() -> String {
    "user".to_string()
}

/// Request for creating a chat completion. `model` names either an agent
/// definition or an existing agent session id.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default = "default_model")]
    pub model:       String,
    pub messages:    Vec<ApiChatMessage>,
    #[serde(default = "default_stream")]
    pub stream:      bool,
    #[serde(default)]
    pub max_tokens:  Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

fn default_model() -> String {
    "sgr_tool_calling_agent".to_string()
}

fn default_stream() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status:  &'static str,
    pub service: &'static str,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self { status: "healthy", service: "SGR Deep Research API" }
    }
}

/// One configured agent definition in the `/v1/models` listing.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id:       String,
    pub object:   &'static str,
    pub created:  u64,
    pub owned_by: &'static str,
}

impl ModelInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id:       id.into(),
            object:   "model",
            created:  1234567890,
            owned_by: "sgr-deep-research",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelListResponse {
    pub object: &'static str,
    pub data:   Vec<ModelInfo>,
}

/// State projection served by `GET /agents/{id}/state`.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStateResponse {
    pub agent_id:               String,
    pub task:                   String,
    pub state:                  AgentState,
    pub iteration:              usize,
    pub searches_used:          usize,
    pub clarifications_used:    usize,
    pub sources_count:          usize,
    pub current_step_reasoning: Option<Reasoning>,
    pub execution_result:       Option<String>,
    pub tokens_used:            u64,
}

impl AgentStateResponse {
    pub fn new(agent_id: String, task: String, snapshot: ContextSnapshot) -> Self {
        Self {
            agent_id,
            task,
            state:                  snapshot.state,
            iteration:              snapshot.iteration,
            searches_used:          snapshot.searches_used,
            clarifications_used:    snapshot.clarifications_used,
            sources_count:          snapshot.sources_count,
            current_step_reasoning: snapshot.current_step_reasoning,
            execution_result:       snapshot.execution_result,
            tokens_used:            snapshot.tokens_used,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentListItem {
    pub agent_id:      String,
    pub task:          String,
    pub state:         AgentState,
    pub creation_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentListResponse {
    pub agents: Vec<AgentListItem>,
    pub total:  usize,
}

/// Request for providing clarifications to a waiting agent.
#[derive(Debug, Clone, Deserialize)]
pub struct ClarificationRequest {
    pub clarifications: String,
}
