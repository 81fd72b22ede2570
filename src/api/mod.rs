//! HTTP boundary: routes, request validation, session construction and the
//! clarification-reattach protocol over an in-memory session registry.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;

use crate::agent::ResearchAgent;
use crate::config::{GlobalConfig, ResolvedAgentDefinition};
use crate::context::AgentState;
use crate::error::AgentError;
use crate::llm::OpenAiBackend;
use crate::registry::{AgentRegistry, ToolRegistry};
use crate::search::{SearchProvider, TavilySearch};
use crate::tools::ToolEnv;

pub mod models;

use models::{
    AgentListItem, AgentListResponse, AgentStateResponse, ApiChatMessage, ChatCompletionRequest,
    ClarificationRequest, HealthResponse, ModelInfo, ModelListResponse,
};

/// Process-wide mapping from agent id to live session. Sessions are
/// retained for the lifetime of the process; no eviction.
pub type Sessions = Arc<RwLock<HashMap<String, Arc<ResearchAgent>>>>;

/// Builds a live session from a resolved definition. The server installs
/// [`OpenAiSessionFactory`]; tests install factories with scripted
/// backends.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(
        &self,
        definition: &ResolvedAgentDefinition,
        task: &str,
    ) -> Result<Arc<ResearchAgent>, AgentError>;
}

/// Default factory: OpenAI-compatible LLM backend plus the Tavily search
/// provider when a key is configured.
pub struct OpenAiSessionFactory;

#[async_trait]
impl SessionFactory for OpenAiSessionFactory {
    async fn create(
        &self,
        definition: &ResolvedAgentDefinition,
        task: &str,
    ) -> Result<Arc<ResearchAgent>, AgentError> {
        let archetype = AgentRegistry::get(&definition.base_class)
            .ok_or_else(|| AgentError::UnknownAgent(definition.base_class.clone()))?;

        let (toolkit, missing) = ToolRegistry::resolve(&definition.tools);
        if !missing.is_empty() {
            return Err(AgentError::UnknownTool(missing.join(", ")));
        }

        let search: Option<Arc<dyn SearchProvider>> = match definition.search.tavily_api_key {
            Some(_) => Some(Arc::new(TavilySearch::new(&definition.search)?)),
            None => None,
        };
        let env = ToolEnv {
            search,
            search_config: definition.search.clone(),
            execution: definition.execution.clone(),
        };

        let agent = ResearchAgent::new(
            &definition.name,
            task,
            archetype.mode,
            toolkit,
            Arc::new(OpenAiBackend::new(&definition.llm)),
            env,
            definition.llm.clone(),
            definition.execution.clone(),
            definition.prompts.clone(),
        );
        tracing::info!(
            agent = %agent.id,
            base_class = %definition.base_class,
            tools = definition.tools.len(),
            "created agent"
        );
        Ok(Arc::new(agent))
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config:   Arc<GlobalConfig>,
    pub sessions: Sessions,
    pub factory:  Arc<dyn SessionFactory>,
}

impl AppState {
    pub fn new(config: Arc<GlobalConfig>, factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            config,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            factory,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/agents", get(list_agents))
        .route("/agents/:id/state", get(agent_state))
        .route("/agents/:id/provide_clarification", post(provide_clarification))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (status, Json(json!({ "detail": detail.into() })))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

async fn list_models(State(state): State<AppState>) -> Json<ModelListResponse> {
    let mut names: Vec<&String> = state.config.agents.keys().collect();
    names.sort();
    Json(ModelListResponse {
        object: "list",
        data:   names.into_iter().map(ModelInfo::new).collect(),
    })
}

async fn list_agents(State(state): State<AppState>) -> Json<AgentListResponse> {
    let sessions = state.sessions.read().await;
    let mut agents = Vec::with_capacity(sessions.len());
    for agent in sessions.values() {
        let snapshot = agent.snapshot().await;
        agents.push(AgentListItem {
            agent_id:      agent.id.clone(),
            task:          agent.task.clone(),
            state:         snapshot.state,
            creation_time: agent.creation_time,
        });
    }
    agents.sort_by(|a, b| a.creation_time.cmp(&b.creation_time));
    let total = agents.len();
    Json(AgentListResponse { agents, total })
}

async fn agent_state(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<AgentStateResponse>, ApiError> {
    let agent = lookup(&state, &agent_id)
        .await
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Agent not found"))?;
    let snapshot = agent.snapshot().await;
    Ok(Json(AgentStateResponse::new(agent.id.clone(), agent.task.clone(), snapshot)))
}

async fn provide_clarification(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(request): Json<ClarificationRequest>,
) -> Result<Response, ApiError> {
    let agent = lookup(&state, &agent_id)
        .await
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Agent not found"))?;
    deliver_clarification(&agent, &request.clarifications).await
}

async fn chat_completions(
    State(state): State<AppState>,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Response, ApiError> {
    if !request.stream {
        return Err(api_error(
            StatusCode::NOT_IMPLEMENTED,
            "Only streaming responses are supported. Set 'stream=true'",
        ));
    }

    // A follow-up call that names a waiting session by id carries a
    // clarification in its latest user message.
    if looks_like_agent_id(&request.model) {
        if let Some(agent) = lookup(&state, &request.model).await {
            if agent.snapshot().await.state == AgentState::WaitingForClarification {
                let clarifications = extract_user_content(&request.messages)?;
                return deliver_clarification(&agent, &clarifications).await;
            }
        }
    }

    let task = extract_user_content(&request.messages)?;

    let Ok(definition) = state.config.resolve_agent(&request.model) else {
        let mut available: Vec<&String> = state.config.agents.keys().collect();
        available.sort();
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("Invalid model '{}'. Available models: {:?}", request.model, available),
        ));
    };

    let agent = state
        .factory
        .create(&definition, &task)
        .await
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    state.sessions.write().await.insert(agent.id.clone(), Arc::clone(&agent));

    let runner = Arc::clone(&agent);
    tokio::spawn(async move { runner.execute().await });

    sse_response(&agent, Some(&request.model))
}

async fn lookup(state: &AppState, agent_id: &str) -> Option<Arc<ResearchAgent>> {
    state.sessions.read().await.get(agent_id).cloned()
}

async fn deliver_clarification(
    agent: &Arc<ResearchAgent>,
    clarifications: &str,
) -> Result<Response, ApiError> {
    tracing::info!(agent = %agent.id, "providing clarification");
    agent
        .provide_clarification(clarifications)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    sse_response(agent, None)
}

/// Agent ids are `<name>_<uuid-v4>`; anything with an underscore and more
/// than 20 characters is treated as one.
fn looks_like_agent_id(model: &str) -> bool {
    model.contains('_') && model.len() > 20
}

/// The task or clarification text is the latest user message.
fn extract_user_content(messages: &[ApiChatMessage]) -> Result<String, ApiError> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.clone())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "User message not found in messages"))
}

/// Streaming response attached to the session's chunk queue. The drain
/// ends at the generator's `[DONE]` sentinel; the session loop continues
/// independently of the consumer.
fn sse_response(agent: &Arc<ResearchAgent>, model: Option<&str>) -> Result<Response, ApiError> {
    let frames = agent
        .streaming()
        .stream()
        .map(|frame| Ok::<Bytes, Infallible>(Bytes::from(frame)));

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("X-Agent-ID", agent.id.clone());
    if let Some(model) = model {
        builder = builder.header("X-Agent-Model", model);
    }
    builder
        .body(Body::from_stream(frames))
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}
