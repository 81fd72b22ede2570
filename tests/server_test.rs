//! End-to-end HTTP tests: the real router served on an ephemeral listener,
//! driven with reqwest, with a scripted session factory standing in for
//! the OpenAI-backed one.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::timeout;

use sgr_deep_research::api::{self, AppState, SessionFactory};
use sgr_deep_research::llm::{MockBackend, MockReply};
use sgr_deep_research::registry::{AgentRegistry, ToolRegistry};
use sgr_deep_research::tools::ToolEnv;
use sgr_deep_research::{
    AgentError, GlobalConfig, ResearchAgent, ResolvedAgentDefinition,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test helpers
// ─────────────────────────────────────────────────────────────────────────────

fn reasoning_fields() -> Value {
    json!({
        "reasoning_steps": ["assess", "act"],
        "current_situation": "working",
        "plan_status": "ok",
        "enough_data": false,
        "remaining_steps": ["continue"],
        "task_completed": false
    })
}

fn next_step(function: Value) -> MockReply {
    let mut payload = reasoning_fields();
    payload["function"] = function;
    MockReply::Payload(payload)
}

fn final_answer_step(answer: &str) -> MockReply {
    next_step(json!({
        "tool_name_discriminator": "finalanswertool",
        "reasoning": "done",
        "completed_steps": ["worked"],
        "answer": answer,
        "status": "completed"
    }))
}

fn clarification_step() -> MockReply {
    next_step(json!({
        "tool_name_discriminator": "clarificationtool",
        "reasoning": "ambiguous",
        "unclear_terms": ["it"],
        "assumptions": ["a", "b"],
        "questions": ["Which year?"]
    }))
}

/// Session factory with one programmed reply script per created session.
struct ScriptedFactory {
    scripts: Mutex<VecDeque<Vec<MockReply>>>,
    tmp:     tempfile::TempDir,
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    async fn create(
        &self,
        definition: &ResolvedAgentDefinition,
        task: &str,
    ) -> Result<Arc<ResearchAgent>, AgentError> {
        let replies = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
        let archetype = AgentRegistry::get(&definition.base_class)
            .ok_or_else(|| AgentError::UnknownAgent(definition.base_class.clone()))?;
        let (toolkit, _) = ToolRegistry::resolve(&definition.tools);

        let mut execution = definition.execution.clone();
        execution.logs_dir = self.tmp.path().join("logs").to_string_lossy().into_owned();
        execution.reports_dir = self.tmp.path().join("reports").to_string_lossy().into_owned();

        Ok(Arc::new(ResearchAgent::new(
            &definition.name,
            task,
            archetype.mode,
            toolkit,
            Arc::new(MockBackend::new(replies)),
            ToolEnv::offline(execution.clone()),
            definition.llm.clone(),
            execution,
            definition.prompts.clone(),
        )))
    }
}

/// Serves the router on an ephemeral port; returns the base URL.
async fn spawn_server(scripts: Vec<Vec<MockReply>>) -> String {
    let mut config = GlobalConfig::default();
    config.install_default_definitions();

    let factory = ScriptedFactory {
        scripts: Mutex::new(scripts.into()),
        tmp:     tempfile::tempdir().expect("tempdir"),
    };
    let state = AppState::new(Arc::new(config), Arc::new(factory));
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server crashed");
    });
    format!("http://{}", addr)
}

fn chat_body(model: &str, content: &str) -> Value {
    json!({
        "model": model,
        "messages": [{"role": "user", "content": content}],
        "stream": true
    })
}

async fn post_chat(client: &reqwest::Client, base: &str, body: Value) -> reqwest::Response {
    client
        .post(format!("{}/v1/chat/completions", base))
        .json(&body)
        .send()
        .await
        .expect("request failed")
}

/// Drains the streaming body to completion (bounded by the DONE sentinel).
async fn drain(response: reqwest::Response) -> String {
    timeout(Duration::from_secs(5), response.text())
        .await
        .expect("stream drain timed out")
        .expect("body read failed")
}

// ─────────────────────────────────────────────────────────────────────────────
// Plain endpoints
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_the_service() {
    let base = spawn_server(vec![]).await;
    let body: Value = reqwest::get(format!("{}/health", base)).await.unwrap().json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "SGR Deep Research API");
}

#[tokio::test]
async fn models_lists_the_configured_agent_definitions() {
    let base = spawn_server(vec![]).await;
    let body: Value =
        reqwest::get(format!("{}/v1/models", base)).await.unwrap().json().await.unwrap();

    assert_eq!(body["object"], "list");
    let ids: Vec<&str> =
        body["data"].as_array().unwrap().iter().map(|m| m["id"].as_str().unwrap()).collect();
    assert!(ids.contains(&"sgr_agent"));
    assert!(ids.contains(&"sgr_tool_calling_agent"));
    assert_eq!(body["data"][0]["owned_by"], "sgr-deep-research");
}

#[tokio::test]
async fn non_streaming_requests_are_not_implemented() {
    let base = spawn_server(vec![]).await;
    let client = reqwest::Client::new();
    let mut body = chat_body("sgr_agent", "task");
    body["stream"] = json!(false);

    let response = post_chat(&client, &base, body).await;
    assert_eq!(response.status(), 501);
}

#[tokio::test]
async fn unknown_model_is_a_bad_request() {
    let base = spawn_server(vec![]).await;
    let client = reqwest::Client::new();

    let response = post_chat(&client, &base, chat_body("no_such_agent_anywhere", "task")).await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("Invalid model"));
}

#[tokio::test]
async fn missing_user_message_is_a_bad_request() {
    let base = spawn_server(vec![]).await;
    let client = reqwest::Client::new();
    let body = json!({
        "model": "sgr_agent",
        "messages": [{"role": "system", "content": "no user here"}],
        "stream": true
    });

    let response = post_chat(&client, &base, body).await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn unknown_agent_id_is_not_found() {
    let base = spawn_server(vec![]).await;
    let response =
        reqwest::get(format!("{}/agents/missing_agent/state", base)).await.unwrap();
    assert_eq!(response.status(), 404);
}

// ─────────────────────────────────────────────────────────────────────────────
// Full session over HTTP
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn chat_completion_streams_a_full_session() {
    let base = spawn_server(vec![vec![final_answer_step("http done")]]).await;
    let client = reqwest::Client::new();

    let response = post_chat(&client, &base, chat_body("sgr_agent", "research this")).await;
    assert_eq!(response.status(), 200);

    let agent_id = response
        .headers()
        .get("X-Agent-ID")
        .and_then(|v| v.to_str().ok())
        .expect("X-Agent-ID header")
        .to_string();
    assert!(agent_id.starts_with("sgr_agent_"));
    assert_eq!(
        response.headers().get("X-Agent-Model").and_then(|v| v.to_str().ok()),
        Some("sgr_agent")
    );

    let body = drain(response).await;
    assert!(body.contains("finalanswertool"));
    assert!(body.ends_with("data: [DONE]\n\n"));

    // the registry retains the finished session
    let agents: Value =
        reqwest::get(format!("{}/agents", base)).await.unwrap().json().await.unwrap();
    assert_eq!(agents["total"], 1);
    assert_eq!(agents["agents"][0]["agent_id"], agent_id.as_str());
    assert_eq!(agents["agents"][0]["state"], "completed");

    let state: Value = reqwest::get(format!("{}/agents/{}/state", base, agent_id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(state["state"], "completed");
    assert_eq!(state["execution_result"], "http done");
    assert_eq!(state["task"], "research this");
}

#[tokio::test]
async fn clarification_reattaches_through_chat_completions() {
    let base =
        spawn_server(vec![vec![clarification_step(), final_answer_step("after answer")]]).await;
    let client = reqwest::Client::new();

    let response = post_chat(&client, &base, chat_body("sgr_agent", "ambiguous task")).await;
    let agent_id = response.headers()["X-Agent-ID"].to_str().unwrap().to_string();
    let body = drain(response).await;
    assert!(body.contains("Which year?"));
    assert!(body.ends_with("data: [DONE]\n\n"));

    let state: Value = reqwest::get(format!("{}/agents/{}/state", base, agent_id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(state["state"], "waiting_for_clarification");

    // the follow-up names the session id in the model field
    let response = post_chat(&client, &base, chat_body(&agent_id, "2024, Russia")).await;
    assert_eq!(response.status(), 200);
    let body = drain(response).await;
    assert!(body.contains("finalanswertool"));
    assert!(body.ends_with("data: [DONE]\n\n"));

    let state: Value = reqwest::get(format!("{}/agents/{}/state", base, agent_id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(state["state"], "completed");
    assert_eq!(state["clarifications_used"], 1);
    assert_eq!(state["execution_result"], "after answer");
}

#[tokio::test]
async fn clarification_endpoint_also_resumes_the_session() {
    let base =
        spawn_server(vec![vec![clarification_step(), final_answer_step("resumed")]]).await;
    let client = reqwest::Client::new();

    let response = post_chat(&client, &base, chat_body("sgr_agent", "ambiguous task")).await;
    let agent_id = response.headers()["X-Agent-ID"].to_str().unwrap().to_string();
    drain(response).await;

    let response = client
        .post(format!("{}/agents/{}/provide_clarification", base, agent_id))
        .json(&json!({"clarifications": "use 2023 data"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body = drain(response).await;
    assert!(body.ends_with("data: [DONE]\n\n"));

    let state: Value = reqwest::get(format!("{}/agents/{}/state", base, agent_id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(state["state"], "completed");
    assert_eq!(state["execution_result"], "resumed");
}

#[tokio::test]
async fn clarification_for_unknown_agent_is_not_found() {
    let base = spawn_server(vec![]).await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/agents/sgr_agent_00000000-0000-0000-0000-000000000000/provide_clarification", base))
        .json(&json!({"clarifications": "hello"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

// ─────────────────────────────────────────────────────────────────────────────
// Concurrent sessions
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_sessions_are_independent() {
    let base = spawn_server(vec![
        vec![final_answer_step("answer A")],
        vec![final_answer_step("answer B")],
    ])
    .await;
    let client = reqwest::Client::new();

    let (first, second) = tokio::join!(
        post_chat(&client, &base, chat_body("sgr_agent", "task A")),
        post_chat(&client, &base, chat_body("sgr_agent", "task B")),
    );
    let id_a = first.headers()["X-Agent-ID"].to_str().unwrap().to_string();
    let id_b = second.headers()["X-Agent-ID"].to_str().unwrap().to_string();
    assert_ne!(id_a, id_b);

    let (body_a, body_b) = tokio::join!(drain(first), drain(second));
    assert!(body_a.ends_with("data: [DONE]\n\n"));
    assert!(body_b.ends_with("data: [DONE]\n\n"));

    let agents: Value =
        reqwest::get(format!("{}/agents", base)).await.unwrap().json().await.unwrap();
    assert_eq!(agents["total"], 2);

    // each session carries exactly one of the scripted results; the two
    // requests race for the scripts, so only the set is deterministic
    let state_a: Value = reqwest::get(format!("{}/agents/{}/state", base, id_a))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let state_b: Value = reqwest::get(format!("{}/agents/{}/state", base, id_b))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let mut results = vec![
        state_a["execution_result"].as_str().unwrap().to_string(),
        state_b["execution_result"].as_str().unwrap().to_string(),
    ];
    results.sort();
    assert_eq!(results, vec!["answer A", "answer B"]);
    assert_eq!(state_a["state"], "completed");
    assert_eq!(state_b["state"], "completed");
}
