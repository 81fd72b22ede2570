use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use sgr_deep_research::api::{self, AppState, OpenAiSessionFactory};
use sgr_deep_research::config::{GlobalConfig, ServerConfig};
use sgr_deep_research::registry::{AgentRegistry, ToolRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sgr_deep_research=info,sgr_server=info")),
        )
        .init();

    let server = ServerConfig::from_env();

    let mut config = GlobalConfig::from_yaml(&server.config_file)
        .with_context(|| format!("failed to load '{}'", server.config_file))?;
    config.install_default_definitions();
    if Path::new(&server.agents_file).exists() {
        config
            .merge_definitions_from_yaml(&server.agents_file)
            .with_context(|| format!("failed to load '{}'", server.agents_file))?;
    } else {
        tracing::info!(file = %server.agents_file, "no extra agent definitions file");
    }
    config.validate().context("configuration validation failed")?;

    for tool in ToolRegistry::list() {
        tracing::info!(tool = tool.name, "tool registered");
    }
    for agent in AgentRegistry::list() {
        tracing::info!(agent = agent.name, "agent class registered");
    }
    for name in config.agents.keys() {
        tracing::info!(definition = %name, "agent definition loaded");
    }

    let state = AppState::new(Arc::new(config), Arc::new(OpenAiSessionFactory));
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind((server.host.as_str(), server.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", server.host, server.port))?;
    tracing::info!(host = %server.host, port = server.port, "listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
