use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::SearchConfig;
use crate::context::SourceData;
use crate::error::AgentError;

/// Web search and page-extraction provider used by the research tools.
///
/// The production implementation is [`TavilySearch`]; tests inject stubs.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Search the web, returning at most `max_results` sources with title,
    /// URL and snippet filled in.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SourceData>, AgentError>;

    /// Extract full page content for the given URLs. Failed URLs are simply
    /// absent from the result.
    async fn extract(&self, urls: &[String]) -> Result<Vec<SourceData>, AgentError>;
}

/// Tavily REST API client (`/search` and `/extract`).
pub struct TavilySearch {
    client:   reqwest::Client,
    api_key:  String,
    base_url: String,
}

impl TavilySearch {
    pub fn new(config: &SearchConfig) -> Result<Self, AgentError> {
        let api_key = config
            .tavily_api_key
            .clone()
            .ok_or_else(|| AgentError::Config("Tavily API key is not provided".to_string()))?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AgentError::Search(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_key,
            base_url: config.tavily_api_base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, AgentError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Search(format!("request to {} failed: {}", path, e)))?
            .error_for_status()
            .map_err(|e| AgentError::Search(format!("{} returned error status: {}", path, e)))?;
        response
            .json()
            .await
            .map_err(|e| AgentError::Search(format!("invalid JSON from {}: {}", path, e)))
    }
}

#[async_trait]
impl SearchProvider for TavilySearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SourceData>, AgentError> {
        tracing::info!(query, max_results, "tavily search");
        let response = self
            .post(
                "/search",
                json!({
                    "api_key": self.api_key,
                    "query": query,
                    "max_results": max_results,
                    "include_raw_content": false,
                }),
            )
            .await?;

        let mut sources = Vec::new();
        for (i, result) in result_array(&response).iter().enumerate() {
            let url = str_field(result, "url");
            if url.is_empty() {
                continue;
            }
            let full_content = str_field(result, "raw_content");
            sources.push(SourceData {
                number:       i,
                title:        Some(str_field(result, "title")),
                url,
                snippet:      str_field(result, "content"),
                char_count:   full_content.len(),
                full_content,
            });
        }
        Ok(sources)
    }

    async fn extract(&self, urls: &[String]) -> Result<Vec<SourceData>, AgentError> {
        tracing::info!(count = urls.len(), "tavily extract");
        let response = self
            .post("/extract", json!({ "api_key": self.api_key, "urls": urls }))
            .await?;

        let mut sources = Vec::new();
        for (i, result) in result_array(&response).iter().enumerate() {
            let url = str_field(result, "url");
            if url.is_empty() {
                continue;
            }
            let full_content = str_field(result, "raw_content");
            let title = url
                .rsplit('/')
                .find(|part| !part.is_empty())
                .unwrap_or("Extracted Content")
                .to_string();
            sources.push(SourceData {
                number:       i,
                title:        Some(title),
                url,
                snippet:      String::new(),
                char_count:   full_content.len(),
                full_content,
            });
        }

        if let Some(failed) = response.get("failed_results").and_then(Value::as_array) {
            if !failed.is_empty() {
                tracing::warn!(count = failed.len(), "failed to extract some URLs");
            }
        }
        Ok(sources)
    }
}

fn result_array(response: &Value) -> Vec<Value> {
    response
        .get("results")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
