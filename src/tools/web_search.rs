use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{parse_args, ResearchTool, ToolDescriptor, ToolEnv};
use crate::context::{ResearchContext, SearchResult};
use crate::error::AgentError;

/// Search the web for real-time information about any topic.
///
/// Merges new sources into the context keyed by URL (existing URLs keep
/// their citation number), appends a [`SearchResult`] to the search history
/// and increments the search budget counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearch {
    pub reasoning:   String,
    pub query:       String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
}

impl WebSearch {
    pub const NAME: &'static str = "websearchtool";

    fn validate(&self) -> Result<(), AgentError> {
        if let Some(n) = self.max_results {
            if !(1..=10).contains(&n) {
                return Err(AgentError::ToolArguments {
                    name:   Self::NAME.to_string(),
                    reason: format!("max_results must be in 1..10, got {}", n),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ResearchTool for WebSearch {
    fn tool_name(&self) -> &'static str {
        Self::NAME
    }

    fn as_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    async fn invoke(&self, context: &mut ResearchContext, env: &ToolEnv)
        -> Result<String, AgentError>
    {
        let Some(provider) = env.search.as_ref() else {
            return Ok("Error: no search provider is configured for this agent".to_string());
        };
        let max_results = self
            .max_results
            .unwrap_or_else(|| env.search_config.max_results.min(10));

        tracing::info!(query = %self.query, "web search");

        let found = match provider.search(&self.query, max_results).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "search failed");
                return Ok(format!("Error: search failed: {}", e));
            }
        };

        // Merge by URL: a URL seen before keeps its original number, so the
        // citations list is rebuilt from the canonical context entries.
        let mut citations = Vec::with_capacity(found.len());
        for source in found {
            citations.push(context.sources.merge_search_hit(source));
        }

        let mut formatted = format!("Search Query: {}\n\n", self.query);
        formatted.push_str("Search Results (titles, links, short snippets):\n\n");
        for source in &citations {
            let snippet = if source.snippet.chars().count() > 100 {
                let cut: String = source.snippet.chars().take(100).collect();
                format!("{}...", cut)
            } else {
                source.snippet.clone()
            };
            formatted.push_str(&format!("{}\n{}\n\n", source.citation(), snippet));
        }

        context.searches.push(SearchResult {
            query:     self.query.clone(),
            answer:    None,
            citations,
            timestamp: Utc::now(),
        });
        context.searches_used += 1;

        Ok(formatted)
    }
}

fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "reasoning": {
                "type": "string",
                "description": "Why this search is needed and what to expect"
            },
            "query": {
                "type": "string",
                "description": "Search query in same language as user request"
            },
            "max_results": {
                "type": "integer",
                "description": "Maximum results",
                "minimum": 1,
                "maximum": 10
            }
        },
        "required": ["reasoning", "query"],
        "additionalProperties": false
    })
}

fn parse(value: Value) -> Result<Box<dyn ResearchTool>, AgentError> {
    let tool: WebSearch = parse_args(WebSearch::NAME, value)?;
    tool.validate()?;
    Ok(Box::new(tool))
}

pub const WEB_SEARCH: ToolDescriptor = ToolDescriptor {
    name:        WebSearch::NAME,
    description: "Search the web for real-time information about any topic. \
                  Returns page titles, URLs, and short snippets. \
                  Use SPECIFIC terms and context in queries; search in the SAME LANGUAGE \
                  as the user request. Snippets often contain direct answers to factual \
                  questions - check them carefully. Use the page extraction tool to get \
                  full content from found URLs.",
    schema,
    parse,
};
