use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{check_list_len, parse_args, ResearchTool, ToolDescriptor, ToolEnv};
use crate::context::ResearchContext;
use crate::error::AgentError;

/// Extract full detailed content from specific web pages.
///
/// Updates existing sources in place (keeping their citation number) or
/// inserts new ones with the next number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractPageContent {
    pub reasoning: String,
    pub urls:      Vec<String>,
}

impl ExtractPageContent {
    pub const NAME: &'static str = "extractpagecontenttool";

    fn validate(&self) -> Result<(), AgentError> {
        check_list_len(Self::NAME, "urls", self.urls.len(), 1, 5)
    }
}

#[async_trait]
impl ResearchTool for ExtractPageContent {
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

        tracing::info!(count = self.urls.len(), "extracting page content");

        let extracted = match provider.extract(&self.urls).await {
            Ok(extracted) => extracted,
            Err(e) => {
                tracing::warn!(error = %e, "extraction failed");
                return Ok(format!("Error: extraction failed: {}", e));
            }
        };

        for source in extracted {
            // a known URL keeps its citation number
            context.sources.merge_extracted(source);
        }

        let mut formatted = String::from("Extracted Page Content:\n\n");
        for url in &self.urls {
            let Some(source) = context.sources.get(url) else {
                continue;
            };
            if source.full_content.is_empty() {
                formatted.push_str(&format!("{}\n*Failed to extract content*\n\n", source.citation()));
                continue;
            }
            let preview: String = source
                .full_content
                .chars()
                .take(env.search_config.content_limit)
                .collect();
            formatted.push_str(&format!(
                "{}\n\n**Full Content:**\n{}\n\n*[Content length: {} characters]*\n\n---\n\n",
                source.citation(),
                preview,
                preview.chars().count()
            ));
        }

        Ok(formatted)
    }
}

fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "reasoning": {
                "type": "string",
                "description": "Why extract these specific pages"
            },
            "urls": {
                "type": "array",
                "items": {"type": "string"},
                "description": "List of URLs to extract full content from",
                "minItems": 1,
                "maxItems": 5
            }
        },
        "required": ["reasoning", "urls"],
        "additionalProperties": false
    })
}

fn parse(value: Value) -> Result<Box<dyn ResearchTool>, AgentError> {
    let tool: ExtractPageContent = parse_args(ExtractPageContent::NAME, value)?;
    tool.validate()?;
    Ok(Box::new(tool))
}

pub const EXTRACT_PAGE_CONTENT: ToolDescriptor = ToolDescriptor {
    name:        ExtractPageContent::NAME,
    description: "Extract full detailed content from specific web pages. \
                  Use after a web search to get complete page content from promising URLs. \
                  ALWAYS verify that extracted content matches the question's temporal \
                  context; if it contradicts the search snippet, prefer the snippet for \
                  factual questions.",
    schema,
    parse,
};
