use async_trait::async_trait;
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{parse_args, ResearchTool, ToolDescriptor, ToolEnv};
use crate::context::ResearchContext;
use crate::error::AgentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Create a comprehensive report with citations as the final step of
/// research. Writes a Markdown file under the reports directory and
/// returns a JSON summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReport {
    pub reasoning:                       String,
    pub title:                           String,
    pub user_request_language_reference: String,
    pub content:                         String,
    pub confidence:                      Confidence,
}

impl CreateReport {
    pub const NAME: &'static str = "createreporttool";

    /// Filename-safe title: alphanumerics, spaces, dashes and underscores,
    /// capped at 50 characters.
    fn sanitized_title(&self) -> String {
        self.title
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '-' || *c == '_')
            .take(50)
            .collect()
    }
}

#[async_trait]
impl ResearchTool for CreateReport {
    fn tool_name(&self) -> &'static str {
        Self::NAME
    }

    fn as_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    async fn invoke(&self, context: &mut ResearchContext, env: &ToolEnv)
        -> Result<String, AgentError>
    {
        let reports_dir = &env.execution.reports_dir;
        std::fs::create_dir_all(reports_dir)?;

        let now = Local::now();
        let filename = format!("{}_{}.md", now.format("%Y%m%d_%H%M%S"), self.sanitized_title());
        let filepath = std::path::Path::new(reports_dir).join(filename);

        let mut full_content = format!("# {}\n\n", self.title);
        full_content.push_str(&format!("*Created: {}*\n\n", now.format("%Y-%m-%d %H:%M:%S")));
        full_content.push_str(&self.content);
        full_content.push_str("\n\n");
        if !context.sources.is_empty() {
            full_content.push_str("---\n\n## Sources\n\n");
            let citations: Vec<String> =
                context.sources.iter().map(|s| s.citation()).collect();
            full_content.push_str(&citations.join("\n"));
        }

        std::fs::write(&filepath, full_content)?;

        let word_count = self.content.split_whitespace().count();
        tracing::info!(
            title = %self.title,
            words = word_count,
            sources = context.sources.len(),
            path = %filepath.display(),
            "report saved"
        );

        let report = json!({
            "title": self.title,
            "content": self.content,
            "confidence": self.confidence,
            "sources_count": context.sources.len(),
            "word_count": word_count,
            "filepath": filepath.to_string_lossy(),
            "timestamp": now.to_rfc3339(),
        });
        Ok(serde_json::to_string_pretty(&report)?)
    }
}

fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "reasoning": {
                "type": "string",
                "description": "Why ready to create report now"
            },
            "title": {
                "type": "string",
                "description": "Report title"
            },
            "user_request_language_reference": {
                "type": "string",
                "description": "Copy of original user request to ensure language consistency"
            },
            "content": {
                "type": "string",
                "description": "Comprehensive research report in the SAME LANGUAGE as \
                                user_request_language_reference. MANDATORY: inline citations \
                                [1], [2], [3] after EVERY factual claim."
            },
            "confidence": {
                "type": "string",
                "enum": ["high", "medium", "low"],
                "description": "Confidence in findings"
            }
        },
        "required": ["reasoning", "title", "user_request_language_reference", "content", "confidence"],
        "additionalProperties": false
    })
}

fn parse(value: Value) -> Result<Box<dyn ResearchTool>, AgentError> {
    let tool: CreateReport = parse_args(CreateReport::NAME, value)?;
    Ok(Box::new(tool))
}

pub const CREATE_REPORT: ToolDescriptor = ToolDescriptor {
    name:        CreateReport::NAME,
    description: "Create a comprehensive detailed report with citations as the final step \
                  of research. Every factual claim in content MUST have inline citations \
                  [1], [2], [3] integrated directly into sentences.",
    schema,
    parse,
};
