use chrono::Local;

use crate::config::PromptsConfig;
use crate::error::AgentError;
use crate::tools::ToolDescriptor;

/// Default templates, embedded at compile time. A configuration may replace
/// any of them with a file path or an inline string.
pub const DEFAULT_SYSTEM_PROMPT: &str = include_str!("../prompts/system_prompt.txt");
pub const DEFAULT_INITIAL_USER_REQUEST: &str = include_str!("../prompts/initial_user_request.txt");
pub const DEFAULT_CLARIFICATION_RESPONSE: &str =
    include_str!("../prompts/clarification_response.txt");

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Renders the three prompt templates used by every session.
pub struct PromptLoader;

impl PromptLoader {
    /// System prompt with the current toolset substituted into the
    /// `{available_tools}` placeholder. The toolset changes per iteration
    /// as budgets narrow it, so this is rendered on every LLM call.
    pub fn system_prompt(
        toolkit: &[ToolDescriptor],
        prompts: &PromptsConfig,
    ) -> Result<String, AgentError> {
        let template = prompts.system_prompt()?;
        if !template.contains("{available_tools}") {
            return Err(AgentError::PromptTemplate(
                "system prompt template is missing the {available_tools} placeholder".to_string(),
            ));
        }
        let tools_list: Vec<String> = toolkit
            .iter()
            .enumerate()
            .map(|(i, tool)| format!("{}. {}: {}", i + 1, tool.name, tool.description))
            .collect();
        Ok(template.replace("{available_tools}", &tools_list.join("\n")))
    }

    /// First user message of a session: the task plus the current date.
    pub fn initial_user_request(
        task: &str,
        prompts: &PromptsConfig,
    ) -> Result<String, AgentError> {
        let template = prompts.initial_user_request()?;
        Ok(template
            .replace("{task}", task)
            .replace("{current_date}", &Local::now().format(DATE_FORMAT).to_string()))
    }

    /// User message delivered on clarification resume.
    pub fn clarification_response(
        clarifications: &str,
        prompts: &PromptsConfig,
    ) -> Result<String, AgentError> {
        let template = prompts.clarification_response()?;
        Ok(template
            .replace("{clarifications}", clarifications)
            .replace("{current_date}", &Local::now().format(DATE_FORMAT).to_string()))
    }
}
