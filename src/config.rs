use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AgentError;
use crate::prompts::{
    DEFAULT_CLARIFICATION_RESPONSE, DEFAULT_INITIAL_USER_REQUEST, DEFAULT_SYSTEM_PROMPT,
};
use crate::registry::{AgentRegistry, ToolRegistry};
use crate::tools::default_toolkit_names;

/// LLM endpoint, credentials and generation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMConfig {
    pub api_key:           Option<String>,
    pub base_url:          String,
    pub model:             String,
    /// Maximum number of output tokens per completion.
    pub max_tokens:        u32,
    pub temperature:       f32,
    /// Proxy URL (e.g. socks5://127.0.0.1:1081). Applied through reqwest's
    /// proxy environment variables.
    pub proxy:             Option<String>,
    /// Use constrained structured output; turn off for backends that only
    /// support function calling.
    pub structured_output: bool,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            api_key:           None,
            base_url:          "https://api.openai.com/v1".to_string(),
            model:             "gpt-4o-mini".to_string(),
            max_tokens:        8000,
            temperature:       0.4,
            proxy:             None,
            structured_output: true,
        }
    }
}

impl LLMConfig {
    /// Serialization for session logs: credentials and proxy excluded.
    pub fn redacted(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Some(map) = value.as_object_mut() {
            map.remove("api_key");
            map.remove("proxy");
        }
        value
    }
}

/// Search provider credentials and per-tool content caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub tavily_api_key:      Option<String>,
    pub tavily_api_base_url: String,
    /// Maximum number of search results per query.
    pub max_results:         usize,
    /// Maximum pages to scrape in one extraction.
    pub max_pages:           usize,
    /// Content character limit per source in tool results.
    pub content_limit:       usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            tavily_api_key:      None,
            tavily_api_base_url: "https://api.tavily.com".to_string(),
            max_results:         10,
            max_pages:           5,
            content_limit:       1500,
        }
    }
}

/// Execution parameters and budget limits for agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub max_steps:          usize,
    pub max_clarifications: usize,
    pub max_iterations:     usize,
    pub max_searches:       usize,
    pub logs_dir:           String,
    pub reports_dir:        String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_steps:          6,
            max_clarifications: 3,
            max_iterations:     10,
            max_searches:       4,
            logs_dir:           "logs".to_string(),
            reports_dir:        "reports".to_string(),
        }
    }
}

/// Prompt template sources: inline strings win over files, files win over
/// the embedded defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub system_prompt_file:          Option<PathBuf>,
    pub initial_user_request_file:   Option<PathBuf>,
    pub clarification_response_file: Option<PathBuf>,
    pub system_prompt_str:           Option<String>,
    pub initial_user_request_str:    Option<String>,
    pub clarification_response_str:  Option<String>,
}

impl PromptsConfig {
    fn resolve(
        inline: &Option<String>,
        file: &Option<PathBuf>,
        default: &str,
    ) -> Result<String, AgentError> {
        if let Some(inline) = inline {
            return Ok(inline.clone());
        }
        if let Some(file) = file {
            return std::fs::read_to_string(file).map_err(|e| {
                AgentError::Config(format!("prompt file '{}' not readable: {}", file.display(), e))
            });
        }
        Ok(default.to_string())
    }

    pub fn system_prompt(&self) -> Result<String, AgentError> {
        Self::resolve(&self.system_prompt_str, &self.system_prompt_file, DEFAULT_SYSTEM_PROMPT)
    }

    pub fn initial_user_request(&self) -> Result<String, AgentError> {
        Self::resolve(
            &self.initial_user_request_str,
            &self.initial_user_request_file,
            DEFAULT_INITIAL_USER_REQUEST,
        )
    }

    pub fn clarification_response(&self) -> Result<String, AgentError> {
        Self::resolve(
            &self.clarification_response_str,
            &self.clarification_response_file,
            DEFAULT_CLARIFICATION_RESPONSE,
        )
    }

    /// Startup check: every configured file must exist and every template
    /// must carry its placeholder.
    pub fn validate(&self) -> Result<(), AgentError> {
        for file in [
            &self.system_prompt_file,
            &self.initial_user_request_file,
            &self.clarification_response_file,
        ]
        .into_iter()
        .flatten()
        {
            if !file.exists() {
                return Err(AgentError::Config(format!(
                    "prompt file '{}' not found",
                    file.display()
                )));
            }
        }
        if !self.system_prompt()?.contains("{available_tools}") {
            return Err(AgentError::Config(
                "system prompt template is missing the {available_tools} placeholder".to_string(),
            ));
        }
        Ok(())
    }
}

/// An agent definition as written in YAML. Per-section overrides are
/// partial objects merged onto the global configuration at resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentDefinition {
    #[serde(skip)]
    pub name:       String,
    pub base_class: String,
    pub tools:      Vec<String>,
    pub llm:        Option<Value>,
    pub search:     Option<Value>,
    pub execution:  Option<Value>,
    pub prompts:    Option<Value>,
}

/// A definition with all overrides applied — what the session factory
/// consumes.
#[derive(Debug, Clone)]
pub struct ResolvedAgentDefinition {
    pub name:       String,
    pub base_class: String,
    pub tools:      Vec<String>,
    pub llm:        LLMConfig,
    pub search:     SearchConfig,
    pub execution:  ExecutionConfig,
    pub prompts:    PromptsConfig,
}

/// The single immutable configuration value, built once from YAML plus the
/// environment and threaded explicitly into the session factory.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub llm:       LLMConfig,
    pub search:    SearchConfig,
    pub execution: ExecutionConfig,
    pub prompts:   PromptsConfig,
    pub agents:    HashMap<String, AgentDefinition>,
}

impl GlobalConfig {
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AgentError::Config(format!("configuration file '{}' not readable: {}", path.display(), e))
        })?;
        let mut config: GlobalConfig = serde_yaml::from_str(&raw)
            .map_err(|e| AgentError::Config(format!("invalid YAML in '{}': {}", path.display(), e)))?;
        for (name, definition) in config.agents.iter_mut() {
            definition.name = name.clone();
        }
        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment variables override YAML values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SGR__LLM__API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("SGR__LLM__BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("SGR__LLM__MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("SGR__SEARCH__TAVILY_API_KEY") {
            self.search.tavily_api_key = Some(v);
        }
        if let Ok(v) = std::env::var("SGR__EXECUTION__LOGS_DIR") {
            self.execution.logs_dir = v;
        }
        if let Ok(v) = std::env::var("SGR__EXECUTION__REPORTS_DIR") {
            self.execution.reports_dir = v;
        }
    }

    /// Installs the built-in agent definitions (one per registered agent
    /// class, default research toolkit). Existing names are replaced, as
    /// the defaults are the reference behaviour.
    pub fn install_default_definitions(&mut self) {
        for archetype in crate::registry::builtin_agents() {
            self.agents.insert(
                archetype.name.to_string(),
                AgentDefinition {
                    name:       archetype.name.to_string(),
                    base_class: archetype.name.to_string(),
                    tools:      default_toolkit_names(),
                    llm:        None,
                    search:     None,
                    execution:  None,
                    prompts:    None,
                },
            );
        }
    }

    /// Merges agent definitions from a separate YAML file into the current
    /// set. Definitions with an already-known name replace it with a
    /// warning.
    pub fn merge_definitions_from_yaml(&mut self, path: impl AsRef<Path>) -> Result<(), AgentError> {
        #[derive(Deserialize)]
        struct DefinitionsFile {
            agents: HashMap<String, AgentDefinition>,
        }

        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AgentError::Config(format!("agents file '{}' not readable: {}", path.display(), e))
        })?;
        let mut file: DefinitionsFile = serde_yaml::from_str(&raw)
            .map_err(|e| AgentError::Config(format!("invalid YAML in '{}': {}", path.display(), e)))?;

        let mut overridden: Vec<&String> =
            file.agents.keys().filter(|name| self.agents.contains_key(*name)).collect();
        overridden.sort();
        if !overridden.is_empty() {
            tracing::warn!(
                agents = %overridden.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", "),
                "loaded agents override existing definitions"
            );
        }

        for (name, definition) in file.agents.iter_mut() {
            definition.name = name.clone();
        }
        self.agents.extend(file.agents);
        Ok(())
    }

    /// Applies a definition's partial overrides onto the global sections.
    pub fn resolve_agent(&self, name: &str) -> Result<ResolvedAgentDefinition, AgentError> {
        let definition = self
            .agents
            .get(name)
            .ok_or_else(|| AgentError::UnknownAgent(name.to_string()))?;
        Ok(ResolvedAgentDefinition {
            name:       definition.name.clone(),
            base_class: definition.base_class.clone(),
            tools:      definition.tools.clone(),
            llm:        overlay(&self.llm, definition.llm.as_ref())?,
            search:     overlay(&self.search, definition.search.as_ref())?,
            execution:  overlay(&self.execution, definition.execution.as_ref())?,
            prompts:    overlay(&self.prompts, definition.prompts.as_ref())?,
        })
    }

    /// Startup validation: every registered definition must resolve to a
    /// usable agent. Failures here are fatal.
    pub fn validate(&self) -> Result<(), AgentError> {
        for name in self.agents.keys() {
            let resolved = self.resolve_agent(name)?;
            if resolved.llm.api_key.is_none() {
                return Err(AgentError::Config(format!(
                    "LLM API key is not provided for agent '{}'",
                    name
                )));
            }
            if resolved.tools.is_empty() {
                return Err(AgentError::Config(format!(
                    "tools are not provided for agent '{}'",
                    name
                )));
            }
            if AgentRegistry::get(&resolved.base_class).is_none() {
                return Err(AgentError::UnknownAgent(resolved.base_class));
            }
            let (_, missing) = ToolRegistry::resolve(&resolved.tools);
            if !missing.is_empty() {
                return Err(AgentError::UnknownTool(missing.join(", ")));
            }
            resolved.prompts.validate()?;
        }
        Ok(())
    }
}

/// Deserializes `base` overlaid with the fields present in `patch`.
fn overlay<T>(base: &T, patch: Option<&Value>) -> Result<T, AgentError>
where
    T: Serialize + serde::de::DeserializeOwned + Clone,
{
    let Some(patch) = patch else {
        return Ok(base.clone());
    };
    let mut value = serde_json::to_value(base)?;
    merge_objects(&mut value, patch);
    serde_json::from_value(value)
        .map_err(|e| AgentError::Config(format!("invalid configuration override: {}", e)))
}

fn merge_objects(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                let nested = patch_value.is_object()
                    && base_map.get(key).map(Value::is_object).unwrap_or(false);
                if nested {
                    if let Some(base_value) = base_map.get_mut(key) {
                        merge_objects(base_value, patch_value);
                    }
                } else {
                    base_map.insert(key.clone(), patch_value.clone());
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

/// Server binary settings, read from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host:        String,
    pub port:        u16,
    pub config_file: String,
    pub agents_file: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            host:        std::env::var("SGR_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port:        std::env::var("SGR_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8010),
            config_file: std::env::var("SGR_CONFIG_FILE").unwrap_or_else(|_| "config.yaml".to_string()),
            agents_file: std::env::var("SGR_AGENTS_FILE").unwrap_or_else(|_| "agents.yaml".to_string()),
        }
    }
}
