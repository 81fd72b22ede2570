use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use futures::FutureExt;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use crate::config::{ExecutionConfig, LLMConfig, PromptsConfig};
use crate::context::{AgentState, ContextSnapshot, ResearchContext, TokenUsage};
use crate::error::AgentError;
use crate::llm::{ChatBackend, ChatMessage, FunctionChoice, FunctionSpec};
use crate::prompts::PromptLoader;
use crate::schema::{build_next_step_schema, parse_next_step, NEXT_STEP_FUNCTION};
use crate::stream::OpenAiStreamingGenerator;
use crate::tools::{
    Clarification, FinalAnswer, Reasoning, ResearchTool, ToolDescriptor, ToolEnv, CREATE_REPORT,
    FINAL_ANSWER, REASONING,
};

/// How a session turns conversation state into the next tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionMode {
    /// One LLM call per iteration: the composite next-step schema yields
    /// the reasoning block and the chosen tool together.
    Sgr,
    /// Two LLM calls per iteration: a forced reasoning function call, then
    /// a free function choice for the action.
    ToolCalling,
}

/// One entry of the session's persisted step log.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "step_type", rename_all = "snake_case")]
pub enum StepRecord {
    Reasoning {
        step_number:     usize,
        timestamp:       String,
        agent_reasoning: Value,
    },
    ToolExecution {
        step_number:                 usize,
        timestamp:                   String,
        tool_name:                   String,
        agent_tool_context:          Value,
        agent_tool_execution_result: String,
    },
    Error {
        step_number: usize,
        timestamp:   String,
        error:       String,
    },
}

/// A long-lived research session: the reason → select-action → act loop
/// plus everything it owns — context, conversation, step log and the SSE
/// stream its HTTP consumers drain.
///
/// The loop runs as a detached task and takes `&self`; HTTP handlers share
/// the session through an `Arc` and only ever touch it via
/// [`provide_clarification`](Self::provide_clarification),
/// [`snapshot`](Self::snapshot) and the streaming generator.
pub struct ResearchAgent {
    pub id:            String,
    pub task:          String,
    pub creation_time: DateTime<Utc>,

    mode:      DecisionMode,
    toolkit:   Vec<ToolDescriptor>,
    backend:   Arc<dyn ChatBackend>,
    env:       ToolEnv,
    llm:       LLMConfig,
    execution: ExecutionConfig,
    prompts:   PromptsConfig,

    streaming:              OpenAiStreamingGenerator,
    context:                Mutex<ResearchContext>,
    conversation:           Mutex<Vec<ChatMessage>>,
    step_log:               std::sync::Mutex<Vec<StepRecord>>,
    clarification_received: Notify,
}

impl ResearchAgent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent_name: &str,
        task: impl Into<String>,
        mode: DecisionMode,
        mut toolkit: Vec<ToolDescriptor>,
        backend: Arc<dyn ChatBackend>,
        env: ToolEnv,
        llm: LLMConfig,
        execution: ExecutionConfig,
        prompts: PromptsConfig,
    ) -> Self {
        let id = format!("{}_{}", agent_name, Uuid::new_v4());

        // the tool-calling flavour drives its reasoning phase through the
        // reasoning tool, so it always belongs to the toolkit
        if mode == DecisionMode::ToolCalling && !toolkit.contains(&REASONING) {
            toolkit.push(REASONING);
        }

        Self {
            streaming: OpenAiStreamingGenerator::new(id.clone()),
            id,
            task: task.into(),
            creation_time: Utc::now(),
            mode,
            toolkit,
            backend,
            env,
            llm,
            execution,
            prompts,
            context: Mutex::new(ResearchContext::new()),
            conversation: Mutex::new(Vec::new()),
            step_log: std::sync::Mutex::new(Vec::new()),
            clarification_received: Notify::new(),
        }
    }

    pub fn streaming(&self) -> &OpenAiStreamingGenerator {
        &self.streaming
    }

    /// Read-only projection of the session's context.
    pub async fn snapshot(&self) -> ContextSnapshot {
        self.context.lock().await.snapshot()
    }

    /// Delivers clarification text to the session and wakes its loop.
    ///
    /// Deliberately lenient, matching the reference behaviour: on a session
    /// that is not currently waiting this still appends the user message
    /// and counts against the clarification budget, but it never resurrects
    /// a terminal session.
    pub async fn provide_clarification(&self, clarifications: &str) -> Result<(), AgentError> {
        let message = PromptLoader::clarification_response(clarifications, &self.prompts)?;
        self.conversation.lock().await.push(ChatMessage::user(message));
        {
            let mut context = self.context.lock().await;
            context.clarifications_used += 1;
            if !context.state.is_terminal() {
                context.state = AgentState::Researching;
            }
        }
        self.clarification_received.notify_one();
        tracing::info!(agent = %self.id, "clarification received");
        Ok(())
    }

    /// Runs the session to a terminal state. Always finalises the SSE
    /// stream and persists the step log, even on failure.
    pub async fn execute(&self) {
        tracing::info!(agent = %self.id, task = %self.task, "starting agent loop");

        if let Err(error) = self.run_loop().await {
            tracing::error!(agent = %self.id, error = %error, "agent execution error");
            let step = {
                let mut context = self.context.lock().await;
                context.state = AgentState::Failed;
                context.iteration
            };
            self.push_record(StepRecord::Error {
                step_number: step,
                timestamp:   Utc::now().to_rfc3339(),
                error:       error.to_string(),
            });
        }

        self.streaming.finish();
        if let Err(error) = self.save_log() {
            tracing::warn!(agent = %self.id, error = %error, "failed to save session log");
        }
    }

    async fn run_loop(&self) -> Result<(), AgentError> {
        let initial = PromptLoader::initial_user_request(&self.task, &self.prompts)?;
        self.conversation.lock().await.push(ChatMessage::user(initial));

        loop {
            let toolset = {
                let mut context = self.context.lock().await;
                if context.state.is_terminal() {
                    return Ok(());
                }
                if context.state == AgentState::Inited {
                    context.state = AgentState::Researching;
                }
                context.iteration += 1;
                tracing::info!(agent = %self.id, step = context.iteration, "step started");
                self.narrowed_toolset(&context)
            };

            let tool = match self.mode {
                DecisionMode::Sgr => self.sgr_next_step(&toolset).await?,
                DecisionMode::ToolCalling => self.tool_calling_next_step(&toolset).await?,
            };

            let suspend = tool.tool_name() == Clarification::NAME;
            self.action_phase(tool.as_ref()).await?;

            if suspend {
                // discard a wake-up left over from an out-of-band
                // clarification before publishing the waiting state
                let _ = self.clarification_received.notified().now_or_never();
                {
                    self.context.lock().await.state = AgentState::WaitingForClarification;
                }
                tracing::info!(agent = %self.id, "research paused - waiting for clarification");
                self.streaming.finish();
                self.clarification_received.notified().await;
            }
        }
    }

    /// Narrows the configured toolkit by the remaining budgets. The step
    /// that reaches `max_iterations` may only pick a terminal tool.
    fn narrowed_toolset(&self, context: &ResearchContext) -> Vec<ToolDescriptor> {
        let mut tools = self.toolkit.clone();
        if context.iteration >= self.execution.max_iterations {
            tools = vec![CREATE_REPORT, FINAL_ANSWER];
            if self.mode == DecisionMode::ToolCalling {
                tools.insert(0, REASONING);
            }
        }
        if context.clarifications_used >= self.execution.max_clarifications {
            tools.retain(|d| d.name != Clarification::NAME);
        }
        if context.searches_used >= self.execution.max_searches {
            tools.retain(|d| d.name != crate::tools::WebSearch::NAME);
        }
        tools
    }

    /// Conversation with the per-iteration system prompt prepended.
    async fn llm_messages(&self, toolset: &[ToolDescriptor]) -> Result<Vec<ChatMessage>, AgentError> {
        let system = PromptLoader::system_prompt(toolset, &self.prompts)?;
        let mut messages = vec![ChatMessage::system(system)];
        messages.extend(self.conversation.lock().await.iter().cloned());
        Ok(messages)
    }

    /// Legacy history form is used whenever the structured-output strategy
    /// is not in play.
    fn uses_legacy_history(&self) -> bool {
        self.mode == DecisionMode::ToolCalling || !self.llm.structured_output
    }

    /// SGR flavour: one call yields the reasoning block and the chosen
    /// tool, streamed through the session's SSE generator when the backend
    /// supports constrained structured output.
    async fn sgr_next_step(
        &self,
        toolset: &[ToolDescriptor],
    ) -> Result<Box<dyn ResearchTool>, AgentError> {
        let schema = build_next_step_schema(toolset);
        let messages = self.llm_messages(toolset).await?;

        let reply = if self.llm.structured_output {
            self.backend
                .structured_next_step(&messages, &schema, &self.streaming)
                .await?
        } else {
            let function = FunctionSpec {
                name:        NEXT_STEP_FUNCTION.to_string(),
                description: "Plan the next step and select a tool".to_string(),
                parameters:  schema.clone(),
            };
            self.backend.forced_function_call(&messages, &function).await?
        };
        self.add_usage(reply.usage).await;

        let decision = parse_next_step(reply.value, toolset)?;
        self.capture_reasoning(decision.reasoning.clone()).await;

        let tool = decision.tool;
        let call_id = self.action_call_id().await;
        let arguments = serde_json::to_string(&tool.as_json())?;
        let content = decision.reasoning.next_step_hint().to_string();
        {
            let mut conversation = self.conversation.lock().await;
            if self.uses_legacy_history() {
                conversation.push(ChatMessage::assistant_function_call(
                    content,
                    tool.tool_name(),
                    &arguments,
                ));
            } else {
                conversation.push(ChatMessage::assistant_tool_call(
                    content,
                    &call_id,
                    tool.tool_name(),
                    &arguments,
                ));
            }
        }
        self.streaming.add_tool_call(&call_id, tool.tool_name(), &arguments);
        Ok(tool)
    }

    /// Tool-calling flavour: force the reasoning function, record its
    /// result, then let the model pick the action tool freely. Free-form
    /// content instead of a call falls back to a synthetic final answer.
    async fn tool_calling_next_step(
        &self,
        toolset: &[ToolDescriptor],
    ) -> Result<Box<dyn ResearchTool>, AgentError> {
        // reasoning phase
        let messages = self.llm_messages(toolset).await?;
        let reply = self
            .backend
            .forced_function_call(&messages, &FunctionSpec::from_descriptor(&REASONING))
            .await?;
        self.add_usage(reply.usage).await;

        let reasoning: Reasoning = serde_json::from_value(reply.value)
            .map_err(|e| AgentError::LlmOutput(format!("invalid reasoning block: {}", e)))?;
        reasoning.validate()?;
        self.capture_reasoning(reasoning.clone()).await;

        let reasoning_result = {
            let mut context = self.context.lock().await;
            reasoning.invoke(&mut context, &self.env).await?
        };
        let arguments = serde_json::to_string(&reasoning.as_json())?;
        {
            let mut conversation = self.conversation.lock().await;
            conversation.push(ChatMessage::assistant_function_call("", Reasoning::NAME, &arguments));
            conversation.push(ChatMessage::function_result(Reasoning::NAME, reasoning_result));
        }

        // select-action phase
        let functions: Vec<FunctionSpec> =
            toolset.iter().map(FunctionSpec::from_descriptor).collect();
        let messages = self.llm_messages(toolset).await?;
        let selection = self.backend.select_function_call(&messages, &functions).await?;
        self.add_usage(selection.usage).await;

        let tool: Box<dyn ResearchTool> = match selection.choice {
            FunctionChoice::Call { name, arguments } => {
                let descriptor = toolset
                    .iter()
                    .find(|d| d.name.eq_ignore_ascii_case(&name))
                    .ok_or_else(|| {
                        AgentError::LlmOutput(format!("tool '{}' is not in the offered toolset", name))
                    })?;
                (descriptor.parse)(arguments)?
            }
            FunctionChoice::Content(content) => Box::new(FinalAnswer::from_content(content)),
        };

        let call_id = self.action_call_id().await;
        let arguments = serde_json::to_string(&tool.as_json())?;
        self.conversation.lock().await.push(ChatMessage::assistant_function_call(
            "",
            tool.tool_name(),
            &arguments,
        ));
        self.streaming.add_tool_call(&call_id, tool.tool_name(), &arguments);
        Ok(tool)
    }

    /// Invokes the selected tool, records the result message and pushes it
    /// into the SSE stream.
    async fn action_phase(&self, tool: &dyn ResearchTool) -> Result<(), AgentError> {
        let result = {
            let mut context = self.context.lock().await;
            tool.invoke(&mut context, &self.env).await?
        };

        let call_id = self.action_call_id().await;
        {
            let mut conversation = self.conversation.lock().await;
            if self.uses_legacy_history() {
                conversation.push(ChatMessage::function_result(tool.tool_name(), result.clone()));
            } else {
                conversation.push(ChatMessage::tool_result(&call_id, tool.tool_name(), result.clone()));
            }
        }
        self.streaming.add_chunk_from_str(&format!("{}\n", result));
        self.log_tool_execution(tool, &result).await;
        Ok(())
    }

    async fn action_call_id(&self) -> String {
        format!("{}-action", self.context.lock().await.iteration)
    }

    async fn add_usage(&self, usage: Option<TokenUsage>) {
        if let Some(usage) = usage {
            let mut context = self.context.lock().await;
            context.tokens_used += u64::from(usage.total_tokens);
        }
    }

    async fn capture_reasoning(&self, reasoning: Reasoning) {
        let step = {
            let mut context = self.context.lock().await;
            context.current_step_reasoning = Some(reasoning.clone());
            context.iteration
        };
        tracing::debug!(
            agent = %self.id,
            step,
            next_step = reasoning.next_step_hint(),
            task_completed = reasoning.task_completed,
            enough_data = reasoning.enough_data,
            "reasoning captured"
        );
        self.push_record(StepRecord::Reasoning {
            step_number:     step,
            timestamp:       Utc::now().to_rfc3339(),
            agent_reasoning: reasoning.as_json(),
        });
    }

    async fn log_tool_execution(&self, tool: &dyn ResearchTool, result: &str) {
        let (step, tokens) = {
            let context = self.context.lock().await;
            (context.iteration, context.tokens_used)
        };
        tracing::debug!(
            agent = %self.id,
            step,
            tool = tool.tool_name(),
            tokens_used = tokens,
            "tool executed"
        );
        self.push_record(StepRecord::ToolExecution {
            step_number:                 step,
            timestamp:                   Utc::now().to_rfc3339(),
            tool_name:                   tool.tool_name().to_string(),
            agent_tool_context:          tool.as_json(),
            agent_tool_execution_result: result.to_string(),
        });
    }

    fn push_record(&self, record: StepRecord) {
        self.step_log.lock().expect("step log poisoned").push(record);
    }

    /// Persists the session's step log as JSON under the logs directory.
    fn save_log(&self) -> Result<(), AgentError> {
        std::fs::create_dir_all(&self.execution.logs_dir)?;
        let filename = format!("{}-{}-log.json", Local::now().format("%Y%m%d-%H%M%S"), self.id);
        let filepath = std::path::Path::new(&self.execution.logs_dir).join(filename);

        let toolkit: Vec<&str> = self.toolkit.iter().map(|d| d.name).collect();
        let log = json!({
            "id": self.id,
            "model_config": self.llm.redacted(),
            "task": self.task,
            "toolkit": toolkit,
            "log": self.step_log.lock().expect("step log poisoned").clone(),
        });
        std::fs::write(&filepath, serde_json::to_string_pretty(&log)?)?;
        tracing::info!(agent = %self.id, path = %filepath.display(), "session log saved");
        Ok(())
    }
}
