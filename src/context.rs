use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tools::Reasoning;

/// Lifecycle state of a research session.
///
/// Transitions form a DAG: `Inited → Researching ⇄ WaitingForClarification`,
/// and from either non-terminal state into exactly one of the terminal
/// states. Entering a terminal state halts the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Inited,
    Researching,
    WaitingForClarification,
    Completed,
    Failed,
    Error,
}

impl AgentState {
    /// Returns true for `Completed`, `Failed` and `Error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Error)
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            Self::Inited => "inited",
            Self::Researching => "researching",
            Self::WaitingForClarification => "waiting_for_clarification",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// A research source found by search or page extraction, keyed by URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceData {
    /// Citation number, assigned once at first insertion.
    pub number:       usize,
    pub title:        Option<String>,
    pub url:          String,
    #[serde(default)]
    pub snippet:      String,
    #[serde(default)]
    pub full_content: String,
    #[serde(default)]
    pub char_count:   usize,
}

impl SourceData {
    /// Citation line used in search listings, reports and the Sources section.
    pub fn citation(&self) -> String {
        format!(
            "[{}] {} - {}",
            self.number,
            self.title.as_deref().filter(|t| !t.is_empty()).unwrap_or("Untitled"),
            self.url
        )
    }
}

impl std::fmt::Display for SourceData {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.citation())
    }
}

/// One performed web search with its citations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub query:     String,
    pub answer:    Option<String>,
    pub citations: Vec<SourceData>,
    pub timestamp: DateTime<Utc>,
}

/// Insertion-ordered mapping from URL to source.
///
/// Citation numbers are 1-based insertion ranks and never change once
/// assigned; updates (e.g. page extraction after a search) replace content
/// in place.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceMap {
    entries: Vec<SourceData>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<&SourceData> {
        self.entries.iter().find(|s| s.url == url)
    }

    pub fn get_mut(&mut self, url: &str) -> Option<&mut SourceData> {
        self.entries.iter_mut().find(|s| s.url == url)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.get(url).is_some()
    }

    /// Inserts a new source, assigning the next citation number.
    /// Returns the assigned number. The caller must check for duplicates
    /// first; inserting an already-present URL would fork its numbering.
    pub fn insert_new(&mut self, mut source: SourceData) -> usize {
        let number = self.entries.len() + 1;
        source.number = number;
        self.entries.push(source);
        number
    }

    /// Merges a search hit and returns the canonical entry: a known URL
    /// keeps its number (an empty snippet is filled in), a new URL is
    /// inserted with the next number.
    pub fn merge_search_hit(&mut self, source: SourceData) -> SourceData {
        match self.entries.iter().position(|s| s.url == source.url) {
            Some(i) => {
                let existing = &mut self.entries[i];
                if existing.snippet.is_empty() {
                    existing.snippet = source.snippet;
                }
                existing.clone()
            }
            None => {
                let mut source = source;
                source.number = self.entries.len() + 1;
                self.entries.push(source.clone());
                source
            }
        }
    }

    /// Merges extracted page content: a known URL gets its content
    /// replaced in place, keeping the number; a new URL is inserted with
    /// the next number.
    pub fn merge_extracted(&mut self, source: SourceData) {
        match self.entries.iter().position(|s| s.url == source.url) {
            Some(i) => {
                let existing = &mut self.entries[i];
                existing.full_content = source.full_content;
                existing.char_count = source.char_count;
            }
            None => {
                self.insert_new(source);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceData> {
        self.entries.iter()
    }
}

/// Tracks token usage for a single LLM call or an entire session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens:  u32,
    pub output_tokens: u32,
    pub total_tokens:  u32,
}

impl TokenUsage {
    pub fn new(input: u32, output: u32) -> Self {
        Self {
            input_tokens:  input,
            output_tokens: output,
            total_tokens:  input + output,
        }
    }

    /// Accumulate usage from another call.
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Mutable per-session state shared between the agent loop and its tools.
///
/// All mutation happens inside a tool's `invoke` or inside the loop itself;
/// HTTP handlers only ever see [`ContextSnapshot`] copies.
#[derive(Debug)]
pub struct ResearchContext {
    pub state:                  AgentState,
    /// 1-based after the loop's entry increment.
    pub iteration:              usize,
    pub searches_used:          usize,
    pub clarifications_used:    usize,
    pub searches:               Vec<SearchResult>,
    pub sources:                SourceMap,
    pub current_step_reasoning: Option<Reasoning>,
    pub execution_result:       Option<String>,
    pub tokens_used:            u64,
}

impl ResearchContext {
    pub fn new() -> Self {
        Self {
            state:                  AgentState::Inited,
            iteration:              0,
            searches_used:          0,
            clarifications_used:    0,
            searches:               Vec::new(),
            sources:                SourceMap::new(),
            current_step_reasoning: None,
            execution_result:       None,
            tokens_used:            0,
        }
    }

    /// Projection served by the state endpoint: excludes the search history
    /// and the full source contents.
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            state:                  self.state,
            iteration:              self.iteration,
            searches_used:          self.searches_used,
            clarifications_used:    self.clarifications_used,
            sources_count:          self.sources.len(),
            current_step_reasoning: self.current_step_reasoning.clone(),
            execution_result:       self.execution_result.clone(),
            tokens_used:            self.tokens_used,
        }
    }
}

impl Default for ResearchContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of a [`ResearchContext`], a pure function of it.
#[derive(Debug, Clone, Serialize)]
pub struct ContextSnapshot {
    pub state:                  AgentState,
    pub iteration:              usize,
    pub searches_used:          usize,
    pub clarifications_used:    usize,
    pub sources_count:          usize,
    pub current_step_reasoning: Option<Reasoning>,
    pub execution_result:       Option<String>,
    pub tokens_used:            u64,
}
