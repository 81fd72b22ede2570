//! Tool behaviour tests: context mutation, source numbering, report
//! writing and argument validation. No network calls are made.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use sgr_deep_research::search::SearchProvider;
use sgr_deep_research::tools::{
    Clarification, CreateReport, ExtractPageContent, FinalAnswer, ResearchTool, ToolEnv,
    WebSearch, CLARIFICATION, CREATE_REPORT, WEB_SEARCH,
};
use sgr_deep_research::{
    AgentError, AgentState, ExecutionConfig, ResearchContext, SearchConfig, SourceData,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Search stub returning one fixed source per query and full content for
/// every extracted URL.
struct FixedSearch {
    urls: Vec<&'static str>,
}

#[async_trait]
impl SearchProvider for FixedSearch {
    async fn search(&self, query: &str, _max_results: usize) -> Result<Vec<SourceData>, AgentError> {
        Ok(self
            .urls
            .iter()
            .map(|url| SourceData {
                number:       0,
                title:        Some(format!("Page about {}", query)),
                url:          url.to_string(),
                snippet:      "x".repeat(150),
                full_content: String::new(),
                char_count:   0,
            })
            .collect())
    }

    async fn extract(&self, urls: &[String]) -> Result<Vec<SourceData>, AgentError> {
        Ok(urls
            .iter()
            .map(|url| SourceData {
                number:       0,
                title:        Some("Extracted".to_string()),
                url:          url.clone(),
                snippet:      String::new(),
                full_content: "extracted body text".to_string(),
                char_count:   19,
            })
            .collect())
    }
}

fn env_with(urls: Vec<&'static str>) -> (ToolEnv, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let execution = ExecutionConfig {
        logs_dir:    tmp.path().join("logs").to_string_lossy().into_owned(),
        reports_dir: tmp.path().join("reports").to_string_lossy().into_owned(),
        ..ExecutionConfig::default()
    };
    let env = ToolEnv {
        search:        Some(Arc::new(FixedSearch { urls })),
        search_config: SearchConfig::default(),
        execution,
    };
    (env, tmp)
}

fn web_search(query: &str) -> WebSearch {
    WebSearch {
        reasoning:   "test".to_string(),
        query:       query.to_string(),
        max_results: None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Web search: numbering, history, budget counter
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn web_search_assigns_numbers_in_insertion_order() {
    let (env, _tmp) = env_with(vec!["https://a", "https://b"]);
    let mut context = ResearchContext::new();

    let result = web_search("rust").invoke(&mut context, &env).await.unwrap();

    assert_eq!(context.sources.len(), 2);
    assert_eq!(context.sources.get("https://a").unwrap().number, 1);
    assert_eq!(context.sources.get("https://b").unwrap().number, 2);
    assert_eq!(context.searches_used, 1);
    assert_eq!(context.searches.len(), 1);
    assert_eq!(context.searches[0].query, "rust");
    assert!(result.starts_with("Search Query: rust"));
    // snippets are truncated at 100 characters in the listing
    assert!(result.contains(&format!("{}...", "x".repeat(100))));
}

#[tokio::test]
async fn repeated_search_keeps_existing_citation_numbers() {
    let (env, _tmp) = env_with(vec!["https://a"]);
    let mut context = ResearchContext::new();

    web_search("first").invoke(&mut context, &env).await.unwrap();
    web_search("second").invoke(&mut context, &env).await.unwrap();

    // the same URL came back from both searches; its number is stable
    assert_eq!(context.sources.len(), 1);
    assert_eq!(context.sources.get("https://a").unwrap().number, 1);
    assert_eq!(context.searches_used, 2);
    assert_eq!(context.searches.len(), 2);
}

#[tokio::test]
async fn web_search_without_provider_reports_an_error_string() {
    let env = ToolEnv::offline(ExecutionConfig::default());
    let mut context = ResearchContext::new();

    let result = web_search("anything").invoke(&mut context, &env).await.unwrap();

    assert!(result.starts_with("Error:"));
    assert_eq!(context.searches_used, 0, "a failed search must not consume budget");
}

// ─────────────────────────────────────────────────────────────────────────────
// Extraction: dedup against existing sources
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn extraction_preserves_numbers_and_adds_new_sources() {
    let (env, _tmp) = env_with(vec!["https://a"]);
    let mut context = ResearchContext::new();

    // search finds https://a as source [1]
    web_search("seed").invoke(&mut context, &env).await.unwrap();
    assert_eq!(context.sources.get("https://a").unwrap().number, 1);

    let extract = ExtractPageContent {
        reasoning: "deep dive".to_string(),
        urls:      vec!["https://a".to_string(), "https://b".to_string()],
    };
    let result = extract.invoke(&mut context, &env).await.unwrap();

    let a = context.sources.get("https://a").unwrap();
    let b = context.sources.get("https://b").unwrap();
    assert_eq!(a.number, 1, "existing source keeps its number");
    assert_eq!(b.number, 2, "new source gets the next number");
    assert_eq!(a.full_content, "extracted body text");
    assert_eq!(b.full_content, "extracted body text");
    assert!(result.contains("**Full Content:**"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Terminal and conversational tools
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn final_answer_sets_state_and_result() {
    let env = ToolEnv::offline(ExecutionConfig::default());
    let mut context = ResearchContext::new();

    let tool: Box<dyn ResearchTool> = (sgr_deep_research::tools::FINAL_ANSWER.parse)(json!({
        "reasoning": "verified",
        "completed_steps": ["step one"],
        "answer": "the final answer",
        "status": "completed"
    }))
    .unwrap();
    let result = tool.invoke(&mut context, &env).await.unwrap();

    assert_eq!(context.state, AgentState::Completed);
    assert_eq!(context.execution_result.as_deref(), Some("the final answer"));
    let parsed: Value = serde_json::from_str(&result).unwrap();
    assert_eq!(parsed["answer"], "the final answer");
}

#[tokio::test]
async fn final_answer_failed_status_maps_to_failed_state() {
    let env = ToolEnv::offline(ExecutionConfig::default());
    let mut context = ResearchContext::new();

    let tool = FinalAnswer::from_content("fallback".to_string());
    tool.invoke(&mut context, &env).await.unwrap();
    assert_eq!(context.state, AgentState::Completed);

    let mut context = ResearchContext::new();
    let tool: Box<dyn ResearchTool> = (sgr_deep_research::tools::FINAL_ANSWER.parse)(json!({
        "reasoning": "could not verify",
        "completed_steps": ["tried"],
        "answer": "no luck",
        "status": "failed"
    }))
    .unwrap();
    tool.invoke(&mut context, &env).await.unwrap();
    assert_eq!(context.state, AgentState::Failed);
}

#[tokio::test]
async fn clarification_returns_questions_joined_by_newline() {
    let env = ToolEnv::offline(ExecutionConfig::default());
    let mut context = ResearchContext::new();

    let tool = Clarification {
        reasoning:     "ambiguous".to_string(),
        unclear_terms: vec!["it".to_string()],
        assumptions:   vec!["a".to_string(), "b".to_string()],
        questions:     vec!["Which year?".to_string(), "Which country?".to_string()],
    };
    let result = tool.invoke(&mut context, &env).await.unwrap();

    assert_eq!(result, "Which year?\nWhich country?");
    assert_eq!(context.state, AgentState::Inited, "the tool itself does not change state");
}

// ─────────────────────────────────────────────────────────────────────────────
// Report writing
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_report_writes_markdown_with_sources_section() {
    let (env, tmp) = env_with(vec!["https://a"]);
    let mut context = ResearchContext::new();
    web_search("seed").invoke(&mut context, &env).await.unwrap();

    let tool = CreateReport {
        reasoning: "enough data".to_string(),
        title: "Rust Agents: A Survey".to_string(),
        user_request_language_reference: "tell me about rust agents".to_string(),
        content: "Rust agents are a thing [1].".to_string(),
        confidence: sgr_deep_research::tools::Confidence::High,
    };
    let result = tool.invoke(&mut context, &env).await.unwrap();

    let summary: Value = serde_json::from_str(&result).unwrap();
    assert_eq!(summary["word_count"], 6);
    assert_eq!(summary["sources_count"], 1);
    assert_eq!(summary["confidence"], "high");

    let filepath = summary["filepath"].as_str().unwrap();
    assert!(filepath.starts_with(&tmp.path().join("reports").to_string_lossy().into_owned()));
    let report = std::fs::read_to_string(filepath).unwrap();
    assert!(report.starts_with("# Rust Agents: A Survey\n"));
    assert!(report.contains("*Created: "));
    assert!(report.contains("Rust agents are a thing [1]."));
    assert!(report.contains("## Sources"));
    assert!(report.contains("[1] Page about seed - https://a"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Argument validation and round-trips
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn clarification_rejects_out_of_bounds_lists() {
    let result = (CLARIFICATION.parse)(json!({
        "reasoning": "r",
        "unclear_terms": [],
        "assumptions": ["a", "b"],
        "questions": ["q"]
    }));
    assert!(matches!(result, Err(AgentError::ToolArguments { .. })));
}

#[test]
fn web_search_rejects_out_of_range_max_results() {
    let result = (WEB_SEARCH.parse)(json!({
        "reasoning": "r",
        "query": "q",
        "max_results": 11
    }));
    assert!(matches!(result, Err(AgentError::ToolArguments { .. })));
}

#[test]
fn create_report_rejects_unknown_confidence() {
    let result = (CREATE_REPORT.parse)(json!({
        "reasoning": "r",
        "title": "t",
        "user_request_language_reference": "u",
        "content": "c",
        "confidence": "absolute"
    }));
    assert!(matches!(result, Err(AgentError::ToolArguments { .. })));
}

#[test]
fn tool_argument_records_round_trip_through_json() {
    let search = web_search("round trip");
    let parsed: WebSearch = serde_json::from_value(serde_json::to_value(&search).unwrap()).unwrap();
    assert_eq!(parsed.query, search.query);
    assert_eq!(parsed.max_results, search.max_results);

    let clarification = Clarification {
        reasoning:     "r".to_string(),
        unclear_terms: vec!["t".to_string()],
        assumptions:   vec!["a".to_string(), "b".to_string()],
        questions:     vec!["q".to_string()],
    };
    let parsed: Clarification =
        serde_json::from_value(serde_json::to_value(&clarification).unwrap()).unwrap();
    assert_eq!(parsed.questions, clarification.questions);
}
