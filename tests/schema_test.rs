//! Next-step schema builder and parser tests.

use serde_json::{json, Value};

use sgr_deep_research::schema::{build_next_step_schema, parse_next_step, parse_tool_choice};
use sgr_deep_research::tools::{FINAL_ANSWER, WEB_SEARCH};
use sgr_deep_research::AgentError;

fn reasoning_fields() -> Value {
    json!({
        "reasoning_steps": ["look at the task", "decide"],
        "current_situation": "starting out",
        "plan_status": "fresh",
        "enough_data": false,
        "remaining_steps": ["search the web"],
        "task_completed": false
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder shape
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn composite_schema_carries_reasoning_block_and_union() {
    let schema = build_next_step_schema(&[WEB_SEARCH, FINAL_ANSWER]);

    let properties = schema["properties"].as_object().unwrap();
    for field in [
        "reasoning_steps",
        "current_situation",
        "plan_status",
        "enough_data",
        "remaining_steps",
        "task_completed",
        "function",
    ] {
        assert!(properties.contains_key(field), "missing property {}", field);
    }

    let required = schema["required"].as_array().unwrap();
    assert!(required.contains(&json!("function")));

    let variants = schema["properties"]["function"]["anyOf"].as_array().unwrap();
    assert_eq!(variants.len(), 2);
    let discriminators: Vec<&str> = variants
        .iter()
        .map(|v| {
            v["properties"]["tool_name_discriminator"]["enum"][0]
                .as_str()
                .unwrap()
        })
        .collect();
    assert_eq!(discriminators, vec!["websearchtool", "finalanswertool"]);

    // the discriminator is required on every variant
    for variant in variants {
        let required = variant["required"].as_array().unwrap();
        assert_eq!(required[0], json!("tool_name_discriminator"));
    }
}

#[test]
fn single_tool_union_collapses_to_that_schema() {
    let schema = build_next_step_schema(&[FINAL_ANSWER]);

    let function = &schema["properties"]["function"];
    assert!(function.get("anyOf").is_none(), "no union for a single tool");
    assert_eq!(
        function["properties"]["tool_name_discriminator"]["enum"][0],
        json!("finalanswertool")
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Parsing
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn parse_splits_reasoning_and_tool() {
    let mut payload = reasoning_fields();
    payload["function"] = json!({
        "tool_name_discriminator": "websearchtool",
        "reasoning": "need data",
        "query": "rust async"
    });

    let decision = parse_next_step(payload, &[WEB_SEARCH, FINAL_ANSWER]).unwrap();
    assert_eq!(decision.reasoning.remaining_steps, vec!["search the web"]);
    assert!(!decision.reasoning.task_completed);
    assert_eq!(decision.tool.tool_name(), "websearchtool");
    assert_eq!(decision.tool.as_json()["query"], "rust async");
}

#[test]
fn parse_rejects_missing_function_field() {
    let payload = reasoning_fields();
    let result = parse_next_step(payload, &[WEB_SEARCH]);
    assert!(matches!(result, Err(AgentError::LlmOutput(_))));
}

#[test]
fn parse_rejects_tool_outside_offered_set() {
    let mut payload = reasoning_fields();
    payload["function"] = json!({
        "tool_name_discriminator": "websearchtool",
        "reasoning": "need data",
        "query": "rust async"
    });

    // web search is not offered on this step
    let result = parse_next_step(payload, &[FINAL_ANSWER]);
    assert!(matches!(result, Err(AgentError::LlmOutput(_))));
}

#[test]
fn parse_rejects_invalid_reasoning_bounds() {
    let mut payload = reasoning_fields();
    payload["reasoning_steps"] = json!(["only one step"]); // needs 2..3
    payload["function"] = json!({
        "tool_name_discriminator": "finalanswertool",
        "reasoning": "done",
        "completed_steps": ["a"],
        "answer": "x",
        "status": "completed"
    });

    let result = parse_next_step(payload, &[FINAL_ANSWER]);
    assert!(matches!(result, Err(AgentError::ToolArguments { .. })));
}

#[test]
fn tool_choice_discriminator_is_case_insensitive() {
    let tool = parse_tool_choice(
        json!({
            "tool_name_discriminator": "WebSearchTool",
            "reasoning": "need data",
            "query": "case folding"
        }),
        &[WEB_SEARCH],
    )
    .unwrap();
    assert_eq!(tool.tool_name(), "websearchtool");
}

#[test]
fn tool_choice_without_discriminator_is_rejected() {
    let result = parse_tool_choice(
        json!({"reasoning": "need data", "query": "oops"}),
        &[WEB_SEARCH],
    );
    assert!(matches!(result, Err(AgentError::LlmOutput(_))));
}
