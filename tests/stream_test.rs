//! Streaming generator tests: chunk framing, termination and re-attach.

use futures::StreamExt;
use serde_json::Value;

use sgr_deep_research::stream::{OpenAiStreamingGenerator, StreamingGenerator};

fn parse_frame(frame: &str) -> Value {
    let body = frame.strip_prefix("data: ").expect("data: prefix").trim();
    serde_json::from_str(body).expect("frame body is JSON")
}

// ─────────────────────────────────────────────────────────────────────────────
// Base queue
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn frames_are_delivered_in_enqueue_order() {
    let generator = StreamingGenerator::new();
    generator.add("one".to_string());
    generator.add("two".to_string());
    generator.add("three".to_string());
    generator.push_sentinel();

    let frames: Vec<String> = generator.stream().collect().await;
    assert_eq!(frames, vec!["one", "two", "three"]);
}

#[tokio::test]
async fn empty_stream_ends_at_the_sentinel() {
    let generator = StreamingGenerator::new();
    generator.push_sentinel();

    let frames: Vec<String> = generator.stream().collect().await;
    assert!(frames.is_empty());
}

#[tokio::test]
async fn a_second_drain_reattaches_after_the_sentinel() {
    let generator = StreamingGenerator::new();
    generator.add("first batch".to_string());
    generator.push_sentinel();

    let frames: Vec<String> = generator.stream().collect().await;
    assert_eq!(frames, vec!["first batch"]);

    // the queue stays open: a later producer run reaches a new consumer
    generator.add("second batch".to_string());
    generator.push_sentinel();

    let frames: Vec<String> = generator.stream().collect().await;
    assert_eq!(frames, vec!["second batch"]);
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI chunk framing
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn content_chunk_has_openai_shape() {
    let generator = OpenAiStreamingGenerator::new("sgr_agent_test-id");
    generator.add_chunk_from_str("hello");
    generator.finish();

    let frames: Vec<String> = generator.stream().collect().await;
    assert!(frames.iter().all(|f| f.ends_with("\n\n")));

    let chunk = parse_frame(&frames[0]);
    assert_eq!(chunk["object"], "chat.completion.chunk");
    assert_eq!(chunk["model"], "sgr_agent_test-id");
    assert_eq!(chunk["choices"][0]["delta"]["content"], "hello");
    assert_eq!(chunk["choices"][0]["delta"]["role"], "assistant");
    assert_eq!(chunk["choices"][0]["finish_reason"], Value::Null);

    let id = chunk["id"].as_str().unwrap();
    assert!(id.starts_with("chatcmpl-"));
    assert_eq!(id.len(), 29);
    let fingerprint = chunk["system_fingerprint"].as_str().unwrap();
    assert!(fingerprint.starts_with("fp_"));
    assert_eq!(fingerprint.len(), 11);
}

#[tokio::test]
async fn tool_call_chunk_carries_the_function_frame() {
    let generator = OpenAiStreamingGenerator::new("model");
    generator.add_tool_call("3-action", "websearchtool", "{\"query\":\"x\"}");
    generator.finish();

    let frames: Vec<String> = generator.stream().collect().await;
    let chunk = parse_frame(&frames[0]);
    let tool_call = &chunk["choices"][0]["delta"]["tool_calls"][0];
    assert_eq!(tool_call["index"], 0);
    assert_eq!(tool_call["id"], "3-action");
    assert_eq!(tool_call["type"], "function");
    assert_eq!(tool_call["function"]["name"], "websearchtool");
    assert_eq!(tool_call["function"]["arguments"], "{\"query\":\"x\"}");
}

#[tokio::test]
async fn finish_emits_final_chunk_usage_and_done() {
    let generator = OpenAiStreamingGenerator::new("model");
    generator.add_chunk_from_str("body");
    generator.finish();

    let frames: Vec<String> = generator.stream().collect().await;
    assert_eq!(frames.len(), 3);

    let final_chunk = parse_frame(&frames[1]);
    assert_eq!(final_chunk["choices"][0]["finish_reason"], "stop");
    assert_eq!(final_chunk["choices"][0]["delta"], serde_json::json!({}));
    assert_eq!(final_chunk["usage"]["total_tokens"], 0);

    assert_eq!(frames[2], "data: [DONE]\n\n");
}

#[tokio::test]
async fn chunk_ids_are_stable_within_one_generator() {
    let generator = OpenAiStreamingGenerator::new("model");
    generator.add_chunk_from_str("a");
    generator.add_chunk_from_str("b");
    generator.finish();

    let frames: Vec<String> = generator.stream().collect().await;
    let first = parse_frame(&frames[0]);
    let second = parse_frame(&frames[1]);
    assert_eq!(first["id"], second["id"]);
    assert_eq!(first["created"], second["created"]);
    assert_eq!(first["system_fingerprint"], second["system_fingerprint"]);
}
