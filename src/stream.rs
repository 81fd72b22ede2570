//! SSE-compatible chunk multiplexer.
//!
//! The agent loop and the LLM adapter push frames in; exactly one HTTP
//! response at a time drains them via [`StreamingGenerator::stream`]. A
//! `None` sentinel ends the current drain without closing the queue, so a
//! later request (clarification resume) can re-attach to the same session
//! stream.

use std::sync::Arc;

use async_openai::types::CreateChatCompletionStreamResponse;
use futures::Stream;
use serde_json::json;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Single-producer single-consumer frame queue with a termination sentinel.
pub struct StreamingGenerator {
    tx: UnboundedSender<Option<String>>,
    rx: Arc<Mutex<UnboundedReceiver<Option<String>>>>,
}

impl StreamingGenerator {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx: Arc::new(Mutex::new(rx)) }
    }

    /// Enqueues one raw frame. Frames are delivered strictly in enqueue
    /// order.
    pub fn add(&self, data: String) {
        let _ = self.tx.send(Some(data));
    }

    /// Enqueues the sentinel that ends the current consumer's iteration.
    pub fn push_sentinel(&self) {
        let _ = self.tx.send(None);
    }

    /// Async iterator over frames until the next sentinel. Calling this
    /// again after a sentinel re-attaches to the same queue.
    pub fn stream(&self) -> impl Stream<Item = String> + Send + 'static {
        let rx = Arc::clone(&self.rx);
        futures::stream::unfold(rx, |rx| async move {
            let frame = rx.lock().await.recv().await;
            match frame {
                Some(Some(data)) => Some((data, rx)),
                // queue closed or sentinel: end this drain
                _ => None,
            }
        })
    }
}

impl Default for StreamingGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// [`StreamingGenerator`] with OpenAI chat-completion-chunk framing.
///
/// Every frame is `data: <JSON>\n\n`; the stream is finalised with a final
/// chunk carrying `finish_reason` and a usage block, then the literal
/// `data: [DONE]\n\n` line. The chunk id, creation timestamp and
/// fingerprint are fixed per generator; the model field carries the agent
/// session id so clients can recover it from any chunk.
pub struct OpenAiStreamingGenerator {
    inner:        StreamingGenerator,
    model:        String,
    id:           String,
    fingerprint:  String,
    created:      i64,
    choice_index: u32,
}

impl OpenAiStreamingGenerator {
    pub fn new(model: impl Into<String>) -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self {
            inner:        StreamingGenerator::new(),
            model:        model.into(),
            id:           format!("chatcmpl-{}", &hex[..20]),
            fingerprint:  format!("fp_{}", &hex[..8]),
            created:      chrono::Utc::now().timestamp(),
            choice_index: 0,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Forwards an LLM-originated chunk, rewriting its model field to the
    /// session id.
    pub fn add_chunk(&self, mut chunk: CreateChatCompletionStreamResponse) {
        chunk.model = self.model.clone();
        match serde_json::to_string(&chunk) {
            Ok(body) => self.inner.add(format!("data: {}\n\n", body)),
            Err(e) => tracing::warn!(error = %e, "failed to serialize LLM chunk"),
        }
    }

    /// Emits a content delta chunk.
    pub fn add_chunk_from_str(&self, content: &str) {
        let response = json!({
            "id": self.id,
            "object": "chat.completion.chunk",
            "created": self.created,
            "model": self.model,
            "system_fingerprint": self.fingerprint,
            "choices": [
                {
                    "delta": {"content": content, "role": "assistant", "tool_calls": null},
                    "index": self.choice_index,
                    "finish_reason": null,
                    "logprobs": null
                }
            ],
            "usage": null
        });
        self.inner.add(format!("data: {}\n\n", response));
    }

    /// Emits a synthetic tool-call chunk.
    pub fn add_tool_call(&self, tool_call_id: &str, function_name: &str, arguments: &str) {
        let response = json!({
            "id": self.id,
            "object": "chat.completion.chunk",
            "created": self.created,
            "model": self.model,
            "system_fingerprint": self.fingerprint,
            "choices": [
                {
                    "delta": {
                        "tool_calls": [
                            {
                                "index": 0,
                                "id": tool_call_id,
                                "type": "function",
                                "function": {"name": function_name, "arguments": arguments}
                            }
                        ]
                    },
                    "index": self.choice_index,
                    "logprobs": null,
                    "finish_reason": null
                }
            ],
            "usage": null
        });
        self.inner.add(format!("data: {}\n\n", response));
    }

    /// Final chunk with `finish_reason: "stop"`, the `[DONE]` marker and
    /// the drain-ending sentinel.
    pub fn finish(&self) {
        self.finish_with_reason("stop");
    }

    pub fn finish_with_reason(&self, finish_reason: &str) {
        let final_response = json!({
            "id": self.id,
            "object": "chat.completion.chunk",
            "created": self.created,
            "model": self.model,
            "system_fingerprint": self.fingerprint,
            "choices": [
                {
                    "index": self.choice_index,
                    "delta": {},
                    "logprobs": null,
                    "finish_reason": finish_reason
                }
            ],
            "usage": {"prompt_tokens": 0, "completion_tokens": 0, "total_tokens": 0}
        });
        self.inner.add(format!("data: {}\n\n", final_response));
        self.inner.add("data: [DONE]\n\n".to_string());
        self.inner.push_sentinel();
    }

    /// Async iterator over frames until the next `[DONE]` sentinel.
    pub fn stream(&self) -> impl Stream<Item = String> + Send + 'static {
        self.inner.stream()
    }
}
