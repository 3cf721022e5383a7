//! LM Studio (OpenAI-compatible) inference client.
//!
//! Works with any server exposing `/chat/completions` and `/models` in the
//! OpenAI shape: LM Studio, llama.cpp server, Ollama, vLLM.
//!
//! Supports:
//! - Batch chat completions (one JSON response)
//! - Streaming chat completions (line-delimited `data:` events ending in `[DONE]`)
//! - Model listing

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use lmgram_core::error::InferenceError;
use lmgram_core::message::Message;
use lmgram_core::provider::{InferenceClient, StreamEvent, StreamReceiver};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Local inference can be slow; requests get a long fixed timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// An OpenAI-compatible inference client, LM Studio by default.
pub struct LmStudioClient {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl LmStudioClient {
    /// Create a client for the given API base (e.g. `http://localhost:1234/v1`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            client: reqwest::Client::new(),
        }
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_chat(
        &self,
        model: &str,
        window: &[Message],
        stream: bool,
    ) -> Result<reqwest::Response, InferenceError> {
        let body = ChatRequest {
            model,
            messages: window,
            stream,
        };

        debug!(model, messages = window.len(), stream, "Sending chat completion request");

        let mut request = self
            .client
            .post(self.url("/chat/completions"))
            .timeout(self.timeout)
            .json(&body);
        if stream {
            request = request.header("Accept", "text/event-stream");
        }

        let response = request
            .send()
            .await
            .map_err(|e| InferenceError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Inference server returned error");
            return Err(InferenceError::Status {
                status_code: status,
                message: error_body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl InferenceClient for LmStudioClient {
    fn name(&self) -> &str {
        "lmstudio"
    }

    async fn complete(&self, model: &str, window: &[Message]) -> Result<String, InferenceError> {
        let response = self.post_chat(model, window, false).await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| InferenceError::Request(e.to_string()))?;
        let api_response: ChatResponse = serde_json::from_slice(&bytes)
            .map_err(|e| InferenceError::Decode(e.to_string()))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or(InferenceError::NoChoices)?;

        Ok(choice.message.content.unwrap_or_default())
    }

    async fn stream(&self, model: &str, window: &[Message]) -> Result<StreamReceiver, InferenceError> {
        let response = self.post_chat(model, window, true).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        // Read the event stream off the request path and forward deltas.
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = LineBuffer::default();
            let mut full_text = String::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(InferenceError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for line in lines.push(&bytes) {
                    match decode_line(&line) {
                        StreamLine::Skip => {}
                        StreamLine::Done => {
                            let _ = tx.send(Ok(StreamEvent::Done(full_text))).await;
                            return;
                        }
                        StreamLine::Delta(delta) => {
                            full_text.push_str(&delta);
                            if tx.send(Ok(StreamEvent::Delta(delta))).await.is_err() {
                                return; // receiver dropped
                            }
                        }
                        StreamLine::Malformed(reason) => {
                            warn!(line = %line, error = %reason, "Skipping malformed stream chunk");
                        }
                    }
                }
            }

            // Stream ended without [DONE]: flush a trailing unterminated line.
            if let Some(line) = lines.finish() {
                if let StreamLine::Delta(delta) = decode_line(&line) {
                    full_text.push_str(&delta);
                    if tx.send(Ok(StreamEvent::Delta(delta))).await.is_err() {
                        return;
                    }
                }
            }
            let _ = tx.send(Ok(StreamEvent::Done(full_text))).await;
        });

        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<String>, InferenceError> {
        let response = self
            .client
            .get(self.url("/models"))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| InferenceError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Status {
                status_code: status,
                message: error_body,
            });
        }

        let body: ModelsResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Decode(e.to_string()))?;

        Ok(body.data.into_iter().map(|m| m.id).collect())
    }
}

/// Splits a byte stream into lines. Works on bytes so a multi-byte UTF-8
/// character split across network chunks is reassembled before decoding.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append bytes and return every complete line (without `\r\n`/`\n`).
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            lines.push(line.trim_end_matches('\r').to_string());
        }
        lines
    }

    /// Whatever is left after the stream closed, if not blank.
    fn finish(&mut self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.pending).trim().to_string();
        self.pending.clear();
        (!rest.is_empty()).then_some(rest)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum StreamLine {
    Skip,
    Done,
    Delta(String),
    Malformed(String),
}

/// Interpret one line of the event stream.
///
/// The `data:` prefix is optional. Blank lines, `:` comments and the other
/// SSE fields are skipped, as are chunks whose delta carries no text.
fn decode_line(line: &str) -> StreamLine {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return StreamLine::Skip;
    }
    if ["event:", "id:", "retry:"].iter().any(|f| line.starts_with(f)) {
        return StreamLine::Skip;
    }

    let data = line.strip_prefix("data:").map_or(line, str::trim_start);
    if data == "[DONE]" {
        return StreamLine::Done;
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => match chunk.choices.into_iter().next().and_then(|c| c.delta.content) {
            Some(content) if !content.is_empty() => StreamLine::Delta(content),
            _ => StreamLine::Skip,
        },
        Err(e) => StreamLine::Malformed(e.to_string()),
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// A single `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}
