//! Inference client trait: the abstraction over the model server.
//!
//! An inference client sends a request window to an OpenAI-compatible
//! chat-completion endpoint and gets a reply back, either as one complete
//! string or as a live stream of partial deltas.

use async_trait::async_trait;
use crate::error::InferenceError;
use crate::message::Message;

/// One item of a streaming reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// An incremental fragment of generated text (never empty).
    Delta(String),
    /// The stream finished; carries the concatenation of every delta.
    Done(String),
}

/// Receiver side of a streaming reply.
pub type StreamReceiver = tokio::sync::mpsc::Receiver<Result<StreamEvent, InferenceError>>;

/// The core inference trait.
///
/// The dispatcher calls `complete()` or `stream()` depending on the configured
/// response mode, without knowing which server is behind it.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// A human-readable name for this backend (e.g., "lmstudio").
    fn name(&self) -> &str;

    /// Send the window and wait for the full reply (first choice's content).
    async fn complete(&self, model: &str, window: &[Message]) -> Result<String, InferenceError>;

    /// Send the window and receive the reply incrementally.
    ///
    /// The returned receiver yields zero or more `Delta`s followed by exactly
    /// one `Done`, or an `Err` if the stream breaks midway.
    async fn stream(&self, model: &str, window: &[Message]) -> Result<StreamReceiver, InferenceError>;

    /// List the model identifiers the server can serve.
    async fn list_models(&self) -> Result<Vec<String>, InferenceError>;
}
