//! Chat transport traits: the abstraction over the messaging platform.
//!
//! A transport delivers inbound events from the platform and performs the
//! outbound operations the dispatcher needs: send, edit, delete, and the
//! "typing" indicator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::TransportError;
use crate::message::ChatId;

/// Platform identifier of a sent message (needed to edit or delete it).
pub type MessageId = i64;

/// Rendering dialect for outbound text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseMode {
    Markdown,
    MarkdownV2,
    #[serde(rename = "HTML")]
    Html,
}

impl ParseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseMode::Markdown => "Markdown",
            ParseMode::MarkdownV2 => "MarkdownV2",
            ParseMode::Html => "HTML",
        }
    }
}

/// Who sent an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub id: i64,
    /// Username, or the trimmed "first last" name when the user has none.
    pub display_name: String,
}

/// A chat message received from the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub chat_id: ChatId,
    pub sender: Sender,
    /// Message text; empty for non-text messages.
    pub text: String,
    /// Command name without the leading `/` or `@botname` suffix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

/// One raw update from a pull source.
///
/// Carries the update id even when the update is not a message, so the
/// poll offset can advance past it.
#[derive(Debug, Clone)]
pub struct InboundUpdate {
    pub update_id: i64,
    pub event: Option<InboundEvent>,
}

/// Outbound operations on the chat platform.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Human-readable transport name (e.g., "telegram").
    fn name(&self) -> &str;

    /// Send a message, returning its id.
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<MessageId, TransportError>;

    /// Replace the text of a previously sent message.
    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<(), TransportError>;

    /// Delete a previously sent message.
    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<(), TransportError>;

    /// Show the "typing" indicator.
    async fn send_typing(&self, _chat_id: ChatId) -> Result<(), TransportError> {
        Ok(()) // No-op default
    }
}

/// Long-poll source of inbound updates.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Fetch updates with `update_id >= offset`, waiting up to `timeout_secs`.
    async fn poll(&self, offset: i64, timeout_secs: u64) -> Result<Vec<InboundUpdate>, TransportError>;
}
