//! Conversation context management for lmgram.
//!
//! - **token**: word-count approximation of token cost
//! - **store**: per-chat message log with trimming and request windows
//! - **format**: model markup to Telegram Markdown conversion

pub mod format;
pub mod store;
pub mod token;

pub use format::format_for_chat;
pub use store::{ContextSettings, ConversationStore};
pub use token::{estimate_messages_tokens, estimate_tokens};
