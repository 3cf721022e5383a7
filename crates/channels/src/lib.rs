//! Chat transport implementations for lmgram.
//!
//! - **telegram**: Telegram Bot API client (outbound calls, long polling,
//!   webhook registration)
//! - **update**: Telegram update payloads and their conversion into
//!   platform-neutral inbound events

pub mod telegram;
pub mod update;

pub use telegram::{BotInfo, TelegramClient, WebhookInfo};
pub use update::Update;
