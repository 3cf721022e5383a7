//! Telegram update payloads.
//!
//! Only the fields the relay reads are modelled; everything else in the
//! Bot API objects is ignored by serde.

use lmgram_core::transport::{InboundEvent, InboundUpdate, Sender};
use serde::{Deserialize, Serialize};

/// One entry of a `getUpdates` result, or the body of a webhook POST.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<TgMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgMessage {
    pub message_id: i64,
    pub chat: TgChat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<TgUser>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<TgEntity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgChat {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgUser {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgEntity {
    #[serde(rename = "type")]
    pub kind: String,
    pub offset: i64,
    pub length: i64,
}

impl TgUser {
    /// Username, or "first last" trimmed when the user has none.
    pub fn display_name(&self) -> String {
        match self.username.as_deref() {
            Some(username) if !username.is_empty() => username.to_string(),
            _ => format!(
                "{} {}",
                self.first_name,
                self.last_name.as_deref().unwrap_or_default()
            )
            .trim()
            .to_string(),
        }
    }
}

impl TgMessage {
    /// Command name if the message starts with one: `/Clear@my_bot now`
    /// yields `clear`.
    pub fn command(&self) -> Option<String> {
        let text = self.text.as_deref()?;
        let is_command = if self.entities.is_empty() {
            text.starts_with('/')
        } else {
            self.entities
                .iter()
                .any(|e| e.kind == "bot_command" && e.offset == 0)
        };
        if !is_command {
            return None;
        }

        let token = text.split_whitespace().next()?;
        let name = token.trim_start_matches('/');
        let name = name.split('@').next().unwrap_or(name);
        if name.is_empty() {
            return None;
        }
        Some(name.to_lowercase())
    }
}

impl Update {
    /// The platform-neutral event, if this update is a user message.
    pub fn to_event(&self) -> Option<InboundEvent> {
        let message = self.message.as_ref()?;
        let from = message.from.as_ref()?;
        Some(InboundEvent {
            chat_id: message.chat.id,
            sender: Sender {
                id: from.id,
                display_name: from.display_name(),
            },
            text: message.text.clone().unwrap_or_default(),
            command: message.command(),
        })
    }

    pub fn into_inbound(self) -> InboundUpdate {
        InboundUpdate {
            update_id: self.update_id,
            event: self.to_event(),
        }
    }
}
