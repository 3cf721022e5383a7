//! Conversation store: per-chat ordered message log.
//!
//! Every conversation starts with a `system` message holding the configured
//! system role, and that message stays at index 0 until the conversation is
//! cleared. Two update policies exist:
//!
//! - [`ConversationStore::append_and_trim`] keeps the stored log within the
//!   token budget by dropping the oldest non-system messages (batch replies).
//! - [`ConversationStore::append`] never trims (streaming replies); only the
//!   per-request window built by [`ConversationStore::build_request_window`]
//!   is bounded there, so the stored log can grow without limit.
//!
//! All chats share one `std::sync::Mutex`. Critical sections are short and
//! in-memory; the guard is never held across an `.await`. Events for the same
//! chat are not serialized against each other: appends from concurrent events
//! interleave, but none is lost.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use lmgram_core::message::{ChatId, Message, Role};
use tracing::debug;

use crate::token::{estimate_messages_tokens, estimate_tokens};

/// Budget and system-role settings applied by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSettings {
    /// Maximum word-count estimate of a window (and of a trimmed log).
    pub token_limit: usize,
    /// Content of the system message at the head of every conversation.
    pub system_role: String,
    /// Always include the system message in request windows.
    pub pin_system_prompt: bool,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            token_limit: 2048,
            system_role: "You are a helpful assistant.".into(),
            pin_system_prompt: false,
        }
    }
}

/// In-memory conversations for the life of the process.
pub struct ConversationStore {
    conversations: Mutex<HashMap<ChatId, Vec<Message>>>,
    settings: RwLock<ContextSettings>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(ContextSettings::default())
    }
}

impl ConversationStore {
    pub fn new(settings: ContextSettings) -> Self {
        Self {
            conversations: Mutex::new(HashMap::new()),
            settings: RwLock::new(settings),
        }
    }

    /// Current settings (a copy).
    pub fn settings(&self) -> ContextSettings {
        self.settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the settings. Existing conversations keep their system message
    /// until they are cleared.
    pub fn update_settings(&self, settings: ContextSettings) {
        *self.settings.write().unwrap_or_else(|e| e.into_inner()) = settings;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ChatId, Vec<Message>>> {
        self.conversations.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The conversation for `chat_id`, created with a single system message
    /// if it does not exist yet.
    pub fn get_or_create(&self, chat_id: ChatId) -> Vec<Message> {
        let system_role = self.settings().system_role;
        let mut conversations = self.lock();
        conversations
            .entry(chat_id)
            .or_insert_with(|| vec![Message::system(system_role)])
            .clone()
    }

    /// Append a message without trimming.
    pub fn append(&self, chat_id: ChatId, role: Role, content: impl Into<String>) {
        let system_role = self.settings().system_role;
        let mut conversations = self.lock();
        let messages = conversations
            .entry(chat_id)
            .or_insert_with(|| vec![Message::system(system_role)]);
        messages.push(Message::new(role, content));
    }

    /// Append a message, then drop the oldest non-system messages until the
    /// stored log fits the token budget (or only the system message is left).
    pub fn append_and_trim(&self, chat_id: ChatId, role: Role, content: impl Into<String>) {
        let settings = self.settings();
        let mut conversations = self.lock();
        let messages = conversations
            .entry(chat_id)
            .or_insert_with(|| vec![Message::system(settings.system_role)]);
        messages.push(Message::new(role, content));

        let removed = trim_to_budget(messages, settings.token_limit);
        if removed > 0 {
            debug!(chat_id, removed, remaining = messages.len(), "Trimmed conversation");
        }
    }

    /// The bounded window of this chat's history to send to the model, in
    /// chronological order. Does not mutate the conversation.
    ///
    /// By default this is the longest suffix whose estimate fits the budget,
    /// which may leave out the system message when the budget is tight. With
    /// `pin_system_prompt` the system message is always first and the rest of
    /// the budget goes to the newest messages.
    pub fn build_request_window(&self, chat_id: ChatId) -> Vec<Message> {
        let settings = self.settings();
        let conversations = self.lock();
        match conversations.get(&chat_id) {
            Some(messages) if settings.pin_system_prompt => {
                pinned_window(messages, settings.token_limit)
            }
            Some(messages) => suffix_window(messages, settings.token_limit),
            None => Vec::new(),
        }
    }

    /// A copy of the full stored conversation (empty if it does not exist).
    pub fn snapshot(&self, chat_id: ChatId) -> Vec<Message> {
        self.lock().get(&chat_id).cloned().unwrap_or_default()
    }

    /// Reset the conversation to a single system message with the current
    /// system role.
    pub fn clear(&self, chat_id: ChatId) {
        let system_role = self.settings().system_role;
        self.lock().insert(chat_id, vec![Message::system(system_role)]);
    }

    /// Number of stored messages for a chat (0 if absent).
    pub fn len(&self, chat_id: ChatId) -> usize {
        self.lock().get(&chat_id).map_or(0, Vec::len)
    }

    /// Number of chats with a conversation.
    pub fn chat_count(&self) -> usize {
        self.lock().len()
    }
}

/// Remove messages at index 1 while the total exceeds `limit` and more than
/// one message remains. Returns how many were removed.
fn trim_to_budget(messages: &mut Vec<Message>, limit: usize) -> usize {
    let mut total = estimate_messages_tokens(messages);
    let mut removed = 0;
    while total > limit && messages.len() > 1 {
        let dropped = messages.remove(1);
        total -= estimate_tokens(&dropped.content);
        removed += 1;
    }
    removed
}

/// Walk newest to oldest, stop at the first message that would overflow the
/// budget, and return the accumulated suffix in chronological order.
fn suffix_window(messages: &[Message], limit: usize) -> Vec<Message> {
    let mut used = 0;
    let mut window: Vec<Message> = Vec::new();
    for message in messages.iter().rev() {
        let cost = estimate_tokens(&message.content);
        if used + cost > limit {
            break;
        }
        used += cost;
        window.push(message.clone());
    }
    window.reverse();
    window
}

/// Like [`suffix_window`] over the non-system tail, with the system message
/// always prepended. The system message's cost is charged first; if it alone
/// exceeds the budget the window holds only the system message.
fn pinned_window(messages: &[Message], limit: usize) -> Vec<Message> {
    match messages.split_first() {
        Some((head, tail)) if head.role == Role::System => {
            let remaining = limit.saturating_sub(estimate_tokens(&head.content));
            let mut window = Vec::with_capacity(tail.len() + 1);
            window.push(head.clone());
            window.extend(suffix_window(tail, remaining));
            window
        }
        _ => suffix_window(messages, limit),
    }
}
