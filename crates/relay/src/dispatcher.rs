//! The update dispatcher.
//!
//! One call to [`UpdateDispatcher::dispatch`] handles one inbound event and
//! ends in exactly one [`DispatchOutcome`]. Internal error details are logged
//! and never echoed to the chat; the user only sees the fixed error notice.

use std::sync::Arc;

use lmgram_config::{ResponseMode, Translations};
use lmgram_context::{ConversationStore, format_for_chat};
use lmgram_core::message::{ChatId, Role};
use lmgram_core::provider::{InferenceClient, StreamEvent};
use lmgram_core::transport::{ChatTransport, InboundEvent, MessageId, ParseMode};
use lmgram_security::{SenderCheckResult, UserStore};
use tracing::{debug, error, info, warn};

const MSG_ACCESS_DENIED: &str = "Access denied.";
const MSG_GREETING: &str = "Hello! I'm a Telegram bot that uses LM Studio.";
const MSG_HISTORY_CLEARED: &str = "Chat history cleared.";
const MSG_UNKNOWN_COMMAND: &str = "I don't know that command";
const MSG_GENERATION_FAILED: &str = "Error generating response.";
const MSG_TYPING: &str = "Bot is typing...";

/// Placeholder edited in place while a streaming reply arrives.
const STREAM_PLACEHOLDER: &str = "...";

/// Parse mode for formatted replies.
const REPLY_PARSE_MODE: ParseMode = ParseMode::Markdown;

/// How an event ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The sender is not allowed; the denial message was sent.
    Denied,
    /// A command was handled; the model was not called.
    CommandHandled,
    /// The model replied and the reply was delivered.
    Replied,
    /// Inference or delivery failed; the error notice was sent.
    Failed,
    /// Nothing to answer (e.g. a sticker or photo without text).
    Ignored,
}

/// Routes inbound events through the gate, commands and the reply flows.
pub struct UpdateDispatcher {
    transport: Arc<dyn ChatTransport>,
    inference: Arc<dyn InferenceClient>,
    store: Arc<ConversationStore>,
    users: Arc<UserStore>,
    translations: Arc<Translations>,
    model: String,
    mode: ResponseMode,
}

impl UpdateDispatcher {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        inference: Arc<dyn InferenceClient>,
        store: Arc<ConversationStore>,
        users: Arc<UserStore>,
        translations: Arc<Translations>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            inference,
            store,
            users,
            translations,
            model: model.into(),
            mode: ResponseMode::default(),
        }
    }

    /// Select the reply flow.
    pub fn with_mode(mut self, mode: ResponseMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> ResponseMode {
        self.mode
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Handle one inbound event to completion.
    pub async fn dispatch(&self, event: InboundEvent) -> DispatchOutcome {
        let chat_id = event.chat_id;
        debug!(
            chat_id,
            user_id = event.sender.id,
            username = %event.sender.display_name,
            "Update received"
        );

        // 1. Gate
        let users = self.users.clone();
        let (user_id, username) = (event.sender.id, event.sender.display_name.clone());
        let check = tokio::task::spawn_blocking(move || users.check_sender(user_id, &username)).await;
        let check = match check {
            Ok(check) => check,
            Err(e) => {
                error!(chat_id, user_id, error = %e, "Allow-list check failed");
                SenderCheckResult::Denied {
                    sender_id: user_id,
                    reason: "allow-list check failed".into(),
                }
            }
        };
        if let SenderCheckResult::Denied { sender_id, reason } = check {
            debug!(chat_id, user_id = sender_id, reason = %reason, "Access denied");
            self.send_text(chat_id, self.translations.t(MSG_ACCESS_DENIED), None)
                .await;
            return DispatchOutcome::Denied;
        }

        // 2. Commands
        if let Some(command) = event.command.as_deref() {
            self.handle_command(chat_id, command).await;
            return DispatchOutcome::CommandHandled;
        }

        if event.text.trim().is_empty() {
            debug!(chat_id, "Ignoring message without text");
            return DispatchOutcome::Ignored;
        }

        // 3. Reply flow
        match self.mode {
            ResponseMode::Stream => self.respond_streaming(chat_id, &event.text).await,
            ResponseMode::Full => self.respond_batch(chat_id, &event.text).await,
        }
    }

    async fn handle_command(&self, chat_id: ChatId, command: &str) {
        let reply = match command {
            "start" => MSG_GREETING,
            "clear" => {
                self.store.clear(chat_id);
                info!(chat_id, "Conversation cleared");
                MSG_HISTORY_CLEARED
            }
            other => {
                debug!(chat_id, command = other, "Unknown command");
                MSG_UNKNOWN_COMMAND
            }
        };
        self.send_text(chat_id, self.translations.t(reply), None).await;
    }

    /// Streaming flow: the stored log is appended without trimming and only
    /// the request window is bounded. The placeholder is edited with the raw
    /// accumulated text after every delta; the raw text is what gets stored.
    async fn respond_streaming(&self, chat_id: ChatId, text: &str) -> DispatchOutcome {
        self.store.append(chat_id, Role::User, text);
        let window = self.store.build_request_window(chat_id);

        if let Err(e) = self.transport.send_typing(chat_id).await {
            debug!(chat_id, error = %e, "Failed to send typing indicator");
        }

        let mut rx = match self.inference.stream(&self.model, &window).await {
            Ok(rx) => rx,
            Err(e) => {
                error!(chat_id, model = %self.model, error = %e, "Error calling inference server");
                return self.notify_failure(chat_id).await;
            }
        };

        let placeholder = match self
            .transport
            .send_message(chat_id, STREAM_PLACEHOLDER, None)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                error!(chat_id, error = %e, "Error sending stream placeholder");
                return self.notify_failure(chat_id).await;
            }
        };

        let mut accumulated = String::new();
        let full_text = loop {
            match rx.recv().await {
                Some(Ok(StreamEvent::Delta(delta))) => {
                    accumulated.push_str(&delta);
                    if let Err(e) = self
                        .transport
                        .edit_message(chat_id, placeholder, &accumulated, None)
                        .await
                    {
                        debug!(chat_id, error = %e, "Failed to update streamed message");
                    }
                }
                Some(Ok(StreamEvent::Done(full))) => break full,
                Some(Err(e)) => {
                    error!(chat_id, model = %self.model, error = %e, "Inference stream failed");
                    return self.notify_failure(chat_id).await;
                }
                None => {
                    warn!(chat_id, "Inference stream closed without completion");
                    break accumulated;
                }
            }
        };

        let formatted = format_for_chat(&full_text);
        if formatted != full_text && !formatted.trim().is_empty() {
            if let Err(e) = self
                .transport
                .edit_message(chat_id, placeholder, &formatted, Some(REPLY_PARSE_MODE))
                .await
            {
                warn!(chat_id, error = %e, "Formatted edit rejected; keeping plain text");
            }
        }

        self.store.append(chat_id, Role::Assistant, full_text);
        DispatchOutcome::Replied
    }

    /// Batch flow: the stored log is trimmed to the budget and sent whole.
    /// The formatted reply is what gets stored.
    async fn respond_batch(&self, chat_id: ChatId, text: &str) -> DispatchOutcome {
        self.store.append_and_trim(chat_id, Role::User, text);
        let window = self.store.snapshot(chat_id);

        let placeholder = self
            .send_text(chat_id, self.translations.t(MSG_TYPING), None)
            .await;

        let reply = match self.inference.complete(&self.model, &window).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(chat_id, model = %self.model, error = %e, "Error calling inference server");
                return self.notify_failure(chat_id).await;
            }
        };

        if let Some(id) = placeholder {
            if let Err(e) = self.transport.delete_message(chat_id, id).await {
                debug!(chat_id, error = %e, "Failed to delete typing placeholder");
            }
        }

        let formatted = format_for_chat(&reply);
        self.store
            .append_and_trim(chat_id, Role::Assistant, formatted.clone());

        match self.deliver_formatted(chat_id, &formatted).await {
            Some(_) => DispatchOutcome::Replied,
            None => DispatchOutcome::Failed,
        }
    }

    /// Send a formatted reply. If Telegram cannot parse the markup, the same
    /// text goes out unformatted.
    async fn deliver_formatted(&self, chat_id: ChatId, text: &str) -> Option<MessageId> {
        match self
            .transport
            .send_message(chat_id, text, Some(REPLY_PARSE_MODE))
            .await
        {
            Ok(id) => {
                debug!(chat_id, len = text.len(), "Reply sent");
                Some(id)
            }
            Err(e) => {
                warn!(chat_id, error = %e, "Formatted reply rejected; resending as plain text");
                self.send_text(chat_id, text, None).await
            }
        }
    }

    async fn notify_failure(&self, chat_id: ChatId) -> DispatchOutcome {
        self.send_text(chat_id, self.translations.t(MSG_GENERATION_FAILED), None)
            .await;
        DispatchOutcome::Failed
    }

    /// Send and log; delivery failures do not abort the caller.
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Option<MessageId> {
        match self.transport.send_message(chat_id, text, parse_mode).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!(chat_id, error = %e, "Error sending message");
                None
            }
        }
    }
}
