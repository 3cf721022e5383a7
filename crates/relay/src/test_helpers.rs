//! Shared test doubles for dispatcher and polling tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use lmgram_core::error::{InferenceError, TransportError};
use lmgram_core::message::{ChatId, Message};
use lmgram_core::provider::{InferenceClient, StreamEvent, StreamReceiver};
use lmgram_core::transport::{
    ChatTransport, InboundEvent, InboundUpdate, MessageId, ParseMode, Sender, UpdateSource,
};

/// One outbound call observed by [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Send {
        chat_id: ChatId,
        text: String,
        parse_mode: Option<ParseMode>,
    },
    Edit {
        chat_id: ChatId,
        message_id: MessageId,
        text: String,
        parse_mode: Option<ParseMode>,
    },
    Delete {
        chat_id: ChatId,
        message_id: MessageId,
    },
    Typing {
        chat_id: ChatId,
    },
}

/// A transport that records every call (including failed ones) and hands out
/// message ids 1, 2, 3... for successful sends.
pub struct RecordingTransport {
    calls: Mutex<Vec<Call>>,
    next_id: Mutex<MessageId>,
    edit_failure: Mutex<Option<TransportError>>,
    markdown_failure: Mutex<Option<TransportError>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_id: Mutex::new(1),
            edit_failure: Mutex::new(None),
            markdown_failure: Mutex::new(None),
        }
    }

    /// Make every edit fail with `error`.
    pub fn fail_edits(&self, error: TransportError) {
        *self.edit_failure.lock().unwrap() = Some(error);
    }

    /// Make every send with a parse mode fail with `error`.
    pub fn fail_markdown_sends(&self, error: TransportError) {
        *self.markdown_failure.lock().unwrap() = Some(error);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Texts of every `Send` call, in order.
    pub fn sent_texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Send { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<MessageId, TransportError> {
        self.calls.lock().unwrap().push(Call::Send {
            chat_id,
            text: text.to_string(),
            parse_mode,
        });
        if parse_mode.is_some() {
            if let Some(err) = self.markdown_failure.lock().unwrap().clone() {
                return Err(err);
            }
        }
        let mut next = self.next_id.lock().unwrap();
        let id = *next;
        *next += 1;
        Ok(id)
    }

    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<(), TransportError> {
        self.calls.lock().unwrap().push(Call::Edit {
            chat_id,
            message_id,
            text: text.to_string(),
            parse_mode,
        });
        match self.edit_failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn delete_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Delete { chat_id, message_id });
        Ok(())
    }

    async fn send_typing(&self, chat_id: ChatId) -> Result<(), TransportError> {
        self.calls.lock().unwrap().push(Call::Typing { chat_id });
        Ok(())
    }
}

type StreamScript = Result<Vec<Result<StreamEvent, InferenceError>>, InferenceError>;

/// An inference client that replays scripted results in order.
///
/// Panics if more calls are made than results provided.
pub struct ScriptedInference {
    completions: Mutex<VecDeque<Result<String, InferenceError>>>,
    streams: Mutex<VecDeque<StreamScript>>,
    windows: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedInference {
    pub fn new() -> Self {
        Self {
            completions: Mutex::new(VecDeque::new()),
            streams: Mutex::new(VecDeque::new()),
            windows: Mutex::new(Vec::new()),
        }
    }

    pub fn with_completion(self, result: Result<String, InferenceError>) -> Self {
        self.completions.lock().unwrap().push_back(result);
        self
    }

    pub fn with_stream(self, script: StreamScript) -> Self {
        self.streams.lock().unwrap().push_back(script);
        self
    }

    /// Every window received, in call order.
    pub fn windows(&self) -> Vec<Vec<Message>> {
        self.windows.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.windows.lock().unwrap().len()
    }
}

#[async_trait]
impl InferenceClient for ScriptedInference {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _model: &str, window: &[Message]) -> Result<String, InferenceError> {
        self.windows.lock().unwrap().push(window.to_vec());
        self.completions
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedInference: no more completions")
    }

    async fn stream(&self, _model: &str, window: &[Message]) -> Result<StreamReceiver, InferenceError> {
        self.windows.lock().unwrap().push(window.to_vec());
        let events = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedInference: no more streams")?;

        let (tx, rx) = tokio::sync::mpsc::channel(events.len().max(1));
        for event in events {
            tx.try_send(event).unwrap();
        }
        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<String>, InferenceError> {
        Ok(vec!["mock-model".into()])
    }
}

/// An update source that returns scripted batches, then waits forever.
pub struct ScriptedSource {
    batches: Mutex<VecDeque<Result<Vec<InboundUpdate>, TransportError>>>,
    offsets: Mutex<Vec<i64>>,
}

impl ScriptedSource {
    pub fn new(batches: Vec<Result<Vec<InboundUpdate>, TransportError>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
            offsets: Mutex::new(Vec::new()),
        }
    }

    /// The offset passed to every poll, in order.
    pub fn offsets(&self) -> Vec<i64> {
        self.offsets.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpdateSource for ScriptedSource {
    async fn poll(&self, offset: i64, _timeout_secs: u64) -> Result<Vec<InboundUpdate>, TransportError> {
        self.offsets.lock().unwrap().push(offset);
        let next = self.batches.lock().unwrap().pop_front();
        match next {
            Some(batch) => batch,
            None => std::future::pending().await,
        }
    }
}

/// A text message from `user_id` in `chat_id`.
pub fn event(chat_id: ChatId, user_id: i64, text: &str) -> InboundEvent {
    InboundEvent {
        chat_id,
        sender: Sender {
            id: user_id,
            display_name: format!("user{user_id}"),
        },
        text: text.to_string(),
        command: None,
    }
}

/// A `/command` message from `user_id` in `chat_id`.
pub fn command_event(chat_id: ChatId, user_id: i64, command: &str) -> InboundEvent {
    InboundEvent {
        command: Some(command.to_string()),
        ..event(chat_id, user_id, &format!("/{command}"))
    }
}

pub fn update(update_id: i64, event: Option<InboundEvent>) -> InboundUpdate {
    InboundUpdate { update_id, event }
}
