//! # lmgram Core
//!
//! Domain types, traits, and error definitions for the lmgram relay between
//! a Telegram bot and a local OpenAI-compatible inference server.
//! This crate has **zero framework dependencies**: it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping the chat platform or inference backend
//! - Easy testing with recording/scripted mock implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod message;
pub mod provider;
pub mod transport;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{ChatId, Message, Role};
pub use provider::{InferenceClient, StreamEvent, StreamReceiver};
pub use transport::{ChatTransport, InboundEvent, InboundUpdate, MessageId, ParseMode, Sender, UpdateSource};
