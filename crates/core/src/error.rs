//! Error types for the lmgram domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; `Error` aggregates them.
//!
//! A malformed streaming chunk has no variant here: it is logged and
//! skipped inside the inference client and never reaches a caller. Access
//! denial is a dispatch outcome, not an error.

use std::path::PathBuf;
use thiserror::Error;

/// The top-level error type for all lmgram operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Inference server errors ---
    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    // --- Chat platform errors ---
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    // --- File persistence errors ---
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures talking to the inference server.
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    /// The request never produced a response (connect, DNS, timeout).
    #[error("Inference request failed: {0}")]
    Request(String),

    /// The server answered with a non-200 status.
    #[error("Inference server returned status {status_code}: {message}")]
    Status { status_code: u16, message: String },

    /// The response body was not the expected JSON shape.
    #[error("Failed to decode inference response: {0}")]
    Decode(String),

    /// A well-formed response carried zero choices.
    #[error("Inference response contained no choices")]
    NoChoices,

    /// The byte stream broke after the response headers arrived.
    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),
}

impl InferenceError {
    /// Whether the failure happened before any protocol exchange completed.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Request(_) | Self::StreamInterrupted(_))
    }
}

/// Failures talking to the chat platform.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Chat platform unreachable: {0}")]
    Network(String),

    #[error("Chat platform rejected the call ({code}): {description}")]
    Api { code: i64, description: String },

    #[error("Invalid payload from chat platform: {0}")]
    InvalidPayload(String),

    #[error("Transport not configured: {0}")]
    NotConfigured(String),
}

/// Failures reading or writing one of the structured files (users, config).
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to write {path}: {reason}")]
    Write { path: PathBuf, reason: String },

    #[error("Failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}
