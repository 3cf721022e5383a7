//! Token estimation utilities.
//!
//! Uses a word-count heuristic: one whitespace-delimited word ≈ one token.
//! This is not a tokenizer. It only has to be consistent and monotonic in
//! text length so that trimming terminates.

use lmgram_core::message::Message;

/// Estimate the token count for a string.
pub fn estimate_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Estimate tokens for a slice of messages.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(|m| estimate_tokens(&m.content)).sum()
}
