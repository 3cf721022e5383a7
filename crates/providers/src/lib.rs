//! Inference client implementations for lmgram.
//!
//! All clients implement the `lmgram_core::InferenceClient` trait.

pub mod lmstudio;

pub use lmstudio::LmStudioClient;
