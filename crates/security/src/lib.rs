//! Access control for lmgram.
//!
//! Provides:
//! - **Allowlist**: the persisted per-user `allowed` flag and the gate check
//!   applied to every inbound message

pub mod allowlist;

pub use allowlist::{BotUser, SenderCheckResult, UserStore};
