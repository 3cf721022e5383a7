//! Relay between a chat transport and an inference server.
//!
//! The [`UpdateDispatcher`] runs the per-event state machine: allow-list gate,
//! command handling, then the streaming or batch reply flow. The long-poll
//! loop feeds it from an [`UpdateSource`](lmgram_core::UpdateSource); the
//! webhook listener lives in `lmgram-gateway`.

pub mod dispatcher;
pub mod polling;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use dispatcher::{DispatchOutcome, UpdateDispatcher};
pub use polling::run_long_polling;
