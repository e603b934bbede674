//! Command orchestration: commander → steward → laborers.
//!
//! - [`Orchestrator`]: runs one queued command through decomposition,
//!   concurrent laborer dispatch, report collection and dashboard updates.
//! - [`parse`]: tolerant decoding of steward and laborer replies.
//! - [`prompts`]: role prompts and dashboard line formats.

pub mod engine;
pub mod parse;
pub mod prompts;

pub use engine::Orchestrator;

use crate::pool::PoolError;
use crate::storage::StoreError;

/// Errors that abort a command attempt.
///
/// Laborer failures never appear here; they are recorded in that laborer's
/// report instead.
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error("Command {id} not found")]
    CommandNotFound { id: String },

    #[error("Steward could not decompose the command: {reason}")]
    Decomposition { reason: String },

    #[error("Steward job failed: {reason}")]
    Steward { reason: String },

    #[error("Orchestration cancelled")]
    Cancelled,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<PoolError> for OrchestrationError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::Cancelled { .. } => Self::Cancelled,
            other => Self::Steward {
                reason: other.to_string(),
            },
        }
    }
}
