//! Error types for cryo-ir.

use thiserror::Error;

/// Core error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid basic block reference.
    #[error("invalid basic block id: {0:?}")]
    InvalidBlockId(crate::BasicBlockId),

    /// The operation was cancelled through a cancellation token.
    #[error("cancelled")]
    Cancelled,
}
