//! Error types for cryo-cgen.

use thiserror::Error;

/// Code-generation error type.
#[derive(Error, Debug)]
pub enum GenerateError {
    /// Generation was cancelled through the cancellation token.
    #[error("code generation cancelled")]
    Cancelled,
}
