//! Error types for cryo-dflow.

use thiserror::Error;

/// Analysis error type.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Analysis was cancelled through the cancellation token.
    #[error("dataflow analysis cancelled")]
    Cancelled,
}
