//! Crate-local error type, converting into `rag_core::Error` at the boundary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("intent classification failed: {0}")]
    Intent(String),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("verification failed: {0}")]
    Verification(String),

    #[error("history store error: {0}")]
    History(String),
}

impl From<PipelineError> for rag_core::Error {
    fn from(err: PipelineError) -> Self {
        rag_core::Error::Pipeline(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
