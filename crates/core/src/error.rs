//! Crate-wide error type and result alias.

use thiserror::Error;

/// Errors that can surface anywhere in the query-processing pipeline.
///
/// Per-crate errors (`RetrievalError`, `LlmError`, ...) convert into this type
/// at crate boundaries via `From` so callers higher up the stack only need to
/// match one error enum.
#[derive(Error, Debug)]
pub enum Error {
    #[error("retrieval error: {0}")]
    Retrieval(String),

    #[error("llm error: {0}")]
    Llm(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("pipeline error: {0}")]
    Pipeline(String),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
