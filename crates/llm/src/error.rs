use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("generation error: {0}")]
    Generation(String),

    #[error("api error: {0}")]
    Api(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("request timed out")]
    Timeout,

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("model error: {0}")]
    Model(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for rag_core::Error {
    fn from(err: LlmError) -> Self {
        rag_core::Error::Llm(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
