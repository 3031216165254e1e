use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("lexical index error: {0}")]
    Index(String),

    #[error("search error: {0}")]
    Search(String),

    #[error("embedding error: {0}")]
    Embedding(String),
}

impl From<RetrievalError> for rag_core::Error {
    fn from(err: RetrievalError) -> Self {
        rag_core::Error::Retrieval(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
