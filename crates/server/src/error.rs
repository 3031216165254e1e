//! Crate-local error type for the Qdrant vector-store adapter, converting
//! into `rag_core::Error` at the boundary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("qdrant connection error: {0}")]
    Connection(String),

    #[error("qdrant operation failed: {0}")]
    Operation(String),
}

impl From<StoreError> for rag_core::Error {
    fn from(err: StoreError) -> Self {
        rag_core::Error::Retrieval(err.to_string())
    }
}

/// Errors surfaced directly by HTTP handlers, translated to a status code.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("pipeline error: {0}")]
    Pipeline(#[from] rag_core::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl axum::response::IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            ServerError::Pipeline(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::InvalidRequest(_) => axum::http::StatusCode::BAD_REQUEST,
        };
        let body = axum::Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
