//! HTTP surface over the RAG query pipeline: a non-streaming JSON endpoint
//! and an SSE streaming endpoint, plus the concrete backends (Qdrant vector
//! store, in-memory history) the server binary wires together at startup.

pub mod error;
pub mod history_store;
pub mod http;
pub mod state;
pub mod vector_store;

pub use error::{ServerError, StoreError};
pub use history_store::InMemoryHistoryStore;
pub use http::create_router;
pub use state::AppState;
pub use vector_store::QdrantVectorStore;
