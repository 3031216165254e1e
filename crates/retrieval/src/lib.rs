//! Hybrid dense+lexical retrieval, reranking, and snippet extraction for the
//! RAG query-processing pipeline.

pub mod error;
pub mod hybrid;
pub mod lexical;
pub mod rerank;
pub mod sequential;
pub mod snippet;

pub use error::{RetrievalError, Result};
pub use hybrid::{HybridParams, HybridRetriever};
pub use lexical::LexicalIndex;
pub use rerank::RerankerGate;
pub use sequential::SequentialRetriever;
pub use snippet::extract_relevant_snippet;
