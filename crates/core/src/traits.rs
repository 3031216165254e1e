//! Capability interfaces (§6) consumed by the core pipeline.
//!
//! These traits are the seam between the query-processing pipeline and its
//! external collaborators: the embedding model, the vector database, the
//! cross-encoder, the language model, and the conversation-history store.
//! None of their implementations live in this crate.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::chunk::Chunk;
use crate::error::Result;
use crate::state::ConversationTurn;

/// Dense embedding model. Vector dimensionality is fixed per deployment;
/// collections embedded with one model cannot be searched with another.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
    fn dimension(&self) -> usize;
    /// Identifier of the active model, used to reject queries on a
    /// collection whose stored embeddings were produced by a different model.
    fn model_id(&self) -> &str;
}

/// A single hit from the vector store, paired with its raw distance/score.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub chunk: Chunk,
    pub score: f32,
}

/// Summary of a collection's size, used to distinguish "collection exists
/// but is empty" from "collection never existed".
#[derive(Debug, Clone, Copy)]
pub struct CollectionInfo {
    pub count: u64,
}

/// Filter applied to a vector-store query or deletion.
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    pub fields: HashMap<String, String>,
}

/// External dense vector database.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn similarity_search_with_score(&self, query_embedding: &[f32], collection: &str, k: usize) -> Result<Vec<VectorHit>>;
    async fn add(&self, collection: &str, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()>;
    async fn delete(&self, collection: &str) -> Result<()>;
    async fn delete_by_metadata(&self, collection: &str, filter: &MetadataFilter) -> Result<()>;
    async fn list_collections(&self) -> Result<Vec<String>>;
    async fn get_all_chunks(&self, collection: &str, limit: usize) -> Result<Vec<Chunk>>;
    async fn get_collection_info(&self, collection: &str) -> Result<Option<CollectionInfo>>;
}

/// Cross-encoder that scores a (query, document) pair jointly.
///
/// Returns unnormalized logits; normalization (min-max across the batch, or
/// sigmoid for a single item) is the caller's responsibility (§4.7).
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    async fn score(&self, pairs: &[(String, String)]) -> Result<Vec<f32>>;
}

/// Temperature and context-window knobs for a single generation call.
#[derive(Debug, Clone, Copy)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: usize,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self { temperature: 0.0, max_tokens: 1024 }
    }
}

/// External language model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn invoke(&self, prompt: &str, params: GenerationParams) -> Result<String>;

    /// Stream generated text chunks over the channel as they arrive.
    /// Returns the full concatenated text once generation completes or the
    /// receiver is dropped (cancellation).
    async fn stream(&self, prompt: &str, params: GenerationParams, tx: tokio::sync::mpsc::Sender<String>) -> Result<String>;
}

/// Process-external, session-keyed conversation history store.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn add(&self, session_id: &str, turn: ConversationTurn) -> Result<()>;
    /// Newest-first list of up to `limit` turns.
    async fn get(&self, session_id: &str, limit: usize) -> Result<Vec<ConversationTurn>>;
    async fn clear(&self, session_id: &str) -> Result<()>;
    async fn list_sessions(&self) -> Result<Vec<String>>;
}
