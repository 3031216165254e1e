//! Shared types, traits and error handling for the RAG query-processing
//! pipeline. Downstream crates depend on this one for the vocabulary they
//! all need to agree on: chunks, pipeline state, and the capability
//! interfaces to external collaborators.

pub mod chunk;
pub mod error;
pub mod state;
pub mod traits;

pub use chunk::{Chunk, RetrievedDocument, Source};
pub use error::{Error, Result};
pub use state::{ConversationTurn, Intent, PipelineState, QueryComplexity, TurnRole};
pub use traits::{CollectionInfo, CrossEncoder, Embedder, GenerationParams, HistoryStore, LanguageModel, MetadataFilter, VectorHit, VectorStore};
