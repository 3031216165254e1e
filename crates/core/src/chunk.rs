//! Chunk and retrieved-document types (data model §3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A unit of retrievable text produced at ingestion by a two-level split.
///
/// A child chunk (~400 chars) is embedded and indexed; it carries the full
/// text of its parent chunk (~2000 chars) redundantly in `parent_context` so
/// retrieval can expand to parent context without a second lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable identifier for this chunk, unique within its collection.
    pub chunk_id: String,
    /// Identifier of the source document this chunk was split from.
    pub doc_id: String,
    /// The child chunk's own text (the unit actually embedded/indexed).
    pub content: String,
    /// Source file name, shown to the user as the citation.
    pub source: String,
    /// Page number, if the source document is paginated.
    pub page: Option<u32>,
    /// Identifier of the parent chunk this child belongs to.
    pub parent_id: Option<String>,
    /// Full parent-chunk text, stored redundantly for atomic expansion.
    pub parent_context: Option<String>,
    /// Ordinal position of the parent chunk within its document.
    pub parent_index: u32,
    /// Ordinal position of this child within its parent.
    pub child_index: u32,
    /// Arbitrary extra metadata carried alongside the chunk.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Chunk {
    pub fn new(chunk_id: impl Into<String>, doc_id: impl Into<String>, content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            doc_id: doc_id.into(),
            content: content.into(),
            source: source.into(),
            page: None,
            parent_id: None,
            parent_context: None,
            parent_index: 0,
            child_index: 0,
            metadata: HashMap::new(),
        }
    }
}

/// A retrieved document flowing through the pipeline after a search stage.
///
/// Distinct from [`Chunk`]: a `RetrievedDocument` carries a relevance score
/// and may already have been expanded to parent context, so `content` is not
/// necessarily the same text that was embedded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub content: String,
    pub metadata: HashMap<String, String>,
    pub relevance_score: f32,
}

impl RetrievedDocument {
    pub fn source(&self) -> &str {
        self.metadata.get("source").map(String::as_str).unwrap_or("unknown")
    }

    pub fn page(&self) -> Option<&str> {
        self.metadata.get("page").map(String::as_str)
    }

    pub fn chunk_id(&self) -> Option<&str> {
        self.metadata.get("chunk_id").map(String::as_str)
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.metadata.get("parent_id").map(String::as_str)
    }

    pub fn parent_context(&self) -> Option<&str> {
        self.metadata.get("parent_context").map(String::as_str)
    }
}

/// A deduplicated, user-visible citation for one answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub filename: String,
    pub chunk_id: String,
    pub relevance_score: f32,
    pub content_preview: String,
    pub page: Option<String>,
}
