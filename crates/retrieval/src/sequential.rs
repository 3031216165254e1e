//! Sequential retriever for the summarization branch (§4.8). Bypasses
//! similarity search entirely: every chunk in the collection is in scope.

use std::collections::HashSet;
use std::sync::Arc;

use rag_core::{Chunk, RetrievedDocument, VectorStore};

/// All documents returned by the sequential retriever are equally "in
/// scope", so they carry this synthetic top relevance score rather than a
/// real similarity or rank-derived one.
const SYNTHETIC_SCORE: f32 = 1.0;

pub struct SequentialRetriever {
    vector_store: Arc<dyn VectorStore>,
}

impl SequentialRetriever {
    pub fn new(vector_store: Arc<dyn VectorStore>) -> Self {
        Self { vector_store }
    }

    /// Fetches all chunks for `collection` (capped at `limit`), orders them
    /// by document position, and deduplicates by parent so the summarizer
    /// sees each parent section once.
    pub async fn retrieve(&self, collection: &str, limit: usize) -> crate::error::Result<Vec<RetrievedDocument>> {
        let chunks = self
            .vector_store
            .get_all_chunks(collection, limit)
            .await
            .map_err(|e| crate::error::RetrievalError::Search(e.to_string()))?;

        let mut ordered = chunks;
        ordered.sort_by_key(|c| (c.page.unwrap_or(0), c.parent_index, c.child_index));

        let mut seen_parents: HashSet<String> = HashSet::new();
        let mut documents = Vec::with_capacity(ordered.len());

        for chunk in ordered {
            match &chunk.parent_id {
                Some(parent_id) => {
                    if !seen_parents.insert(parent_id.clone()) {
                        continue;
                    }
                    let content = chunk.parent_context.clone().unwrap_or_else(|| chunk.content.clone());
                    documents.push(to_document(&chunk, content));
                }
                None => documents.push(to_document(&chunk, chunk.content.clone())),
            }
        }

        Ok(documents)
    }
}

fn to_document(chunk: &Chunk, content: String) -> RetrievedDocument {
    let mut metadata = chunk.metadata.clone();
    metadata.insert("source".to_string(), chunk.source.clone());
    metadata.insert("chunk_id".to_string(), chunk.chunk_id.clone());
    if let Some(parent_id) = &chunk.parent_id {
        metadata.insert("parent_id".to_string(), parent_id.clone());
    }
    if let Some(page) = chunk.page {
        metadata.insert("page".to_string(), page.to_string());
    }
    RetrievedDocument { content, metadata, relevance_score: SYNTHETIC_SCORE }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use rag_core::{CollectionInfo, MetadataFilter, VectorHit};

    use super::*;

    struct FakeStore {
        chunks: Vec<Chunk>,
    }

    #[async_trait]
    impl VectorStore for FakeStore {
        async fn similarity_search_with_score(&self, _q: &[f32], _c: &str, _k: usize) -> rag_core::Result<Vec<VectorHit>> {
            Ok(Vec::new())
        }
        async fn add(&self, _c: &str, _chunks: &[Chunk], _e: &[Vec<f32>]) -> rag_core::Result<()> {
            Ok(())
        }
        async fn delete(&self, _c: &str) -> rag_core::Result<()> {
            Ok(())
        }
        async fn delete_by_metadata(&self, _c: &str, _f: &MetadataFilter) -> rag_core::Result<()> {
            Ok(())
        }
        async fn list_collections(&self) -> rag_core::Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn get_all_chunks(&self, _c: &str, limit: usize) -> rag_core::Result<Vec<Chunk>> {
            Ok(self.chunks.iter().take(limit).cloned().collect())
        }
        async fn get_collection_info(&self, _c: &str) -> rag_core::Result<Option<CollectionInfo>> {
            Ok(Some(CollectionInfo { count: self.chunks.len() as u64 }))
        }
    }

    fn chunk(id: &str, parent: &str, parent_index: u32, child_index: u32) -> Chunk {
        let mut c = Chunk::new(id, "d1", format!("child {id}"), "doc.txt");
        c.parent_id = Some(parent.to_string());
        c.parent_context = Some(format!("parent {parent}"));
        c.parent_index = parent_index;
        c.child_index = child_index;
        c
    }

    #[tokio::test]
    async fn dedups_by_parent_and_orders_by_position() {
        let store = Arc::new(FakeStore {
            chunks: vec![
                chunk("c2", "p2", 1, 0),
                chunk("c1a", "p1", 0, 0),
                chunk("c1b", "p1", 0, 1),
            ],
        });
        let retriever = SequentialRetriever::new(store);
        let docs = retriever.retrieve("coll", 500).await.unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].content, "parent p1");
        assert_eq!(docs[1].content, "parent p2");
        assert_eq!(docs[0].relevance_score, SYNTHETIC_SCORE);
    }
}
