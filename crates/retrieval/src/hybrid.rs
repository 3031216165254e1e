//! Hybrid dense + lexical retriever with reciprocal rank fusion and parent
//! expansion (§4.6).

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rag_core::{Chunk, Embedder, RetrievedDocument, VectorStore};
use tracing::{debug, warn};

use crate::lexical::LexicalIndex;

/// Knobs for one hybrid search call; callers (the pipeline crate) own the
/// configured values and pass them in rather than this crate depending on
/// the configuration crate.
#[derive(Debug, Clone, Copy)]
pub struct HybridParams {
    pub vector_k: usize,
    pub bm25_k: usize,
    pub rrf_k: f32,
    pub initial_k: usize,
}

impl Default for HybridParams {
    fn default() -> Self {
        Self { vector_k: 20, bm25_k: 20, rrf_k: 60.0, initial_k: 50 }
    }
}

pub struct HybridRetriever {
    vector_store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    lexical_index: Arc<LexicalIndex>,
}

impl HybridRetriever {
    pub fn new(vector_store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>, lexical_index: Arc<LexicalIndex>) -> Self {
        Self { vector_store, embedder, lexical_index }
    }

    /// A chunk's fusion identity: its `chunk_id`, or (absent that) a hash of
    /// the first 200 characters of its content.
    fn fusion_key(chunk: &Chunk) -> String {
        if !chunk.chunk_id.is_empty() {
            return chunk.chunk_id.clone();
        }
        let head: String = chunk.content.chars().take(200).collect();
        let mut hasher = DefaultHasher::new();
        head.hash(&mut hasher);
        format!("{:x}", hasher.finish())
    }

    fn rrf_fusion(lists: &[Vec<Chunk>], rrf_k: f32) -> Vec<(Chunk, f32)> {
        let mut scores: HashMap<String, f32> = HashMap::new();
        let mut by_key: HashMap<String, Chunk> = HashMap::new();

        for list in lists {
            for (rank, chunk) in list.iter().enumerate() {
                let key = Self::fusion_key(chunk);
                let rrf_score = 1.0 / (rrf_k + rank as f32 + 1.0);
                *scores.entry(key.clone()).or_insert(0.0) += rrf_score;
                by_key.entry(key).or_insert_with(|| chunk.clone());
            }
        }

        let mut fused: Vec<(Chunk, f32)> = scores
            .into_iter()
            .filter_map(|(key, score)| by_key.remove(&key).map(|chunk| (chunk, score)))
            .collect();
        fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        fused
    }

    /// Dense + lexical search, fused by RRF. Returns the fused (chunk,
    /// score) list and whether the collection is empty (checked only when
    /// both legs return nothing).
    async fn search_children(&self, query: &str, collection: &str, params: HybridParams) -> crate::error::Result<(Vec<(Chunk, f32)>, bool)> {
        let lexical_index = self.lexical_index.clone();
        let bm25_k = params.bm25_k;
        let query_owned = query.to_string();
        let collection_owned = collection.to_string();
        let lexical_task = tokio::task::spawn_blocking(move || lexical_index.search(&collection_owned, &query_owned, bm25_k));

        let dense_result = async {
            let embedding = self.embedder.embed_query(query).await?;
            self.vector_store
                .similarity_search_with_score(&embedding, collection, params.vector_k)
                .await
        };

        let (dense, lexical) = tokio::join!(dense_result, lexical_task);

        let dense_chunks: Vec<Chunk> = match dense {
            Ok(hits) => hits.into_iter().map(|h| h.chunk).collect(),
            Err(e) => {
                warn!(error = %e, "dense search failed, continuing with lexical only");
                Vec::new()
            }
        };
        let lexical_pairs = lexical.unwrap_or_default();
        let lexical_chunks: Vec<Chunk> = lexical_pairs.into_iter().map(|(c, _)| c).collect();

        if dense_chunks.is_empty() && lexical_chunks.is_empty() {
            let empty = match self.vector_store.get_collection_info(collection).await {
                Ok(info) => info.map(|i| i.count == 0).unwrap_or(true),
                Err(_) => true,
            };
            return Ok((Vec::new(), empty));
        }

        if dense_chunks.is_empty() {
            let top: Vec<(Chunk, f32)> = lexical_chunks.into_iter().take(params.initial_k).enumerate().map(|(i, c)| (c, 1.0 / (i as f32 + 1.0))).collect();
            return Ok((top, false));
        }
        if lexical_chunks.is_empty() {
            let top: Vec<(Chunk, f32)> = dense_chunks.into_iter().take(params.initial_k).enumerate().map(|(i, c)| (c, 1.0 / (i as f32 + 1.0))).collect();
            return Ok((top, false));
        }

        let fused = Self::rrf_fusion(&[dense_chunks, lexical_chunks], params.rrf_k);
        debug!(count = fused.len(), "rrf fusion complete");
        Ok((fused.into_iter().take(params.initial_k).collect(), false))
    }

    /// Fuses child-chunk search results then expands each newly-seen parent
    /// into one document carrying the parent's full context. Chunks without
    /// a `parent_id` pass through unchanged, undeduplicated.
    pub async fn search(&self, query: &str, collection: &str, params: HybridParams) -> crate::error::Result<(Vec<RetrievedDocument>, bool)> {
        let (fused, collection_empty) = self.search_children(query, collection, params).await?;
        if fused.is_empty() {
            return Ok((Vec::new(), collection_empty));
        }

        let mut seen_parents = std::collections::HashSet::new();
        let mut documents = Vec::with_capacity(fused.len());

        for (chunk, score) in fused {
            if let Some(parent_id) = chunk.parent_id.clone() {
                if !seen_parents.insert(parent_id.clone()) {
                    continue;
                }
                let content = chunk.parent_context.clone().unwrap_or_else(|| chunk.content.clone());
                documents.push(Self::to_document(&chunk, content, score, true));
            } else {
                documents.push(Self::to_document(&chunk, chunk.content.clone(), score, false));
            }
        }

        Ok((documents, false))
    }

    fn to_document(chunk: &Chunk, content: String, score: f32, expanded: bool) -> RetrievedDocument {
        let mut metadata = chunk.metadata.clone();
        metadata.insert("source".to_string(), chunk.source.clone());
        metadata.insert("chunk_id".to_string(), chunk.chunk_id.clone());
        if let Some(parent_id) = &chunk.parent_id {
            metadata.insert("parent_id".to_string(), parent_id.clone());
        }
        if let Some(page) = chunk.page {
            metadata.insert("page".to_string(), page.to_string());
        }
        if expanded {
            metadata.insert("expanded_from_child".to_string(), "true".to_string());
        }
        RetrievedDocument { content, metadata, relevance_score: score }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_with_parent(id: &str, parent: &str, content: &str) -> Chunk {
        let mut c = Chunk::new(id, "d1", content, "test.txt");
        c.parent_id = Some(parent.to_string());
        c.parent_context = Some(format!("parent context for {parent}"));
        c
    }

    #[test]
    fn rrf_fusion_sums_scores_across_lists() {
        let a = chunk_with_parent("a", "p1", "alpha");
        let b = chunk_with_parent("b", "p2", "beta");
        let list1 = vec![a.clone(), b.clone()];
        let list2 = vec![b.clone(), a.clone()];

        let fused = HybridRetriever::rrf_fusion(&[list1, list2], 60.0);
        assert_eq!(fused.len(), 2);
        // Both appear once at rank 0 and once at rank 1 across the two lists,
        // so they tie; order between ties is not asserted.
        let total: f32 = 2.0 / 61.0 + 2.0 / 62.0;
        let sum: f32 = fused.iter().map(|(_, s)| s).sum();
        assert!((sum - total).abs() < 1e-6);
    }

    #[test]
    fn fusion_key_prefers_chunk_id_over_hash() {
        let c = chunk_with_parent("stable-id", "p1", "whatever content");
        assert_eq!(HybridRetriever::fusion_key(&c), "stable-id");
    }
}
