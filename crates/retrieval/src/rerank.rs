//! Reranker gate (§4.7): anti-bleed context filter, cross-encoder rerank
//! with adaptive top-K, and user-visible source list construction.

use std::collections::HashMap;
use std::sync::Arc;

use rag_core::{CrossEncoder, Embedder, QueryComplexity, RetrievedDocument, Source};
use tracing::warn;

/// Content words (length >= 3) used by the keyword-overlap fallback when
/// embeddings are unavailable for the context filter.
fn content_words(text: &str) -> std::collections::HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3)
        .map(str::to_string)
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

pub struct RerankerGate {
    embedder: Option<Arc<dyn Embedder>>,
    cross_encoder: Option<Arc<dyn CrossEncoder>>,
    relevance_threshold: f32,
}

impl RerankerGate {
    pub fn new(embedder: Option<Arc<dyn Embedder>>, cross_encoder: Option<Arc<dyn CrossEncoder>>, relevance_threshold: f32) -> Self {
        Self { embedder, cross_encoder, relevance_threshold }
    }

    /// Drops candidates whose content doesn't resemble the query enough to
    /// guard against stale context bleeding in from earlier turns.
    async fn context_filter(&self, query: &str, documents: Vec<RetrievedDocument>) -> Vec<RetrievedDocument> {
        if documents.is_empty() {
            return documents;
        }

        if let Some(embedder) = &self.embedder {
            match embedder.embed_query(query).await {
                Ok(query_embedding) => {
                    let mut kept = Vec::with_capacity(documents.len());
                    for doc in documents {
                        let head: String = doc.content.chars().take(1000).collect();
                        match embedder.embed_documents(&[head]).await {
                            Ok(mut embeddings) => {
                                let doc_embedding = embeddings.pop().unwrap_or_default();
                                let similarity = cosine_similarity(&query_embedding, &doc_embedding);
                                if similarity >= self.relevance_threshold {
                                    kept.push(doc);
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "document embedding failed during context filter, keeping candidate");
                                kept.push(doc);
                            }
                        }
                    }
                    return kept;
                }
                Err(e) => {
                    warn!(error = %e, "query embedding failed, falling back to keyword overlap for context filter");
                }
            }
        }

        self.keyword_filter(query, documents)
    }

    fn keyword_filter(&self, query: &str, documents: Vec<RetrievedDocument>) -> Vec<RetrievedDocument> {
        let query_words = content_words(query);
        if query_words.is_empty() {
            return documents;
        }
        documents
            .into_iter()
            .filter(|doc| {
                let doc_words = content_words(&doc.content);
                let overlap = query_words.intersection(&doc_words).count() as f32 / query_words.len() as f32;
                overlap >= self.relevance_threshold
            })
            .collect()
    }

    /// Scores surviving candidates with the cross-encoder, normalizes
    /// scores across the batch, and keeps the top `k`. Falls back to
    /// sorting by retrieval score and filtering by `relevance_threshold`
    /// when no cross-encoder is configured or it fails, keeping at least
    /// one document.
    async fn cross_encoder_rerank(&self, query: &str, mut documents: Vec<RetrievedDocument>, k: usize) -> Vec<RetrievedDocument> {
        if documents.is_empty() {
            return documents;
        }

        if let Some(cross_encoder) = &self.cross_encoder {
            let pairs: Vec<(String, String)> = documents.iter().map(|d| (query.to_string(), d.content.clone())).collect();
            match cross_encoder.score(&pairs).await {
                Ok(scores) if scores.len() == documents.len() => {
                    let normalized = normalize_scores(&scores);
                    for (doc, score) in documents.iter_mut().zip(normalized) {
                        doc.relevance_score = score;
                    }
                    documents.sort_by(|a, b| b.relevance_score.partial_cmp(&a.relevance_score).unwrap_or(std::cmp::Ordering::Equal));
                    documents.truncate(k);
                    return documents;
                }
                Ok(_) => warn!("cross-encoder returned a mismatched score count, falling back to retrieval-score ranking"),
                Err(e) => warn!(error = %e, "cross-encoder scoring failed, falling back to retrieval-score ranking"),
            }
        }

        documents.sort_by(|a, b| b.relevance_score.partial_cmp(&a.relevance_score).unwrap_or(std::cmp::Ordering::Equal));
        let mut filtered: Vec<RetrievedDocument> = documents.iter().filter(|d| d.relevance_score >= self.relevance_threshold).cloned().collect();
        if filtered.is_empty() {
            if let Some(best) = documents.into_iter().next() {
                filtered.push(best);
            }
        }
        filtered.truncate(k);
        filtered
    }

    /// Runs the full gate: context filter, cross-encoder rerank with the
    /// complexity-adaptive K, then builds the deduplicated source list.
    pub async fn rerank(&self, query: &str, documents: Vec<RetrievedDocument>, complexity: QueryComplexity, simple_k: usize, default_k: usize) -> (Vec<RetrievedDocument>, Vec<Source>) {
        let k = if complexity == QueryComplexity::Simple { simple_k } else { default_k };

        let filtered = self.context_filter(query, documents).await;
        let kept = self.cross_encoder_rerank(query, filtered, k).await;
        let sources = build_sources(query, &kept);
        (kept, sources)
    }
}

fn normalize_scores(scores: &[f32]) -> Vec<f32> {
    if scores.len() > 1 {
        let min = scores.iter().cloned().fold(f32::INFINITY, f32::min);
        let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        if max > min {
            scores.iter().map(|s| (s - min) / (max - min)).collect()
        } else {
            vec![0.5; scores.len()]
        }
    } else {
        scores.iter().map(|s| 1.0 / (1.0 + (-s).exp())).collect()
    }
}

/// Deduplicates kept documents by source filename, keeping the
/// highest-scoring hit per file and a snippet extracted for the preview.
fn build_sources(query: &str, documents: &[RetrievedDocument]) -> Vec<Source> {
    let mut best_per_file: HashMap<String, &RetrievedDocument> = HashMap::new();
    for doc in documents {
        let filename = doc.source().to_string();
        best_per_file
            .entry(filename)
            .and_modify(|existing| {
                if doc.relevance_score > existing.relevance_score {
                    *existing = doc;
                }
            })
            .or_insert(doc);
    }

    let mut sources: Vec<Source> = best_per_file
        .into_values()
        .map(|doc| {
            let parent_context = doc.parent_context();
            let preview = crate::snippet::extract_relevant_snippet(query, &doc.content, parent_context);
            Source {
                filename: doc.source().to_string(),
                chunk_id: doc.chunk_id().unwrap_or_default().to_string(),
                relevance_score: doc.relevance_score,
                content_preview: preview,
                page: doc.page().map(str::to_string),
            }
        })
        .collect();
    sources.sort_by(|a, b| b.relevance_score.partial_cmp(&a.relevance_score).unwrap_or(std::cmp::Ordering::Equal));
    sources
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(source: &str, content: &str, score: f32) -> RetrievedDocument {
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), source.to_string());
        metadata.insert("chunk_id".to_string(), format!("{source}-chunk"));
        RetrievedDocument { content: content.to_string(), metadata, relevance_score: score }
    }

    #[test]
    fn normalize_min_max_spreads_batch_scores() {
        let normalized = normalize_scores(&[1.0, 2.0, 3.0]);
        assert_eq!(normalized, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn normalize_single_score_uses_sigmoid() {
        let normalized = normalize_scores(&[0.0]);
        assert!((normalized[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn build_sources_dedups_by_filename_keeping_best_score() {
        let docs = vec![doc("a.txt", "low score content", 0.2), doc("a.txt", "high score content", 0.9), doc("b.txt", "other file", 0.5)];
        let sources = build_sources("query", &docs);
        assert_eq!(sources.len(), 2);
        let a = sources.iter().find(|s| s.filename == "a.txt").unwrap();
        assert_eq!(a.relevance_score, 0.9);
    }

    #[tokio::test]
    async fn keyword_fallback_filters_out_unrelated_documents() {
        let gate = RerankerGate::new(None, None, 0.3);
        let docs = vec![doc("a.txt", "load balancer distributes traffic across servers", 0.5), doc("b.txt", "completely unrelated content about baking bread", 0.5)];
        let filtered = gate.context_filter("load balancer traffic", docs).await;
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].source(), "a.txt");
    }
}
