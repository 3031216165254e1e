//! Per-collection BM25-style keyword index (§4.3).
//!
//! Tantivy backs the scoring and posting lists, but the index is rebuilt in
//! full on every `add`/`remove` rather than incrementally committed: the
//! corpus-wide document-frequency statistics this system's scoring depends
//! on are not safe to update piecemeal. A new index is built off to the side
//! and the collection's pointer is swapped atomically, so a reader in flight
//! always sees a complete, consistent index (old or new, never partial).

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, OwnedValue, Schema, STORED, STRING, TEXT};
use tantivy::tokenizer::{LowerCaser, TextAnalyzer, WhitespaceTokenizer};
use tantivy::{Index, IndexReader, TantivyDocument};

use rag_core::Chunk;

use crate::error::{Result, RetrievalError};

const TOKENIZER_NAME: &str = "rag_whitespace_lower";

struct CollectionIndex {
    chunks: HashMap<String, Chunk>,
    index: Index,
    reader: IndexReader,
    id_field: Field,
    text_field: Field,
}

fn build_schema() -> (Schema, Field, Field) {
    let mut builder = Schema::builder();
    let id_field = builder.add_text_field("chunk_id", STRING | STORED);
    let text_field = builder.add_text_field("content", TEXT);
    (builder.build(), id_field, text_field)
}

fn tokenizer() -> TextAnalyzer {
    TextAnalyzer::builder(WhitespaceTokenizer::default()).filter(LowerCaser).build()
}

fn build_collection_index(chunks: Vec<Chunk>) -> Result<CollectionIndex> {
    let (schema, id_field, text_field) = build_schema();
    let index = Index::create_in_ram(schema);
    index.tokenizers().register(TOKENIZER_NAME, tokenizer());

    {
        let mut writer = index
            .writer(15_000_000)
            .map_err(|e| RetrievalError::Index(e.to_string()))?;
        for chunk in &chunks {
            let mut doc = TantivyDocument::default();
            doc.add_text(id_field, &chunk.chunk_id);
            doc.add_text(text_field, &chunk.content);
            writer.add_document(doc).map_err(|e| RetrievalError::Index(e.to_string()))?;
        }
        writer.commit().map_err(|e| RetrievalError::Index(e.to_string()))?;
    }

    let reader = index.reader().map_err(|e| RetrievalError::Index(e.to_string()))?;
    let by_id = chunks.into_iter().map(|c| (c.chunk_id.clone(), c)).collect();

    Ok(CollectionIndex { chunks: by_id, index, reader, id_field, text_field })
}

/// Process-wide, collection-keyed lexical index.
pub struct LexicalIndex {
    collections: DashMap<String, Arc<CollectionIndex>>,
    write_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Default for LexicalIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl LexicalIndex {
    pub fn new() -> Self {
        Self { collections: DashMap::new(), write_locks: DashMap::new() }
    }

    fn lock_for(&self, collection: &str) -> Arc<Mutex<()>> {
        self.write_locks.entry(collection.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Replace the collection's index wholesale.
    pub fn build(&self, collection: &str, chunks: Vec<Chunk>) -> Result<()> {
        let lock = self.lock_for(collection);
        let _guard = lock.lock();
        let built = build_collection_index(chunks)?;
        self.collections.insert(collection.to_string(), Arc::new(built));
        Ok(())
    }

    /// Concatenate the existing corpus with `new_chunks` and rebuild.
    pub fn add(&self, collection: &str, new_chunks: Vec<Chunk>) -> Result<()> {
        let lock = self.lock_for(collection);
        let _guard = lock.lock();
        let mut all: Vec<Chunk> = self
            .collections
            .get(collection)
            .map(|c| c.chunks.values().cloned().collect())
            .unwrap_or_default();
        all.extend(new_chunks);
        let built = build_collection_index(all)?;
        self.collections.insert(collection.to_string(), Arc::new(built));
        Ok(())
    }

    /// Drop chunks whose `doc_id` is in `doc_ids` and rebuild. Drops the
    /// collection entirely if nothing remains.
    pub fn remove(&self, collection: &str, doc_ids: &[String]) -> Result<()> {
        let lock = self.lock_for(collection);
        let _guard = lock.lock();
        let remaining: Vec<Chunk> = match self.collections.get(collection) {
            Some(existing) => existing
                .chunks
                .values()
                .filter(|c| !doc_ids.contains(&c.doc_id))
                .cloned()
                .collect(),
            None => return Ok(()),
        };
        if remaining.is_empty() {
            self.collections.remove(collection);
            return Ok(());
        }
        let built = build_collection_index(remaining)?;
        self.collections.insert(collection.to_string(), Arc::new(built));
        Ok(())
    }

    pub fn clear(&self, collection: &str) {
        self.collections.remove(collection);
    }

    /// Top-k chunks by keyword score, descending. Never fails: a missing or
    /// empty collection returns an empty list.
    pub fn search(&self, collection: &str, query: &str, k: usize) -> Vec<(Chunk, f32)> {
        let entry = match self.collections.get(collection) {
            Some(e) => e.clone(),
            None => return Vec::new(),
        };
        if entry.chunks.is_empty() {
            return Vec::new();
        }

        let searcher = entry.reader.searcher();
        let parser = QueryParser::for_index(&entry.index, vec![entry.text_field]);
        let tokenized = query.to_lowercase();
        let parsed = match parser.parse_query(&tantivy_escape(&tokenized)) {
            Ok(q) => q,
            Err(_) => return Vec::new(),
        };

        let top_docs = match searcher.search(&parsed, &TopDocs::with_limit(k)) {
            Ok(docs) => docs,
            Err(_) => return Vec::new(),
        };

        top_docs
            .into_iter()
            .filter_map(|(score, addr)| {
                let doc: TantivyDocument = searcher.doc(addr).ok()?;
                let chunk_id = match doc.get_first(entry.id_field)? {
                    OwnedValue::Str(s) => s.clone(),
                    _ => return None,
                };
                entry.chunks.get(&chunk_id).map(|c| (c.clone(), score))
            })
            .collect()
    }
}

/// Tantivy's default query parser treats several ASCII punctuation
/// characters as syntax; user queries are plain text, not query language.
fn tantivy_escape(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '+' | '-' | '&' | '|' | '!' | '(' | ')' | '{' | '}' | '[' | ']' | '^' | '"' | '~' | '*' | '?' | ':' | '\\' | '/') {
            escaped.push(' ');
        } else {
            escaped.push(ch);
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, doc_id: &str, content: &str) -> Chunk {
        Chunk::new(id, doc_id, content, "test.txt")
    }

    #[test]
    fn search_on_missing_collection_is_empty() {
        let idx = LexicalIndex::new();
        assert!(idx.search("nope", "anything", 5).is_empty());
    }

    #[test]
    fn build_then_search_finds_matching_chunk() {
        let idx = LexicalIndex::new();
        idx.build(
            "c1",
            vec![
                chunk("a", "d1", "the CAP theorem describes consistency tradeoffs"),
                chunk("b", "d2", "load balancers distribute traffic across servers"),
            ],
        )
        .unwrap();

        let results = idx.search("c1", "CAP theorem", 5);
        assert!(!results.is_empty());
        assert_eq!(results[0].0.chunk_id, "a");
    }

    #[test]
    fn add_then_remove_restores_prior_search_results() {
        let idx = LexicalIndex::new();
        idx.build("c1", vec![chunk("a", "d1", "gold loan interest rate")]).unwrap();
        let before = idx.search("c1", "gold loan", 5);

        idx.add("c1", vec![chunk("b", "d2", "apply for a gold loan online")]).unwrap();
        assert_eq!(idx.search("c1", "gold loan", 5).len(), 2);

        idx.remove("c1", &["d2".to_string()]).unwrap();
        let after = idx.search("c1", "gold loan", 5);

        assert_eq!(before.len(), after.len());
        assert_eq!(before[0].0.chunk_id, after[0].0.chunk_id);
    }

    #[test]
    fn remove_all_chunks_drops_the_collection() {
        let idx = LexicalIndex::new();
        idx.build("c1", vec![chunk("a", "d1", "hello world")]).unwrap();
        idx.remove("c1", &["d1".to_string()]).unwrap();
        assert!(idx.search("c1", "hello", 5).is_empty());
    }
}
