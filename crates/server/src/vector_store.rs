//! Qdrant-backed `VectorStore` adapter (§6: vector database is an external
//! collaborator; this is the concrete client the server constructs at
//! startup).

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    value::Kind, Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, FieldCondition, Filter, Match, PointStruct,
    ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use rag_core::{Chunk, CollectionInfo, MetadataFilter, VectorHit, VectorStore};
use uuid::Uuid;

use crate::error::StoreError;

pub struct QdrantVectorStore {
    client: Qdrant,
    vector_dim: u64,
}

impl QdrantVectorStore {
    pub fn new(endpoint: &str, api_key: Option<&str>, vector_dim: u64) -> Result<Self, StoreError> {
        let mut builder = Qdrant::from_url(endpoint);
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder.build().map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { client, vector_dim })
    }

    async fn ensure_collection(&self, collection: &str) -> Result<(), StoreError> {
        let exists = self.client.collection_exists(collection).await.map_err(|e| StoreError::Operation(e.to_string()))?;
        if !exists {
            self.client
                .create_collection(CreateCollectionBuilder::new(collection).vectors_config(VectorParamsBuilder::new(self.vector_dim, Distance::Cosine)))
                .await
                .map_err(|e| StoreError::Operation(e.to_string()))?;
        }
        Ok(())
    }

    fn chunk_payload(chunk: &Chunk) -> HashMap<String, qdrant_client::qdrant::Value> {
        let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
        payload.insert("chunk_id".to_string(), chunk.chunk_id.clone().into());
        payload.insert("doc_id".to_string(), chunk.doc_id.clone().into());
        payload.insert("content".to_string(), chunk.content.clone().into());
        payload.insert("source".to_string(), chunk.source.clone().into());
        if let Some(page) = chunk.page {
            payload.insert("page".to_string(), (page as i64).into());
        }
        if let Some(parent_id) = &chunk.parent_id {
            payload.insert("parent_id".to_string(), parent_id.clone().into());
        }
        if let Some(parent_context) = &chunk.parent_context {
            payload.insert("parent_context".to_string(), parent_context.clone().into());
        }
        payload.insert("parent_index".to_string(), (chunk.parent_index as i64).into());
        payload.insert("child_index".to_string(), (chunk.child_index as i64).into());
        for (k, v) in &chunk.metadata {
            payload.entry(format!("meta_{k}")).or_insert_with(|| v.clone().into());
        }
        payload
    }

    fn payload_to_chunk(payload: HashMap<String, qdrant_client::qdrant::Value>) -> Chunk {
        let string_field = |key: &str| -> Option<String> {
            payload.get(key).and_then(|v| match &v.kind {
                Some(Kind::StringValue(s)) => Some(s.clone()),
                _ => None,
            })
        };
        let int_field = |key: &str| -> Option<i64> {
            payload.get(key).and_then(|v| match &v.kind {
                Some(Kind::IntegerValue(n)) => Some(*n),
                _ => None,
            })
        };

        let mut chunk = Chunk::new(
            string_field("chunk_id").unwrap_or_default(),
            string_field("doc_id").unwrap_or_default(),
            string_field("content").unwrap_or_default(),
            string_field("source").unwrap_or_default(),
        );
        chunk.page = int_field("page").map(|p| p as u32);
        chunk.parent_id = string_field("parent_id");
        chunk.parent_context = string_field("parent_context");
        chunk.parent_index = int_field("parent_index").unwrap_or(0) as u32;
        chunk.child_index = int_field("child_index").unwrap_or(0) as u32;
        for key in payload.keys() {
            if let Some(meta_key) = key.strip_prefix("meta_") {
                if let Some(value) = string_field(key) {
                    chunk.metadata.insert(meta_key.to_string(), value);
                }
            }
        }
        chunk
    }

    fn build_filter(filter: &MetadataFilter) -> Filter {
        let must = filter
            .fields
            .iter()
            .map(|(key, value)| Condition {
                condition_one_of: Some(qdrant_client::qdrant::condition::ConditionOneOf::Field(FieldCondition {
                    key: key.clone(),
                    r#match: Some(Match { match_value: Some(qdrant_client::qdrant::r#match::MatchValue::Keyword(value.clone())) }),
                    ..Default::default()
                })),
            })
            .collect();
        Filter { must, ..Default::default() }
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn similarity_search_with_score(&self, query_embedding: &[f32], collection: &str, k: usize) -> rag_core::Result<Vec<VectorHit>> {
        let results = self
            .client
            .search_points(SearchPointsBuilder::new(collection, query_embedding.to_vec(), k as u64).with_payload(true))
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;

        Ok(results
            .result
            .into_iter()
            .map(|point| VectorHit { chunk: Self::payload_to_chunk(point.payload), score: point.score })
            .collect())
    }

    async fn add(&self, collection: &str, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> rag_core::Result<()> {
        if chunks.len() != embeddings.len() {
            return Err(StoreError::Operation("chunk and embedding count mismatch".to_string()).into());
        }
        self.ensure_collection(collection).await.map_err(rag_core::Error::from)?;

        let points: Vec<PointStruct> = chunks
            .iter()
            .zip(embeddings.iter())
            .map(|(chunk, embedding)| PointStruct::new(Uuid::new_v4().to_string(), embedding.clone(), Self::chunk_payload(chunk)))
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points))
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, collection: &str) -> rag_core::Result<()> {
        self.client.delete_collection(collection).await.map_err(|e| StoreError::Operation(e.to_string()))?;
        Ok(())
    }

    async fn delete_by_metadata(&self, collection: &str, filter: &MetadataFilter) -> rag_core::Result<()> {
        self.client
            .delete_points(DeletePointsBuilder::new(collection).points(Self::build_filter(filter)))
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;
        Ok(())
    }

    async fn list_collections(&self) -> rag_core::Result<Vec<String>> {
        let collections = self.client.list_collections().await.map_err(|e| StoreError::Operation(e.to_string()))?;
        Ok(collections.collections.into_iter().map(|c| c.name).collect())
    }

    async fn get_all_chunks(&self, collection: &str, limit: usize) -> rag_core::Result<Vec<Chunk>> {
        let response = self
            .client
            .scroll(ScrollPointsBuilder::new(collection).limit(limit as u32).with_payload(true).with_vectors(false))
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;
        Ok(response.result.into_iter().map(|point| Self::payload_to_chunk(point.payload)).collect())
    }

    async fn get_collection_info(&self, collection: &str) -> rag_core::Result<Option<CollectionInfo>> {
        let exists = self.client.collection_exists(collection).await.map_err(|e| StoreError::Operation(e.to_string()))?;
        if !exists {
            return Ok(None);
        }
        let info = self.client.collection_info(collection).await.map_err(|e| StoreError::Operation(e.to_string()))?;
        let count = info.result.and_then(|r| r.points_count).unwrap_or(0);
        Ok(Some(CollectionInfo { count }))
    }
}
