//! ONNX-backed dense embedder.

use async_trait::async_trait;
use rag_core::Embedder;

#[cfg(feature = "onnx")]
use ndarray::Array2;
#[cfg(feature = "onnx")]
use ort::{session::builder::GraphOptimizationLevel, session::Session, value::Tensor};
#[cfg(feature = "onnx")]
use tokenizers::Tokenizer;

use crate::error::{LlmError, Result};

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub max_seq_len: usize,
    pub embedding_dim: usize,
    pub normalize: bool,
    pub batch_size: usize,
    /// ONNX output tensor name; models vary ("last_hidden_state",
    /// "sentence_embedding", "output").
    pub output_name: String,
    pub model_id: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            max_seq_len: 512,
            embedding_dim: 768,
            normalize: true,
            batch_size: 32,
            output_name: "last_hidden_state".to_string(),
            model_id: "bge-base-en-v1.5".to_string(),
        }
    }
}

pub struct OnnxEmbedder {
    #[cfg(feature = "onnx")]
    session: Session,
    #[cfg(feature = "onnx")]
    tokenizer: Tokenizer,
    config: EmbeddingConfig,
}

impl OnnxEmbedder {
    #[cfg(feature = "onnx")]
    pub fn new(model_path: impl AsRef<std::path::Path>, tokenizer_path: impl AsRef<std::path::Path>, config: EmbeddingConfig) -> Result<Self> {
        let session = Session::builder()
            .map_err(|e| LlmError::Model(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| LlmError::Model(e.to_string()))?
            .with_intra_threads(2)
            .map_err(|e| LlmError::Model(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| LlmError::Model(e.to_string()))?;

        let tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|e| LlmError::Model(e.to_string()))?;

        Ok(Self { session, tokenizer, config })
    }

    #[cfg(feature = "onnx")]
    fn embed_batch_internal(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let batch_size = texts.len();

        let encodings = self.tokenizer.encode_batch(texts.to_vec(), true).map_err(|e| LlmError::Embedding(e.to_string()))?;

        let mut input_ids = vec![0i64; batch_size * self.config.max_seq_len];
        let mut attention_mask = vec![0i64; batch_size * self.config.max_seq_len];
        let mut token_type_ids = vec![0i64; batch_size * self.config.max_seq_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let types = encoding.get_type_ids();
            let len = ids.len().min(self.config.max_seq_len);
            let offset = i * self.config.max_seq_len;
            for j in 0..len {
                input_ids[offset + j] = ids[j] as i64;
                attention_mask[offset + j] = mask[j] as i64;
                token_type_ids[offset + j] = types[j] as i64;
            }
        }

        let input_ids = Array2::from_shape_vec((batch_size, self.config.max_seq_len), input_ids).map_err(|e| LlmError::Embedding(e.to_string()))?;
        let attention_mask = Array2::from_shape_vec((batch_size, self.config.max_seq_len), attention_mask).map_err(|e| LlmError::Embedding(e.to_string()))?;
        let token_type_ids = Array2::from_shape_vec((batch_size, self.config.max_seq_len), token_type_ids).map_err(|e| LlmError::Embedding(e.to_string()))?;

        let input_ids_tensor = Tensor::from_array(input_ids).map_err(|e| LlmError::Model(e.to_string()))?;
        let attention_mask_tensor = Tensor::from_array(attention_mask).map_err(|e| LlmError::Model(e.to_string()))?;
        let token_type_ids_tensor = Tensor::from_array(token_type_ids).map_err(|e| LlmError::Model(e.to_string()))?;

        let outputs = self
            .session
            .run(
                ort::inputs![
                    "input_ids" => input_ids_tensor,
                    "attention_mask" => attention_mask_tensor,
                    "token_type_ids" => token_type_ids_tensor,
                ]
                .map_err(|e| LlmError::Model(e.to_string()))?,
            )
            .map_err(|e| LlmError::Model(e.to_string()))?;

        let tensor_view = outputs
            .get(&self.config.output_name)
            .ok_or_else(|| LlmError::Model(format!("missing output tensor: {}", self.config.output_name)))?
            .try_extract_tensor::<f32>()
            .map_err(|e| LlmError::Model(e.to_string()))?;

        let dims: Vec<usize> = tensor_view.shape().to_vec();
        let hidden_data: Vec<f32> = tensor_view.iter().copied().collect();
        let (tensor_batch, tensor_seq_len, tensor_hidden_dim) = if dims.len() == 3 {
            (dims[0], dims[1], dims[2])
        } else {
            return Err(LlmError::Model(format!("unexpected tensor shape: {dims:?}")));
        };

        // Mean-pool token embeddings over the real (non-padding) sequence
        // length, then L2-normalize if configured.
        let mut embeddings = Vec::with_capacity(batch_size);
        for i in 0..batch_size.min(tensor_batch) {
            let seq_len = encodings[i].get_ids().len().min(self.config.max_seq_len).min(tensor_seq_len);
            let mut embedding = vec![0.0f32; self.config.embedding_dim];

            for j in 0..seq_len {
                for k in 0..self.config.embedding_dim.min(tensor_hidden_dim) {
                    let idx = i * tensor_seq_len * tensor_hidden_dim + j * tensor_hidden_dim + k;
                    if idx < hidden_data.len() {
                        embedding[k] += hidden_data[idx];
                    }
                }
            }
            for v in &mut embedding {
                *v /= seq_len.max(1) as f32;
            }

            if self.config.normalize {
                let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    for v in &mut embedding {
                        *v /= norm;
                    }
                }
            }
            embeddings.push(embedding);
        }

        Ok(embeddings)
    }
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> rag_core::Result<Vec<Vec<f32>>> {
        #[cfg(feature = "onnx")]
        {
            let mut all = Vec::with_capacity(texts.len());
            for batch in texts.chunks(self.config.batch_size) {
                let refs: Vec<&str> = batch.iter().map(String::as_str).collect();
                let embedded = self.embed_batch_internal(&refs).map_err(Into::<rag_core::Error>::into)?;
                all.extend(embedded);
            }
            Ok(all)
        }
        #[cfg(not(feature = "onnx"))]
        {
            let _ = texts;
            Err(LlmError::Configuration("onnx feature disabled".to_string()).into())
        }
    }

    async fn embed_query(&self, text: &str) -> rag_core::Result<Vec<f32>> {
        let embedded = self.embed_documents(&[text.to_string()]).await?;
        Ok(embedded.into_iter().next().unwrap_or_default())
    }

    fn dimension(&self) -> usize {
        self.config.embedding_dim
    }

    fn model_id(&self) -> &str {
        &self.config.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_dimension_matches_bge_base() {
        assert_eq!(EmbeddingConfig::default().embedding_dim, 768);
    }
}
