//! ONNX-backed cross-encoder used by the reranker gate (§4.7). Scores are
//! returned unnormalized; batch normalization is the caller's job.

use async_trait::async_trait;
use rag_core::CrossEncoder;

#[cfg(feature = "onnx")]
use ndarray::Array2;
#[cfg(feature = "onnx")]
use ort::{session::builder::GraphOptimizationLevel, session::Session, value::Tensor};
#[cfg(feature = "onnx")]
use tokenizers::Tokenizer;

use crate::error::{LlmError, Result};

#[derive(Debug, Clone)]
pub struct CrossEncoderConfig {
    pub max_seq_len: usize,
}

impl Default for CrossEncoderConfig {
    fn default() -> Self {
        Self { max_seq_len: 256 }
    }
}

pub struct OnnxCrossEncoder {
    #[cfg(feature = "onnx")]
    session: Session,
    #[cfg(feature = "onnx")]
    tokenizer: Tokenizer,
    config: CrossEncoderConfig,
}

impl OnnxCrossEncoder {
    #[cfg(feature = "onnx")]
    pub fn new(model_path: impl AsRef<std::path::Path>, tokenizer_path: impl AsRef<std::path::Path>, config: CrossEncoderConfig) -> Result<Self> {
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
    fn score_pair(&self, query: &str, document: &str) -> Result<f32> {
        let encoding = self.tokenizer.encode((query, document), true).map_err(|e| LlmError::Embedding(e.to_string()))?;

        let ids: Vec<i64> = encoding.get_ids().iter().take(self.config.max_seq_len).map(|&id| id as i64).collect();
        let attention_mask: Vec<i64> = vec![1i64; ids.len()];

        let mut padded_ids = vec![0i64; self.config.max_seq_len];
        let mut padded_mask = vec![0i64; self.config.max_seq_len];
        padded_ids[..ids.len()].copy_from_slice(&ids);
        padded_mask[..attention_mask.len()].copy_from_slice(&attention_mask);

        let input_ids = Array2::from_shape_vec((1, self.config.max_seq_len), padded_ids).map_err(|e| LlmError::Model(e.to_string()))?;
        let attention = Array2::from_shape_vec((1, self.config.max_seq_len), padded_mask).map_err(|e| LlmError::Model(e.to_string()))?;

        let input_ids_tensor = Tensor::from_array(input_ids).map_err(|e| LlmError::Model(e.to_string()))?;
        let attention_tensor = Tensor::from_array(attention).map_err(|e| LlmError::Model(e.to_string()))?;

        let outputs = self
            .session
            .run(
                ort::inputs![
                    "input_ids" => input_ids_tensor,
                    "attention_mask" => attention_tensor,
                ]
                .map_err(|e| LlmError::Model(e.to_string()))?,
            )
            .map_err(|e| LlmError::Model(e.to_string()))?;

        let logits = outputs
            .get("logits")
            .ok_or_else(|| LlmError::Model("missing logits output".to_string()))?
            .try_extract_tensor::<f32>()
            .map_err(|e| LlmError::Model(e.to_string()))?;

        Ok(logits.iter().next().copied().unwrap_or(0.0))
    }
}

#[async_trait]
impl CrossEncoder for OnnxCrossEncoder {
    async fn score(&self, pairs: &[(String, String)]) -> rag_core::Result<Vec<f32>> {
        #[cfg(feature = "onnx")]
        {
            pairs
                .iter()
                .map(|(query, document)| self.score_pair(query, document).map_err(Into::into))
                .collect()
        }
        #[cfg(not(feature = "onnx"))]
        {
            let _ = pairs;
            Err(LlmError::Configuration("onnx feature disabled".to_string()).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_max_seq_len_matches_teacher_reranker() {
        assert_eq!(CrossEncoderConfig::default().max_seq_len, 256);
    }
}
