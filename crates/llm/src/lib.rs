//! Ollama generation, ONNX embeddings, ONNX cross-encoder scoring, and the
//! prompt templates that drive them.

pub mod cross_encoder;
pub mod embedder;
pub mod error;
pub mod ollama;
pub mod prompts;

pub use cross_encoder::{CrossEncoderConfig, OnnxCrossEncoder};
pub use embedder::{EmbeddingConfig, OnnxEmbedder};
pub use error::{LlmError, Result};
pub use ollama::{OllamaConfig, OllamaLanguageModel};
