//! Configuration loading and validation.
//!
//! Settings are layered: `config/default.toml`, an optional
//! `config/{env}.toml`, then environment variables prefixed `RAG__` with
//! `__` as the nesting separator (e.g. `RAG__RETRIEVAL__RRF_K=80`).

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

/// Top-level settings for the query-processing pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub reranking: RerankingConfig,
    #[serde(default)]
    pub intent: IntentConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retrieval.validate()?;
        self.reranking.validate()?;
        self.intent.validate()?;
        self.verification.validate()?;
        self.server.validate()?;
        Ok(())
    }
}

/// Hybrid retrieval knobs (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Results pulled from the dense (vector) search leg.
    #[serde(default = "default_vector_k")]
    pub vector_k: usize,
    /// Results pulled from the lexical (BM25) search leg.
    #[serde(default = "default_bm25_k")]
    pub bm25_k: usize,
    /// Reciprocal Rank Fusion constant.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,
    /// Candidates retained before reranking.
    #[serde(default = "default_initial_k")]
    pub initial_k: usize,
    /// Chunks pulled per page for summarization's sequential retriever.
    #[serde(default = "default_sequential_limit")]
    pub sequential_limit: usize,
}

fn default_vector_k() -> usize {
    20
}
fn default_bm25_k() -> usize {
    20
}
fn default_rrf_k() -> f32 {
    60.0
}
fn default_initial_k() -> usize {
    50
}
fn default_sequential_limit() -> usize {
    500
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_k: default_vector_k(),
            bm25_k: default_bm25_k(),
            rrf_k: default_rrf_k(),
            initial_k: default_initial_k(),
            sequential_limit: default_sequential_limit(),
        }
    }
}

impl RetrievalConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.rrf_k <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.rrf_k".to_string(),
                message: format!("must be positive, got {}", self.rrf_k),
            });
        }
        if self.initial_k == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.initial_k".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Context filter and cross-encoder reranking knobs (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankingConfig {
    /// Final number of documents returned for non-simple queries.
    #[serde(default = "default_final_k")]
    pub final_k: usize,
    /// Final number of documents returned for simple queries (adaptive K).
    #[serde(default = "default_simple_final_k")]
    pub simple_final_k: usize,
    /// Minimum query/document cosine similarity to survive the anti-bleed
    /// context filter.
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f32,
}

fn default_final_k() -> usize {
    5
}
fn default_simple_final_k() -> usize {
    2
}
fn default_relevance_threshold() -> f32 {
    0.30
}

impl Default for RerankingConfig {
    fn default() -> Self {
        Self {
            final_k: default_final_k(),
            simple_final_k: default_simple_final_k(),
            relevance_threshold: default_relevance_threshold(),
        }
    }
}

impl RerankingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.relevance_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "reranking.relevance_threshold".to_string(),
                message: format!("must be between 0.0 and 1.0, got {}", self.relevance_threshold),
            });
        }
        if self.final_k == 0 || self.simple_final_k == 0 {
            return Err(ConfigError::InvalidValue {
                field: "reranking.final_k".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Intent classification cascade thresholds (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentConfig {
    /// Minimum cosine similarity for layer-1 semantic exemplar matching.
    #[serde(default = "default_semantic_confidence")]
    pub semantic_confidence_threshold: f32,
    /// Minimum confidence an LLM fallback classification must clear before
    /// it is trusted over `Intent::ClarifyNeeded`.
    #[serde(default = "default_llm_fallback_confidence")]
    pub llm_fallback_confidence_threshold: f32,
}

fn default_semantic_confidence() -> f32 {
    0.85
}
fn default_llm_fallback_confidence() -> f32 {
    0.70
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            semantic_confidence_threshold: default_semantic_confidence(),
            llm_fallback_confidence_threshold: default_llm_fallback_confidence(),
        }
    }
}

impl IntentConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.semantic_confidence_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "intent.semantic_confidence_threshold".to_string(),
                message: format!("must be between 0.0 and 1.0, got {}", self.semantic_confidence_threshold),
            });
        }
        Ok(())
    }
}

/// Two-tier groundedness verifier thresholds (§4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Self-correction retry budget.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fast-path score at or above which an answer is accepted without an
    /// LLM verification call.
    #[serde(default = "default_hallucination_threshold")]
    pub hallucination_threshold: f32,
    /// Fast-path score at or below which an answer is rejected without an
    /// LLM verification call.
    #[serde(default = "default_fast_fail_threshold")]
    pub fast_fail_threshold: f32,
    /// For simple-complexity queries, top relevance score at or above which
    /// the verifier is skipped entirely and the answer is trusted.
    #[serde(default = "default_simple_skip_score")]
    pub simple_skip_score: f32,
}

fn default_max_retries() -> u32 {
    2
}
fn default_hallucination_threshold() -> f32 {
    0.80
}
fn default_fast_fail_threshold() -> f32 {
    0.30
}
fn default_simple_skip_score() -> f32 {
    0.70
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            hallucination_threshold: default_hallucination_threshold(),
            fast_fail_threshold: default_fast_fail_threshold(),
            simple_skip_score: default_simple_skip_score(),
        }
    }
}

impl VerificationConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.fast_fail_threshold >= self.hallucination_threshold {
            return Err(ConfigError::InvalidValue {
                field: "verification.fast_fail_threshold".to_string(),
                message: "must be strictly less than hallucination_threshold".to_string(),
            });
        }
        Ok(())
    }
}

/// Language model connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_llm_endpoint() -> String {
    "http://localhost:11434".to_string()
}
fn default_llm_model() -> String {
    "llama3.1".to_string()
}
fn default_llm_timeout_seconds() -> u64 {
    60
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            timeout_seconds: default_llm_timeout_seconds(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "port cannot be 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Load settings from `config/default.toml`, an optional
/// `config/{env}.toml`, and `RAG__`-prefixed environment variables, in that
/// priority order (lowest to highest).
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(Environment::with_prefix("RAG").separator("__").try_parsing(true));

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.retrieval.rrf_k, 60.0);
        assert_eq!(settings.retrieval.initial_k, 50);
        assert_eq!(settings.reranking.final_k, 5);
        assert_eq!(settings.reranking.simple_final_k, 2);
        assert_eq!(settings.intent.semantic_confidence_threshold, 0.85);
        assert_eq!(settings.verification.hallucination_threshold, 0.80);
        assert_eq!(settings.verification.fast_fail_threshold, 0.30);
    }

    #[test]
    fn rejects_inverted_verification_thresholds() {
        let mut settings = Settings::default();
        settings.verification.fast_fail_threshold = 0.9;
        settings.verification.hallucination_threshold = 0.2;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_relevance_threshold() {
        let mut settings = Settings::default();
        settings.reranking.relevance_threshold = 1.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_zero_port() {
        let mut settings = Settings::default();
        settings.server.port = 0;
        assert!(settings.validate().is_err());
    }
}
