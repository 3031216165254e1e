//! Ollama-backed `LanguageModel` (§4.9 generation, §4.5 rewriting, §4.10
//! verification all share this one backend — callers vary only the prompt
//! and `GenerationParams`).

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use rag_core::{GenerationParams, LanguageModel};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{LlmError, Result};

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub model: String,
    pub endpoint: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    /// Forwarded to Ollama's `keep_alive` so the model stays resident
    /// between the several calls one pipeline run makes (rewrite, generate,
    /// verify, and any self-correction retries).
    pub keep_alive: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            model: "llama3.1".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            timeout: Duration::from_secs(60),
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            keep_alive: "5m".to_string(),
        }
    }
}

pub struct OllamaLanguageModel {
    client: Client,
    config: OllamaConfig,
}

impl OllamaLanguageModel {
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("failed to build http client: {e}")))?;
        Ok(Self { client, config })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.config.endpoint, path)
    }

    async fn execute(&self, request: &OllamaGenerateRequest) -> Result<OllamaGenerateResponse> {
        let response = self.client.post(self.api_url("/generate")).json(request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                return Err(LlmError::Network(format!("server error {status}: {body}")));
            }
            return Err(LlmError::Api(body));
        }

        response.json().await.map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }

    fn is_retryable(error: &LlmError) -> bool {
        matches!(error, LlmError::Network(_) | LlmError::Timeout)
    }

    async fn generate_once(&self, prompt: &str, params: GenerationParams) -> Result<String> {
        let request = OllamaGenerateRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            options: OllamaOptions { temperature: params.temperature, num_predict: params.max_tokens as i32 },
            keep_alive: self.config.keep_alive.clone(),
        };

        let mut backoff = self.config.initial_backoff;
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::warn!(attempt, max_retries = self.config.max_retries, "ollama request failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            match self.execute(&request).await {
                Ok(response) => return Ok(response.response),
                Err(e) if Self::is_retryable(&e) => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(LlmError::Network("max retries exceeded".to_string())))
    }
}

#[async_trait]
impl LanguageModel for OllamaLanguageModel {
    async fn invoke(&self, prompt: &str, params: GenerationParams) -> rag_core::Result<String> {
        self.generate_once(prompt, params).await.map_err(Into::into)
    }

    async fn stream(&self, prompt: &str, params: GenerationParams, tx: mpsc::Sender<String>) -> rag_core::Result<String> {
        let request = OllamaGenerateRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            stream: true,
            options: OllamaOptions { temperature: params.temperature, num_predict: params.max_tokens as i32 },
            keep_alive: self.config.keep_alive.clone(),
        };

        let response = self
            .client
            .post(self.api_url("/generate"))
            .json(&request)
            .send()
            .await
            .map_err(LlmError::from)?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(body).into());
        }

        let mut byte_stream = response.bytes_stream();
        let mut full_text = String::new();

        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk.map_err(LlmError::from)?;
            let text = String::from_utf8_lossy(&chunk);

            for line in text.lines() {
                if line.is_empty() {
                    continue;
                }
                let Ok(parsed) = serde_json::from_str::<OllamaStreamChunk>(line) else {
                    continue;
                };

                full_text.push_str(&parsed.response);

                if tx.send(parsed.response.clone()).await.is_err() {
                    // Receiver dropped: caller cancelled the stream.
                    return Ok(full_text);
                }

                if parsed.done {
                    break;
                }
            }
        }

        Ok(full_text)
    }
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
    keep_alive: String,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: i32,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
    #[allow(dead_code)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaStreamChunk {
    response: String,
    done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors_are_network_or_timeout() {
        assert!(OllamaLanguageModel::is_retryable(&LlmError::Timeout));
        assert!(OllamaLanguageModel::is_retryable(&LlmError::Network("boom".to_string())));
        assert!(!OllamaLanguageModel::is_retryable(&LlmError::Api("bad request".to_string())));
    }

    #[test]
    fn config_defaults_keep_model_warm() {
        let config = OllamaConfig::default();
        assert_eq!(config.keep_alive, "5m");
        assert_eq!(config.max_retries, 3);
    }
}
