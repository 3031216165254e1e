//! Server binary entry point (§6): loads settings, constructs the backend
//! clients behind the capability traits, and serves the HTTP surface.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rag_config::{load_settings, Settings};
use rag_core::{CrossEncoder, Embedder, HistoryStore, LanguageModel, VectorStore};
use rag_llm::{CrossEncoderConfig, EmbeddingConfig, OllamaConfig, OllamaLanguageModel, OnnxCrossEncoder, OnnxEmbedder};
use rag_pipeline::{Pipeline, PipelineDependencies};
use rag_retrieval::LexicalIndex;
use rag_server::{create_router, AppState, InMemoryHistoryStore, QdrantVectorStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[tokio::main]
async fn main() -> Result<()> {
    let env = std::env::var("RAG_ENV").ok();
    let settings = load_settings(env.as_deref()).context("failed to load configuration")?;

    init_tracing(&settings);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), env = env.as_deref().unwrap_or("default"), "starting rag-server");

    let embedder: Arc<dyn Embedder> = Arc::new(
        OnnxEmbedder::new(embedder_model_path(), embedder_tokenizer_path(), EmbeddingConfig::default())
            .context("failed to load embedding model")?,
    );

    let cross_encoder = build_cross_encoder().context("failed to load cross-encoder model")?;
    if cross_encoder.is_none() {
        tracing::warn!("no cross-encoder model configured, reranking falls back to the context filter only");
    }

    let language_model: Arc<dyn LanguageModel> = Arc::new(
        OllamaLanguageModel::new(OllamaConfig {
            model: settings.llm.model.clone(),
            endpoint: settings.llm.endpoint.clone(),
            timeout: Duration::from_secs(settings.llm.timeout_seconds),
            ..Default::default()
        })
        .context("failed to construct language model client")?,
    );

    let vector_store: Arc<dyn VectorStore> = Arc::new(build_vector_store().context("failed to connect to vector store")?);
    let history: Arc<dyn HistoryStore> = Arc::new(InMemoryHistoryStore::new());
    let lexical_index = Arc::new(LexicalIndex::new());

    let deps = PipelineDependencies { vector_store, embedder, cross_encoder, language_model, history, lexical_index };

    let pipeline = Pipeline::new(deps, settings.clone());
    let state = AppState::new(pipeline, settings.clone());
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse().context("invalid server host/port")?;
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await.context("failed to bind server address")?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await.context("server error")?;

    tracing::info!("server shutdown complete");
    Ok(())
}

fn embedder_model_path() -> String {
    std::env::var("RAG_EMBEDDER_MODEL_PATH").unwrap_or_else(|_| "models/embedder/model.onnx".to_string())
}

fn embedder_tokenizer_path() -> String {
    std::env::var("RAG_EMBEDDER_TOKENIZER_PATH").unwrap_or_else(|_| "models/embedder/tokenizer.json".to_string())
}

fn build_cross_encoder() -> rag_llm::Result<Option<Arc<dyn CrossEncoder>>> {
    let model_path = std::env::var("RAG_CROSS_ENCODER_MODEL_PATH");
    let tokenizer_path = std::env::var("RAG_CROSS_ENCODER_TOKENIZER_PATH");
    let (Ok(model_path), Ok(tokenizer_path)) = (model_path, tokenizer_path) else {
        return Ok(None);
    };
    let encoder = OnnxCrossEncoder::new(model_path, tokenizer_path, CrossEncoderConfig::default())?;
    Ok(Some(Arc::new(encoder)))
}

fn build_vector_store() -> Result<QdrantVectorStore, rag_server::StoreError> {
    let endpoint = std::env::var("RAG_QDRANT_ENDPOINT").unwrap_or_else(|_| "http://localhost:6334".to_string());
    let api_key = std::env::var("RAG_QDRANT_API_KEY").ok();
    let vector_dim = std::env::var("RAG_VECTOR_DIM").ok().and_then(|v| v.parse().ok()).unwrap_or(768);
    QdrantVectorStore::new(&endpoint, api_key.as_deref(), vector_dim)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
        _ = terminate => tracing::info!("received sigterm, shutting down"),
    }
}

fn init_tracing(settings: &Settings) {
    let level = &settings.observability.log_level;
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("rag_server={level},rag_pipeline={level},tower_http=debug").into());

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}
