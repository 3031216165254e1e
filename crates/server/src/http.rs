//! HTTP surface (§6): one non-streaming reply endpoint and one SSE stream
//! endpoint over the query pipeline. No health/readiness/metrics/CORS
//! routes — those remain explicit non-goals.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

use crate::error::ServerError;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/query", post(query))
        .route("/query/stream", post(query_stream))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    question: String,
    session_id: String,
    collection_name: String,
}

#[derive(Debug, Serialize)]
struct QueryResponse {
    message_id: String,
    answer: String,
    sources: Vec<rag_core::Source>,
    session_id: String,
    was_grounded: bool,
    confidence: f32,
    processing_time_ms: u64,
}

impl From<rag_pipeline::QueryOutcome> for QueryResponse {
    fn from(outcome: rag_pipeline::QueryOutcome) -> Self {
        Self {
            message_id: outcome.message_id,
            answer: outcome.answer,
            sources: outcome.sources,
            session_id: outcome.session_id,
            was_grounded: outcome.was_grounded,
            confidence: outcome.confidence,
            processing_time_ms: outcome.processing_time_ms,
        }
    }
}

async fn query(State(state): State<AppState>, Json(request): Json<QueryRequest>) -> Result<impl IntoResponse, ServerError> {
    if request.question.trim().is_empty() {
        return Err(ServerError::InvalidRequest("question must not be empty".to_string()));
    }
    let outcome = state.pipeline.query(request.question, request.session_id, request.collection_name).await;
    Ok(Json(QueryResponse::from(outcome)))
}

async fn query_stream(State(state): State<AppState>, Json(request): Json<QueryRequest>) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
    if request.question.trim().is_empty() {
        return Err(ServerError::InvalidRequest("question must not be empty".to_string()));
    }

    let (tx, rx) = mpsc::channel(32);
    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        pipeline.stream(request.question, request.session_id, request.collection_name, tx).await;
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        let payload = serde_json::to_string(&event).unwrap_or_else(|_| r#"{"type":"error","message":"serialization failed","code":"internal"}"#.to_string());
        Ok(Event::default().data(payload))
    });

    Ok(Sse::new(stream))
}
