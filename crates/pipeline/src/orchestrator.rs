//! Pipeline orchestrator FSM (§4.13): wires intent classification, routing,
//! retrieval, grading, generation and self-correction into one query path,
//! in both a buffered (`query`) and streaming (`stream`) form.

use std::sync::Arc;
use std::time::Instant;

use rag_config::Settings;
use rag_core::{
    ConversationTurn, CrossEncoder, Embedder, GenerationParams, HistoryStore, Intent, LanguageModel, PipelineState, QueryComplexity, Source,
    VectorStore,
};
use rag_retrieval::{HybridParams, HybridRetriever, LexicalIndex, RerankerGate, SequentialRetriever};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::events::StreamEvent;
use crate::intent::{dispatch_intent_handler, IntentClassifier};
use crate::router::route_query;
use crate::rewrite::QueryRewriter;
use crate::verify::GroundednessVerifier;

/// External collaborators the orchestrator is built from. None of their
/// implementations live in this crate.
pub struct PipelineDependencies {
    pub vector_store: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn Embedder>,
    pub cross_encoder: Option<Arc<dyn CrossEncoder>>,
    pub language_model: Arc<dyn LanguageModel>,
    pub history: Arc<dyn HistoryStore>,
    pub lexical_index: Arc<LexicalIndex>,
}

/// Result of a non-streaming query, matching the buffered reply shape (§6).
pub struct QueryOutcome {
    pub message_id: String,
    pub answer: String,
    pub sources: Vec<Source>,
    pub session_id: String,
    pub was_grounded: bool,
    pub confidence: f32,
    pub processing_time_ms: u64,
}

pub struct Pipeline {
    settings: Settings,
    intent_classifier: IntentClassifier,
    hybrid_retriever: HybridRetriever,
    sequential_retriever: SequentialRetriever,
    reranker: RerankerGate,
    rewriter: QueryRewriter,
    verifier: GroundednessVerifier,
    language_model: Arc<dyn LanguageModel>,
    history: Arc<dyn HistoryStore>,
}

impl Pipeline {
    pub fn new(deps: PipelineDependencies, settings: Settings) -> Self {
        let intent_classifier = IntentClassifier::new(Some(deps.embedder.clone()), deps.language_model.clone(), settings.intent.clone());
        let hybrid_retriever = HybridRetriever::new(deps.vector_store.clone(), deps.embedder.clone(), deps.lexical_index.clone());
        let sequential_retriever = SequentialRetriever::new(deps.vector_store.clone());
        let reranker = RerankerGate::new(Some(deps.embedder.clone()), deps.cross_encoder.clone(), settings.reranking.relevance_threshold);
        let rewriter = QueryRewriter::new(deps.language_model.clone(), Some(deps.history.clone()));
        let verifier = GroundednessVerifier::new(deps.language_model.clone(), settings.verification.clone());

        Self {
            settings,
            intent_classifier,
            hybrid_retriever,
            sequential_retriever,
            reranker,
            rewriter,
            verifier,
            language_model: deps.language_model,
            history: deps.history,
        }
    }

    fn hybrid_params(&self) -> HybridParams {
        HybridParams {
            vector_k: self.settings.retrieval.vector_k,
            bm25_k: self.settings.retrieval.bm25_k,
            rrf_k: self.settings.retrieval.rrf_k,
            initial_k: self.settings.retrieval.initial_k,
        }
    }

    async fn has_prior_turns(&self, session_id: &str) -> bool {
        matches!(self.history.get(session_id, 1).await, Ok(turns) if !turns.is_empty())
    }

    /// Retrieves, grades, and rewrites-and-retries until relevant documents
    /// are found, the rewrite budget is exhausted, or the collection is
    /// empty. Mirrors `retrieve -> grade_documents -> rewrite_query` (§4.13).
    async fn retrieve_and_grade(&self, state: &mut PipelineState) {
        loop {
            let (retrieved, collection_empty) = if state.is_summarization {
                match self.sequential_retriever.retrieve(&state.collection_name, self.settings.retrieval.sequential_limit).await {
                    Ok(docs) => {
                        let empty = docs.is_empty();
                        (docs, empty)
                    }
                    Err(e) => {
                        warn!(error = %e, "sequential retrieval failed");
                        state.errors.push(e.to_string());
                        (Vec::new(), true)
                    }
                }
            } else {
                match self.hybrid_retriever.search(state.effective_query(), &state.collection_name, self.hybrid_params()).await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(error = %e, "hybrid retrieval failed");
                        state.errors.push(e.to_string());
                        (Vec::new(), true)
                    }
                }
            };

            state.retrieved_documents = retrieved;
            state.collection_empty = collection_empty;
            state.record_step("retrieve");

            let complexity = state.query_complexity.unwrap_or(QueryComplexity::Simple);
            let simple_k = self.settings.reranking.simple_final_k;
            let default_k = self.settings.reranking.final_k;
            let (relevant, sources) = self.reranker.rerank(state.effective_query(), state.retrieved_documents.clone(), complexity, simple_k, default_k).await;
            state.relevant_documents = relevant;
            state.sources = sources;
            state.record_step("grade_documents");

            let has_relevant = !state.relevant_documents.is_empty();
            let exhausted_rewrites = state.rewrite_count >= state.max_iterations;
            if exhausted_rewrites || state.collection_empty || has_relevant {
                return;
            }

            match self.rewriter.rewrite(&state.question, &state.session_id).await {
                Ok(rewritten) => {
                    state.rewritten_query = Some(rewritten);
                    state.rewrite_count += 1;
                    state.record_step("rewrite_query");
                }
                Err(e) => {
                    warn!(error = %e, "query rewrite failed, generating from current results");
                    state.errors.push(e.to_string());
                    return;
                }
            }
        }
    }

    fn build_context(state: &PipelineState) -> String {
        state
            .relevant_documents
            .iter()
            .enumerate()
            .map(|(i, doc)| {
                let page_str = doc.page().map(|p| format!(", page {p}")).unwrap_or_default();
                format!("[Source {}: {}{page_str}]\n{}", i + 1, doc.source(), doc.content)
            })
            .collect::<Vec<_>>()
            .join("\n\n---\n\n")
    }

    async fn conversation_history(&self, session_id: &str) -> String {
        match self.history.get(session_id, 5).await {
            Ok(mut turns) => {
                turns.reverse();
                turns
                    .iter()
                    .map(|t| format!("{}: {}", role_label(t.role), t.content))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            Err(_) => String::new(),
        }
    }

    async fn generate(&self, state: &PipelineState) -> rag_core::Result<String> {
        let context = Self::build_context(state);
        let prompt = if state.iteration > 0 {
            rag_llm::prompts::generation_retry_prompt(&state.question, &context)
        } else {
            let history = self.conversation_history(&state.session_id).await;
            rag_llm::prompts::generation_prompt(&state.question, &context, &history)
        };
        self.language_model.invoke(&prompt, GenerationParams::default()).await
    }

    /// Generate-and-verify self-correction loop: `generate -> check_hallucination
    /// -> (grounded or out of retries) -> save_to_memory | generate` (§4.13).
    async fn generate_and_verify(&self, state: &mut PipelineState) {
        loop {
            let answer = match self.generate(state).await {
                Ok(answer) => answer,
                Err(e) => {
                    warn!(error = %e, "generation failed");
                    state.errors.push(e.to_string());
                    state.answer = Some("I wasn't able to generate an answer due to an internal error.".to_string());
                    state.is_grounded = false;
                    return;
                }
            };
            state.answer = Some(answer.clone());
            state.record_step("generate");

            if state.relevant_documents.is_empty() {
                state.is_grounded = true;
                state.iteration += 1;
                state.record_step("check_hallucination");
                return;
            }

            let complexity = state.query_complexity.unwrap_or(QueryComplexity::Simple);
            let verdict = self.verifier.verify(&answer, &state.relevant_documents, complexity).await;
            state.is_grounded = verdict.is_grounded;
            state.groundedness_score = verdict.score;
            state.fast_groundedness_score = verdict.score;
            state.skip_llm_check = verdict.skipped_llm_check;
            state.hallucination_details = verdict.details;
            state.iteration += 1;
            state.record_step("check_hallucination");

            if state.is_grounded || state.iteration >= state.max_iterations {
                return;
            }
        }
    }

    /// Full non-RAG path: classify -> handle_non_rag_intent -> done. Also
    /// covers the router's garbage branch, which ends the same way.
    async fn handle_non_rag(&self, state: &mut PipelineState, intent: Intent) {
        let result = dispatch_intent_handler(intent, &state.session_id, Some(&self.history), &self.language_model).await;
        state.answer = Some(result.answer);
        state.sources = result.sources;
        state.is_grounded = true;
        state.record_step("handle_non_rag_intent");
    }

    async fn save_to_memory(&self, state: &PipelineState) {
        if let Err(e) = self.history.add(&state.session_id, ConversationTurn::user(state.question.clone())).await {
            warn!(error = %e, "failed to persist user turn");
        }
        let answer = state.answer.clone().unwrap_or_default();
        if let Err(e) = self.history.add(&state.session_id, ConversationTurn::assistant(answer, state.sources.clone())).await {
            warn!(error = %e, "failed to persist assistant turn");
        }
    }

    async fn classify_and_route(&self, state: &mut PipelineState) -> bool {
        let has_history = self.has_prior_turns(&state.session_id).await;
        let (intent, confidence) = self.intent_classifier.classify(&state.question, has_history).await;
        state.detected_intent = Some(intent);
        state.intent_confidence = confidence;
        state.record_step("classify_intent");

        if !intent.needs_rag() {
            self.handle_non_rag(state, intent).await;
            return false;
        }

        let route = route_query(&state.question);
        state.query_complexity = Some(route.complexity);
        state.skip_rewrite = route.skip_rewrite;
        state.is_summarization = route.is_summarization;
        state.record_step("route_query");

        if route.complexity == QueryComplexity::Garbage {
            state.is_garbage = true;
            state.answer = Some("I'm not sure I understand your question. Could you rephrase it?".to_string());
            state.is_grounded = true;
            state.record_step("handle_garbage_query");
            return false;
        }

        true
    }

    /// Buffered, non-streaming query path mirroring the original's `aquery`.
    pub async fn query(&self, question: impl Into<String>, session_id: impl Into<String>, collection_name: impl Into<String>) -> QueryOutcome {
        let started = Instant::now();
        let mut state = PipelineState::new(question, session_id, collection_name, self.settings.verification.max_retries);

        if self.classify_and_route(&mut state).await {
            self.retrieve_and_grade(&mut state).await;
            self.generate_and_verify(&mut state).await;
        }

        self.save_to_memory(&state).await;

        QueryOutcome {
            message_id: new_message_id(),
            answer: state.answer.unwrap_or_default(),
            sources: state.sources,
            session_id: state.session_id,
            was_grounded: state.is_grounded,
            confidence: state.intent_confidence,
            processing_time_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Streaming query path mirroring the original's `astream`: emits
    /// `phase`, `sources`, `token`, and `done`/`error` events in strict
    /// order (§4.13, §5, §6). Tokens are forwarded live from the language
    /// model's own streaming entry point, not simulated.
    pub async fn stream(&self, question: impl Into<String>, session_id: impl Into<String>, collection_name: impl Into<String>, tx: mpsc::Sender<StreamEvent>) {
        let started = Instant::now();
        let question = question.into();
        let session_id = session_id.into();
        let collection_name = collection_name.into();
        let mut state = PipelineState::new(question, session_id, collection_name, self.settings.verification.max_retries);

        if tx.send(StreamEvent::searching()).await.is_err() {
            return;
        }

        let needs_rag = self.classify_and_route(&mut state).await;

        if !needs_rag {
            if tx.send(StreamEvent::sources(state.sources.clone())).await.is_err() {
                return;
            }
            if tx.send(StreamEvent::generating()).await.is_err() {
                return;
            }
            let answer = state.answer.clone().unwrap_or_default();
            for word in answer.split_inclusive(' ') {
                if tx.send(StreamEvent::token(word)).await.is_err() {
                    return;
                }
            }
            self.finish_stream(&state, started, tx).await;
            return;
        }

        self.retrieve_and_grade(&mut state).await;

        if tx.send(StreamEvent::sources(state.sources.clone())).await.is_err() {
            return;
        }
        if tx.send(StreamEvent::generating()).await.is_err() {
            return;
        }

        let context = Self::build_context(&state);
        let prompt = if state.iteration > 0 {
            rag_llm::prompts::generation_retry_prompt(&state.question, &context)
        } else {
            let history = self.conversation_history(&state.session_id).await;
            rag_llm::prompts::generation_prompt(&state.question, &context, &history)
        };

        let (token_tx, mut token_rx) = mpsc::channel::<String>(32);
        let forward_tx = tx.clone();
        let forward = async move {
            while let Some(token) = token_rx.recv().await {
                if forward_tx.send(StreamEvent::token(token)).await.is_err() {
                    break;
                }
            }
        };
        let generate = self.language_model.stream(&prompt, GenerationParams::default(), token_tx);

        let (answer_result, _) = tokio::join!(generate, forward);
        let answer = match answer_result {
            Ok(answer) => answer,
            Err(e) => {
                let _ = tx.send(StreamEvent::error(e.to_string(), "generation_failed")).await;
                return;
            }
        };
        state.answer = Some(answer.clone());
        state.record_step("generate");

        if state.relevant_documents.is_empty() {
            state.is_grounded = true;
        } else {
            let complexity = state.query_complexity.unwrap_or(QueryComplexity::Simple);
            let verdict = self.verifier.verify(&answer, &state.relevant_documents, complexity).await;
            state.is_grounded = verdict.is_grounded;
            state.groundedness_score = verdict.score;
            state.hallucination_details = verdict.details;
        }
        state.record_step("check_hallucination");

        self.finish_stream(&state, started, tx).await;
    }

    async fn finish_stream(&self, state: &PipelineState, started: Instant, tx: mpsc::Sender<StreamEvent>) {
        self.save_to_memory(state).await;
        let _ = tx
            .send(StreamEvent::Done {
                message_id: new_message_id(),
                was_grounded: state.is_grounded,
                processing_time_ms: started.elapsed().as_millis() as u64,
                iteration: state.iteration,
                query_complexity: state.query_complexity,
                is_summarization: state.is_summarization,
                detected_intent: state.detected_intent,
            })
            .await;
        info!(session_id = %state.session_id, grounded = state.is_grounded, "query completed");
    }
}

fn role_label(role: rag_core::TurnRole) -> &'static str {
    match role {
        rag_core::TurnRole::User => "User",
        rag_core::TurnRole::Assistant => "Assistant",
    }
}

fn new_message_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("msg-{n:016x}")
}
