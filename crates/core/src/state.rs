//! Pipeline state object (§4.1): flows through the orchestrator, accumulates
//! intermediate results and provenance. Stages may read any prior field and
//! write their own; no stage overwrites another's outputs.

use serde::{Deserialize, Serialize};

use crate::chunk::{RetrievedDocument, Source};

/// Coarse classification of a user utterance, produced by the intent
/// classifier (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Question,
    Greeting,
    Gratitude,
    Followup,
    Simplify,
    Deepen,
    ClarifyNeeded,
    Command,
    Garbage,
    OffTopic,
}

impl Intent {
    /// Intents that end the pipeline without ever touching retrieval.
    pub fn is_non_rag(self) -> bool {
        matches!(
            self,
            Intent::Greeting | Intent::Gratitude | Intent::Garbage | Intent::OffTopic
        )
    }

    /// Intents that need a previous assistant turn to operate on.
    pub fn is_conversation_dependent(self) -> bool {
        matches!(self, Intent::Followup | Intent::Simplify | Intent::Deepen)
    }

    /// §4.13 `needs_rag` predicate.
    pub fn needs_rag(self) -> bool {
        matches!(self, Intent::Question | Intent::Command)
    }
}

/// Router's query-complexity classification (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryComplexity {
    Simple,
    Complex,
    Conversational,
    Summarize,
    Garbage,
}

/// Per-query mutable record threaded through the pipeline orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    // --- input ---
    pub question: String,
    pub session_id: String,
    pub collection_name: String,
    pub max_iterations: u32,

    // --- classification ---
    pub detected_intent: Option<Intent>,
    pub intent_confidence: f32,
    pub query_complexity: Option<QueryComplexity>,
    pub skip_rewrite: bool,
    pub is_summarization: bool,
    pub is_garbage: bool,

    // --- query processing ---
    pub rewritten_query: Option<String>,
    pub rewrite_count: u32,

    // --- retrieval ---
    pub retrieved_documents: Vec<RetrievedDocument>,
    pub relevant_documents: Vec<RetrievedDocument>,
    pub collection_empty: bool,

    // --- generation ---
    pub answer: Option<String>,
    pub sources: Vec<Source>,
    pub iteration: u32,

    // --- verification ---
    pub is_grounded: bool,
    pub groundedness_score: f32,
    pub fast_groundedness_score: f32,
    pub skip_llm_check: bool,
    pub hallucination_details: Option<String>,

    // --- provenance ---
    pub processing_steps: Vec<String>,
    pub errors: Vec<String>,
}

impl PipelineState {
    pub fn new(question: impl Into<String>, session_id: impl Into<String>, collection_name: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            question: question.into(),
            session_id: session_id.into(),
            collection_name: collection_name.into(),
            max_iterations,
            detected_intent: None,
            intent_confidence: 0.0,
            query_complexity: None,
            skip_rewrite: false,
            is_summarization: false,
            is_garbage: false,
            rewritten_query: None,
            rewrite_count: 0,
            retrieved_documents: Vec::new(),
            relevant_documents: Vec::new(),
            collection_empty: false,
            answer: None,
            sources: Vec::new(),
            iteration: 0,
            is_grounded: false,
            groundedness_score: 0.0,
            fast_groundedness_score: 0.0,
            skip_llm_check: false,
            hallucination_details: None,
            processing_steps: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// The query the retriever should actually search with: the rewritten
    /// query if one exists, otherwise the original question.
    pub fn effective_query(&self) -> &str {
        self.rewritten_query.as_deref().unwrap_or(&self.question)
    }

    pub fn record_step(&mut self, step: impl Into<String>) {
        self.processing_steps.push(step.into());
    }
}

/// A role in a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// {role, content, timestamp, optional metadata} stored per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub sources: Vec<Source>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            timestamp: chrono::Utc::now(),
            sources: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>, sources: Vec<Source>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            timestamp: chrono::Utc::now(),
            sources,
        }
    }
}
