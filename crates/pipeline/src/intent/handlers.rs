//! Fixed-string and context-aware handlers for non-RAG intents (§4.12).

use std::sync::Arc;

use rag_core::{ConversationTurn, GenerationParams, HistoryStore, Intent, LanguageModel, Source, TurnRole};
use tracing::warn;

const NO_PRIOR_ANSWER: &str =
    "I don't have a previous answer to work with. Could you ask a specific question about your documents first?";

pub struct HandlerResult {
    pub answer: String,
    pub handler_used: String,
    pub needs_rag: bool,
    pub sources: Vec<Source>,
}

impl HandlerResult {
    fn fixed(handler: &str, answer: &str) -> Self {
        Self { answer: answer.to_string(), handler_used: handler.to_string(), needs_rag: false, sources: Vec::new() }
    }

    fn no_prior_answer(handler: &str) -> Self {
        Self { answer: NO_PRIOR_ANSWER.to_string(), handler_used: handler.to_string(), needs_rag: true, sources: Vec::new() }
    }
}

async fn most_recent_assistant_turn(history: &Arc<dyn HistoryStore>, session_id: &str) -> Option<ConversationTurn> {
    match history.get(session_id, 4).await {
        Ok(turns) => turns.into_iter().find(|t| matches!(t.role, TurnRole::Assistant)),
        Err(e) => {
            warn!(error = %e, "failed to read conversation history for context-aware handler");
            None
        }
    }
}

async fn run_context_handler(
    handler: &str,
    language_model: &Arc<dyn LanguageModel>,
    history: &Arc<dyn HistoryStore>,
    session_id: &str,
    build_prompt: impl FnOnce(&str) -> String,
) -> HandlerResult {
    let Some(previous) = most_recent_assistant_turn(history, session_id).await else {
        return HandlerResult::no_prior_answer(handler);
    };

    let prompt = build_prompt(&previous.content);
    match language_model.invoke(&prompt, GenerationParams::default()).await {
        Ok(answer) => HandlerResult { answer, handler_used: handler.to_string(), needs_rag: false, sources: previous.sources },
        Err(e) => {
            warn!(error = %e, handler, "context-aware handler generation failed");
            HandlerResult::no_prior_answer(handler)
        }
    }
}

/// Dispatches `intent` to its fixed or context-aware handler. Only
/// non-RAG intents (`Intent::is_non_rag` or conversation-dependent ones)
/// should reach this function; `Question`/`Command` are routed to retrieval.
pub async fn dispatch_intent_handler(
    intent: Intent,
    session_id: &str,
    history: Option<&Arc<dyn HistoryStore>>,
    language_model: &Arc<dyn LanguageModel>,
) -> HandlerResult {
    match intent {
        Intent::Greeting => HandlerResult::fixed("greeting", "Hello! Ask me anything about your documents."),
        Intent::Gratitude => HandlerResult::fixed("gratitude", "You're welcome! Let me know if you have more questions."),
        Intent::Garbage => HandlerResult::fixed(
            "garbage",
            "I'm not sure I understand your question. Could you rephrase it?",
        ),
        Intent::OffTopic => HandlerResult::fixed(
            "off_topic",
            "I can only help with questions about the documents in this collection.",
        ),
        Intent::ClarifyNeeded => HandlerResult::fixed(
            "clarify_needed",
            "Could you clarify what you'd like to know? A more specific question will help me find the right answer.",
        ),
        Intent::Followup | Intent::Simplify | Intent::Deepen => {
            let Some(history) = history else {
                return HandlerResult::no_prior_answer("context_unavailable");
            };
            let (handler, build_prompt): (&str, fn(&str) -> String) = match intent {
                Intent::Followup => ("followup", rag_llm::prompts::expand_prompt),
                Intent::Simplify => ("simplify", rag_llm::prompts::simplify_prompt),
                Intent::Deepen => ("deepen", rag_llm::prompts::deepen_prompt),
                _ => unreachable!(),
            };
            run_context_handler(handler, language_model, history, session_id, build_prompt).await
        }
        Intent::Question | Intent::Command => {
            HandlerResult { answer: String::new(), handler_used: "none".to_string(), needs_rag: true, sources: Vec::new() }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct EchoLlm;

    #[async_trait]
    impl LanguageModel for EchoLlm {
        async fn invoke(&self, prompt: &str, _params: GenerationParams) -> rag_core::Result<String> {
            Ok(format!("echo: {prompt}"))
        }
        async fn stream(&self, prompt: &str, _params: GenerationParams, tx: tokio::sync::mpsc::Sender<String>) -> rag_core::Result<String> {
            let _ = tx.send(prompt.to_string()).await;
            Ok(prompt.to_string())
        }
    }

    struct FakeHistory {
        turns: Mutex<Vec<ConversationTurn>>,
    }

    #[async_trait]
    impl HistoryStore for FakeHistory {
        async fn add(&self, _session_id: &str, turn: ConversationTurn) -> rag_core::Result<()> {
            self.turns.lock().unwrap().push(turn);
            Ok(())
        }
        async fn get(&self, _session_id: &str, limit: usize) -> rag_core::Result<Vec<ConversationTurn>> {
            let turns = self.turns.lock().unwrap();
            Ok(turns.iter().rev().take(limit).cloned().collect())
        }
        async fn clear(&self, _session_id: &str) -> rag_core::Result<()> {
            Ok(())
        }
        async fn list_sessions(&self) -> rag_core::Result<Vec<String>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn greeting_is_fixed_and_skips_rag() {
        let llm: Arc<dyn LanguageModel> = Arc::new(EchoLlm);
        let result = dispatch_intent_handler(Intent::Greeting, "s1", None, &llm).await;
        assert!(!result.needs_rag);
        assert_eq!(result.handler_used, "greeting");
    }

    #[tokio::test]
    async fn followup_without_history_requests_a_specific_question() {
        let llm: Arc<dyn LanguageModel> = Arc::new(EchoLlm);
        let history: Arc<dyn HistoryStore> = Arc::new(FakeHistory { turns: Mutex::new(vec![]) });
        let result = dispatch_intent_handler(Intent::Followup, "s1", Some(&history), &llm).await;
        assert!(result.needs_rag);
        assert_eq!(result.answer, NO_PRIOR_ANSWER);
    }

    #[tokio::test]
    async fn simplify_with_prior_answer_invokes_model() {
        let llm: Arc<dyn LanguageModel> = Arc::new(EchoLlm);
        let history: Arc<dyn HistoryStore> =
            Arc::new(FakeHistory { turns: Mutex::new(vec![ConversationTurn::assistant("the CAP theorem says X".into(), vec![])]) });
        let result = dispatch_intent_handler(Intent::Simplify, "s1", Some(&history), &llm).await;
        assert!(!result.needs_rag);
        assert!(result.answer.starts_with("echo:"));
    }

    #[tokio::test]
    async fn question_intent_defers_to_rag() {
        let llm: Arc<dyn LanguageModel> = Arc::new(EchoLlm);
        let result = dispatch_intent_handler(Intent::Question, "s1", None, &llm).await;
        assert!(result.needs_rag);
    }
}
