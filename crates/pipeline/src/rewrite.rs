//! Conversation-aware query rewriter (§4.5).

use std::sync::Arc;

use rag_core::{GenerationParams, HistoryStore, LanguageModel, TurnRole};

use crate::error::{PipelineError, Result};

const HISTORY_LIMIT: usize = 5;

pub struct QueryRewriter {
    language_model: Arc<dyn LanguageModel>,
    history: Option<Arc<dyn HistoryStore>>,
}

impl QueryRewriter {
    pub fn new(language_model: Arc<dyn LanguageModel>, history: Option<Arc<dyn HistoryStore>>) -> Self {
        Self { language_model, history }
    }

    async fn formatted_history(&self, session_id: &str) -> String {
        let Some(history) = &self.history else {
            return String::new();
        };
        match history.get(session_id, HISTORY_LIMIT).await {
            Ok(mut turns) => {
                turns.reverse(); // newest-first -> chronological
                turns
                    .iter()
                    .map(|t| {
                        let role = match t.role {
                            TurnRole::User => "User",
                            TurnRole::Assistant => "Assistant",
                        };
                        format!("{role}: {}", t.content)
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            Err(_) => String::new(),
        }
    }

    pub async fn rewrite(&self, question: &str, session_id: &str) -> Result<String> {
        let history = self.formatted_history(session_id).await;
        let prompt = rag_llm::prompts::rewrite_prompt(question, &history);
        self.language_model
            .invoke(&prompt, GenerationParams { temperature: 0.0, max_tokens: 128 })
            .await
            .map(|s| s.trim().to_string())
            .map_err(|e| PipelineError::Generation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rag_core::ConversationTurn;
    use std::sync::Mutex;

    struct EchoLlm;

    #[async_trait]
    impl LanguageModel for EchoLlm {
        async fn invoke(&self, prompt: &str, _params: GenerationParams) -> rag_core::Result<String> {
            Ok(prompt.to_string())
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
    async fn rewrite_without_history_omits_conversation_section() {
        let llm: Arc<dyn LanguageModel> = Arc::new(EchoLlm);
        let rewriter = QueryRewriter::new(llm, None);
        let rewritten = rewriter.rewrite("and then?", "s1").await.unwrap();
        assert!(!rewritten.contains("Conversation:"));
    }

    #[tokio::test]
    async fn rewrite_with_history_includes_chronological_turns() {
        let llm: Arc<dyn LanguageModel> = Arc::new(EchoLlm);
        let history: Arc<dyn HistoryStore> = Arc::new(FakeHistory {
            turns: Mutex::new(vec![
                ConversationTurn::user("what is raft".into()),
                ConversationTurn::assistant("raft is a consensus algorithm".into(), vec![]),
            ]),
        });
        let rewriter = QueryRewriter::new(llm, Some(history));
        let rewritten = rewriter.rewrite("and paxos?", "s1").await.unwrap();
        assert!(rewritten.contains("Conversation:"));
        assert!(rewritten.contains("User: what is raft"));
        assert!(rewritten.contains("Assistant: raft is a consensus algorithm"));
    }
}
