//! In-memory conversation history store. Sessions do not survive a restart;
//! a durable backend can implement the same `HistoryStore` trait without
//! touching the pipeline.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use rag_core::{ConversationTurn, HistoryStore};

#[derive(Default)]
pub struct InMemoryHistoryStore {
    turns: RwLock<HashMap<String, Vec<ConversationTurn>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn add(&self, session_id: &str, turn: ConversationTurn) -> rag_core::Result<()> {
        self.turns.write().entry(session_id.to_string()).or_default().push(turn);
        Ok(())
    }

    async fn get(&self, session_id: &str, limit: usize) -> rag_core::Result<Vec<ConversationTurn>> {
        let turns = self.turns.read();
        let Some(session_turns) = turns.get(session_id) else {
            return Ok(Vec::new());
        };
        Ok(session_turns.iter().rev().take(limit).cloned().collect())
    }

    async fn clear(&self, session_id: &str) -> rag_core::Result<()> {
        self.turns.write().remove(session_id);
        Ok(())
    }

    async fn list_sessions(&self) -> rag_core::Result<Vec<String>> {
        Ok(self.turns.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_core::TurnRole;

    #[tokio::test]
    async fn get_returns_newest_first() {
        let store = InMemoryHistoryStore::new();
        store.add("s1", ConversationTurn::user("first".into())).await.unwrap();
        store.add("s1", ConversationTurn::assistant("second".into(), vec![])).await.unwrap();

        let turns = store.get("s1", 10).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].content, "second");
        assert_eq!(turns[0].role, TurnRole::Assistant);
    }

    #[tokio::test]
    async fn clear_removes_session_entirely() {
        let store = InMemoryHistoryStore::new();
        store.add("s1", ConversationTurn::user("hi".into())).await.unwrap();
        store.clear("s1").await.unwrap();
        assert!(store.get("s1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_session_returns_empty_history() {
        let store = InMemoryHistoryStore::new();
        assert!(store.get("never-seen", 10).await.unwrap().is_empty());
    }
}
