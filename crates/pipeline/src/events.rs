//! Streaming SSE event payloads (§6, §4.13).

use rag_core::{Intent, QueryComplexity, Source};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Searching,
    Generating,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Phase {
        phase: Phase,
    },
    Sources {
        sources: Vec<Source>,
    },
    Token {
        content: String,
    },
    Done {
        message_id: String,
        was_grounded: bool,
        processing_time_ms: u64,
        iteration: u32,
        query_complexity: Option<QueryComplexity>,
        is_summarization: bool,
        detected_intent: Option<Intent>,
    },
    Error {
        message: String,
        code: String,
    },
}

impl StreamEvent {
    pub fn searching() -> Self {
        StreamEvent::Phase { phase: Phase::Searching }
    }

    pub fn generating() -> Self {
        StreamEvent::Phase { phase: Phase::Generating }
    }

    pub fn sources(sources: Vec<Source>) -> Self {
        StreamEvent::Sources { sources }
    }

    pub fn token(content: impl Into<String>) -> Self {
        StreamEvent::Token { content: content.into() }
    }

    pub fn error(message: impl Into<String>, code: impl Into<String>) -> Self {
        StreamEvent::Error { message: message.into(), code: code.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_event_serializes_with_snake_case_tag() {
        let json = serde_json::to_value(StreamEvent::searching()).unwrap();
        assert_eq!(json["type"], "phase");
        assert_eq!(json["phase"], "searching");
    }

    #[test]
    fn done_event_carries_all_fields() {
        let event = StreamEvent::Done {
            message_id: "m1".into(),
            was_grounded: true,
            processing_time_ms: 120,
            iteration: 1,
            query_complexity: Some(QueryComplexity::Simple),
            is_summarization: false,
            detected_intent: Some(Intent::Question),
        };
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["type"], "done");
        assert_eq!(json["was_grounded"], true);
        assert_eq!(json["iteration"], 1);
    }
}
