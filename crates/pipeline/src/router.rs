//! Heuristic query router (§4.4). No model call; must stay sub-millisecond.

use rag_core::QueryComplexity;

const COMPLEX_PATTERNS: [&str; 4] = ["compare", "contrast", "vs", "difference"];
const SUMMARIZE_KEYWORDS: [&str; 5] = ["summarize", "summarise", "summary", "overview", "tl;dr"];

pub struct RouteResult {
    pub complexity: QueryComplexity,
    pub skip_rewrite: bool,
    pub is_summarization: bool,
}

pub fn route_query(question: &str) -> RouteResult {
    let lower = question.to_lowercase();

    if SUMMARIZE_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return RouteResult { complexity: QueryComplexity::Summarize, skip_rewrite: true, is_summarization: true };
    }

    let is_complex = COMPLEX_PATTERNS.iter().any(|p| lower.contains(p)) || lower.matches('?').count() > 1;
    let complexity = if is_complex { QueryComplexity::Complex } else { QueryComplexity::Simple };

    RouteResult { complexity, skip_rewrite: complexity == QueryComplexity::Simple, is_summarization: false }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_question_routes_simple() {
        let result = route_query("what is the CAP theorem");
        assert_eq!(result.complexity, QueryComplexity::Simple);
        assert!(result.skip_rewrite);
    }

    #[test]
    fn comparison_keyword_routes_complex() {
        let result = route_query("compare raft and paxos");
        assert_eq!(result.complexity, QueryComplexity::Complex);
        assert!(!result.skip_rewrite);
    }

    #[test]
    fn multiple_question_marks_route_complex() {
        let result = route_query("what is raft? how does it differ from paxos?");
        assert_eq!(result.complexity, QueryComplexity::Complex);
    }

    #[test]
    fn summarize_keyword_short_circuits_to_summarize() {
        let result = route_query("can you summarize chapter 3");
        assert_eq!(result.complexity, QueryComplexity::Summarize);
        assert!(result.is_summarization);
    }
}
