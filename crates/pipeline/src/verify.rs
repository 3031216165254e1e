//! Two-tier groundedness verifier (§4.10): a cheap lexical-overlap fast path,
//! with the language model consulted only in the ambiguous band.

use std::collections::HashSet;
use std::sync::Arc;

use once_cell::sync::Lazy;
use rag_config::VerificationConfig;
use rag_core::{GenerationParams, LanguageModel, QueryComplexity, RetrievedDocument};

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
        "do", "does", "did", "will", "would", "could", "should", "may", "might", "must", "shall",
        "can", "to", "of", "in", "for", "on", "with", "at", "by", "from", "as", "into", "and",
        "but", "if", "or", "this", "that", "these", "those", "it", "its", "i", "me", "my", "we",
        "our", "you", "your", "he", "him", "his", "she", "her", "they", "them", "their",
    ]
    .into_iter()
    .collect()
});

fn content_words(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3)
        .filter(|w| !STOPWORDS.contains(*w))
        .map(str::to_string)
        .collect()
}

fn trigrams(text: &str) -> HashSet<String> {
    let lowercased = text.to_lowercase();
    let words: Vec<&str> = lowercased.split_whitespace().collect();
    let mut grams = HashSet::new();
    for window in words.windows(3) {
        let non_stopword_count = window.iter().filter(|w| !STOPWORDS.contains(*w)).count();
        if non_stopword_count >= 2 {
            grams.insert(window.join(" "));
        }
    }
    grams
}

/// Combined word/trigram overlap score between `answer` and `source_text`,
/// weighted 0.6/0.4. Pure and synchronous; the cheap half of the cascade.
pub fn fast_check(answer: &str, source_text: &str) -> f32 {
    let answer_words = content_words(answer);
    if answer_words.is_empty() {
        return 0.0;
    }
    let source_words = content_words(source_text);
    let matched = answer_words.intersection(&source_words).count();
    let word_overlap = matched as f32 / answer_words.len() as f32;

    let answer_trigrams = trigrams(answer);
    let trigram_score = if answer_trigrams.is_empty() {
        word_overlap
    } else {
        let source_trigrams = trigrams(source_text);
        let matched_trigrams = answer_trigrams.intersection(&source_trigrams).count();
        matched_trigrams as f32 / answer_trigrams.len() as f32
    };

    word_overlap * 0.6 + trigram_score * 0.4
}

pub struct VerificationResult {
    pub is_grounded: bool,
    pub score: f32,
    pub skipped_llm_check: bool,
    pub details: Option<String>,
}

pub struct GroundednessVerifier {
    language_model: Arc<dyn LanguageModel>,
    config: VerificationConfig,
}

impl GroundednessVerifier {
    pub fn new(language_model: Arc<dyn LanguageModel>, config: VerificationConfig) -> Self {
        Self { language_model, config }
    }

    /// Runs the full cascade: empty-document short-circuit, simple+high-score
    /// fast-skip, fast-path high/low confidence, and the ambiguous-band model
    /// call.
    pub async fn verify(&self, answer: &str, relevant_documents: &[RetrievedDocument], complexity: QueryComplexity) -> VerificationResult {
        if relevant_documents.is_empty() {
            return VerificationResult { is_grounded: true, score: 1.0, skipped_llm_check: true, details: None };
        }

        let top_score = relevant_documents.iter().map(|d| d.relevance_score).fold(f32::MIN, f32::max);
        if complexity == QueryComplexity::Simple && top_score >= self.config.simple_skip_score {
            return VerificationResult { is_grounded: true, score: 1.0, skipped_llm_check: true, details: None };
        }

        let source_text = relevant_documents.iter().map(|d| d.content.as_str()).collect::<Vec<_>>().join("\n\n");
        let fast_score = fast_check(answer, &source_text);

        if fast_score >= self.config.hallucination_threshold {
            return VerificationResult { is_grounded: true, score: fast_score, skipped_llm_check: true, details: None };
        }
        if fast_score < self.config.fast_fail_threshold {
            return VerificationResult { is_grounded: false, score: fast_score, skipped_llm_check: true, details: None };
        }

        let prompt = rag_llm::prompts::groundedness_prompt(&source_text, answer);
        match self.language_model.invoke(&prompt, GenerationParams { temperature: 0.0, max_tokens: 128 }).await {
            Ok(response) => match parse_verdict(&response) {
                Some((grounded, score, issues)) => VerificationResult { is_grounded: grounded, score, skipped_llm_check: false, details: issues },
                None => VerificationResult { is_grounded: true, score: fast_score, skipped_llm_check: false, details: None },
            },
            Err(_) => VerificationResult { is_grounded: true, score: fast_score, skipped_llm_check: false, details: None },
        }
    }
}

fn parse_verdict(response: &str) -> Option<(bool, f32, Option<String>)> {
    let mut grounded = None;
    let mut score = None;
    let mut issues = None;

    for line in response.lines() {
        let lower = line.to_lowercase();
        if let Some(rest) = lower.strip_prefix("grounded:") {
            grounded = Some(rest.trim().starts_with("yes"));
        } else if let Some(rest) = line.to_uppercase().strip_prefix("SCORE:").map(|_| line) {
            if let Some(idx) = rest.find(':') {
                score = rest[idx + 1..].trim().parse::<f32>().ok();
            }
        } else if let Some(idx) = line.to_uppercase().find("ISSUES:") {
            let text = line[idx + "ISSUES:".len()..].trim();
            if !text.eq_ignore_ascii_case("none") && !text.is_empty() {
                issues = Some(text.to_string());
            }
        }
    }

    Some((grounded?, score.unwrap_or(0.5), issues))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_check_scores_identical_text_as_fully_grounded() {
        let text = "raft is a consensus algorithm for managing replicated logs";
        assert!(fast_check(text, text) > 0.9);
    }

    #[test]
    fn fast_check_scores_unrelated_text_near_zero() {
        let score = fast_check("the weather is sunny today", "raft is a consensus algorithm for replicated logs");
        assert!(score < 0.3);
    }

    #[test]
    fn parse_verdict_reads_fixed_three_line_format() {
        let response = "GROUNDED: yes\nSCORE: 0.92\nISSUES: none";
        let (grounded, score, issues) = parse_verdict(response).unwrap();
        assert!(grounded);
        assert!((score - 0.92).abs() < 1e-6);
        assert!(issues.is_none());
    }

    #[test]
    fn parse_verdict_captures_issues_text() {
        let response = "GROUNDED: no\nSCORE: 0.2\nISSUES: claims a date not in the sources";
        let (grounded, _score, issues) = parse_verdict(response).unwrap();
        assert!(!grounded);
        assert_eq!(issues.as_deref(), Some("claims a date not in the sources"));
    }

    #[test]
    fn parse_verdict_returns_none_on_malformed_response() {
        assert!(parse_verdict("I think it's fine").is_none());
    }
}
