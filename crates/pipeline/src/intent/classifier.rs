//! Three-layer intent classification cascade (§4.2): deterministic rules,
//! semantic exemplar matching, model fallback. The first layer to produce a
//! result wins; any layer failing is non-fatal and falls through.

use std::collections::HashSet;
use std::sync::Arc;

use once_cell::sync::Lazy;
use rag_config::IntentConfig;
use rag_core::{Embedder, GenerationParams, Intent, LanguageModel};
use tokio::sync::OnceCell;
use tracing::warn;

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
        "do", "does", "did", "will", "would", "could", "should", "may", "might", "must", "shall",
        "can", "to", "of", "in", "for", "on", "with", "at", "by", "from", "as", "into", "and",
        "but", "if", "or", "this", "that", "these", "those", "it", "its", "i", "me", "my", "we",
        "our", "you", "your", "he", "him", "his", "she", "her", "they", "them", "their", "what",
        "which", "who", "whom", "context", "source", "document", "information",
    ]
    .into_iter()
    .collect()
});

/// Layer 0: returns `(Garbage, 0.95)` for input that is too short,
/// non-alphabetic, stopword-dominated, or low-entropy. Otherwise `None`.
fn layer0_rules(query: &str) -> Option<(Intent, f32)> {
    const GARBAGE_CONFIDENCE: f32 = 0.95;
    let trimmed = query.trim();
    let len = trimmed.chars().count();

    if len <= 1 {
        return Some((Intent::Garbage, GARBAGE_CONFIDENCE));
    }

    let alpha_count = trimmed.chars().filter(|c| c.is_alphabetic()).count();
    if alpha_count == 0 {
        return Some((Intent::Garbage, GARBAGE_CONFIDENCE));
    }
    if alpha_count < 2 && len > 2 {
        return Some((Intent::Garbage, GARBAGE_CONFIDENCE));
    }

    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    if !tokens.is_empty() && tokens.len() <= 5 {
        let stopword_count = tokens.iter().filter(|t| STOPWORDS.contains(t.to_lowercase().as_str())).count();
        if stopword_count as f32 / tokens.len() as f32 >= 0.9 {
            return Some((Intent::Garbage, GARBAGE_CONFIDENCE));
        }
    }

    let unique_chars: HashSet<char> = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    if unique_chars.len() <= 2 && len >= 4 {
        return Some((Intent::Garbage, GARBAGE_CONFIDENCE));
    }

    None
}

/// Short exemplar phrases for every intent the model can classify into
/// besides `question`, embedded once at classifier startup.
fn exemplar_phrases() -> Vec<(Intent, &'static str)> {
    vec![
        (Intent::Greeting, "hi"),
        (Intent::Greeting, "hello"),
        (Intent::Greeting, "hey there"),
        (Intent::Greeting, "good morning"),
        (Intent::Greeting, "good afternoon"),
        (Intent::Greeting, "howdy"),
        (Intent::Greeting, "hi there, how are you"),
        (Intent::Greeting, "greetings"),
        (Intent::Gratitude, "thanks"),
        (Intent::Gratitude, "thank you"),
        (Intent::Gratitude, "thanks a lot"),
        (Intent::Gratitude, "much appreciated"),
        (Intent::Gratitude, "that was helpful, thank you"),
        (Intent::Gratitude, "awesome, thanks!"),
        (Intent::Gratitude, "great, appreciate it"),
        (Intent::Followup, "tell me more"),
        (Intent::Followup, "can you elaborate"),
        (Intent::Followup, "what else"),
        (Intent::Followup, "continue"),
        (Intent::Followup, "go on"),
        (Intent::Followup, "and then what"),
        (Intent::Followup, "anything else about that"),
        (Intent::Simplify, "can you simplify that"),
        (Intent::Simplify, "explain it more simply"),
        (Intent::Simplify, "make that easier to understand"),
        (Intent::Simplify, "i don't understand, simpler please"),
        (Intent::Simplify, "break that down for a beginner"),
        (Intent::Simplify, "can you dumb it down"),
        (Intent::Deepen, "go deeper into that"),
        (Intent::Deepen, "give me more technical detail"),
        (Intent::Deepen, "explain the internals"),
        (Intent::Deepen, "what's the underlying mechanism"),
        (Intent::Deepen, "i want a more advanced explanation"),
        (Intent::Deepen, "add more depth to that answer"),
        (Intent::ClarifyNeeded, "what do you mean"),
        (Intent::ClarifyNeeded, "i don't understand the question"),
        (Intent::ClarifyNeeded, "can you clarify"),
        (Intent::ClarifyNeeded, "that doesn't make sense to me"),
        (Intent::ClarifyNeeded, "unclear, can you rephrase"),
        (Intent::Command, "list all the documents"),
        (Intent::Command, "show me the sources"),
        (Intent::Command, "export this conversation"),
        (Intent::Command, "delete this session"),
        (Intent::Command, "restart the conversation"),
        (Intent::Command, "switch to a different collection"),
        (Intent::Garbage, "asdkjasdk"),
        (Intent::Garbage, "????"),
        (Intent::Garbage, "xjxjxj"),
        (Intent::Garbage, "......"),
        (Intent::Garbage, "qwerty"),
        (Intent::OffTopic, "what's the weather today"),
        (Intent::OffTopic, "tell me a joke"),
        (Intent::OffTopic, "who won the game last night"),
        (Intent::OffTopic, "what's your favorite movie"),
        (Intent::OffTopic, "can you write me a poem"),
        (Intent::OffTopic, "what's the capital of france"),
    ]
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn parse_intent_token(response: &str) -> Option<Intent> {
    let token = response
        .trim()
        .split_whitespace()
        .next()?
        .trim_matches(|c: char| !c.is_alphabetic() && c != '_')
        .to_uppercase();
    match token.as_str() {
        "QUESTION" => Some(Intent::Question),
        "GREETING" => Some(Intent::Greeting),
        "GRATITUDE" => Some(Intent::Gratitude),
        "FOLLOWUP" => Some(Intent::Followup),
        "SIMPLIFY" => Some(Intent::Simplify),
        "DEEPEN" => Some(Intent::Deepen),
        "CLARIFY_NEEDED" => Some(Intent::ClarifyNeeded),
        "COMMAND" => Some(Intent::Command),
        "GARBAGE" => Some(Intent::Garbage),
        "OFF_TOPIC" => Some(Intent::OffTopic),
        _ => None,
    }
}

pub struct IntentClassifier {
    embedder: Option<Arc<dyn Embedder>>,
    language_model: Arc<dyn LanguageModel>,
    config: IntentConfig,
    exemplar_bank: OnceCell<Option<Vec<(Intent, Vec<f32>)>>>,
}

impl IntentClassifier {
    pub fn new(embedder: Option<Arc<dyn Embedder>>, language_model: Arc<dyn LanguageModel>, config: IntentConfig) -> Self {
        Self { embedder, language_model, config, exemplar_bank: OnceCell::new() }
    }

    /// Lazily embeds the exemplar bank on first use. Returns `None` (layer
    /// disabled) if there is no embedder or embedding the bank fails.
    async fn exemplar_bank(&self) -> Option<&Vec<(Intent, Vec<f32>)>> {
        let bank = self
            .exemplar_bank
            .get_or_init(|| async {
                let embedder = self.embedder.as_ref()?;
                let exemplars = exemplar_phrases();
                let texts: Vec<String> = exemplars.iter().map(|(_, phrase)| phrase.to_string()).collect();
                match embedder.embed_documents(&texts).await {
                    Ok(vectors) if vectors.len() == exemplars.len() => {
                        Some(exemplars.into_iter().zip(vectors).map(|((intent, _), v)| (intent, v)).collect())
                    }
                    Ok(_) => {
                        warn!("exemplar embedding count mismatch, disabling semantic intent layer");
                        None
                    }
                    Err(e) => {
                        warn!(error = %e, "exemplar bank embedding failed, disabling semantic intent layer");
                        None
                    }
                }
            })
            .await;
        bank.as_ref()
    }

    async fn layer1_semantic(&self, query: &str) -> Option<(Intent, f32)> {
        let embedder = self.embedder.as_ref()?;
        let bank = self.exemplar_bank().await?;

        let query_embedding = match embedder.embed_query(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "query embedding failed, falling through to model fallback");
                return None;
            }
        };

        let mut best: Option<(Intent, f32)> = None;
        for (intent, vector) in bank {
            let similarity = cosine_similarity(&query_embedding, vector);
            if best.map(|(_, b)| similarity > b).unwrap_or(true) {
                best = Some((*intent, similarity));
            }
        }

        let (intent, similarity) = best?;
        if similarity >= self.config.semantic_confidence_threshold {
            Some((intent, similarity))
        } else {
            None
        }
    }

    async fn layer2_model(&self, query: &str) -> (Intent, f32) {
        let prompt = rag_llm::prompts::intent_classification_prompt(query);
        let params = GenerationParams { temperature: 0.0, max_tokens: 16 };
        match self.language_model.invoke(&prompt, params).await {
            Ok(response) => match parse_intent_token(&response) {
                Some(intent) => (intent, self.config.llm_fallback_confidence_threshold),
                None => (Intent::Question, 0.30),
            },
            Err(e) => {
                warn!(error = %e, "intent classifier model fallback failed");
                (Intent::Question, 0.30)
            }
        }
    }

    /// Classifies `query`, applying the conversation-dependent override
    /// (downgrading followup/simplify/deepen to `question` when
    /// `has_prior_turns` is false) to whatever layer produced the result.
    pub async fn classify(&self, query: &str, has_prior_turns: bool) -> (Intent, f32) {
        if let Some(result) = layer0_rules(query) {
            return result;
        }

        let result = match self.layer1_semantic(query).await {
            Some(result) => result,
            None => self.layer2_model(query).await,
        };

        apply_conversation_override(result, has_prior_turns)
    }
}

fn apply_conversation_override((intent, confidence): (Intent, f32), has_prior_turns: bool) -> (Intent, f32) {
    if intent.is_conversation_dependent() && !has_prior_turns {
        (Intent::Question, 1.0)
    } else {
        (intent, confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer0_flags_single_character_as_garbage() {
        assert_eq!(layer0_rules("x"), Some((Intent::Garbage, 0.95)));
    }

    #[test]
    fn layer0_flags_punctuation_only_as_garbage() {
        assert_eq!(layer0_rules("!!!"), Some((Intent::Garbage, 0.95)));
    }

    #[test]
    fn layer0_flags_stopword_dominated_short_input_as_garbage() {
        assert_eq!(layer0_rules("the a an"), Some((Intent::Garbage, 0.95)));
    }

    #[test]
    fn layer0_flags_low_entropy_repetition_as_garbage() {
        assert_eq!(layer0_rules("aaaa"), Some((Intent::Garbage, 0.95)));
    }

    #[test]
    fn layer0_passes_through_real_questions() {
        assert_eq!(layer0_rules("what is the CAP theorem"), None);
    }

    #[test]
    fn override_downgrades_followup_without_history() {
        assert_eq!(apply_conversation_override((Intent::Followup, 0.9), false), (Intent::Question, 1.0));
    }

    #[test]
    fn override_leaves_followup_with_history_untouched() {
        assert_eq!(apply_conversation_override((Intent::Followup, 0.9), true), (Intent::Followup, 0.9));
    }

    #[test]
    fn override_leaves_non_conversation_intents_untouched() {
        assert_eq!(apply_conversation_override((Intent::Greeting, 0.95), false), (Intent::Greeting, 0.95));
    }

    #[test]
    fn parses_uppercase_category_token() {
        assert_eq!(parse_intent_token("GRATITUDE"), Some(Intent::Gratitude));
        assert_eq!(parse_intent_token("  off_topic  "), Some(Intent::OffTopic));
        assert_eq!(parse_intent_token("not a category"), None);
    }
}
