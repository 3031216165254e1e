//! Prompt templates for intent classification fallback, query rewriting,
//! grounded generation, and groundedness verification.

/// One-shot category prompt for the intent classifier's model-fallback layer
/// (§4.2 Layer 2). The model should answer with a single uppercase category
/// token; callers parse it and discard everything else.
pub fn intent_classification_prompt(query: &str) -> String {
    format!(
        "Classify the user message below into exactly one category. Answer \
with only the category word in uppercase, nothing else.\n\n\
Categories: QUESTION, GREETING, GRATITUDE, FOLLOWUP, SIMPLIFY, DEEPEN, \
CLARIFY_NEEDED, COMMAND, GARBAGE, OFF_TOPIC\n\n\
Example: \"thanks a lot\" -> GRATITUDE\n\n\
If uncertain, choose QUESTION.\n\n\
Message: {query}\n\
Category:"
    )
}

/// Rewrite prompt for the query rewriter (§4.5). `history` is already
/// formatted as alternating "User: ..." / "Assistant: ..." lines, newest
/// last, capped to the last five turns by the caller.
pub fn rewrite_prompt(query: &str, history: &str) -> String {
    if history.is_empty() {
        format!(
            "Rewrite the following question into a standalone search query \
suitable for a document retrieval system. Keep it concise and preserve the \
original intent. Respond with only the rewritten query.\n\n\
Question: {query}\n\
Rewritten query:"
        )
    } else {
        format!(
            "Given the conversation so far, rewrite the user's latest question \
into a standalone search query suitable for a document retrieval system. \
Resolve pronouns and implicit references using the conversation. Respond \
with only the rewritten query.\n\n\
Conversation:\n{history}\n\n\
Latest question: {query}\n\
Rewritten query:"
        )
    }
}

/// Standard generation prompt (§4.9, iteration 0). Citation markers such as
/// "[Source 1]" are banned from the answer; the UI renders sources
/// separately from the generated text.
pub fn generation_prompt(query: &str, context: &str, history: &str) -> String {
    let history_section = if history.is_empty() { String::new() } else { format!("Conversation so far:\n{history}\n\n") };
    format!(
        "Answer the question using only the information in the context below. \
If the context does not contain enough information to answer, say so \
explicitly rather than guessing. Do not include citation markers like \
\"[Source 1]\" in your answer; sources are shown separately.\n\n\
{history_section}Context:\n{context}\n\n\
Question: {query}\n\
Answer:"
    )
}

/// Stricter retry prompt used on self-correction iterations (§4.9). Chat
/// history is deliberately omitted to keep the model focused on the
/// context it failed to stay grounded in last time.
pub fn generation_retry_prompt(query: &str, context: &str) -> String {
    format!(
        "Your previous answer was not sufficiently supported by the context. \
Answer the question again, using ONLY facts explicitly stated in the context \
below. Do not introduce any information not present in the context. If the \
context is insufficient, say so explicitly. Do not include citation markers \
like \"[Source 1]\" in your answer.\n\n\
Context:\n{context}\n\n\
Question: {query}\n\
Answer:"
    )
}

/// Model-based groundedness verification prompt (§4.10, ambiguous band
/// only). The response format is fixed so the verifier can parse it
/// line-by-line; on parse failure the caller retains the fast-path score.
pub fn groundedness_prompt(sources: &str, answer: &str) -> String {
    format!(
        "Given the sources and the answer below, determine whether the \
answer is fully supported by the sources.\n\n\
Sources:\n{sources}\n\n\
Answer:\n{answer}\n\n\
Respond with exactly three lines:\n\
GROUNDED: yes or no\n\
SCORE: a number between 0.0 and 1.0\n\
ISSUES: a brief description of any unsupported claims, or \"none\""
    )
}

/// Context-aware handler prompts (§4.12) for intents that operate on the
/// previous assistant turn rather than retrieving fresh context.
pub fn expand_prompt(previous_answer: &str) -> String {
    format!("Expand on the following answer with more detail and relevant examples, while staying consistent with it:\n\n{previous_answer}")
}

pub fn simplify_prompt(previous_answer: &str) -> String {
    format!("Rewrite the following answer in simpler terms, as if explaining to someone unfamiliar with the topic:\n\n{previous_answer}")
}

pub fn deepen_prompt(previous_answer: &str) -> String {
    format!("Add more technical depth to the following answer, including relevant details that were omitted:\n\n{previous_answer}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_prompt_bans_citation_markers() {
        let prompt = generation_prompt("what is x", "ctx", "");
        assert!(prompt.contains("Do not include citation markers"));
    }

    #[test]
    fn retry_prompt_omits_history_parameter() {
        let prompt = generation_retry_prompt("what is x", "ctx");
        assert!(!prompt.contains("Conversation so far"));
    }

    #[test]
    fn rewrite_prompt_includes_history_when_present() {
        let prompt = rewrite_prompt("and then?", "User: what is x\nAssistant: x is y");
        assert!(prompt.contains("Conversation:"));
        assert!(prompt.contains("what is x"));
    }

    #[test]
    fn groundedness_prompt_requests_fixed_format() {
        let prompt = groundedness_prompt("source text", "the answer");
        assert!(prompt.contains("GROUNDED: yes or no"));
        assert!(prompt.contains("SCORE:"));
    }
}
