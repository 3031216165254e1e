//! Snippet selector (§4.11): pick a 300-350 character preview from a source
//! document that is maximally informative for the query. A pure function of
//! (query, content, optional parent_context); never calls a model.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

const MAX_LENGTH: usize = 350;

static STOPWORDS: Lazy<std::collections::HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
        "do", "does", "did", "will", "would", "could", "should", "may", "might", "must", "shall",
        "can", "need", "dare", "what", "which", "who", "whom", "this", "that", "these", "those",
        "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "your", "yours",
        "yourself", "yourselves", "he", "him", "his", "himself", "she", "her", "hers", "herself",
        "it", "its", "itself", "they", "them", "their", "theirs", "themselves", "and", "but",
        "if", "or", "because", "as", "until", "while", "of", "at", "by", "for", "with", "about",
        "against", "between", "into", "through", "during", "before", "after", "above", "below",
        "to", "from", "up", "down", "in", "out", "on", "off", "over", "under", "again", "further",
        "then", "once", "here", "there", "when", "where", "why", "how", "all", "each", "few",
        "more", "most", "other", "some", "such", "no", "nor", "not", "only", "own", "same", "so",
        "than", "too", "very", "s", "t", "just", "don", "now", "tell",
    ]
    .into_iter()
    .collect()
});

const KV_LABELS: &[&str] = &[
    "education",
    "degree",
    "qualification",
    "certifications",
    "certificate",
    "experience",
    "work experience",
    "employment",
    "work history",
    "skills",
    "technical skills",
    "technologies",
    "tools",
    "languages",
    "language",
    "programming languages",
    "projects",
    "portfolio",
    "achievements",
    "summary",
    "objective",
    "profile",
    "about",
    "contact",
    "email",
    "phone",
    "address",
    "location",
    "name",
    "title",
    "role",
    "position",
];

static LABEL_ALIASES: Lazy<HashMap<&'static str, Vec<&'static str>>> = Lazy::new(|| {
    [
        ("degree", vec!["education", "qualification", "certifications"]),
        ("studied", vec!["education"]),
        ("graduated", vec!["education"]),
        ("university", vec!["education"]),
        ("college", vec!["education"]),
        ("school", vec!["education"]),
        ("worked", vec!["experience", "work experience", "employment"]),
        ("job", vec!["experience", "work experience"]),
        ("employed", vec!["experience", "employment"]),
        ("programming", vec!["skills", "technical skills", "languages"]),
        ("tech", vec!["skills", "technical skills", "technologies"]),
        ("know", vec!["skills", "languages"]),
        ("contact", vec!["contact", "email", "phone", "address"]),
        ("reach", vec!["contact", "email", "phone"]),
    ]
    .into_iter()
    .collect()
});

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").unwrap());

fn extract_query_terms(query: &str) -> Vec<String> {
    WORD_RE
        .find_iter(&query.to_lowercase())
        .map(|m| m.as_str().to_string())
        .filter(|w| !STOPWORDS.contains(w.as_str()) && w.len() > 1)
        .collect()
}

fn extract_query_phrases(query: &str) -> Vec<String> {
    let query_lower = query.to_lowercase();
    let words: Vec<&str> = query_lower.split_whitespace().collect();
    let mut phrases = Vec::new();
    for i in 0..words.len() {
        for length in [3usize, 2] {
            if i + length <= words.len() {
                let phrase_words = &words[i..i + length];
                if phrase_words.iter().any(|w| !STOPWORDS.contains(*w)) {
                    phrases.push(phrase_words.join(" "));
                }
            }
        }
    }
    phrases
}

fn labels_to_search(query_terms: &[String]) -> Vec<&'static str> {
    let mut labels: Vec<&'static str> = Vec::new();
    for term in query_terms {
        if let Some(&label) = KV_LABELS.iter().find(|&&l| l == term) {
            if !labels.contains(&label) {
                labels.push(label);
            }
        }
        if let Some(aliases) = LABEL_ALIASES.get(term.as_str()) {
            for &a in aliases {
                if !labels.contains(&a) {
                    labels.push(a);
                }
            }
        }
    }
    labels
}

/// A line that looks like the start of a new "Label:" section — used to
/// decide where a key-value match's continuation lines stop. The `regex`
/// crate has no negative-lookahead support, so this is checked per line
/// rather than folded into one pattern the way the original did.
static HEADER_LIKE_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z][a-z]+[ \t]*[:\-|]").unwrap());

/// Step 1: key-value pattern, e.g. "Education: B.Sc Computer Science".
fn find_key_value_match(query: &str, content: &str) -> Option<String> {
    let query_lower = query.to_lowercase();
    let query_terms = extract_query_terms(query);
    let searched = labels_to_search(&query_terms);

    let lines: Vec<&str> = content.lines().collect();

    for &label in KV_LABELS {
        let label_matches = query_lower.contains(label)
            || searched.contains(&label)
            || query_terms.iter().any(|t| label.contains(t.as_str()) || t.contains(label));
        if !label_matches {
            continue;
        }

        let line_re = match Regex::new(&format!(r"(?i)^[ \t]*{}s?[ \t]*[:\-|]?[ \t]*\S", regex::escape(label))) {
            Ok(r) => r,
            Err(_) => continue,
        };

        let Some(start_idx) = lines.iter().position(|l| line_re.is_match(l)) else {
            continue;
        };

        let mut matched_lines = vec![lines[start_idx].trim()];
        let mut next_idx = start_idx + 1;
        while next_idx < lines.len() {
            let line = lines[next_idx];
            if line.trim().is_empty() || HEADER_LIKE_LINE_RE.is_match(line) {
                break;
            }
            matched_lines.push(line.trim());
            next_idx += 1;
        }

        let mut result = matched_lines.join("\n");
        if result.len() < 100 && next_idx < lines.len() {
            let next_line = lines[next_idx].trim();
            if !next_line.is_empty() {
                result.push('\n');
                result.push_str(next_line);
            }
        }
        return Some(truncate(&result, MAX_LENGTH));
    }
    None
}

static MD_HEADER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)(?:^|\n)(#{1,3})\s*([^\n]+)").unwrap());
static UNDERLINE_HEADER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)(?:^|\n)([^\n]+)\n[=\-]{3,}").unwrap());
static CAPS_HEADER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)(?:^|\n)([A-Z][A-Z\s]{2,}[A-Z])(?:\n|$)").unwrap());
static NEXT_HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n(?:#{1,3}\s|[A-Z][A-Z\s]{2,}[A-Z]\n|[^\n]+\n[=\-]{3,})").unwrap());

/// Step 2: header/section match (markdown, underlined, or ALL CAPS headers).
fn find_header_section(query: &str, content: &str) -> Option<String> {
    let query_terms = extract_query_terms(query);
    if query_terms.is_empty() {
        return None;
    }

    for re in [&*MD_HEADER_RE, &*UNDERLINE_HEADER_RE, &*CAPS_HEADER_RE] {
        for cap in re.captures_iter(content) {
            let header_text = cap.get(2).or_else(|| cap.get(1))?.as_str();
            let header_lower = header_text.to_lowercase();
            if !query_terms.iter().any(|t| header_lower.contains(t.as_str())) {
                continue;
            }

            let whole_match = cap.get(0).unwrap();
            let start = whole_match.end();
            let rest = &content[start.min(content.len())..];
            let section_content = match NEXT_HEADER_RE.find(rest) {
                Some(next) => rest[..next.start()].to_string(),
                None => truncate(rest, MAX_LENGTH),
            };
            let result = format!("{}\n{}", header_text.trim(), section_content.trim());
            return Some(truncate(&result, MAX_LENGTH));
        }
    }
    None
}

/// Step 3 helper: extract the paragraph containing `search_term`.
fn extract_paragraph_around_match(content: &str, search_term: &str) -> String {
    let content_lower = content.to_lowercase();
    let pos = match content_lower.find(&search_term.to_lowercase()) {
        Some(p) => p,
        None => return truncate(content, MAX_LENGTH),
    };

    let para_start = content[..pos].rfind("\n\n").map(|p| p + 2).unwrap_or(0);
    let para_end = content[pos..].find("\n\n").map(|p| pos + p).unwrap_or(content.len());

    truncate(content[para_start..para_end].trim(), MAX_LENGTH)
}

/// Step 3: search the parent context for key-value, header, or phrase/term matches.
fn find_in_parent_context(query: &str, parent_context: &str) -> Option<String> {
    if parent_context.is_empty() {
        return None;
    }
    if let Some(kv) = find_key_value_match(query, parent_context) {
        return Some(kv);
    }
    if let Some(header) = find_header_section(query, parent_context) {
        return Some(header);
    }

    let parent_lower = parent_context.to_lowercase();
    for phrase in extract_query_phrases(query) {
        if parent_lower.contains(&phrase) {
            return Some(extract_paragraph_around_match(parent_context, &phrase));
        }
    }
    for term in extract_query_terms(query) {
        if parent_lower.contains(&term) {
            return Some(extract_paragraph_around_match(parent_context, &term));
        }
    }
    None
}

const ABBREVIATIONS: &[&str] =
    &["Mr.", "Mrs.", "Dr.", "Prof.", "Sr.", "Jr.", "vs.", "etc.", "e.g.", "i.e."];

// The `regex` crate has no lookbehind support, so sentence boundaries are
// located by matching punctuation-plus-whitespace directly and keeping the
// punctuation on the preceding sentence, rather than splitting on `\s+`
// behind a `[.!?]` lookbehind.
static SENTENCE_BOUNDARY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+\s+").unwrap());

fn split_into_sentences(content: &str) -> Vec<String> {
    let mut temp = content.to_string();
    for abbr in ABBREVIATIONS {
        temp = temp.replace(abbr, &abbr.replace('.', "<DOT>"));
    }

    let mut sentences = Vec::new();
    let mut last = 0;
    for m in SENTENCE_BOUNDARY_RE.find_iter(&temp) {
        let matched = &temp[m.start()..m.end()];
        let punct_len = matched.chars().take_while(|c| matches!(c, '.' | '!' | '?')).count();
        let punct_end = m.start() + punct_len;
        sentences.push(temp[last..punct_end].to_string());
        last = m.end();
    }
    if last < temp.len() {
        sentences.push(temp[last..].to_string());
    }

    sentences
        .into_iter()
        .map(|s| s.replace("<DOT>", ".").trim().to_string())
        .filter(|s| s.len() > 15)
        .collect()
}

/// Step 4: score sentences by phrase/term relevance, return a 3-sentence window.
fn find_best_sentence_window(query: &str, content: &str) -> Option<String> {
    let query_terms = extract_query_terms(query);
    let query_phrases = extract_query_phrases(query);
    if query_terms.is_empty() {
        return None;
    }

    let sentences = split_into_sentences(content);
    if sentences.is_empty() {
        return None;
    }

    let content_lower = content.to_lowercase();
    let term_frequency: HashMap<&String, usize> =
        query_terms.iter().map(|t| (t, content_lower.matches(t.as_str()).count())).collect();

    let mut best_idx: Option<usize> = None;
    let mut best_score = 0.0f64;

    for (i, sentence) in sentences.iter().enumerate() {
        let sentence_lower = sentence.to_lowercase();
        let mut score = 0.0f64;

        for phrase in &query_phrases {
            if sentence_lower.contains(phrase.as_str()) {
                score += 5.0;
            }
        }

        for term in &query_terms {
            if sentence_lower.contains(term.as_str()) {
                let freq = *term_frequency.get(term).unwrap_or(&1);
                let specificity_bonus = (5.0 - freq as f64).max(1.0);
                let length_bonus = (term.len() as f64 / 4.0).min(2.0);
                score += specificity_bonus + length_bonus;
            }
        }

        if score > best_score {
            best_score = score;
            best_idx = Some(i);
        }
    }

    let best_idx = best_idx?;
    if best_score == 0.0 {
        return None;
    }

    let mut window = Vec::new();
    if best_idx > 0 {
        window.push(sentences[best_idx - 1].clone());
    }
    window.push(sentences[best_idx].clone());
    if best_idx + 1 < sentences.len() {
        window.push(sentences[best_idx + 1].clone());
    }

    Some(truncate(&window.join(" "), MAX_LENGTH))
}

/// Step 5 / entry point: the five-step priority dispatcher.
pub fn extract_relevant_snippet(query: &str, content: &str, parent_context: Option<&str>) -> String {
    if content.is_empty() || query.is_empty() {
        return truncate(content, MAX_LENGTH);
    }

    if let Some(kv) = find_key_value_match(query, content) {
        return kv;
    }
    if let Some(header) = find_header_section(query, content) {
        return header;
    }
    if let Some(parent) = parent_context {
        if let Some(m) = find_in_parent_context(query, parent) {
            return m;
        }
    }
    if let Some(window) = find_best_sentence_window(query, content) {
        return window;
    }
    truncate(content, MAX_LENGTH)
}

fn truncate(text: &str, max_length: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_length {
        return text.to_string();
    }

    let truncated: String = text.chars().take(max_length).collect();

    for ending in [". ", "! ", "? ", ".\n", "!\n", "?\n"] {
        if let Some(last_end) = truncated.rfind(ending) {
            if last_end as f64 > max_length as f64 * 0.6 {
                return truncated[..last_end + 1].trim().to_string();
            }
        }
    }

    if let Some(last_space) = truncated.rfind(' ') {
        if last_space as f64 > max_length as f64 * 0.7 {
            return format!("{}...", truncated[..last_space].trim());
        }
    }

    format!("{}...", truncated.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_value_match_finds_labeled_section() {
        let content = "Summary\nExperienced engineer.\nEducation: B.Sc Computer Science, MIT\nSkills: Rust, Python";
        let snippet = extract_relevant_snippet("what degree do they have", content, None);
        assert!(snippet.to_lowercase().contains("education"));
    }

    #[test]
    fn header_match_finds_section_content() {
        let content = "## Skills\nRust, Python, Go\n\n## Projects\nBuilt a compiler";
        let snippet = extract_relevant_snippet("what are the skills", content, None);
        assert!(snippet.to_lowercase().contains("rust"));
    }

    #[test]
    fn falls_back_to_sentence_window_when_no_structure_matches() {
        let content = "The CAP theorem describes consistency tradeoffs in distributed systems. \
            It was first formalized by Eric Brewer. Many databases choose availability over consistency.";
        let snippet = extract_relevant_snippet("what is the CAP theorem", content, None);
        assert!(snippet.to_lowercase().contains("cap theorem"));
    }

    #[test]
    fn fallback_truncates_when_nothing_matches() {
        let content = "a ".repeat(400);
        let snippet = extract_relevant_snippet("xyz completely unrelated", &content, None);
        assert!(snippet.chars().count() <= MAX_LENGTH + 3);
    }

    #[test]
    fn empty_content_returns_empty() {
        assert_eq!(extract_relevant_snippet("query", "", None), "");
    }
}
