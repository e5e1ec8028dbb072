//! Heuristic struggle detection.
//!
//! Contract: [`detect_struggle`] takes one raw user utterance and returns
//! whether it reads as an expression of confusion; it never inspects
//! history. [`extract_candidate_concepts`] takes recent conversation
//! messages and returns code-like concept tokens worth tracking, most
//! recent first, deduplicated. Both are plain functions so a model-based
//! classifier can replace them behind the same signatures.

use crate::session::Message;

/// Phrases that indicate the learner is struggling. Matching is
/// case-insensitive substring search.
const STRUGGLE_MARKERS: &[&str] = &[
    "i don't understand",
    "i dont understand",
    "don't get it",
    "dont get it",
    "confused",
    "confusing",
    "makes no sense",
    "doesn't make sense",
    "i'm lost",
    "im lost",
    "what does this mean",
    "no idea",
    "unclear",
];

/// Maximum messages of history scanned for candidate concepts.
const CONCEPT_WINDOW: usize = 6;

/// Maximum concepts returned per detection.
const MAX_CONCEPTS: usize = 3;

/// Returns true if the utterance matches struggle-indicator phrasing.
pub fn detect_struggle(user_text: &str) -> bool {
    let lowered = user_text.to_lowercase();
    STRUGGLE_MARKERS.iter().any(|m| lowered.contains(m))
}

/// Extracts code-like tokens (backticked spans, `snake_case`, `CamelCase`,
/// and `dotted.paths`) from the most recent messages.
pub fn extract_candidate_concepts(recent: &[Message]) -> Vec<String> {
    let mut concepts: Vec<String> = Vec::new();

    for message in recent.iter().rev().take(CONCEPT_WINDOW) {
        for token in candidate_tokens(&message.content) {
            if concepts.len() >= MAX_CONCEPTS {
                return concepts;
            }
            if !concepts.iter().any(|c| c.eq_ignore_ascii_case(&token)) {
                concepts.push(token);
            }
        }
    }
    concepts
}

fn candidate_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();

    // Backticked spans are the strongest signal.
    let mut parts = text.split('`');
    // Odd-indexed parts are inside backticks.
    let _ = parts.next();
    while let (Some(inside), rest) = (parts.next(), parts.next()) {
        if !inside.trim().is_empty() && inside.len() < 60 {
            tokens.push(inside.trim().to_string());
        }
        if rest.is_none() {
            break;
        }
    }

    for word in text.split(|c: char| c.is_whitespace() || ",;:()[]{}<>\"'!".contains(c)) {
        let word = word.trim_matches(|c: char| c == '.' || c == '?');
        if !word.is_ascii() || word.len() < 3 || word.len() > 50 {
            continue;
        }
        if looks_code_like(word) {
            tokens.push(word.to_string());
        }
    }
    tokens
}

fn looks_code_like(word: &str) -> bool {
    let has_interior_underscore = word[1..].contains('_');
    let has_interior_dot = word[1..word.len() - 1].contains('.');
    let is_camel = word.starts_with(|c: char| c.is_ascii_lowercase())
        && word.contains(|c: char| c.is_ascii_uppercase());
    let is_pascal_pair = word.starts_with(|c: char| c.is_ascii_uppercase())
        && word[1..].contains(|c: char| c.is_ascii_uppercase())
        && word[1..].contains(|c: char| c.is_ascii_lowercase());
    has_interior_underscore || has_interior_dot || is_camel || is_pascal_pair
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_confusion_phrases() {
        assert!(detect_struggle("I don't understand the tower Service trait"));
        assert!(detect_struggle("this is really CONFUSING"));
        assert!(detect_struggle("that makes no sense to me"));
    }

    #[test]
    fn ignores_ordinary_messages() {
        assert!(!detect_struggle("what is middleware?"));
        assert!(!detect_struggle("ok, show me the router"));
        assert!(!detect_struggle(""));
    }

    #[test]
    fn extracts_backticked_and_cased_tokens() {
        let messages = vec![
            Message::assistant(
                "Look at `into_make_service` and how ServiceBuilder wraps the stack",
                vec![],
            ),
            Message::user("i don't get the handle_socket part"),
        ];
        let concepts = extract_candidate_concepts(&messages);
        assert!(concepts.iter().any(|c| c == "handle_socket"));
        assert!(concepts.iter().any(|c| c == "into_make_service"));
    }

    #[test]
    fn skips_plain_english_words() {
        let messages = vec![Message::user("I really do not follow this at all")];
        assert!(extract_candidate_concepts(&messages).is_empty());
    }

    #[test]
    fn caps_and_dedupes_concepts() {
        let messages = vec![Message::user(
            "`tower_layer` tower_layer `axum_core` `serde_json` `tokio_util` extras",
        )];
        let concepts = extract_candidate_concepts(&messages);
        assert!(concepts.len() <= MAX_CONCEPTS);
        let lowered: Vec<String> = concepts.iter().map(|c| c.to_lowercase()).collect();
        let mut deduped = lowered.clone();
        deduped.dedup();
        assert_eq!(lowered, deduped);
    }
}
