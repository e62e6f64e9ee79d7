use std::sync::Arc;

use rapport_schema::ReplyContract;

use crate::lexicon::{contains_any_word_prefix, Lexicon};

pub const DEFAULT_SENTENCE_CAP: usize = 3;
pub const HEAVY_SENTENCE_CAP: usize = 4;
pub const CLARIFYING_QUESTION: &str = "What happened there?";
/// Used when generation is exhausted or produced nothing.
pub const FALLBACK_REPLY: &str = "Something glitched — can you say that again?";

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Splits after `.`, `!` or `?` when followed by whitespace. Fragments are
/// trimmed and empty ones dropped.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut prev: Option<char> = None;
    for (idx, c) in text.char_indices() {
        if c.is_whitespace() && prev.is_some_and(is_terminal) {
            parts.push(&text[start..idx]);
            start = idx;
        }
        prev = Some(c);
    }
    parts.push(&text[start..]);
    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Post-generation guard: caps sentence count, fixes terminal punctuation and
/// adds a clarifying question for heavy inputs that got none.
#[derive(Clone)]
pub struct ReplyEnforcer {
    lexicon: Arc<Lexicon>,
}

impl ReplyEnforcer {
    pub fn new(lexicon: Arc<Lexicon>) -> Self {
        Self { lexicon }
    }

    pub fn is_grief(&self, original_text: &str) -> bool {
        contains_any_word_prefix(&original_text.to_lowercase(), &self.lexicon.reply_grief)
    }

    pub fn is_heavy(&self, original_text: &str) -> bool {
        contains_any_word_prefix(&original_text.to_lowercase(), &self.lexicon.reply_heavy)
    }

    pub fn contract_for(&self, original_text: &str) -> ReplyContract {
        let heavy = self.is_heavy(original_text);
        let max_sentences = if heavy || self.is_grief(original_text) {
            HEAVY_SENTENCE_CAP
        } else {
            DEFAULT_SENTENCE_CAP
        };
        ReplyContract {
            max_sentences,
            must_contain_question: heavy,
        }
    }

    pub fn enforce(&self, generated_text: &str, original_text: &str) -> String {
        let contract = self.contract_for(original_text);

        let raw = match generated_text.trim() {
            "" => FALLBACK_REPLY,
            trimmed => trimmed,
        };

        let parts = split_sentences(raw);
        let mut reply = if parts.is_empty() {
            raw.to_string()
        } else {
            parts
                .iter()
                .take(contract.max_sentences)
                .copied()
                .collect::<Vec<_>>()
                .join(" ")
        };

        if !reply.ends_with(is_terminal) {
            reply.push('.');
        }

        if contract.must_contain_question && !reply.contains('?') {
            reply.push(' ');
            reply.push_str(CLARIFYING_QUESTION);
        }
        reply
    }
}
