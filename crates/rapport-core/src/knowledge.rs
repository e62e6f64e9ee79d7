use std::sync::Arc;
use std::time::Duration;

use rapport_provider::KnowledgeSource;
use tokio::time;

use crate::lexicon::{contains_any_word, Lexicon};

/// Messages this short are treated as likely entity references.
pub const SHORT_MESSAGE_WORDS: usize = 6;

pub fn should_lookup_knowledge(lexicon: &Lexicon, text: &str) -> bool {
    let lower = text.to_lowercase();
    contains_any_word(&lower, &lexicon.knowledge_markers)
        || lower.split_whitespace().count() <= SHORT_MESSAGE_WORDS
}

/// Fail-open background lookup. Errors and timeouts become an empty snippet.
pub struct KnowledgeLookup {
    source: Arc<dyn KnowledgeSource>,
    lexicon: Arc<Lexicon>,
    timeout: Duration,
}

impl KnowledgeLookup {
    pub fn new(source: Arc<dyn KnowledgeSource>, lexicon: Arc<Lexicon>, timeout: Duration) -> Self {
        Self {
            source,
            lexicon,
            timeout,
        }
    }

    pub async fn snippet_for(&self, text: &str) -> String {
        if !should_lookup_knowledge(&self.lexicon, text) {
            return String::new();
        }
        match time::timeout(self.timeout, self.source.lookup(text)).await {
            Ok(Ok(snippet)) => snippet,
            Ok(Err(error)) => {
                tracing::warn!(%error, "knowledge lookup failed, continuing without it");
                String::new()
            }
            Err(_) => {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "knowledge lookup timed out");
                String::new()
            }
        }
    }
}
