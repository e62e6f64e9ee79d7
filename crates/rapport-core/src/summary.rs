use std::sync::Arc;

use anyhow::{Context, Result};
use rapport_schema::Turn;

use crate::router::{GenerationProfile, ReplyGenerator};

pub const DEFAULT_SUMMARY_EVERY: usize = 10;
pub const DEFAULT_SUMMARY_SOURCE_TURNS: usize = 30;

const SUMMARY_INSTRUCTIONS: &str = "\
Summarize this conversation in 2 short lines.

Include:
- main emotional theme
- main situation topic

Do not give advice.
Do not change tone.
Just neutral summary.";

/// True when `turn_count` is a positive multiple of `every`.
pub fn should_refresh_summary(turn_count: usize, every: usize) -> bool {
    every > 0 && turn_count > 0 && turn_count % every == 0
}

/// Rebuilds the rolling summary from the tail of the transcript.
pub struct SummaryBuilder {
    generator: Arc<ReplyGenerator>,
    every: usize,
    source_turns: usize,
}

impl SummaryBuilder {
    pub fn new(generator: Arc<ReplyGenerator>, every: usize, source_turns: usize) -> Self {
        Self {
            generator,
            every,
            source_turns,
        }
    }

    pub fn is_due(&self, turn_count: usize) -> bool {
        should_refresh_summary(turn_count, self.every)
    }

    pub fn prompt(&self, turns: &[Turn]) -> String {
        let start = turns.len().saturating_sub(self.source_turns);
        let transcript = turns[start..]
            .iter()
            .map(Turn::render)
            .collect::<Vec<_>>()
            .join("\n");
        format!("{SUMMARY_INSTRUCTIONS}\n\nConversation:\n{transcript}")
    }

    pub async fn build(&self, turns: &[Turn]) -> Result<String> {
        if turns.is_empty() {
            return Ok(String::new());
        }
        let summary = self
            .generator
            .generate(&GenerationProfile::SUMMARY, &self.prompt(turns))
            .await
            .context("summary generation failed")?;
        Ok(summary.trim().to_string())
    }
}
