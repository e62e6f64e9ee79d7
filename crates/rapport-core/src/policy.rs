use std::sync::Arc;

use rapport_schema::{Policy, RuleId, Signal, StyleModifier};

use crate::lexicon::{contains_any_word_prefix, Lexicon};

pub const LONG_MESSAGE_WORDS: usize = 40;
/// Continuity questions are only forced early in a conversation.
pub const CONTINUITY_MAX_DEPTH: usize = 2;

/// Inputs every rule predicate sees. `lower` is the trimmed, lowercased text.
pub struct RuleInput<'a> {
    pub lower: &'a str,
    pub signal: &'a Signal,
    pub lexicon: &'a Lexicon,
}

type RulePredicate = fn(&RuleInput<'_>) -> bool;

/// Priority order. The first predicate that holds picks the rule; the final
/// entry always holds, so selection is total.
const DECISION_LIST: &[(RuleId, RulePredicate)] = &[
    (RuleId::Goodbye, is_goodbye),
    (RuleId::Grief, mentions_grief),
    (RuleId::Injury, mentions_injury),
    (RuleId::Crying, mentions_crying),
    (RuleId::ProfessionalStress, mentions_work_pressure),
    (RuleId::Identity, asks_identity),
    (RuleId::Casual, mentions_lifestyle),
    (RuleId::Hype, is_celebrating),
    (RuleId::Care, is_struggling),
    (RuleId::DefaultNeutral, always),
];

fn mentions_grief(i: &RuleInput<'_>) -> bool {
    contains_any_word_prefix(i.lower, &i.lexicon.grief)
}

fn mentions_injury(i: &RuleInput<'_>) -> bool {
    contains_any_word_prefix(i.lower, &i.lexicon.injury)
}

fn mentions_crying(i: &RuleInput<'_>) -> bool {
    contains_any_word_prefix(i.lower, &i.lexicon.crying)
}

fn mentions_work_pressure(i: &RuleInput<'_>) -> bool {
    contains_any_word_prefix(i.lower, &i.lexicon.professional)
}

fn asks_identity(i: &RuleInput<'_>) -> bool {
    contains_any_word_prefix(i.lower, &i.lexicon.identity)
}

fn mentions_lifestyle(i: &RuleInput<'_>) -> bool {
    contains_any_word_prefix(i.lower, &i.lexicon.casual)
}

fn is_celebrating(i: &RuleInput<'_>) -> bool {
    contains_any_word_prefix(i.lower, &i.lexicon.celebration)
        || i.signal.overall_state.is_positive()
}

fn is_struggling(i: &RuleInput<'_>) -> bool {
    i.signal.overall_state.is_negative()
        || contains_any_word_prefix(i.lower, &i.lexicon.distress_hint)
}

fn always(_: &RuleInput<'_>) -> bool {
    true
}

fn is_goodbye(input: &RuleInput<'_>) -> bool {
    let stripped = input
        .lower
        .trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace());
    input.lexicon.goodbye.iter().any(|g| g == stripped)
}

/// Number of non-empty `|`-separated segments in a rendered context block.
pub fn conversation_depth(context_block: &str) -> usize {
    context_block
        .split('|')
        .filter(|segment| !segment.trim().is_empty())
        .count()
}

pub fn is_long_message(text: &str) -> bool {
    text.split_whitespace().count() > LONG_MESSAGE_WORDS
}

#[derive(Clone)]
pub struct PolicySelector {
    lexicon: Arc<Lexicon>,
}

impl PolicySelector {
    pub fn new(lexicon: Arc<Lexicon>) -> Self {
        Self { lexicon }
    }

    pub fn select_rule(&self, text: &str, signal: &Signal) -> RuleId {
        let lower = text.trim().to_lowercase();
        let input = RuleInput {
            lower: &lower,
            signal,
            lexicon: &self.lexicon,
        };
        DECISION_LIST
            .iter()
            .find(|(_, predicate)| predicate(&input))
            .map(|(rule, _)| *rule)
            .unwrap_or(RuleId::DefaultNeutral)
    }

    pub fn select(
        &self,
        text: &str,
        signal: &Signal,
        conversation_depth: usize,
        is_long_message: bool,
    ) -> Policy {
        let rule_id = self.select_rule(text, signal);
        let emotional = rule_id.is_emotional_mode();

        let continuity_question_required = emotional
            && conversation_depth <= CONTINUITY_MAX_DEPTH
            && !rule_id.forbids_questions()
            && !rule_id.carries_own_question();

        let mut modifiers = Vec::new();
        if signal.style_flags.is_intense() {
            modifiers.push(StyleModifier::EnergyMatch);
        }
        if signal.style_flags.bro_style {
            modifiers.push(StyleModifier::SlangMirror);
        }

        let policy = Policy {
            rule_id,
            continuity_question_required,
            modifiers,
            long_message_ack: is_long_message && emotional,
        };
        tracing::info!(
            rule = %policy.rule_id,
            continuity = policy.continuity_question_required,
            long_ack = policy.long_message_ack,
            depth = conversation_depth,
            "policy selected"
        );
        policy
    }
}
