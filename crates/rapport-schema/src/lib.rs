use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Language tag used whenever detection is skipped or fails.
pub const UNKNOWN_LANGUAGE: &str = "unknown";

#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionKey(pub String);

impl SessionKey {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Coarse emotional bucket for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverallState {
    #[default]
    Neutral,
    Happy,
    SuperHappy,
    Distress,
    StrongDistress,
}

impl OverallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Happy => "happy",
            Self::SuperHappy => "super_happy",
            Self::Distress => "distress",
            Self::StrongDistress => "strong_distress",
        }
    }

    pub fn is_positive(&self) -> bool {
        matches!(self, Self::Happy | Self::SuperHappy)
    }

    pub fn is_negative(&self) -> bool {
        matches!(self, Self::Distress | Self::StrongDistress)
    }
}

impl fmt::Display for OverallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classifier label with its confidence in `0.0..=1.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionScore {
    pub label: String,
    pub score: f32,
}

impl EmotionScore {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score: score.clamp(0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StyleFlags {
    pub caps_intense: bool,
    pub stretch_intense: bool,
    pub bro_style: bool,
}

impl StyleFlags {
    pub fn is_intense(&self) -> bool {
        self.caps_intense || self.stretch_intense
    }
}

/// Emotion and style reading of a single inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub language: String,
    /// Classifier output, best label first. Empty when the classifier was unavailable.
    #[serde(default)]
    pub emotion_ranking: Vec<EmotionScore>,
    pub overall_state: OverallState,
    #[serde(default)]
    pub style_flags: StyleFlags,
}

impl Signal {
    /// The zero signal produced for blank input.
    pub fn empty() -> Self {
        Self {
            language: UNKNOWN_LANGUAGE.to_string(),
            emotion_ranking: Vec::new(),
            overall_state: OverallState::Neutral,
            style_flags: StyleFlags::default(),
        }
    }

    pub fn labels(&self) -> Vec<&str> {
        self.emotion_ranking
            .iter()
            .map(|e| e.label.as_str())
            .collect()
    }

    pub fn top_emotion(&self) -> Option<&EmotionScore> {
        self.emotion_ranking.first()
    }
}

/// Named behavioral contract for a reply. Exactly one is active per message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleId {
    Goodbye,
    Grief,
    Injury,
    Crying,
    ProfessionalStress,
    Identity,
    Casual,
    Hype,
    Care,
    DefaultNeutral,
}

impl RuleId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Goodbye => "goodbye",
            Self::Grief => "grief",
            Self::Injury => "injury",
            Self::Crying => "crying",
            Self::ProfessionalStress => "professional_stress",
            Self::Identity => "identity",
            Self::Casual => "casual",
            Self::Hype => "hype",
            Self::Care => "care",
            Self::DefaultNeutral => "default_neutral",
        }
    }

    /// Rules that put the reply into emotional-support mode.
    pub fn is_emotional_mode(&self) -> bool {
        matches!(
            self,
            Self::Grief | Self::Injury | Self::Crying | Self::Hype | Self::Care
        )
    }

    /// Rules whose contract disallows any follow-up question.
    pub fn forbids_questions(&self) -> bool {
        matches!(self, Self::Goodbye | Self::Grief)
    }

    /// Rules whose own instruction already asks a clarifying question, so the
    /// generic continuity hook must not stack a second one.
    pub fn carries_own_question(&self) -> bool {
        matches!(self, Self::Injury)
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleModifier {
    EnergyMatch,
    SlangMirror,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub rule_id: RuleId,
    pub continuity_question_required: bool,
    #[serde(default)]
    pub modifiers: Vec<StyleModifier>,
    pub long_message_ack: bool,
}

impl Policy {
    pub fn emotional_mode(&self) -> bool {
        self.rule_id.is_emotional_mode()
    }

    pub fn has_modifier(&self, modifier: StyleModifier) -> bool {
        self.modifiers.contains(&modifier)
    }
}

/// Output constraint the final reply must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyContract {
    pub max_sentences: usize,
    pub must_contain_question: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: TurnRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            at: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(TurnRole::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, text)
    }

    /// `role: text` line used in prompt context blocks.
    pub fn render(&self) -> String {
        format!("{}: {}", self.role.as_str(), self.text)
    }
}

/// Everything returned to the caller for one handled message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub session_id: SessionKey,
    pub trace_id: Uuid,
    pub reply: String,
    pub overall_state: OverallState,
    pub signal: Signal,
    pub policy: Option<Policy>,
    pub stored_summary: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_signal_is_neutral_and_unknown() {
        let signal = Signal::empty();
        assert_eq!(signal.language, "unknown");
        assert!(signal.emotion_ranking.is_empty());
        assert_eq!(signal.overall_state, OverallState::Neutral);
        assert_eq!(signal.style_flags, StyleFlags::default());
    }

    #[test]
    fn overall_state_serializes_snake_case() {
        let json = serde_json::to_string(&OverallState::StrongDistress).unwrap();
        assert_eq!(json, "\"strong_distress\"");
        let parsed: OverallState = serde_json::from_str("\"super_happy\"").unwrap();
        assert_eq!(parsed, OverallState::SuperHappy);
    }

    #[test]
    fn rule_flags_match_contracts() {
        assert!(RuleId::Grief.forbids_questions());
        assert!(RuleId::Goodbye.forbids_questions());
        assert!(!RuleId::Goodbye.is_emotional_mode());
        assert!(RuleId::Care.is_emotional_mode());
        assert!(!RuleId::ProfessionalStress.is_emotional_mode());
        assert!(RuleId::Injury.carries_own_question());
    }

    #[test]
    fn emotion_score_clamps_confidence() {
        assert_eq!(EmotionScore::new("joy", 1.7).score, 1.0);
        assert_eq!(EmotionScore::new("joy", -0.2).score, 0.0);
    }

    #[test]
    fn turn_renders_role_prefix() {
        let turn = Turn::user("hello there");
        assert_eq!(turn.render(), "user: hello there");
        assert_eq!(Turn::assistant("hi").render(), "assistant: hi");
    }

    #[test]
    fn signal_labels_keep_ranking_order() {
        let signal = Signal {
            language: "en".into(),
            emotion_ranking: vec![
                EmotionScore::new("sadness", 0.8),
                EmotionScore::new("fear", 0.1),
            ],
            overall_state: OverallState::StrongDistress,
            style_flags: StyleFlags::default(),
        };
        assert_eq!(signal.labels(), vec!["sadness", "fear"]);
        assert_eq!(signal.top_emotion().map(|e| e.label.as_str()), Some("sadness"));
    }
}
