use std::sync::Arc;

use rapport_provider::EmotionClassifier;
use rapport_schema::{EmotionScore, OverallState, Signal, StyleFlags, UNKNOWN_LANGUAGE};

use crate::language::LanguageDetector;
use crate::lexicon::{contains_any, contains_any_word, tokens, Lexicon};

const CAPS_RATIO_THRESHOLD: f32 = 0.6;
const STRETCH_RUN: usize = 4;

#[derive(Debug, Clone)]
pub struct SignalSettings {
    /// Inputs shorter than this (in chars) skip detection and take `default_language`.
    pub short_text_chars: usize,
    pub confidence_threshold: f32,
    pub default_language: String,
}

impl Default for SignalSettings {
    fn default() -> Self {
        Self {
            short_text_chars: 20,
            confidence_threshold: 0.75,
            default_language: "en".to_string(),
        }
    }
}

/// Outcome of one override check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Override {
    Escalate(OverallState),
    /// Matched, and no later override may run.
    Suppress,
    Pass,
}

type OverrideCheck = fn(&Lexicon, &str) -> Override;

/// Evaluated top-down, first non-`Pass` outcome wins.
const OVERRIDES: &[(&str, OverrideCheck)] = &[("grief", grief_override), ("slang", slang_override)];

fn grief_override(lexicon: &Lexicon, lower: &str) -> Override {
    if contains_any(lower, &lexicon.grief_override) {
        Override::Escalate(OverallState::StrongDistress)
    } else {
        Override::Pass
    }
}

fn slang_override(lexicon: &Lexicon, lower: &str) -> Override {
    if contains_any(lower, &lexicon.win_slang) {
        return Override::Suppress;
    }
    if contains_any(lower, &lexicon.distress_slang) || idiom_with_marker(lexicon, lower) {
        return Override::Escalate(OverallState::StrongDistress);
    }
    Override::Pass
}

/// The idiom alone is too ambiguous ("dinner is cooked"); it needs a
/// first-person or intensity marker somewhere in the same message.
fn idiom_with_marker(lexicon: &Lexicon, lower: &str) -> bool {
    tokens(lower).iter().any(|word| *word == lexicon.slang_idiom)
        && contains_any_word(lower, &lexicon.slang_markers)
}

fn severity(state: OverallState) -> u8 {
    match state {
        OverallState::StrongDistress => 2,
        OverallState::Distress => 1,
        _ => 0,
    }
}

/// Applies the override list. Escalations never lower the distress tier.
fn apply_overrides(lexicon: &Lexicon, lower: &str, base: OverallState) -> OverallState {
    for (name, check) in OVERRIDES {
        match check(lexicon, lower) {
            Override::Pass => continue,
            Override::Suppress => {
                tracing::debug!(rule = name, "override suppressed");
                return base;
            }
            Override::Escalate(target) => {
                tracing::debug!(rule = name, from = %base, to = %target, "override escalated");
                return if severity(target) >= severity(base) {
                    target
                } else {
                    base
                };
            }
        }
    }
    base
}

/// Maps the top-ranked label through the positive/negative label groups.
pub fn state_from_ranking(
    lexicon: &Lexicon,
    ranking: &[EmotionScore],
    threshold: f32,
) -> OverallState {
    let Some(top) = ranking.first() else {
        return OverallState::Neutral;
    };
    let strong = top.score > threshold;
    if lexicon.is_negative_label(&top.label) {
        if strong {
            OverallState::StrongDistress
        } else {
            OverallState::Distress
        }
    } else if lexicon.is_positive_label(&top.label) {
        if strong {
            OverallState::SuperHappy
        } else {
            OverallState::Happy
        }
    } else {
        OverallState::Neutral
    }
}

/// Keyword fallback used when the classifier cannot answer.
pub fn heuristic_state(lexicon: &Lexicon, lower: &str) -> OverallState {
    if contains_any_word(lower, &lexicon.heuristic_negative) {
        OverallState::Distress
    } else if contains_any_word(lower, &lexicon.heuristic_positive) {
        OverallState::Happy
    } else {
        OverallState::Neutral
    }
}

pub fn style_flags(lexicon: &Lexicon, text: &str) -> StyleFlags {
    StyleFlags {
        caps_intense: caps_intense(text),
        stretch_intense: stretch_intense(text),
        bro_style: contains_any_word(&text.to_lowercase(), &lexicon.bro_terms),
    }
}

fn caps_intense(text: &str) -> bool {
    let (letters, upper) = text
        .chars()
        .filter(|c| c.is_alphabetic())
        .fold((0usize, 0usize), |(n, u), c| {
            (n + 1, u + usize::from(c.is_uppercase()))
        });
    letters > 0 && (upper as f32 / letters as f32) > CAPS_RATIO_THRESHOLD
}

fn stretch_intense(text: &str) -> bool {
    let mut run = 0;
    let mut prev: Option<char> = None;
    for c in text.chars() {
        if prev == Some(c) {
            run += 1;
        } else {
            run = 1;
            prev = Some(c);
        }
        if run >= STRETCH_RUN && !c.is_whitespace() {
            return true;
        }
    }
    false
}

pub struct SignalExtractor {
    lexicon: Arc<Lexicon>,
    classifier: Arc<dyn EmotionClassifier>,
    detector: Arc<dyn LanguageDetector>,
    settings: SignalSettings,
}

impl SignalExtractor {
    pub fn new(
        lexicon: Arc<Lexicon>,
        classifier: Arc<dyn EmotionClassifier>,
        detector: Arc<dyn LanguageDetector>,
        settings: SignalSettings,
    ) -> Self {
        Self {
            lexicon,
            classifier,
            detector,
            settings,
        }
    }

    fn language(&self, clean: &str) -> String {
        if clean.chars().count() < self.settings.short_text_chars {
            return self.settings.default_language.clone();
        }
        self.detector
            .detect(clean)
            .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string())
    }

    pub async fn extract(&self, text: &str) -> Signal {
        let clean = text.trim();
        if clean.is_empty() {
            return Signal::empty();
        }
        let lower = clean.to_lowercase();

        let (emotion_ranking, base) = match self.classifier.classify(clean).await {
            Ok(ranking) => {
                let state =
                    state_from_ranking(&self.lexicon, &ranking, self.settings.confidence_threshold);
                (ranking, state)
            }
            Err(error) => {
                tracing::warn!(model = self.classifier.model_id(), %error, "emotion classifier failed, using keyword heuristic");
                (Vec::new(), heuristic_state(&self.lexicon, &lower))
            }
        };

        let overall_state = apply_overrides(&self.lexicon, &lower, base);

        Signal {
            language: self.language(clean),
            emotion_ranking,
            overall_state,
            style_flags: style_flags(&self.lexicon, clean),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::ScriptLanguageDetector;
    use async_trait::async_trait;
    use rapport_provider::{ClassifierError, OfflineClassifier};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedClassifier {
        ranking: Vec<EmotionScore>,
        calls: AtomicUsize,
    }

    impl ScriptedClassifier {
        fn new(label: &str, score: f32) -> Self {
            Self {
                ranking: vec![EmotionScore::new(label, score)],
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmotionClassifier for ScriptedClassifier {
        async fn classify(&self, _text: &str) -> Result<Vec<EmotionScore>, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.ranking.clone())
        }

        fn model_id(&self) -> &str {
            "scripted"
        }
    }

    fn extractor(classifier: Arc<dyn EmotionClassifier>) -> SignalExtractor {
        SignalExtractor::new(
            Arc::new(Lexicon::builtin()),
            classifier,
            Arc::new(ScriptLanguageDetector),
            SignalSettings::default(),
        )
    }

    #[tokio::test]
    async fn blank_input_is_zero_signal_without_classifier_call() {
        let classifier = Arc::new(ScriptedClassifier::new("joy", 0.9));
        let ex = extractor(classifier.clone());
        for text in ["", "   ", "\n\t "] {
            assert_eq!(ex.extract(text).await, Signal::empty());
        }
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn grief_overrides_positive_classifier() {
        let ex = extractor(Arc::new(ScriptedClassifier::new("joy", 0.99)));
        let signal = ex.extract("my dog died yesterday").await;
        assert_eq!(signal.overall_state, OverallState::StrongDistress);
        assert_eq!(signal.labels(), vec!["joy"]);
    }

    #[tokio::test]
    async fn cooked_idiom_with_markers_escalates() {
        let ex = extractor(Arc::new(OfflineClassifier));
        let signal = ex.extract("IM SO COOKED FOR THIS EXAM").await;
        assert!(signal.style_flags.caps_intense);
        assert_eq!(signal.overall_state, OverallState::StrongDistress);
        assert!(signal.emotion_ranking.is_empty());
    }

    #[tokio::test]
    async fn win_pattern_suppresses_slang_distress() {
        let ex = extractor(Arc::new(ScriptedClassifier::new("joy", 0.6)));
        let signal = ex.extract("we cooked that presentation").await;
        assert_eq!(signal.overall_state, OverallState::Happy);

        // distress phrase present too, win still wins
        let signal = ex.extract("we cooked them but honestly i give up").await;
        assert_eq!(signal.overall_state, OverallState::Happy);
    }

    #[tokio::test]
    async fn cooked_marker_may_follow_the_idiom() {
        let ex = extractor(Arc::new(OfflineClassifier));
        for text in ["i got cooked so hard", "the exam cooked me so bad"] {
            let signal = ex.extract(text).await;
            assert_eq!(signal.overall_state, OverallState::StrongDistress, "{text}");
        }
    }

    #[tokio::test]
    async fn cooked_without_marker_is_left_alone() {
        let ex = extractor(Arc::new(OfflineClassifier));
        let signal = ex.extract("dinner is cooked").await;
        assert_eq!(signal.overall_state, OverallState::Neutral);
    }

    #[tokio::test]
    async fn threshold_is_strictly_greater() {
        let ex = extractor(Arc::new(ScriptedClassifier::new("sadness", 0.75)));
        assert_eq!(
            ex.extract("a plain sentence").await.overall_state,
            OverallState::Distress
        );
        let ex = extractor(Arc::new(ScriptedClassifier::new("sadness", 0.76)));
        assert_eq!(
            ex.extract("a plain sentence").await.overall_state,
            OverallState::StrongDistress
        );
    }

    #[tokio::test]
    async fn unknown_label_is_neutral() {
        let ex = extractor(Arc::new(ScriptedClassifier::new("disgust", 0.95)));
        assert_eq!(
            ex.extract("that is weird").await.overall_state,
            OverallState::Neutral
        );
    }

    #[tokio::test]
    async fn heuristic_fallback_when_classifier_unavailable() {
        let ex = extractor(Arc::new(OfflineClassifier));
        assert_eq!(
            ex.extract("i feel so anxious today").await.overall_state,
            OverallState::Distress
        );
        assert_eq!(
            ex.extract("i am so happy right now").await.overall_state,
            OverallState::Happy
        );
        assert_eq!(
            ex.extract("the bus is late").await.overall_state,
            OverallState::Neutral
        );
    }

    #[tokio::test]
    async fn short_text_uses_default_language() {
        let ex = extractor(Arc::new(OfflineClassifier));
        assert_eq!(ex.extract("hola").await.language, "en");
        assert_eq!(
            ex.extract("zzzz qqqq wwww xxxx yyyy").await.language,
            UNKNOWN_LANGUAGE
        );
    }

    #[test]
    fn style_flags_are_independent() {
        let lexicon = Lexicon::builtin();
        let flags = style_flags(&lexicon, "noooooo bro");
        assert!(flags.stretch_intense);
        assert!(flags.bro_style);
        assert!(!flags.caps_intense);

        let flags = style_flags(&lexicon, "my manager said so");
        assert!(!flags.bro_style);
        assert!(!style_flags(&lexicon, "wait    what").stretch_intense);
        assert!(style_flags(&lexicon, "WHAT IS THIS").caps_intense);
    }

    #[test]
    fn escalation_never_downgrades() {
        let lexicon = Lexicon::builtin();
        assert_eq!(
            apply_overrides(&lexicon, "i give up", OverallState::StrongDistress),
            OverallState::StrongDistress
        );
        assert_eq!(
            apply_overrides(&lexicon, "i give up", OverallState::Happy),
            OverallState::StrongDistress
        );
        assert_eq!(
            apply_overrides(&lexicon, "nothing special", OverallState::Distress),
            OverallState::Distress
        );
    }
}
