//! Phrase tables that drive every keyword decision in the pipeline.
//!
//! All tables live in one versioned [`Lexicon`] value so that a change to a
//! keyword list is a data change, reviewable and testable on its own. A YAML
//! file may override individual tables; anything it omits keeps the builtin
//! list.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const LEXICON_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Lexicon {
    pub version: u32,

    // classifier label groups
    pub negative_labels: Vec<String>,
    pub positive_labels: Vec<String>,

    // signal overrides (substring matched)
    pub grief_override: Vec<String>,
    pub distress_slang: Vec<String>,
    pub win_slang: Vec<String>,
    pub slang_idiom: String,
    pub slang_markers: Vec<String>,

    // style and fallback heuristic
    pub bro_terms: Vec<String>,
    pub heuristic_positive: Vec<String>,
    pub heuristic_negative: Vec<String>,

    // policy selection
    pub goodbye: Vec<String>,
    pub grief: Vec<String>,
    pub injury: Vec<String>,
    pub crying: Vec<String>,
    pub professional: Vec<String>,
    pub identity: Vec<String>,
    pub casual: Vec<String>,
    pub celebration: Vec<String>,
    pub distress_hint: Vec<String>,

    // reply enforcement
    pub reply_grief: Vec<String>,
    pub reply_heavy: Vec<String>,

    pub knowledge_markers: Vec<String>,
}

fn table(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for Lexicon {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Lexicon {
    pub fn builtin() -> Self {
        Self {
            version: LEXICON_VERSION,
            negative_labels: table(&["sadness", "anger", "frustration", "fear"]),
            positive_labels: table(&["happiness", "joy", "surprise"]),
            grief_override: table(&[
                "died",
                "passed away",
                "lost my",
                "funeral",
                "death",
                "put to sleep",
            ]),
            distress_slang: table(&[
                "i'm cooked",
                "im cooked",
                "i am cooked",
                "feeling cooked",
                "i'm done",
                "im done",
                "i'm finished",
                "im finished",
                "i cant anymore",
                "i can't anymore",
                "i give up",
                "i'm not okay",
                "im not okay",
                "this is bad for me",
            ]),
            win_slang: table(&[
                "we cooked",
                "we are cooking",
                "we're cooking",
                "they got cooked",
                "he got cooked",
                "she got cooked",
            ]),
            slang_idiom: "cooked".to_string(),
            slang_markers: table(&["i'm", "im", "i am", "feeling", "so", "too"]),
            bro_terms: table(&["bro", "dude", "man", "bruh"]),
            heuristic_positive: table(&[
                "happy", "glad", "great", "excited", "awesome", "amazing", "love", "yay",
                "proud", "thrilled",
            ]),
            heuristic_negative: table(&[
                "sad", "angry", "upset", "scared", "afraid", "anxious", "stressed",
                "worried", "hate", "lonely", "frustrated", "overwhelmed",
            ]),
            goodbye: table(&["bye", "goodbye", "gn", "good night", "see you"]),
            grief: table(&[
                "died",
                "passed away",
                "lost my",
                "death",
                "funeral",
                "my pet",
                "my dog",
            ]),
            injury: table(&["broke my", "fracture", "injured", "hurt my", "accident"]),
            crying: table(&["i'll cry", "i will cry", "crying", "about to cry"]),
            professional: table(&[
                "delivery",
                "deadline",
                "stakeholder",
                "client",
                "timeline",
                "behind schedule",
                "delay",
                "escalation",
                "project risk",
                "not on track",
            ]),
            identity: table(&[
                "who are you",
                "what are you",
                "are you a bot",
                "what can you do",
            ]),
            casual: table(&[
                "buy", "shop", "shirt", "dress", "wear", "outfit", "choose", "which one",
            ]),
            celebration: table(&[
                "yay",
                "yess",
                "lets go",
                "let's go",
                "i got it",
                "i did it",
                "finally got",
                "won",
            ]),
            distress_hint: table(&[
                "i'm done",
                "im done",
                "i give up",
                "cant anymore",
                "too much",
                "over it",
            ]),
            reply_grief: table(&["died", "passed away", "lost my", "death", "funeral"]),
            reply_heavy: table(&[
                "frustrated",
                "overwhelmed",
                "low",
                "depressed",
                "sad",
                "hurt",
                "broken",
                "tired of",
                "not okay",
                "cooked",
                "done",
                "give up",
            ]),
            knowledge_markers: table(&[
                "who is",
                "what is",
                "tell me about",
                "movie",
                "film",
                "song",
                "actor",
                "director",
                "company",
                "brand",
            ]),
        }
    }

    /// Reads a YAML lexicon. Tables missing from the file keep their builtin
    /// contents.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read lexicon file: {}", path.display()))?;
        let lexicon: Lexicon = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse lexicon file: {}", path.display()))?;
        tracing::info!(path = %path.display(), version = lexicon.version, "loaded lexicon");
        Ok(lexicon)
    }

    pub fn is_negative_label(&self, label: &str) -> bool {
        self.negative_labels.iter().any(|l| l.eq_ignore_ascii_case(label))
    }

    pub fn is_positive_label(&self, label: &str) -> bool {
        self.positive_labels.iter().any(|l| l.eq_ignore_ascii_case(label))
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '\''
}

/// Plain substring search. `haystack` is expected to be lowercased already.
pub fn contains_any(haystack: &str, phrases: &[String]) -> bool {
    phrases
        .iter()
        .any(|p| !p.is_empty() && haystack.contains(p.as_str()))
}

/// True when `phrase` occurs in `haystack` without being glued to a
/// neighbouring word ("won" does not match "wonder" or "won't").
pub fn contains_word(haystack: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    haystack.match_indices(phrase).any(|(start, matched)| {
        let end = start + matched.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !is_word_char(c));
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !is_word_char(c));
        before_ok && after_ok
    })
}

pub fn contains_any_word(haystack: &str, phrases: &[String]) -> bool {
    phrases.iter().any(|p| contains_word(haystack, p))
}

/// Like [`contains_word`] but only the start is anchored, so inflected forms
/// match ("deadline" finds "deadlines", "hurt" finds "hurting") while "low"
/// still skips "hello".
pub fn contains_word_prefix(haystack: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    haystack.match_indices(phrase).any(|(start, _)| {
        haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !is_word_char(c))
    })
}

pub fn contains_any_word_prefix(haystack: &str, phrases: &[String]) -> bool {
    phrases.iter().any(|p| contains_word_prefix(haystack, p))
}

/// Lowercased word tokens with surrounding punctuation stripped. Apostrophes
/// inside a word are kept so "i'm" stays one token.
pub fn tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !is_word_char(c))
                .trim_matches('\'')
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_match_respects_boundaries() {
        assert!(contains_word("we won today", "won"));
        assert!(contains_word("won!", "won"));
        assert!(!contains_word("i wonder", "won"));
        assert!(!contains_word("i won't", "won"));
        assert!(contains_word("i'm done.", "i'm done"));
        assert!(!contains_word("anything", ""));
    }

    #[test]
    fn prefix_match_accepts_suffixes_only() {
        assert!(contains_word_prefix("so many deaths lately", "death"));
        assert!(contains_word_prefix("two deadlines", "deadline"));
        assert!(contains_word_prefix("i'm hurting", "hurt"));
        assert!(!contains_word_prefix("hello", "low"));
        assert!(!contains_word_prefix("anything", ""));
    }

    #[test]
    fn substring_match_is_loose() {
        let phrases = table(&["died"]);
        assert!(contains_any("my dog died yesterday", &phrases));
        assert!(!contains_any("nothing here", &phrases));
    }

    #[test]
    fn tokens_strip_punctuation_but_keep_apostrophes() {
        assert_eq!(
            tokens("IM SO COOKED!!! (for real) I'm"),
            vec!["im", "so", "cooked", "for", "real", "i'm"]
        );
    }

    #[test]
    fn yaml_override_keeps_other_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lexicon.yaml");
        fs::write(&path, "version: 2\nbro_terms: [mate]\n").unwrap();

        let lexicon = Lexicon::from_yaml_file(&path).unwrap();
        assert_eq!(lexicon.version, 2);
        assert_eq!(lexicon.bro_terms, vec!["mate".to_string()]);
        assert_eq!(lexicon.grief_override, Lexicon::builtin().grief_override);
    }

    #[test]
    fn label_groups_ignore_case() {
        let lexicon = Lexicon::builtin();
        assert!(lexicon.is_negative_label("Sadness"));
        assert!(lexicon.is_positive_label("joy"));
        assert!(!lexicon.is_positive_label("neutral"));
    }
}
