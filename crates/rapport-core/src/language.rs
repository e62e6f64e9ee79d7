//! Best-effort language tagging.
//!
//! Non-Latin text is tagged from its dominant Unicode script; Latin text is
//! scored against small stopword lists. Anything inconclusive yields `None`.

use std::collections::HashMap;

pub trait LanguageDetector: Send + Sync {
    fn detect(&self, text: &str) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Script {
    Latin,
    Cyrillic,
    Greek,
    Arabic,
    Hebrew,
    Devanagari,
    Bengali,
    Tamil,
    Thai,
    Hangul,
    Kana,
    Han,
}

fn script_of(c: char) -> Option<Script> {
    let script = match c as u32 {
        0x0041..=0x005A | 0x0061..=0x007A | 0x00C0..=0x024F => Script::Latin,
        0x0370..=0x03FF => Script::Greek,
        0x0400..=0x04FF => Script::Cyrillic,
        0x0590..=0x05FF => Script::Hebrew,
        0x0600..=0x06FF | 0x0750..=0x077F => Script::Arabic,
        0x0900..=0x097F => Script::Devanagari,
        0x0980..=0x09FF => Script::Bengali,
        0x0B80..=0x0BFF => Script::Tamil,
        0x0E00..=0x0E7F => Script::Thai,
        0x1100..=0x11FF | 0xAC00..=0xD7AF => Script::Hangul,
        0x3040..=0x30FF => Script::Kana,
        0x4E00..=0x9FFF | 0x3400..=0x4DBF => Script::Han,
        _ => return None,
    };
    Some(script)
}

const STOPWORDS: &[(&str, &[&str])] = &[
    (
        "en",
        &[
            "the", "and", "is", "i", "you", "to", "my", "it", "this", "that", "for", "was",
            "of", "with", "me", "so", "just", "have",
        ],
    ),
    (
        "es",
        &[
            "el", "la", "que", "y", "de", "los", "es", "por", "con", "una", "estoy", "muy",
            "pero", "mi",
        ],
    ),
    (
        "fr",
        &[
            "le", "la", "les", "et", "est", "je", "pas", "une", "des", "que", "suis", "mon",
            "très", "mais",
        ],
    ),
    (
        "de",
        &[
            "der", "die", "das", "und", "ist", "ich", "nicht", "ein", "zu", "bin", "mein",
            "sehr", "aber",
        ],
    ),
    (
        "pt",
        &[
            "o", "que", "não", "é", "um", "uma", "com", "para", "os", "estou", "muito", "meu",
        ],
    ),
    (
        "it",
        &[
            "il", "che", "non", "di", "è", "un", "per", "sono", "molto", "ma", "mio",
        ],
    ),
];

/// Script and stopword heuristic. No model, no I/O.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptLanguageDetector;

impl ScriptLanguageDetector {
    fn latin_language(text: &str) -> Option<String> {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphabetic())
            .filter(|w| !w.is_empty())
            .collect();

        let mut best: Option<(&str, usize)> = None;
        for (lang, stopwords) in STOPWORDS {
            let hits = words.iter().filter(|w| stopwords.contains(w)).count();
            if hits > 0 && best.map_or(true, |(_, n)| hits > n) {
                best = Some((*lang, hits));
            }
        }
        best.map(|(lang, _)| lang.to_string())
    }
}

impl LanguageDetector for ScriptLanguageDetector {
    fn detect(&self, text: &str) -> Option<String> {
        let mut counts: HashMap<Script, usize> = HashMap::new();
        for script in text.chars().filter_map(script_of) {
            *counts.entry(script).or_default() += 1;
        }

        // Japanese mixes kana with han; any kana decides it.
        if counts.contains_key(&Script::Kana) {
            return Some("ja".to_string());
        }

        let (script, _) = counts.into_iter().max_by_key(|(_, n)| *n)?;
        let tag = match script {
            Script::Latin => return Self::latin_language(text),
            Script::Cyrillic => "ru",
            Script::Greek => "el",
            Script::Arabic => "ar",
            Script::Hebrew => "he",
            Script::Devanagari => "hi",
            Script::Bengali => "bn",
            Script::Tamil => "ta",
            Script::Thai => "th",
            Script::Hangul => "ko",
            Script::Han => "zh",
            Script::Kana => "ja",
        };
        Some(tag.to_string())
    }
}
