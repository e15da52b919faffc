// libs/ai-assist-cell/src/services/language.rs
use regex::Regex;
use std::collections::{BTreeMap, HashSet};

use crate::models::Language;

/// Romanized Hindi words that mark code-mixed text.
const HINGLISH_MARKERS: &[&str] = &[
    "hai", "hain", "ho", "hoga", "raha", "rahi", "rahe", "tha", "thi", "gaya", "gayi",
    "mujhe", "mera", "meri", "mere", "tum", "tumhara", "aap", "aapka", "aapko",
    "kya", "kyun", "kaise", "kab", "kahan", "nahi", "nahin", "haan", "ji",
    "bahut", "thoda", "kal", "aaj", "abhi", "se", "mein", "ko", "ka", "ki", "ke",
    "aur", "lekin", "bhi", "karo", "karna", "kar", "theek", "accha", "acha", "yaar",
    "jaldi", "din", "raat", "subah", "shaam",
    "dard", "bukhar", "khansi", "jukam", "sardi", "ulti", "chakkar", "kamzori",
    "saans", "pet", "sar", "dawai", "dawa",
];

/// Frequent English words. Disjoint from the Hinglish markers.
const ENGLISH_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "am", "was", "were", "be", "been",
    "i", "you", "he", "she", "it", "we", "they", "me", "my", "your", "our", "their",
    "have", "has", "had", "do", "does", "did", "not", "no", "yes",
    "and", "or", "but", "with", "for", "of", "in", "on", "at", "to", "from", "since",
    "this", "that", "what", "when", "where", "how", "why", "which",
    "can", "could", "will", "would", "should", "very", "much", "some", "please",
    "feel", "feeling", "pain", "fever", "headache", "cough", "cold", "doctor",
    "medicine", "day", "days", "week", "weeks", "yesterday", "today", "help",
];

/// Heuristic script and word-list classifier over en, hi, hinglish and bn.
pub struct LanguageDetector {
    devanagari: Regex,
    devanagari_extended: Regex,
    bengali: Regex,
    latin: Regex,
    hinglish_markers: HashSet<&'static str>,
    english_words: HashSet<&'static str>,
}

impl Default for LanguageDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageDetector {
    pub fn new() -> Self {
        Self {
            devanagari: Regex::new(r"[\x{0900}-\x{097F}]").unwrap(),
            devanagari_extended: Regex::new(r"[\x{A8E0}-\x{A8FF}]").unwrap(),
            bengali: Regex::new(r"[\x{0980}-\x{09FF}]").unwrap(),
            latin: Regex::new(r"[A-Za-z]").unwrap(),
            hinglish_markers: HINGLISH_MARKERS.iter().copied().collect(),
            english_words: ENGLISH_WORDS.iter().copied().collect(),
        }
    }

    /// Normalized confidence per language. Languages with no evidence are
    /// left out; the scores always sum to 1.
    pub fn language_confidence(&self, text: &str) -> BTreeMap<Language, f64> {
        if text.trim().is_empty() {
            return english_only();
        }

        let has_devanagari = self.devanagari.is_match(text) || self.devanagari_extended.is_match(text);
        let has_bengali = self.bengali.is_match(text);
        let has_latin = self.latin.is_match(text);

        let mut scores = BTreeMap::new();
        if has_devanagari {
            scores.insert(Language::Hi, 0.9);
        }
        if has_bengali {
            scores.insert(Language::Bn, 0.9);
        }

        if has_latin {
            let tokens = tokenize(text);
            let total = tokens.len().max(1) as f64;
            let hinglish_count = tokens.iter().filter(|t| self.hinglish_markers.contains(t.as_str())).count();
            let english_count = tokens.iter().filter(|t| self.english_words.contains(t.as_str())).count();

            let hinglish = (hinglish_count as f64 / total * 2.0).min(0.8);
            let mut english = (0.5 + english_count as f64 / total).min(0.9);
            if hinglish_count > 0 {
                english = (english - hinglish).max(0.1);
            }

            // Latin letters inside Indic-script text are usually loanwords.
            let weight = if has_devanagari || has_bengali { 0.5 } else { 1.0 };
            if hinglish > 0.0 {
                scores.insert(Language::Hinglish, hinglish * weight);
            }
            scores.insert(Language::En, english * weight);
        }

        let sum: f64 = scores.values().sum();
        if sum <= 0.0 {
            return english_only();
        }
        scores.values_mut().for_each(|score| *score /= sum);
        scores
    }

    /// Highest-scoring language; ties go to the earlier of en, hinglish, hi, bn.
    pub fn detect(&self, text: &str) -> Language {
        self.detect_with_confidence(text).0
    }

    pub fn detect_with_confidence(&self, text: &str) -> (Language, f64) {
        best_language(&self.language_confidence(text))
    }
}

/// Argmax over a score map; BTreeMap order makes ties resolve en, hinglish, hi, bn.
pub fn best_language(scores: &BTreeMap<Language, f64>) -> (Language, f64) {
    scores
        .iter()
        .fold((Language::En, f64::MIN), |best, (&language, &score)| {
            if score > best.1 { (language, score) } else { best }
        })
}

fn english_only() -> BTreeMap<Language, f64> {
    BTreeMap::from([(Language::En, 1.0)])
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}
