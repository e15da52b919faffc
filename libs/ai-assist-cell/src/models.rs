// libs/ai-assist-cell/src/models.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use shared_models::error::AppError;

// ==============================================================================
// LANGUAGES
// ==============================================================================

/// Languages the assistant understands. Declaration order doubles as the
/// tie-break order when two languages score the same.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Hinglish,
    Hi,
    Bn,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Hinglish => "hinglish",
            Language::Hi => "hi",
            Language::Bn => "bn",
        }
    }

    /// Name used when instructing the model which language to answer in.
    pub fn prompt_name(&self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Hinglish => "Hinglish (Hindi written in Latin script, mixed with English)",
            Language::Hi => "Hindi (Devanagari script)",
            Language::Bn => "Bengali (Bengali script)",
        }
    }

    pub fn disclaimer(&self) -> &'static str {
        match self {
            Language::En => "This is general information, not a medical diagnosis. Please consult a doctor for medical advice.",
            Language::Hinglish => "Yeh sirf general jaankari hai, medical diagnosis nahi. Kripya doctor se salah lein.",
            Language::Hi => "यह केवल सामान्य जानकारी है, चिकित्सीय निदान नहीं। कृपया डॉक्टर से सलाह लें।",
            Language::Bn => "এটি শুধুমাত্র সাধারণ তথ্য, চিকিৎসা নির্ণয় নয়। অনুগ্রহ করে ডাক্তারের পরামর্শ নিন।",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = AiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" | "english" => Ok(Language::En),
            "hinglish" => Ok(Language::Hinglish),
            "hi" | "hindi" => Ok(Language::Hi),
            "bn" | "bengali" | "bangla" => Ok(Language::Bn),
            other => Err(AiError::UnsupportedLanguage(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectLanguageRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageDetection {
    pub language: Language,
    pub confidence: f64,
    pub scores: BTreeMap<Language, f64>,
}

// ==============================================================================
// TRIAGE
// ==============================================================================

/// Ordered from least to most severe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    SelfCare,
    Routine,
    Urgent,
    Emergency,
}

impl Urgency {
    pub fn advice(&self) -> &'static str {
        match self {
            Urgency::Emergency => "Seek emergency care immediately. Call 112 or go to the nearest emergency department.",
            Urgency::Urgent => "Book a consultation within the next 24 hours.",
            Urgency::Routine => "Book a routine consultation with a doctor.",
            Urgency::SelfCare => "Rest, stay hydrated and monitor your symptoms. Book a consultation if they persist or worsen.",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Urgency::SelfCare => write!(f, "self_care"),
            Urgency::Routine => write!(f, "routine"),
            Urgency::Urgent => write!(f, "urgent"),
            Urgency::Emergency => write!(f, "emergency"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageRequest {
    pub symptoms: String,
    pub age: Option<u32>,
    pub duration_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageAssessment {
    pub urgency: Urgency,
    pub red_flags: Vec<String>,
    pub recommended_specialty: String,
    pub advice: String,
    pub language: Language,
    /// False when only the rule screen ran.
    pub ai_refined: bool,
}

// ==============================================================================
// CHAT AND TRANSLATION
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
    pub language: Language,
    pub disclaimer: String,
    /// Set when the message trips the emergency red-flag screen.
    pub emergency: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateRequest {
    pub text: String,
    pub target_language: String,
    pub source_language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Translation {
    pub text: String,
    pub source_language: Language,
    pub target_language: Language,
    pub translated: bool,
}

// ==============================================================================
// TRANSCRIPTION CODING
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionCodesRequest {
    pub transcript: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeSuggestion {
    pub code: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSuggestions {
    pub codes: Vec<CodeSuggestion>,
    /// Codes the model proposed that are not well-formed ICD-10.
    pub discarded: Vec<String>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("AI assistant is not configured")]
    NotConfigured,

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("AI provider error: {0}")]
    ProviderError(String),

    #[error("AI provider returned an unusable answer: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        AiError::ProviderError(err.to_string())
    }
}

impl From<serde_json::Error> for AiError {
    fn from(err: serde_json::Error) -> Self {
        AiError::InvalidResponse(err.to_string())
    }
}

impl From<AiError> for AppError {
    fn from(err: AiError) -> Self {
        match err {
            AiError::NotConfigured => AppError::Unavailable(err.to_string()),
            AiError::UnsupportedLanguage(_) => AppError::BadRequest(err.to_string()),
            AiError::ValidationError(msg) => AppError::ValidationError(msg),
            AiError::ProviderError(_) | AiError::InvalidResponse(_) => AppError::ExternalService(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_parsing() {
        assert_eq!("HI".parse::<Language>().unwrap(), Language::Hi);
        assert_eq!("bangla".parse::<Language>().unwrap(), Language::Bn);
        assert!(matches!("fr".parse::<Language>(), Err(AiError::UnsupportedLanguage(_))));
    }

    #[test]
    fn test_language_serializes_as_code() {
        assert_eq!(serde_json::to_value(Language::Hinglish).unwrap(), "hinglish");
        assert_eq!(serde_json::to_value(Urgency::SelfCare).unwrap(), "self_care");
    }

    #[test]
    fn test_urgency_ordering() {
        assert!(Urgency::Emergency > Urgency::Urgent);
        assert!(Urgency::Routine > Urgency::SelfCare);
    }
}
