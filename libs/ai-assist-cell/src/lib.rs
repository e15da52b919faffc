// libs/ai-assist-cell/src/lib.rs
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::*;
pub use router::ai_routes;
pub use services::{AiAssistService, CompletionProvider, LanguageDetector, OpenAiClient, TriageRules};
