// libs/ai-assist-cell/src/services/mod.rs
pub mod assistant;
pub mod completion;
pub mod language;
pub mod triage;

pub use assistant::AiAssistService;
pub use completion::{CompletionProvider, OpenAiClient};
pub use language::LanguageDetector;
pub use triage::TriageRules;
