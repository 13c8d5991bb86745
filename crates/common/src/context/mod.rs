//! Request- and response-shaping stages of the chat pipeline
//!
//! Leaves first:
//! - PII redaction
//! - Query refinement
//! - Language detection and translation
//! - History windowing
//! - Grounded retrieval
//! - Response composition
//! - Citation extraction

mod citations;
mod composer;
mod history;
mod language;
mod redactor;
mod refiner;
mod retrieval;

pub use citations::{escape_html, CitationExtractor, CitationRecord, UNAVAILABLE_SENTINEL};
pub use composer::{render_documents, reply_text, ResponseComposer, FALLBACK_RESPONSE, PATIENT_PERSONA};
pub use history::{HistoryRoles, HistoryWindower, Turn, DEFAULT_HISTORY_WINDOW};
pub use language::{
    create_translator, translate_or_original, GoogleTranslator, LanguageDetector, TranslatedText,
    Translation, Translator, UnchangedReason, KOREAN, UNKNOWN_LANGUAGE,
};
pub use redactor::{Redaction, RedactionRule, Redactor, REDACTION_WARNING};
pub use refiner::{QueryRefiner, QueryRefinerConfig, FILLER_PATTERNS, MEDICAL_KEYWORDS};
pub use retrieval::{RetrievalClient, RetrievalParams, RetrievedDocument, SearchResult};
