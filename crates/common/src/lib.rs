//! MedRAG Common Library
//!
//! Shared code for the MedRAG chat services including:
//! - Request/response shaping stages (redaction, refinement, translation,
//!   history windowing, retrieval, composition, citations)
//! - The chat pipeline wiring them per deployment variant
//! - Chat-completion client abstraction
//! - Audio storage and speech-to-text collaborators
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod audio;
pub mod chat;
pub mod config;
pub mod context;
pub mod errors;
pub mod llm;
pub mod metrics;

// Re-export commonly used types
pub use chat::{ChatPipeline, ChatReply, ChatTurnRequest};
pub use config::{AppConfig, ChatVariant};
pub use errors::{AppError, Result};
pub use llm::CompletionClient;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
