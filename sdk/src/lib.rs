//! Ferusher SDK
//!
//! Shared data model and error types for the Ferusher analysis engine.
//! Callers that only render results (or store them elsewhere) depend on this
//! crate without pulling in the engine's runtime stack.

/// Error types and handling
pub mod errors;

/// Analysis results, request settings and cache records
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, FerusherErrorExt};
pub use types::{
    AnalysisRecord, AnalysisResult, CacheRecord, PerspectiveKey, Perspectives, QuestionId,
    RequestSettings, SnapshotRecord, QUESTION_PLACEHOLDER,
};
