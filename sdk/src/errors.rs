//! Error types and handling
//!
//! This module provides the error type returned across the Ferusher engine's
//! public API. Every variant implements `FerusherErrorExt`, which supplies a
//! user-facing hint and tells callers whether retrying makes sense.
//!
//! Upstream failures never show up here: they are contained at the branch
//! runner and turned into visible analysis text. What reaches callers as an
//! `EngineError` is a rejected operation the caller has to decide about
//! (for example, proceeding without the cache after a store failure).
//!
//! # Examples
//!
//! ```
//! use ferusher_sdk::errors::{EngineError, FerusherErrorExt};
//!
//! let error = EngineError::UnknownQuestion(42);
//! assert!(error.is_recoverable());
//! println!("Hint: {}", error.user_hint());
//!
//! let fatal = EngineError::SchemaDowngrade { stored: 3, requested: 2 };
//! assert!(!fatal.is_recoverable());
//! ```

use crate::types::QuestionId;
use thiserror::Error;

/// Trait for Ferusher error extensions
pub trait FerusherErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint never contains credentials or internal file paths.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Persistent cache errors
    #[error("Store error: {0}")]
    Store(String),

    #[error("Store schema version {requested} is older than stored version {stored}")]
    SchemaDowngrade { stored: u32, requested: u32 },

    // Dataset errors
    #[error("Question {0} not found")]
    UnknownQuestion(QuestionId),

    #[error("Dataset error: {0}")]
    Dataset(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FerusherErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Store(_) => "Cache operation failed. You can continue without the cache",
            Self::SchemaDowngrade { .. } => {
                "The cache was written by a newer version. Upgrade or remove the cache file"
            }
            Self::UnknownQuestion(_) => "The question id is not in the loaded dataset",
            Self::Dataset(_) => "The question dataset could not be read. Re-import it",
            Self::Network(_) => "Network operation failed. Check your connection",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::SchemaDowngrade { .. })
    }
}
