//! Completion Transport Layer
//!
//! This module provides the outbound seam between the analysis engine and the
//! text-completion endpoint. A `CompletionTransport` issues exactly one
//! request and hands back the response body as a stream of raw text bytes;
//! the branch runner never sees provider-specific framing.
//!
//! Two transports are available:
//! - `OpenAICompatibleTransport` talks to `{endpoint_base}/chat/completions`
//!   directly and unwraps SSE deltas into plain text
//! - `RelayTransport` posts to an analysis relay (`/api/analyze`) that
//!   already returns a raw text stream

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

pub mod openai;
pub mod relay;
pub mod sse;

pub use openai::OpenAICompatibleTransport;
pub use relay::RelayTransport;

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, UpstreamError>;

/// Response body as it arrives, one fragment per item
pub type TextStream = BoxStream<'static, Result<Vec<u8>>>;

/// Errors raised while talking to the completion endpoint
///
/// The `Display` form of each variant is what ends up after
/// `analysis generation failed: ` in a contained failure, so `Rejected`
/// renders the upstream message verbatim.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    Parse(String),
}

impl UpstreamError {
    /// Build a rejection from a non-2xx status and its body.
    ///
    /// An empty body falls back to the status reason phrase.
    pub fn rejected(status: reqwest::StatusCode, body: String) -> Self {
        let message = if body.trim().is_empty() {
            status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| status.as_str().to_string())
        } else {
            body
        };
        UpstreamError::Rejected {
            status: status.as_u16(),
            message,
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else {
            UpstreamError::Network(err.to_string())
        }
    }
}

/// One outbound analysis request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionRequest {
    /// Prompt with the question already substituted
    pub prompt: String,

    /// Credential forwarded verbatim
    pub credential: String,

    /// Base URL of the OpenAI-compatible endpoint
    pub endpoint_base: String,

    /// Model name
    pub model: String,

    /// Ask for an incremental response
    pub stream: bool,
}

/// Transport trait that all outbound clients implement
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    /// Short name used in logs (e.g., "openai", "relay")
    fn name(&self) -> &str;

    /// Issue the request and return the response body.
    ///
    /// Non-2xx responses are returned as `UpstreamError::Rejected` carrying
    /// the body text. Errors while reading the body surface as `Err` items
    /// of the returned stream.
    async fn send(&self, request: &CompletionRequest) -> Result<TextStream>;
}
