//! Ferusher Engine Library
//!
//! Streaming analysis orchestration and persistent cache for interview
//! questions. It is used by both the `ferusher` binary and integration tests.

/// Configuration management module
pub mod config;

/// Persistent cache store
pub mod db;

/// Question dataset
pub mod dataset;

/// Completion transport layer
pub mod llm;

/// Stream assembly, branch execution and orchestration
pub mod analysis;

/// Analysis relay server
pub mod server;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
