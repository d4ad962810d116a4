//! Core types and traits for docquery.
//!
//! This crate provides the error type, shared request/response types,
//! configuration, and the completion provider trait used across the
//! docquery workspace.
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        reason = "Allow for tests"
    )
)]

/// Configuration loading, saving, and validation.
pub mod config;
/// Error types and result definitions.
pub mod error;
/// Synchronization helpers.
pub mod sync;
/// Trait definitions for completion providers.
pub mod traits;
/// Core data types for completions and uploaded files.
pub mod types;

pub use config::{
    ApiKeys, CacheConfig, DocqueryConfig, LoggingConfig, ModelConfig, RetryConfig,
    validate_api_key,
};
pub use error::{Error, Result};
pub use sync::IgnoreLock;
pub use traits::CompletionProvider;
pub use types::{Completion, CompletionRequest, FileInfo, FileKind, TokenUsage};
