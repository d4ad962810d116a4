use core::result::Result as CoreResult;
use std::io::Error as IoError;

use reqwest::Error as ReqwestError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;
use toml::de::Error as TomlError;

/// Result type for docquery operations.
pub type Result<T> = CoreResult<T, Error>;

/// Errors that can occur while extracting, analyzing, or querying a model.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// An HTTP request failed before a response was received.
    #[error("HTTP request failed: {0}")]
    Request(#[from] ReqwestError),

    /// JSON serialization or deserialization failed.
    #[error("JSON serialization error: {0}")]
    Json(#[from] SerdeJsonError),

    /// TOML deserialization failed.
    #[error("TOML deserialization error: {0}")]
    Toml(#[from] TomlError),

    /// Configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Required API key was not found.
    #[error("API key not found: {0}")]
    MissingApiKey(String),

    /// The completion service signalled rate limiting. Transient.
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// The completion service rejected the request. Terminal.
    #[error("Provider error: {0}")]
    Provider(String),

    /// The completion service returned a payload we could not use.
    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),

    /// Every attempt was rate limited.
    #[error("Failed to get AI response after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Description of the final rate-limit failure.
        last_error: String,
    },

    /// The caller cancelled the request.
    #[error("Request cancelled")]
    Cancelled,

    /// The declared file type is not recognized.
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    /// Extraction of the uploaded file failed.
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// The caller asked for something the data cannot answer.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Writing the interaction log failed.
    #[error("Failed to log interaction: {0}")]
    Logging(String),
}

impl Error {
    /// Determines whether this error may succeed if retried.
    ///
    /// Only rate limiting is transient; every other failure is terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}
