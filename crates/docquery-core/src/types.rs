use core::fmt;
use core::str::FromStr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A single prompt addressed to a completion service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier understood by the service.
    pub model: String,
    /// Full prompt text, sent as one user message.
    pub prompt: String,
    /// Maximum number of tokens the model may generate.
    pub max_tokens: u32,
    /// Sampling temperature in `[0, 1]`.
    pub temperature: f32,
}

impl CompletionRequest {
    /// Creates a request for `prompt` against `model` with the service defaults.
    pub fn new<M: Into<String>, P: Into<String>>(model: M, prompt: P) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            max_tokens: 500,
            temperature: 0.7,
        }
    }

    /// Sets the token cap.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Successful completion returned by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// Text of the first choice.
    pub text: String,
    /// Provider that produced the answer.
    pub provider: String,
    /// Token accounting, when the service reports it.
    pub tokens_used: TokenUsage,
    /// Wall-clock latency of the request.
    pub latency_ms: u64,
}

/// Tokens consumed by one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub input: u64,
    /// Completion tokens
    pub output: u64,
}

impl TokenUsage {
    /// Prompt and completion tokens combined.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}

/// Closed set of upload kinds, resolved once from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    /// Comma separated values.
    Csv,
    /// `xlsx` / `xls` spreadsheets.
    Spreadsheet,
    /// Plain text.
    Text,
    /// PDF documents.
    Pdf,
    /// Raster images, read through OCR.
    Image,
}

impl FileKind {
    /// Resolves a kind from a bare extension, case-insensitively.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedType`] for unknown extensions.
    pub fn from_extension(extension: &str) -> Result<Self> {
        match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "xlsx" | "xls" => Ok(Self::Spreadsheet),
            "txt" => Ok(Self::Text),
            "pdf" => Ok(Self::Pdf),
            "png" | "jpg" | "jpeg" | "bmp" | "tiff" | "gif" => Ok(Self::Image),
            other => Err(Error::UnsupportedType(other.to_owned())),
        }
    }

    /// Resolves a kind from the extension of `file_name`.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedType`] when the name has no extension or
    /// the extension is unknown.
    pub fn from_file_name(file_name: &str) -> Result<Self> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| Error::UnsupportedType(file_name.to_owned()))?;
        Self::from_extension(extension)
    }

    /// Whether extraction yields a table rather than text.
    pub fn is_tabular(self) -> bool {
        matches!(self, Self::Csv | Self::Spreadsheet)
    }

    /// Lowercase name used in messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Spreadsheet => "spreadsheet",
            Self::Text => "text",
            Self::Pdf => "pdf",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for FileKind {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        Self::from_extension(value)
    }
}

/// Metadata about the uploaded file, carried into prompts and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Original file name.
    pub name: String,
    /// Declared type, the upper-cased extension (`CSV`, `PDF`, ...).
    pub file_type: String,
    /// Size of the raw upload in bytes.
    pub size_bytes: u64,
    /// Resolved kind.
    pub kind: FileKind,
}

impl FileInfo {
    /// Describes an upload named `name` of `size_bytes` bytes.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedType`] when the extension is unknown.
    pub fn from_upload<N: Into<String>>(name: N, size_bytes: u64) -> Result<Self> {
        let name = name.into();
        let kind = FileKind::from_file_name(&name)?;
        let file_type = Path::new(&name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or_else(|| kind.as_str().to_uppercase(), str::to_uppercase);

        Ok(Self {
            name,
            file_type,
            size_bytes,
            kind,
        })
    }
}
