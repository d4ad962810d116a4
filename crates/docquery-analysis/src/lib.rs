//! Question answering over uploaded files.
//!
//! Uploads are turned into [`ExtractedData`], summarized into a bounded
//! prompt context, and sent through a rate-limit aware [`RequestPipeline`].
//! [`AnalysisOrchestrator`] ties these together behind a fixed-size FIFO
//! answer cache keyed by [`derive_key`].
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

/// Bounded FIFO answer cache.
pub mod cache;
/// Tables, cells and column statistics.
pub mod data;
/// File kind dispatch and extractors.
pub mod extract;
/// Append-only interaction log files.
pub mod interaction_log;
/// Cache key derivation.
pub mod key;
/// Cached question answering.
pub mod orchestrator;
/// Retrying completion requests.
pub mod pipeline;
/// Markdown session reports.
pub mod report;
/// Data summaries and prompt assembly.
pub mod summary;

pub use cache::{AnalysisCache, CacheEntry, DEFAULT_MAX_SIZE};
pub use data::{Cell, ColumnStats, ExtractedData, TabularData};
pub use extract::{
    CsvExtractor, Extractor, ExtractorRegistry, PdfExtractor, SpreadsheetExtractor, TextExtractor,
    decode_text,
};
pub use interaction_log::{Interaction, InteractionLogger, Outcome};
pub use key::{CacheKey, SUMMARY_KEY_CHARS, derive_key};
pub use orchestrator::{AnalysisOrchestrator, CacheStats};
pub use pipeline::RequestPipeline;
pub use report::{AnalysisReport, QaRecord, format_file_size};
pub use summary::{build_prompt, build_summary};
