//! Provider adapters for external completion services.
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

/// Scripted provider for tests and offline runs.
pub mod mock;
/// Together AI provider implementation.
pub mod together;

pub use mock::{MockOutcome, MockProvider};
pub use together::TogetherProvider;
