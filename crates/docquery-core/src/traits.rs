use async_trait::async_trait;

use crate::{Completion, CompletionRequest, Result};

/// Trait for completion services that turn a prompt into answer text.
///
/// Implementations must classify failures: rate limiting is reported as
/// [`Error::RateLimited`](crate::Error::RateLimited), everything else as a
/// terminal variant. Callers drive retries from that classification alone.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Returns the unique identifier for this provider.
    fn name(&self) -> &'static str;

    /// Issues exactly one completion request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RateLimited`](crate::Error::RateLimited) when the
    /// service is throttling, or a terminal error if the request fails or
    /// the response cannot be parsed.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;
}
