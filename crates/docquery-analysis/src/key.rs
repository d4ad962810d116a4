//! Cache key derivation.

use core::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

/// Number of summary characters that participate in the key.
pub const SUMMARY_KEY_CHARS: usize = 200;
/// Separator between the truncated summary and the question.
const KEY_SEPARATOR: &str = "_";

/// Fixed-width identifier of a (summary, question) pair.
///
/// Always 64 lowercase hex characters of a SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// The hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Returns the first `max_chars` characters of `text` without splitting a
/// code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(byte_index, _)| &text[..byte_index])
}

/// Derives the cache key for `question` asked about data described by `summary`.
///
/// Only the first [`SUMMARY_KEY_CHARS`] characters of the summary are hashed,
/// so summaries that agree on that prefix share keys. The question is used
/// in full.
pub fn derive_key(summary: &str, question: &str) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(truncate_chars(summary, SUMMARY_KEY_CHARS).as_bytes());
    hasher.update(KEY_SEPARATOR.as_bytes());
    hasher.update(question.as_bytes());
    CacheKey(format!("{:064x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_key_is_deterministic() {
        let first = derive_key("Dataset with 3 rows", "What is the average age?");
        let second = derive_key("Dataset with 3 rows", "What is the average age?");
        assert_eq!(first, second);
        assert_eq!(first.as_str().len(), 64);
        assert!(first.as_str().chars().all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_uppercase()));
    }

    #[test]
    fn test_derive_key_known_digest() {
        // sha256("_"): empty summary, separator, empty question.
        assert_eq!(
            derive_key("", "").as_str(),
            "d2e2adf7177b7a8afddbc12d1634cf23ea1a71020f6a1308070a16400fb68fde"
        );
    }

    #[test]
    fn test_summary_truncated_at_200_chars() {
        let prefix = "x".repeat(SUMMARY_KEY_CHARS);
        let long_a = format!("{prefix}tail one");
        let long_b = format!("{prefix}a completely different tail");
        assert_eq!(derive_key(&long_a, "q"), derive_key(&long_b, "q"));
        assert_eq!(derive_key(&long_a, "q"), derive_key(&prefix, "q"));
    }

    #[test]
    fn test_difference_inside_prefix_changes_key() {
        let summary_a = format!("a{}", "x".repeat(250));
        let summary_b = format!("b{}", "x".repeat(250));
        assert_ne!(derive_key(&summary_a, "q"), derive_key(&summary_b, "q"));
    }

    #[test]
    fn test_question_used_in_full() {
        let long_question = "why ".repeat(500);
        let longer_question = format!("{long_question}?");
        assert_ne!(
            derive_key("s", &long_question),
            derive_key("s", &longer_question)
        );
    }

    #[test]
    fn test_truncate_chars_respects_code_points() {
        let text = "é".repeat(300);
        let truncated = truncate_chars(&text, SUMMARY_KEY_CHARS);
        assert_eq!(truncated.chars().count(), SUMMARY_KEY_CHARS);
        assert_eq!(truncate_chars("short", SUMMARY_KEY_CHARS), "short");
    }
}
