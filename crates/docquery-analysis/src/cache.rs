//! Bounded answer cache with first-in-first-out eviction.
//!
//! Lookups never change eviction order: the entry inserted earliest is the
//! one evicted when a new key arrives at capacity, however often it was read.

use std::collections::{HashMap, VecDeque};
use std::time::SystemTime;

use docquery_core::{Error, Result};
use tracing::debug;

use crate::key::CacheKey;

/// Default number of cached answers.
pub const DEFAULT_MAX_SIZE: usize = 50;

/// A cached answer with its insertion time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// The answer text returned by the completion service
    pub answer: String,
    /// When this entry was stored
    pub inserted_at: SystemTime,
}

impl CacheEntry {
    /// Wraps `answer`, stamped with the current time.
    pub fn new<T: Into<String>>(answer: T) -> Self {
        Self {
            answer: answer.into(),
            inserted_at: SystemTime::now(),
        }
    }
}

/// In-memory answer cache holding at most `max_size` entries.
#[derive(Debug)]
pub struct AnalysisCache {
    entries: HashMap<CacheKey, CacheEntry>,
    /// Keys in insertion order; always the same set as `entries`.
    order: VecDeque<CacheKey>,
    max_size: usize,
}

impl AnalysisCache {
    /// Creates an empty cache holding at most `max_size` entries.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if `max_size` is zero.
    pub fn new(max_size: usize) -> Result<Self> {
        if max_size == 0 {
            return Err(Error::Config("cache capacity must be positive".to_owned()));
        }

        Ok(Self {
            entries: HashMap::with_capacity(max_size),
            order: VecDeque::with_capacity(max_size),
            max_size,
        })
    }

    /// Looks up `key` without affecting eviction order.
    pub fn get(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Stores `entry` under `key`.
    ///
    /// A new key arriving at capacity first evicts the earliest-inserted
    /// entry. Overwriting an existing key keeps its original position.
    /// Returns the evicted key, if any.
    pub fn put(&mut self, key: CacheKey, entry: CacheEntry) -> Option<CacheKey> {
        if let Some(existing) = self.entries.get_mut(&key) {
            *existing = entry;
            return None;
        }

        let evicted = if self.entries.len() >= self.max_size {
            self.evict_oldest()
        } else {
            None
        };

        self.order.push_back(key.clone());
        self.entries.insert(key, entry);
        evicted
    }

    fn evict_oldest(&mut self) -> Option<CacheKey> {
        let oldest = self.order.pop_front()?;
        self.entries.remove(&oldest);
        debug!(key = %oldest, "evicted oldest cache entry");
        Some(oldest)
    }

    /// Clears all entries from the cache.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Returns the number of entries in the cache.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fixed capacity chosen at construction.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Keys from oldest to newest.
    pub fn keys(&self) -> impl Iterator<Item = &CacheKey> {
        self.order.iter()
    }
}

impl Default for AnalysisCache {
    fn default() -> Self {
        Self {
            entries: HashMap::with_capacity(DEFAULT_MAX_SIZE),
            order: VecDeque::with_capacity(DEFAULT_MAX_SIZE),
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}
