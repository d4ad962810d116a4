//! Question answering over extracted data, fronted by the answer cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use docquery_core::{
    CompletionProvider, DocqueryConfig, Error, FileInfo, IgnoreLock as _, Result,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::{AnalysisCache, CacheEntry};
use crate::data::ExtractedData;
use crate::interaction_log::{Interaction, InteractionLogger, Outcome};
use crate::key::{CacheKey, derive_key};
use crate::pipeline::RequestPipeline;
use crate::summary::{build_prompt, build_summary};

const SUMMARY_REPORT_QUESTION: &str = "Please provide a comprehensive summary of this data including: \
    1. Overview of the data structure and content, \
    2. Key insights and patterns, \
    3. Notable trends or anomalies, \
    4. Potential business implications or recommendations, \
    5. Data quality assessment.";

const SUGGEST_QUESTIONS_QUESTION: &str = "Based on this data, suggest 5-10 interesting and relevant questions \
    that would provide valuable insights. Focus on questions that would \
    help understand the data better, identify trends, or make business decisions.";

/// Per-key locks for requests currently being answered.
type InFlight = Mutex<HashMap<CacheKey, Arc<AsyncMutex<()>>>>;

/// Counters describing cache effectiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Answers served from the cache
    pub hits: u64,
    /// Questions that required a request
    pub misses: u64,
    /// Entries currently stored
    pub entries: usize,
    /// Maximum number of entries
    pub capacity: usize,
}

/// Answers questions about extracted data.
///
/// Identical questions about data with the same summary prefix are answered
/// once; concurrent callers for the same question wait for the first request
/// instead of issuing their own. Failed requests are never cached.
pub struct AnalysisOrchestrator {
    pipeline: RequestPipeline,
    cache: Mutex<AnalysisCache>,
    in_flight: InFlight,
    logger: Option<InteractionLogger>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AnalysisOrchestrator {
    /// Creates an orchestrator caching at most `cache_size` answers.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if `cache_size` is zero.
    pub fn new(pipeline: RequestPipeline, cache_size: usize) -> Result<Self> {
        Ok(Self {
            pipeline,
            cache: Mutex::new(AnalysisCache::new(cache_size)?),
            in_flight: Mutex::new(HashMap::new()),
            logger: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Builds the pipeline, cache and interaction log from `config`.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the cache capacity is zero.
    pub fn from_config(
        provider: Arc<dyn CompletionProvider>,
        config: &DocqueryConfig,
    ) -> Result<Self> {
        let pipeline = RequestPipeline::from_config(provider, config);
        let orchestrator = Self::new(pipeline, config.cache.max_size)?;
        Ok(if config.logging.interaction_log {
            orchestrator.with_logger(InteractionLogger::new(config.logging.log_dir.clone()))
        } else {
            orchestrator
        })
    }

    /// Records every answered or failed request with `logger`.
    #[must_use]
    pub fn with_logger(mut self, logger: InteractionLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Answers `question` about `data`.
    ///
    /// # Errors
    /// Propagates request failures unchanged; see
    /// [`RequestPipeline::complete_with_cancel`].
    pub async fn analyze(
        &self,
        data: &ExtractedData,
        question: &str,
        file: Option<&FileInfo>,
    ) -> Result<String> {
        self.analyze_with_cancel(data, question, file, &CancellationToken::new())
            .await
    }

    /// Answers `question` about `data`, giving up when `cancel` fires.
    ///
    /// # Errors
    /// Propagates request failures unchanged, including
    /// [`Error::Cancelled`].
    pub async fn analyze_with_cancel(
        &self,
        data: &ExtractedData,
        question: &str,
        file: Option<&FileInfo>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let summary = build_summary(data);
        let key = derive_key(&summary, question);

        if let Some(answer) = self.cached(&key) {
            return Ok(answer);
        }

        let slot = InFlightSlot::acquire(&self.in_flight, &key);
        let _turn = slot.lock.lock().await;

        // The request we waited on may have filled the cache.
        if let Some(answer) = self.cached(&key) {
            return Ok(answer);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let prompt = build_prompt(&summary, question, file);
        let result = self
            .pipeline
            .complete_with_cancel(&prompt, cancel)
            .await
            .map(|completion| completion.text);

        self.log_interaction(question, file, &result).await;

        let answer = result?;
        self.cache
            .lock_ignore_poison()
            .put(key, CacheEntry::new(answer.clone()));
        Ok(answer)
    }

    /// Asks for a structured overview of the data.
    ///
    /// # Errors
    /// See [`Self::analyze`].
    pub async fn summary_report(
        &self,
        data: &ExtractedData,
        file: Option<&FileInfo>,
    ) -> Result<String> {
        self.summary_report_with_cancel(data, file, &CancellationToken::new())
            .await
    }

    /// [`Self::summary_report`], giving up when `cancel` fires.
    ///
    /// # Errors
    /// See [`Self::analyze_with_cancel`].
    pub async fn summary_report_with_cancel(
        &self,
        data: &ExtractedData,
        file: Option<&FileInfo>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.analyze_with_cancel(data, SUMMARY_REPORT_QUESTION, file, cancel)
            .await
    }

    /// Asks for questions worth exploring about the data.
    ///
    /// # Errors
    /// See [`Self::analyze`].
    pub async fn suggest_questions(
        &self,
        data: &ExtractedData,
        file: Option<&FileInfo>,
    ) -> Result<String> {
        self.suggest_questions_with_cancel(data, file, &CancellationToken::new())
            .await
    }

    /// [`Self::suggest_questions`], giving up when `cancel` fires.
    ///
    /// # Errors
    /// See [`Self::analyze_with_cancel`].
    pub async fn suggest_questions_with_cancel(
        &self,
        data: &ExtractedData,
        file: Option<&FileInfo>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.analyze_with_cancel(data, SUGGEST_QUESTIONS_QUESTION, file, cancel)
            .await
    }

    /// Asks for a detailed analysis of one column.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] without issuing a request when `data`
    /// is not tabular or has no such column, otherwise see [`Self::analyze`].
    pub async fn explain_column(
        &self,
        data: &ExtractedData,
        column: &str,
        file: Option<&FileInfo>,
    ) -> Result<String> {
        self.explain_column_with_cancel(data, column, file, &CancellationToken::new())
            .await
    }

    /// [`Self::explain_column`], giving up when `cancel` fires.
    ///
    /// # Errors
    /// As [`Self::explain_column`], plus [`Error::Cancelled`].
    pub async fn explain_column_with_cancel(
        &self,
        data: &ExtractedData,
        column: &str,
        file: Option<&FileInfo>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let table = data.as_table().ok_or_else(|| {
            Error::InvalidInput("Column analysis is only available for structured data".to_owned())
        })?;
        if !table.has_column(column) {
            return Err(Error::InvalidInput(format!(
                "Column '{column}' not found in data"
            )));
        }

        let question = format!(
            "Please provide a detailed analysis of the '{column}' column, \
             including its data distribution, summary statistics, patterns, \
             potential issues, and insights."
        );
        self.analyze_with_cancel(data, &question, file, cancel).await
    }

    /// Drops every cached answer.
    pub fn clear_cache(&self) {
        self.cache.lock_ignore_poison().clear();
        info!("analysis cache cleared");
    }

    /// Current hit and miss counters with cache occupancy.
    pub fn cache_stats(&self) -> CacheStats {
        let cache = self.cache.lock_ignore_poison();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: cache.len(),
            capacity: cache.max_size(),
        }
    }

    fn cached(&self, key: &CacheKey) -> Option<String> {
        let answer = self
            .cache
            .lock_ignore_poison()
            .get(key)
            .map(|entry| entry.answer.clone())?;
        self.hits.fetch_add(1, Ordering::Relaxed);
        info!(%key, "answer served from cache");
        Some(answer)
    }

    async fn log_interaction(
        &self,
        question: &str,
        file: Option<&FileInfo>,
        result: &Result<String>,
    ) {
        let Some(logger) = &self.logger else {
            return;
        };

        let outcome = match result {
            Ok(answer) => Outcome::Answer(answer.clone()),
            Err(error) => Outcome::Failure(error.to_string()),
        };
        let interaction = Interaction {
            question,
            file,
            outcome,
        };
        if let Err(error) = logger.record(&interaction).await {
            warn!(%error, "could not record interaction");
        }
    }
}

/// A caller's claim on the per-key lock; the map entry goes away with the
/// last claim.
struct InFlightSlot<'orch> {
    map: &'orch InFlight,
    key: CacheKey,
    lock: Arc<AsyncMutex<()>>,
}

impl<'orch> InFlightSlot<'orch> {
    fn acquire(map: &'orch InFlight, key: &CacheKey) -> Self {
        let lock = Arc::clone(
            map.lock_ignore_poison()
                .entry(key.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        );
        Self {
            map,
            key: key.clone(),
            lock,
        }
    }
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        let mut map = self.map.lock_ignore_poison();
        // One reference in the map, one here: nobody else is waiting.
        if Arc::strong_count(&self.lock) <= 2 {
            map.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Cell, TabularData};
    use crate::interaction_log::RESPONSES_FILE;
    use docquery_providers::{MockOutcome, MockProvider};
    use std::time::Duration;
    use tempfile::TempDir;
    use std::fs as std_fs;
    use tokio::time::{Instant, sleep};

    fn people() -> ExtractedData {
        ExtractedData::Table(
            TabularData::new(
                vec!["age".to_owned(), "income".to_owned()],
                vec![
                    vec![Cell::Number(25.0), Cell::Number(50_000.0)],
                    vec![Cell::Number(40.0), Cell::Number(72_000.0)],
                    vec![Cell::Number(31.0), Cell::Number(61_000.0)],
                ],
            )
            .unwrap(),
        )
    }

    fn orchestrator(provider: &MockProvider, cache_size: usize) -> AnalysisOrchestrator {
        let pipeline = RequestPipeline::new(Arc::new(provider.clone()), "test-model")
            .with_backoff_unit(Duration::from_millis(1));
        AnalysisOrchestrator::new(pipeline, cache_size).unwrap()
    }

    #[tokio::test]
    async fn test_second_identical_question_hits_cache() {
        let provider = MockProvider::new().with_response("average age", "The average age is 32.");
        let subject = orchestrator(&provider, 50);
        let data = people();

        let first = subject.analyze(&data, "What is the average age?", None).await.unwrap();
        let second = subject.analyze(&data, "What is the average age?", None).await.unwrap();

        assert_eq!(first, "The average age is 32.");
        assert_eq!(second, first);
        assert_eq!(provider.call_count(), 1);

        let prompt = &provider.get_call_history()[0];
        assert!(prompt.contains("Dataset with 3 rows and 2 columns."));
        assert!(prompt.contains("Columns: age, income"));
        assert!(prompt.ends_with("User Question: What is the average age?\n\nPlease provide a detailed analysis:"));

        let stats = subject.cache_stats();
        assert_eq!(
            stats,
            CacheStats {
                hits: 1,
                misses: 1,
                entries: 1,
                capacity: 50
            }
        );
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let provider = MockProvider::new()
            .then(MockOutcome::Fail("upstream down".to_owned()))
            .with_default_response("recovered");
        let subject = orchestrator(&provider, 50);
        let data = people();

        let first = subject.analyze(&data, "q", None).await;
        assert!(matches!(first, Err(Error::Provider(message)) if message == "upstream down"));
        assert_eq!(subject.cache_stats().entries, 0);

        let second = subject.analyze(&data, "q", None).await.unwrap();
        assert_eq!(second, "recovered");
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_eviction_forces_new_request() {
        let provider = MockProvider::new();
        let subject = orchestrator(&provider, 2);
        let data = people();

        for question in ["A", "B", "C"] {
            subject.analyze(&data, question, None).await.unwrap();
        }
        subject.analyze(&data, "A", None).await.unwrap();

        assert_eq!(provider.call_count(), 4);
        assert_eq!(subject.cache_stats().entries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_identical_questions_share_one_request() {
        let provider = MockProvider::new()
            .with_default_response("shared")
            .with_latency(Duration::from_millis(100));
        let subject = orchestrator(&provider, 50);
        let data = people();

        let (first, second) = tokio::join!(
            subject.analyze(&data, "same question", None),
            subject.analyze(&data, "same question", None),
        );

        assert_eq!(first.unwrap(), "shared");
        assert_eq!(second.unwrap(), "shared");
        assert_eq!(provider.call_count(), 1);
        assert!(subject.in_flight.lock_ignore_poison().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_questions_do_not_wait() {
        let provider = MockProvider::new().with_latency(Duration::from_millis(100));
        let subject = orchestrator(&provider, 50);
        let data = people();

        let started = Instant::now();
        let (first, second) = tokio::join!(
            subject.analyze(&data, "one", None),
            subject.analyze(&data, "two", None),
        );

        first.unwrap();
        second.unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(100));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_retries_after_leader_fails() {
        let provider = MockProvider::new()
            .then(MockOutcome::Fail("boom".to_owned()))
            .with_default_response("second try")
            .with_latency(Duration::from_millis(50));
        let subject = orchestrator(&provider, 50);
        let data = people();

        let (first, second) = tokio::join!(
            subject.analyze(&data, "q", None),
            subject.analyze(&data, "q", None),
        );

        assert!(matches!(first, Err(Error::Provider(_))));
        assert_eq!(second.unwrap(), "second try");
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_request() {
        let provider = MockProvider::new();
        let subject = orchestrator(&provider, 50);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = subject
            .analyze_with_cancel(&people(), "q", None, &cancel)
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(provider.call_count(), 0);
        assert!(subject.in_flight.lock_ignore_poison().is_empty());
    }

    #[tokio::test]
    async fn test_canned_analyses_honour_cancellation() {
        let provider = MockProvider::new();
        let subject = orchestrator(&provider, 50);
        let data = people();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(matches!(
            subject.summary_report_with_cancel(&data, None, &cancel).await,
            Err(Error::Cancelled)
        ));
        assert!(matches!(
            subject.suggest_questions_with_cancel(&data, None, &cancel).await,
            Err(Error::Cancelled)
        ));
        assert!(matches!(
            subject
                .explain_column_with_cancel(&data, "age", None, &cancel)
                .await,
            Err(Error::Cancelled)
        ));
        // Validation still runs first.
        assert!(matches!(
            subject
                .explain_column_with_cancel(&data, "zip", None, &cancel)
                .await,
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(provider.call_count(), 0);
        assert_eq!(subject.cache_stats().entries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_summary_report_cancelled_during_backoff() {
        let provider = MockProvider::new().then_rate_limited(1).with_default_response("late");
        let pipeline = RequestPipeline::new(Arc::new(provider.clone()), "test-model")
            .with_backoff_unit(Duration::from_secs(60));
        let subject = AnalysisOrchestrator::new(pipeline, 50).unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = subject
            .summary_report_with_cancel(&people(), None, &cancel)
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(60));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_explain_column_validation() {
        let provider = MockProvider::new();
        let subject = orchestrator(&provider, 50);

        let text = ExtractedData::Text("plain".to_owned());
        assert!(matches!(
            subject.explain_column(&text, "age", None).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            subject.explain_column(&people(), "zip", None).await,
            Err(Error::InvalidInput(message)) if message == "Column 'zip' not found in data"
        ));
        assert_eq!(provider.call_count(), 0);

        subject.explain_column(&people(), "age", None).await.unwrap();
        assert!(provider.get_call_history()[0].contains("the 'age' column"));
    }

    #[tokio::test]
    async fn test_canned_questions_go_through_cache() {
        let provider = MockProvider::new();
        let subject = orchestrator(&provider, 50);
        let data = people();

        subject.summary_report(&data, None).await.unwrap();
        subject.summary_report(&data, None).await.unwrap();
        subject.suggest_questions(&data, None).await.unwrap();

        assert_eq!(provider.call_count(), 2);
        assert!(provider.get_call_history()[1].contains("suggest 5-10"));
    }

    #[tokio::test]
    async fn test_clear_cache() {
        let provider = MockProvider::new();
        let subject = orchestrator(&provider, 50);
        let data = people();

        subject.analyze(&data, "q", None).await.unwrap();
        subject.clear_cache();
        subject.analyze(&data, "q", None).await.unwrap();

        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_interactions_logged_once_per_request() {
        let temp = TempDir::new().unwrap();
        let provider = MockProvider::new().with_default_response("logged answer");
        let subject = orchestrator(&provider, 50).with_logger(InteractionLogger::new(temp.path()));
        let info = FileInfo::from_upload("people.csv", 64).unwrap();
        let data = people();

        subject.analyze(&data, "q", Some(&info)).await.unwrap();
        subject.analyze(&data, "q", Some(&info)).await.unwrap();

        let responses = std_fs::read_to_string(temp.path().join(RESPONSES_FILE)).unwrap();
        assert_eq!(responses.matches("Response: logged answer").count(), 1);
        assert!(responses.contains("File: people.csv (CSV)"));
    }

    #[tokio::test]
    async fn test_logging_failure_does_not_fail_analysis() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("file");
        std_fs::write(&blocker, "x").unwrap();
        let provider = MockProvider::new().with_default_response("still fine");
        let subject = orchestrator(&provider, 50).with_logger(InteractionLogger::new(&blocker));

        let answer = subject.analyze(&people(), "q", None).await.unwrap();
        assert_eq!(answer, "still fine");
    }

    #[test]
    fn test_from_config_rejects_zero_capacity() {
        let mut config = DocqueryConfig::default();
        config.cache.max_size = 0;
        let provider: Arc<dyn CompletionProvider> = Arc::new(MockProvider::new());
        assert!(matches!(
            AnalysisOrchestrator::from_config(provider, &config),
            Err(Error::Config(_))
        ));
    }
}
