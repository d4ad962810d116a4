//! Command handlers for CLI operations

use std::fs::{OpenOptions, create_dir_all};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use docquery_analysis::{
    AnalysisOrchestrator, AnalysisReport, ExtractedData, ExtractorRegistry, build_summary,
};
use docquery_core::{DocqueryConfig, Error, FileInfo, validate_api_key};
use docquery_providers::TogetherProvider;
use tokio::io::{AsyncBufReadExt as _, BufReader, stdin};
use tokio::task::JoinHandle;
use tokio::{fs as async_fs, select, signal};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

/// Options shared by every subcommand.
pub struct Settings {
    pub config: Option<PathBuf>,
    pub model: Option<String>,
    pub log_dir: Option<PathBuf>,
}

/// A single-shot question.
pub enum Query {
    Ask(String),
    Summary,
    Suggest,
    Explain(String),
}

/// Cancels its token on Ctrl-C until dropped.
struct InterruptWatch {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl InterruptWatch {
    fn spawn() -> Self {
        let token = CancellationToken::new();
        let watcher = token.clone();
        let handle = tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling request");
                watcher.cancel();
            }
        });
        Self { token, handle }
    }
}

impl Drop for InterruptWatch {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Handle `ask`, `summary`, `suggest` and `explain`.
///
/// # Errors
/// Returns an error if the file cannot be read or extracted, no API key is
/// configured, or the request fails.
#[allow(clippy::print_stdout, reason = "CLI output")]
pub async fn handle_query(settings: &Settings, file: &Path, query: Query) -> Result<()> {
    let config = prepare(settings)?;
    let (info, data) = load_upload(file).await?;
    let orchestrator = build_orchestrator(&config)?;
    let interrupt = InterruptWatch::spawn();

    let token = &interrupt.token;
    let answer = match query {
        Query::Ask(question) => {
            orchestrator
                .analyze_with_cancel(&data, &question, Some(&info), token)
                .await?
        }
        Query::Summary => {
            orchestrator
                .summary_report_with_cancel(&data, Some(&info), token)
                .await?
        }
        Query::Suggest => {
            orchestrator
                .suggest_questions_with_cancel(&data, Some(&info), token)
                .await?
        }
        Query::Explain(column) => {
            orchestrator
                .explain_column_with_cancel(&data, &column, Some(&info), token)
                .await?
        }
    };

    println!("{answer}");
    Ok(())
}

/// Handle `chat`: one question per stdin line against a shared cache.
///
/// # Errors
/// Returns an error if setup fails, stdin cannot be read, or the report
/// cannot be written.
#[allow(clippy::print_stdout, clippy::print_stderr, reason = "CLI output")]
pub async fn handle_chat(
    settings: &Settings,
    file: &Path,
    report_path: Option<&Path>,
) -> Result<()> {
    let config = prepare(settings)?;
    let (info, data) = load_upload(file).await?;
    let orchestrator = build_orchestrator(&config)?;
    let interrupt = InterruptWatch::spawn();
    let mut report = AnalysisReport::new(Some(info.clone()));

    let mut lines = BufReader::new(stdin()).lines();
    loop {
        let line = select! {
            line = lines.next_line() => line?,
            () = interrupt.token.cancelled() => break,
        };
        let Some(line) = line else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }

        match orchestrator
            .analyze_with_cancel(&data, question, Some(&info), &interrupt.token)
            .await
        {
            Ok(answer) => {
                println!("{answer}\n");
                report.push(question, answer);
            }
            Err(Error::Cancelled) => break,
            Err(error) => eprintln!("Error: {error}"),
        }
    }

    let stats = orchestrator.cache_stats();
    info!(
        hits = stats.hits,
        misses = stats.misses,
        entries = stats.entries,
        "chat session finished"
    );

    if let Some(path) = report_path {
        report
            .save(path)
            .await
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        println!("Report written to {}", path.display());
    }
    Ok(())
}

/// Handle `preview`: print the summary that would be sent to the model.
///
/// # Errors
/// Returns an error if the file cannot be read or extracted.
#[allow(clippy::print_stdout, reason = "CLI output")]
pub async fn handle_preview(settings: &Settings, file: &Path) -> Result<()> {
    prepare(settings)?;
    let (info, data) = load_upload(file).await?;
    println!("{} ({})", info.name, info.file_type);
    println!("{}", build_summary(&data));
    Ok(())
}

/// Handle `init-config`.
///
/// # Errors
/// Returns an error if the file exists without `--force` or cannot be written.
#[allow(clippy::print_stdout, reason = "CLI output")]
pub fn handle_init_config(settings: &Settings, force: bool) -> Result<()> {
    let path = match &settings.config {
        Some(path) => path.clone(),
        None => DocqueryConfig::config_path()?,
    };
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    DocqueryConfig::default().save_to_file(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// Load config, apply command-line overrides and start file logging.
fn prepare(settings: &Settings) -> Result<DocqueryConfig> {
    let (mut config, fallback) = match &settings.config {
        Some(path) => (
            DocqueryConfig::load_from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None,
        ),
        None => match DocqueryConfig::load_or_create() {
            Ok(config) => (config, None),
            Err(error) => (DocqueryConfig::default(), Some(error)),
        },
    };

    if let Some(model) = &settings.model {
        config.model.model.clone_from(model);
    }
    if let Some(log_dir) = &settings.log_dir {
        config.logging.log_dir.clone_from(log_dir);
    }
    config.validate()?;

    init_logging(&config.logging.log_dir)?;
    if let Some(error) = fallback {
        warn!("Failed to load config from ~/.docquery/config.toml: {error}");
        warn!("Using default configuration");
    }
    Ok(config)
}

fn init_logging(log_dir: &Path) -> Result<()> {
    create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("app.log"))?;

    Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "docquery_analysis=info,docquery_providers=info,docquery_cli=info".into()
        }))
        .with(
            fmt::layer()
                .with_writer(Arc::new(log_file))
                .with_ansi(false)
                .with_target(true)
                .with_level(true),
        )
        .init();
    Ok(())
}

async fn load_upload(path: &Path) -> Result<(FileInfo, ExtractedData)> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("Not a file path: {}", path.display()))?;
    let bytes = async_fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    Ok(ExtractorRegistry::default().extract_upload(name, &bytes)?)
}

fn build_orchestrator(config: &DocqueryConfig) -> Result<AnalysisOrchestrator> {
    let provider = TogetherProvider::from_config(config)?;
    if config
        .get_api_key()
        .is_some_and(|key| !validate_api_key(&key))
    {
        warn!("API key does not look valid; requests will likely be rejected");
    }
    info!(model = %config.model.model, "using Together AI");
    Ok(AnalysisOrchestrator::from_config(Arc::new(provider), config)?)
}
