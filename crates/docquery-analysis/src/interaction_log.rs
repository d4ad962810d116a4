//! Append-only, human-readable record of questions and answers.
//!
//! Two files live in the log directory: `agent_responses.txt` keeps every
//! full exchange, `interaction_log.txt` keeps one line per question.

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use docquery_core::{Error, FileInfo, Result};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt as _;

/// File receiving full exchanges.
pub const RESPONSES_FILE: &str = "agent_responses.txt";
/// File receiving one summary line per exchange.
pub const INDEX_FILE: &str = "interaction_log.txt";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const QUESTION_PREVIEW_CHARS: usize = 100;
const RULE_WIDTH: usize = 60;

/// How an exchange ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The model's answer.
    Answer(String),
    /// Display text of the terminal error.
    Failure(String),
}

/// One question and its outcome.
#[derive(Debug, Clone)]
pub struct Interaction<'entry> {
    /// The question as asked
    pub question: &'entry str,
    /// Upload the question was about, if any
    pub file: Option<&'entry FileInfo>,
    /// Answer or failure
    pub outcome: Outcome,
}

/// Writes interactions under a directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct InteractionLogger {
    dir: PathBuf,
}

impl InteractionLogger {
    /// Logs into `dir`.
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding both log files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Appends `interaction`, stamped with the local time.
    ///
    /// # Errors
    /// Returns [`Error::Logging`] if either file cannot be written.
    pub async fn record(&self, interaction: &Interaction<'_>) -> Result<()> {
        self.record_at(interaction, Local::now().naive_local()).await
    }

    /// Appends `interaction` stamped with `at`.
    ///
    /// # Errors
    /// Returns [`Error::Logging`] if either file cannot be written.
    pub async fn record_at(&self, interaction: &Interaction<'_>, at: NaiveDateTime) -> Result<()> {
        let timestamp = at.format(TIMESTAMP_FORMAT).to_string();

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|err| Error::Logging(format!("{}: {err}", self.dir.display())))?;

        self.append(RESPONSES_FILE, &response_block(&timestamp, interaction))
            .await?;
        self.append(INDEX_FILE, &index_line(&timestamp, interaction))
            .await
    }

    async fn append(&self, file_name: &str, contents: &str) -> Result<()> {
        let path = self.dir.join(file_name);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|err| Error::Logging(format!("{}: {err}", path.display())))?;
        file.write_all(contents.as_bytes())
            .await
            .map_err(|err| Error::Logging(format!("{}: {err}", path.display())))?;
        file.flush()
            .await
            .map_err(|err| Error::Logging(format!("{}: {err}", path.display())))
    }
}

fn response_block(timestamp: &str, interaction: &Interaction<'_>) -> String {
    let mut block = format!("=== {timestamp} ===\n");
    if let Some(file) = interaction.file {
        block.push_str(&format!("File: {} ({})\n", file.name, file.file_type));
    }
    block.push_str(&format!("Question: {}\n", interaction.question));
    match &interaction.outcome {
        Outcome::Answer(answer) => block.push_str(&format!("Response: {answer}\n")),
        Outcome::Failure(error) => block.push_str(&format!("Error: {error}\n")),
    }
    block.push_str(&"=".repeat(RULE_WIDTH));
    block.push_str("\n\n");
    block
}

fn index_line(timestamp: &str, interaction: &Interaction<'_>) -> String {
    let file_name = interaction.file.map_or("N/A", |file| file.name.as_str());
    let preview: String = interaction
        .question
        .chars()
        .take(QUESTION_PREVIEW_CHARS)
        .collect();
    let ellipsis = if interaction.question.chars().count() > QUESTION_PREVIEW_CHARS {
        "..."
    } else {
        ""
    };
    format!("{timestamp} | File: {file_name} | Question: {preview}{ellipsis}\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;
    use std::fs as std_fs;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(9, 26, 53)
            .unwrap()
    }

    #[tokio::test]
    async fn test_record_answer_with_file() {
        let temp = TempDir::new().unwrap();
        let logger = InteractionLogger::new(temp.path().join("logs"));
        let info = FileInfo::from_upload("people.csv", 120).unwrap();

        logger
            .record_at(
                &Interaction {
                    question: "What is the average age?",
                    file: Some(&info),
                    outcome: Outcome::Answer("The average age is 32.".to_owned()),
                },
                at(),
            )
            .await
            .unwrap();

        let responses = std_fs::read_to_string(logger.dir().join(RESPONSES_FILE)).unwrap();
        let expected = format!(
            "=== 2026-03-14 09:26:53 ===\n\
             File: people.csv (CSV)\n\
             Question: What is the average age?\n\
             Response: The average age is 32.\n\
             {}\n\n",
            "=".repeat(60)
        );
        assert_eq!(responses, expected);

        let index = std_fs::read_to_string(logger.dir().join(INDEX_FILE)).unwrap();
        assert_eq!(
            index,
            "2026-03-14 09:26:53 | File: people.csv | Question: What is the average age?\n"
        );
    }

    #[tokio::test]
    async fn test_record_failure_appends() {
        let temp = TempDir::new().unwrap();
        let logger = InteractionLogger::new(temp.path());
        let long_question = "q".repeat(150);

        for _ in 0..2 {
            logger
                .record_at(
                    &Interaction {
                        question: &long_question,
                        file: None,
                        outcome: Outcome::Failure("Request cancelled".to_owned()),
                    },
                    at(),
                )
                .await
                .unwrap();
        }

        let responses = std_fs::read_to_string(temp.path().join(RESPONSES_FILE)).unwrap();
        assert_eq!(responses.matches("Error: Request cancelled").count(), 2);
        assert!(!responses.contains("File:"));

        let index = std_fs::read_to_string(temp.path().join(INDEX_FILE)).unwrap();
        let lines: Vec<_> = index.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            format!("2026-03-14 09:26:53 | File: N/A | Question: {}...", "q".repeat(100))
        );
    }

    #[tokio::test]
    async fn test_unwritable_dir_is_logging_error() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("not-a-dir");
        std_fs::write(&blocker, "file").unwrap();
        let logger = InteractionLogger::new(&blocker);

        let result = logger
            .record(&Interaction {
                question: "q",
                file: None,
                outcome: Outcome::Answer("a".to_owned()),
            })
            .await;

        assert!(matches!(result, Err(Error::Logging(_))));
    }
}
