//! Markdown export of a question/answer session.

use std::path::Path;

use chrono::{Local, NaiveDateTime};
use docquery_core::{FileInfo, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Human-readable size with one decimal, e.g. `1.5 KB`.
pub fn format_file_size(size_bytes: u64) -> String {
    if size_bytes == 0 {
        return "0 B".to_owned();
    }

    let mut size = size_bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.1} {}", SIZE_UNITS[unit])
}

/// One answered question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaRecord {
    /// Question text
    pub question: String,
    /// Model answer
    pub answer: String,
}

/// Session history for one uploaded file.
#[derive(Debug, Clone, Default)]
pub struct AnalysisReport {
    file: Option<FileInfo>,
    records: Vec<QaRecord>,
}

impl AnalysisReport {
    /// Starts an empty report, optionally about `file`.
    pub fn new(file: Option<FileInfo>) -> Self {
        Self {
            file,
            records: Vec::new(),
        }
    }

    /// Appends one answered question.
    pub fn push<Q: Into<String>, A: Into<String>>(&mut self, question: Q, answer: A) {
        self.records.push(QaRecord {
            question: question.into(),
            answer: answer.into(),
        });
    }

    /// Answered questions, oldest first.
    pub fn records(&self) -> &[QaRecord] {
        &self.records
    }

    /// Whether nothing has been answered yet.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Renders the report with the current local time.
    pub fn to_markdown(&self) -> String {
        self.to_markdown_at(Local::now().naive_local())
    }

    /// Renders the report stamped with `generated_on`.
    pub fn to_markdown_at(&self, generated_on: NaiveDateTime) -> String {
        let mut content = String::from("# Data Analysis Report\n\n");
        content.push_str(&format!(
            "**Generated on:** {}\n\n",
            generated_on.format("%Y-%m-%d %H:%M:%S")
        ));

        if let Some(file) = &self.file {
            content.push_str("## File Information\n\n");
            content.push_str(&format!("- **File Name:** {}\n", file.name));
            content.push_str(&format!("- **File Type:** {}\n", file.file_type));
            content.push_str(&format!(
                "- **File Size:** {}\n\n",
                format_file_size(file.size_bytes)
            ));
        }

        content.push_str("## Analysis Results\n\n");
        for (number, record) in self.records.iter().enumerate() {
            content.push_str(&format!("### Question {}\n\n", number + 1));
            content.push_str(&format!("**Q:** {}\n\n", record.question));
            content.push_str(&format!("**A:** {}\n\n", record.answer));
            content.push_str("---\n\n");
        }

        content.push_str("\n*Report generated by docquery*\n");
        content
    }

    /// Writes the Markdown report to `path`.
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be written.
    pub async fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_markdown()).await?;
        Ok(())
    }
}
