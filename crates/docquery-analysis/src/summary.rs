//! Context building: the bounded textual summary of extracted data and the
//! prompt sent to the completion service.

use docquery_core::FileInfo;

use crate::data::{Cell, ExtractedData, TabularData};

/// Rows shown in the data preview.
pub const PREVIEW_ROWS: usize = 5;
/// Characters of text data shown in the preview.
pub const TEXT_PREVIEW_CHARS: usize = 500;

const PREAMBLE: &str = "You are a professional data analyst AI assistant. ";
const INSTRUCTIONS: &str = "Please analyze this data and provide insights. \
    Be specific, accurate, and helpful. If you need to make assumptions, \
    clearly state them. Provide actionable insights when possible.";
const CLOSING: &str = "Please provide a detailed analysis:";

/// Gap between table columns.
const COLUMN_GAP: &str = "  ";

/// Summarizes `data` for inclusion in a prompt.
pub fn build_summary(data: &ExtractedData) -> String {
    match data {
        ExtractedData::Table(table) => summarize_table(table),
        ExtractedData::Text(text) => summarize_text(text),
    }
}

fn summarize_table(table: &TabularData) -> String {
    let mut summary = format!(
        "Dataset with {} rows and {} columns.",
        table.row_count(),
        table.column_count()
    );
    if table.column_count() == 0 {
        return summary;
    }

    summary.push_str(&format!("\nColumns: {}\n", table.columns().join(", ")));

    let header = if table.row_count() > PREVIEW_ROWS {
        "First 5 rows:"
    } else {
        "Data preview:"
    };
    let preview = table.head(PREVIEW_ROWS);
    let labels: Vec<String> = (0..preview.len()).map(|index| index.to_string()).collect();
    let cells: Vec<Vec<String>> = preview
        .iter()
        .map(|row| row.iter().map(Cell::to_string).collect())
        .collect();
    summary.push_str(&format!(
        "\n{header}\n{}\n",
        render_table(table.columns(), &labels, &cells)
    ));

    let described = table.describe();
    if !described.is_empty() {
        let names: Vec<String> = described.iter().map(|(name, _)| (*name).to_owned()).collect();
        let stat_labels: Vec<String> = described
            .first()
            .map(|(_, stats)| {
                stats.rows().iter().map(|(label, _)| (*label).to_owned()).collect()
            })
            .unwrap_or_default();
        let stat_rows: Vec<Vec<String>> = (0..stat_labels.len())
            .map(|row| {
                described
                    .iter()
                    .map(|(_, stats)| format_stat(stats.rows()[row].1))
                    .collect()
            })
            .collect();
        summary.push_str(&format!(
            "\nBasic statistics for numeric columns:\n{}",
            render_table(&names, &stat_labels, &stat_rows)
        ));
    }

    summary
}

fn summarize_text(text: &str) -> String {
    let total = text.chars().count();
    let preview: String = text.chars().take(TEXT_PREVIEW_CHARS).collect();
    let ellipsis = if total > TEXT_PREVIEW_CHARS { "..." } else { "" };
    format!("Text data with {total} characters.\nPreview: {preview}{ellipsis}")
}

fn format_stat(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_owned()
    } else {
        format!("{value:.6}")
    }
}

/// Renders a right-aligned text table with a leading index column.
fn render_table(columns: &[String], labels: &[String], rows: &[Vec<String>]) -> String {
    let index_width = labels.iter().map(|label| label.chars().count()).max().unwrap_or(0);
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(column, name)| {
            rows.iter()
                .filter_map(|row| row.get(column))
                .map(|value| value.chars().count())
                .chain([name.chars().count()])
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut lines = Vec::with_capacity(rows.len() + 1);

    let mut header = " ".repeat(index_width);
    for (name, width) in columns.iter().zip(&widths) {
        header.push_str(&format!("{COLUMN_GAP}{name:>width$}"));
    }
    lines.push(header);

    for (label, row) in labels.iter().zip(rows) {
        let mut line = format!("{label:<index_width$}");
        for (value, width) in row.iter().zip(&widths) {
            line.push_str(&format!("{COLUMN_GAP}{value:>width$}"));
        }
        lines.push(line);
    }

    lines.join("\n")
}

/// Assembles the full prompt for `question` about data described by `summary`.
pub fn build_prompt(summary: &str, question: &str, file_info: Option<&FileInfo>) -> String {
    let mut prompt = String::from(PREAMBLE);
    if let Some(info) = file_info {
        prompt.push_str(&format!(
            "The user has uploaded a {} file named '{}'. ",
            info.file_type, info.name
        ));
    }
    prompt.push_str(&format!(
        "\n\nData Summary:\n{summary}\n\n{INSTRUCTIONS}\n\nUser Question: {question}\n\n{CLOSING}"
    ));
    prompt
}
