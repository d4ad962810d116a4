//! Extracted data model: tables with typed cells, or plain text.

use core::fmt;

use docquery_core::{Error, Result};

/// A single table cell after type inference.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// A numeric value.
    Number(f64),
    /// Any non-numeric value.
    Text(String),
    /// A missing value.
    Empty,
}

impl Cell {
    /// Infers a cell from raw field text.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        trimmed
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map_or_else(|| Self::Text(raw.to_owned()), Self::Number)
    }

    /// The numeric value, if any.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(_) | Self::Empty => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(formatter, "{}", format_number(*value)),
            Self::Text(text) => formatter.write_str(text),
            Self::Empty => formatter.write_str("NaN"),
        }
    }
}

/// Formats whole numbers without a fractional part.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}

/// Descriptive statistics of one numeric column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnStats {
    /// Number of non-missing values
    pub count: usize,
    /// Arithmetic mean
    pub mean: f64,
    /// Sample standard deviation; `NaN` with fewer than two values
    pub std: f64,
    /// Smallest value
    pub min: f64,
    /// 25th percentile
    pub q25: f64,
    /// Median
    pub q50: f64,
    /// 75th percentile
    pub q75: f64,
    /// Largest value
    pub max: f64,
}

impl ColumnStats {
    /// Computes statistics over `values`; `None` when empty.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let mean = sorted.iter().sum::<f64>() / count as f64;
        let std = if count < 2 {
            f64::NAN
        } else {
            let squared: f64 = sorted.iter().map(|value| (value - mean).powi(2)).sum();
            (squared / (count - 1) as f64).sqrt()
        };

        Some(Self {
            count,
            mean,
            std,
            min: sorted[0],
            q25: quantile(&sorted, 0.25),
            q50: quantile(&sorted, 0.5),
            q75: quantile(&sorted, 0.75),
            max: sorted[count - 1],
        })
    }

    /// Row labels and values in describe order.
    pub fn rows(&self) -> [(&'static str, f64); 8] {
        [
            ("count", self.count as f64),
            ("mean", self.mean),
            ("std", self.std),
            ("min", self.min),
            ("25%", self.q25),
            ("50%", self.q50),
            ("75%", self.q75),
            ("max", self.max),
        ]
    }
}

/// Linear-interpolated quantile of sorted, non-empty `sorted`.
fn quantile(sorted: &[f64], fraction: f64) -> f64 {
    let position = fraction * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// A rectangular table of typed cells.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TabularData {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl TabularData {
    /// Builds a table, checking every row has one cell per column.
    ///
    /// # Errors
    /// Returns [`Error::Extraction`] on a ragged row.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self> {
        if let Some((index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(Error::Extraction(format!(
                "row {index} has {} fields, expected {}",
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    /// Number of data rows, header excluded.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Column names in file order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// All rows; each has one cell per column.
    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// Position of the column named `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Whether a column named `name` exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// The first `count` rows.
    pub fn head(&self, count: usize) -> &[Vec<Cell>] {
        &self.rows[..count.min(self.rows.len())]
    }

    /// Indices of columns whose present values are all numeric.
    ///
    /// A column with no values at all is not numeric.
    pub fn numeric_columns(&self) -> Vec<usize> {
        (0..self.columns.len())
            .filter(|&column| {
                let mut cells = self.rows.iter().map(|row| &row[column]);
                let mut any_number = false;
                let all_numeric = cells.all(|cell| match cell {
                    Cell::Number(_) => {
                        any_number = true;
                        true
                    }
                    Cell::Empty => true,
                    Cell::Text(_) => false,
                });
                all_numeric && any_number
            })
            .collect()
    }

    /// Present numeric values of `column`.
    pub fn numeric_values(&self, column: usize) -> Vec<f64> {
        self.rows
            .iter()
            .filter_map(|row| row.get(column).and_then(Cell::as_number))
            .collect()
    }

    /// Describe statistics for every numeric column, in column order.
    pub fn describe(&self) -> Vec<(&str, ColumnStats)> {
        self.numeric_columns()
            .into_iter()
            .filter_map(|column| {
                ColumnStats::from_values(&self.numeric_values(column))
                    .map(|stats| (self.columns[column].as_str(), stats))
            })
            .collect()
    }
}

/// What extraction produced for an upload.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedData {
    /// Structured rows and columns.
    Table(TabularData),
    /// Free text (text files, PDF text, OCR output).
    Text(String),
}

impl ExtractedData {
    /// The table, if this is tabular data.
    pub fn as_table(&self) -> Option<&TabularData> {
        match self {
            Self::Table(table) => Some(table),
            Self::Text(_) => None,
        }
    }
}
