//! Turning raw uploads into [`ExtractedData`].
//!
//! Dispatch happens once, on the closed [`FileKind`] set. CSV, spreadsheets,
//! PDF and plain text are handled here; an OCR backend for images plugs in
//! through [`ExtractorRegistry::register`].

use core::str::from_utf8;
use std::collections::HashMap;
use std::io::Cursor;

use calamine::{Data, Range, Reader as _, open_workbook_auto_from_rs};
use csv::ReaderBuilder;
use docquery_core::{Error, FileInfo, FileKind, Result};
use pdf_extract::extract_text_from_mem;
use tracing::info;

use crate::data::{Cell, ExtractedData, TabularData};

/// UTF-8 byte order mark.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Converts the raw bytes of one file kind into extracted data.
pub trait Extractor: Send + Sync {
    /// Extracts `bytes`.
    ///
    /// # Errors
    /// Returns [`Error::Extraction`] when the bytes cannot be understood.
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedData>;
}

/// Decodes text as UTF-8, falling back to Latin-1 so any byte sequence reads.
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match from_utf8(bytes) {
        Ok(text) => text.to_owned(),
        Err(_) => {
            info!("input is not valid UTF-8, decoding as Latin-1");
            bytes.iter().copied().map(char::from).collect()
        }
    }
}

/// Comma separated values with a header row.
///
/// Rows shorter than the header are padded with [`Cell::Empty`]; rows longer
/// than the header are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvExtractor;

impl Extractor for CsvExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedData> {
        let text = decode_text(bytes);
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let columns: Vec<String> = reader
            .headers()
            .map_err(|err| Error::Extraction(format!("Error reading CSV header: {err}")))?
            .iter()
            .map(str::to_owned)
            .collect();

        let rows = reader
            .records()
            .enumerate()
            .map(|(index, record)| {
                let fields = record
                    .map_err(|err| Error::Extraction(format!("Error reading CSV: {err}")))?;
                if fields.len() > columns.len() {
                    return Err(Error::Extraction(format!(
                        "Error reading CSV: line {} has {} fields, expected {}",
                        index + 2,
                        fields.len(),
                        columns.len()
                    )));
                }
                let mut row: Vec<Cell> = fields.iter().map(Cell::parse).collect();
                row.resize(columns.len(), Cell::Empty);
                Ok(row)
            })
            .collect::<Result<Vec<_>>>()?;

        let table = TabularData::new(columns, rows)?;
        info!(
            rows = table.row_count(),
            columns = table.column_count(),
            "CSV loaded"
        );
        Ok(ExtractedData::Table(table))
    }
}

/// Excel workbooks; only the first sheet is read, its first row being the
/// header.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpreadsheetExtractor;

impl Extractor for SpreadsheetExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedData> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
            .map_err(|err| Error::Extraction(format!("Error reading Excel file: {err}")))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| {
                Error::Extraction("Error reading Excel file: workbook has no sheets".to_owned())
            })?
            .map_err(|err| Error::Extraction(format!("Error reading Excel file: {err}")))?;

        let table = table_from_range(&range)?;
        info!(
            rows = table.row_count(),
            columns = table.column_count(),
            "Excel file loaded"
        );
        Ok(ExtractedData::Table(table))
    }
}

fn table_from_range(range: &Range<Data>) -> Result<TabularData> {
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(TabularData::default());
    };

    let columns = header
        .iter()
        .enumerate()
        .map(|(index, value)| match value {
            Data::Empty => format!("Unnamed: {index}"),
            other => other.to_string(),
        })
        .collect();
    let body = rows
        .map(|row| row.iter().map(spreadsheet_cell).collect())
        .collect();
    TabularData::new(columns, body)
}

fn spreadsheet_cell(value: &Data) -> Cell {
    match value {
        Data::Int(number) => Cell::Number(*number as f64),
        Data::Float(number) => Cell::Number(*number),
        Data::Empty => Cell::Empty,
        Data::String(text) if text.trim().is_empty() => Cell::Empty,
        other => Cell::Text(other.to_string()),
    }
}

/// Text layer of PDF documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfExtractor;

impl Extractor for PdfExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedData> {
        let text = extract_text_from_mem(bytes)
            .map_err(|err| Error::Extraction(format!("Error reading PDF: {err}")))?;
        let text = require_text(text)?;
        info!(chars = text.chars().count(), "PDF processed");
        Ok(ExtractedData::Text(text))
    }
}

/// Scanned PDFs without a text layer yield nothing useful.
fn require_text(text: String) -> Result<String> {
    if text.trim().is_empty() {
        return Err(Error::Extraction(
            "Error reading PDF: No text could be extracted from PDF".to_owned(),
        ));
    }
    Ok(text)
}

/// Plain text files.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextExtractor;

impl Extractor for TextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedData> {
        let text = decode_text(bytes);
        info!(chars = text.chars().count(), "text file loaded");
        Ok(ExtractedData::Text(text))
    }
}

/// Extractors keyed by file kind.
pub struct ExtractorRegistry {
    extractors: HashMap<FileKind, Box<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// A registry with no extractors.
    pub fn empty() -> Self {
        Self {
            extractors: HashMap::new(),
        }
    }

    /// A registry with every built-in extractor; images have none.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(FileKind::Csv, Box::new(CsvExtractor));
        registry.register(FileKind::Spreadsheet, Box::new(SpreadsheetExtractor));
        registry.register(FileKind::Pdf, Box::new(PdfExtractor));
        registry.register(FileKind::Text, Box::new(TextExtractor));
        registry
    }

    /// Installs `extractor` for `kind`, replacing any previous one.
    pub fn register(&mut self, kind: FileKind, extractor: Box<dyn Extractor>) {
        self.extractors.insert(kind, extractor);
    }

    /// Whether an extractor is installed for `kind`.
    pub fn supports(&self, kind: FileKind) -> bool {
        self.extractors.contains_key(&kind)
    }

    /// Extracts `bytes` declared as `kind`.
    ///
    /// # Errors
    /// Returns [`Error::Extraction`] if no extractor is registered for
    /// `kind` or the extractor fails.
    pub fn extract(&self, bytes: &[u8], kind: FileKind) -> Result<ExtractedData> {
        let extractor = self.extractors.get(&kind).ok_or_else(|| {
            Error::Extraction(format!("no extractor available for {kind} files"))
        })?;
        extractor.extract(bytes)
    }

    /// Resolves the kind of `name`, then extracts `bytes`.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedType`] for unknown extensions, otherwise
    /// whatever [`Self::extract`] returns.
    pub fn extract_upload(&self, name: &str, bytes: &[u8]) -> Result<(FileInfo, ExtractedData)> {
        let info = FileInfo::from_upload(name, bytes.len() as u64)?;
        info!(file = %info.name, kind = %info.kind, "processing upload");
        let data = self.extract(bytes, info.kind)?;
        Ok((info, data))
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}
