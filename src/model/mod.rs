use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Column appended to every loaded table carrying the source file name.
pub const SOURCE_FILE_COLUMN: &str = "source_file";
/// Column appended to every loaded table carrying the source directory.
pub const SOURCE_FOLDER_COLUMN: &str = "source_folder";

/// Input formats recognised during discovery. The set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Xlsx,
    Xls,
    Csv,
}

impl SourceFormat {
    /// Matches an extension (without the leading dot) case-insensitively.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "xlsx" => Some(SourceFormat::Xlsx),
            "xls" => Some(SourceFormat::Xls),
            "csv" => Some(SourceFormat::Csv),
            _ => None,
        }
    }

    /// Detects the format of a path from its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn extension(self) -> &'static str {
        match self {
            SourceFormat::Xlsx => "xlsx",
            SourceFormat::Xls => "xls",
            SourceFormat::Csv => "csv",
        }
    }

    /// Whether the format is a binary spreadsheet rather than delimited text.
    pub fn is_spreadsheet(self) -> bool {
        !matches!(self, SourceFormat::Csv)
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".{}", self.extension())
    }
}

/// A file found during discovery. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Root directory (as supplied by the caller) the file was found under.
    pub root: PathBuf,
    pub format: SourceFormat,
    /// Position in the discovery order, starting at zero.
    pub index: usize,
}

impl SourceFile {
    /// File name including the extension, lossily converted for display.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Directory containing the file.
    pub fn folder(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }
}

/// Significant decimal digits a double reproduces exactly.
pub const EXACT_DIGITS: usize = 15;
/// Largest integer magnitude a double stores exactly.
pub const MAX_EXACT_INT: u64 = 1 << 53;

/// A single typed cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Empty,
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Spreadsheet date serial (days since 1899-12-30, fractional time).
    DateTime(f64),
    String(String),
}

impl CellValue {
    /// Types a raw text cell: integer, then finite float, then boolean,
    /// otherwise the text itself. Surrounding whitespace is ignored.
    ///
    /// Numbers with more than [`EXACT_DIGITS`] significant digits stay text,
    /// so account numbers and identifiers are written exactly as read.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return CellValue::Empty;
        }
        let exact = significant_digits(trimmed) <= EXACT_DIGITS;
        if let Ok(value) = trimmed.parse::<i64>() {
            return if exact {
                CellValue::Int(value)
            } else {
                CellValue::String(raw.to_string())
            };
        }
        if let Ok(value) = trimmed.parse::<f64>() {
            if value.is_finite() {
                return if exact {
                    CellValue::Float(value)
                } else {
                    CellValue::String(raw.to_string())
                };
            }
        }
        match trimmed {
            "true" | "TRUE" | "True" => CellValue::Bool(true),
            "false" | "FALSE" | "False" => CellValue::Bool(false),
            _ => CellValue::String(raw.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Numeric view used by the analytics. Date serials are not numbers here.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(value) => Some(*value as f64),
            CellValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// Number of characters the cell occupies when written as text.
    pub fn text_len(&self) -> usize {
        match self {
            CellValue::String(value) => value.chars().count(),
            _ => 0,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Int(value) => write!(f, "{value}"),
            CellValue::Float(value) => write!(f, "{value}"),
            CellValue::Bool(value) => write!(f, "{value}"),
            CellValue::DateTime(serial) => match serial_to_datetime(*serial) {
                Some(datetime) => write!(f, "{}", datetime.format("%Y-%m-%d %H:%M:%S")),
                None => write!(f, "{serial}"),
            },
            CellValue::String(value) => f.write_str(value),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::String(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::String(value)
    }
}

impl From<usize> for CellValue {
    fn from(value: usize) -> Self {
        i64::try_from(value)
            .map(CellValue::Int)
            .unwrap_or(CellValue::Float(value as f64))
    }
}

/// Counts the significant digits of a numeric literal's mantissa.
fn significant_digits(number: &str) -> usize {
    let mantissa = number.split(['e', 'E']).next().unwrap_or(number);
    let digits: String = mantissa.chars().filter(|ch| ch.is_ascii_digit()).collect();
    digits.trim_start_matches('0').trim_end_matches('0').len()
}

/// Converts a spreadsheet date serial into a calendar timestamp.
pub fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    // 2_958_466 is 10000-01-01, past the last date the format can store.
    if !(0.0..2_958_466.0).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}

/// A table loaded from one source file, provenance columns included.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedTable {
    pub source: SourceFile,
    /// Column names, unique within the table.
    pub columns: Vec<String>,
    /// Rows, each exactly `columns.len()` cells wide.
    pub rows: Vec<Vec<CellValue>>,
    /// Number of columns the source itself contributed.
    pub source_column_count: usize,
    /// Encoding label used to decode delimited text, if any.
    pub encoding: Option<&'static str>,
}

impl LoadedTable {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Cells of one column, top to bottom.
    pub fn column_cells(&self, index: usize) -> impl Iterator<Item = &CellValue> + '_ {
        self.rows.iter().filter_map(move |row| row.get(index))
    }
}

/// Per-sheet metadata block written below the data region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvenanceBlock {
    pub original_filename: String,
    pub original_path: PathBuf,
    pub processed_at: DateTime<Local>,
    pub row_count: usize,
    pub column_count: usize,
    /// Encoding a delimited source was decoded with.
    pub encoding: Option<&'static str>,
}

impl ProvenanceBlock {
    pub fn for_table(table: &LoadedTable, processed_at: DateTime<Local>) -> Self {
        Self {
            original_filename: table.source.file_name(),
            original_path: table.source.path.clone(),
            processed_at,
            row_count: table.row_count(),
            column_count: table.source_column_count,
            encoding: table.encoding,
        }
    }

    /// Number of label/value rows the block of `table` will have.
    pub fn row_count_for(table: &LoadedTable) -> usize {
        5 + usize::from(table.encoding.is_some())
    }

    /// Label/value rows in the order they appear on the sheet.
    pub fn rows(&self) -> Vec<[CellValue; 2]> {
        let mut rows = vec![
            ["Original filename".into(), self.original_filename.clone().into()],
            [
                "Original path".into(),
                self.original_path.display().to_string().into(),
            ],
            [
                "Processed at".into(),
                self.processed_at.format("%Y-%m-%d %H:%M:%S").to_string().into(),
            ],
            ["Row count".into(), self.row_count.into()],
            ["Column count".into(), self.column_count.into()],
        ];
        if let Some(encoding) = self.encoding {
            rows.push(["Encoding".into(), encoding.into()]);
        }
        rows
    }
}

/// The sheet name allocated to one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SheetAssignment {
    pub sanitized_name: String,
    pub source: SourceFile,
    /// Zero when the name was free, otherwise the `_N` suffix used.
    pub collision_suffix: usize,
}

/// One row of the sheet index recorded in the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetRecord {
    pub sheet_name: String,
    pub original_filename: String,
    pub original_path: PathBuf,
    pub root_folder: PathBuf,
    pub row_count: usize,
    pub column_count: usize,
    /// Encoding a delimited source was decoded with; `None` for spreadsheets.
    pub encoding: Option<&'static str>,
}

impl SheetRecord {
    pub fn new(sheet_name: &str, table: &LoadedTable) -> Self {
        Self {
            sheet_name: sheet_name.to_string(),
            original_filename: table.source.file_name(),
            original_path: table.source.path.clone(),
            root_folder: table.source.root.clone(),
            row_count: table.row_count(),
            column_count: table.source_column_count,
            encoding: table.encoding,
        }
    }
}

/// A file that was attempted and could not be consolidated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub root: PathBuf,
    pub message: String,
}

/// A root directory that could not be scanned (or scanned only partially).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryWarning {
    pub root: PathBuf,
    pub message: String,
}

/// Phases a consolidation run moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunPhase {
    Init,
    Discovering,
    Reading,
    Writing,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunPhase::Init => "init",
            RunPhase::Discovering => "discovering",
            RunPhase::Reading => "reading",
            RunPhase::Writing => "writing",
            RunPhase::Done => "done",
        };
        f.write_str(label)
    }
}

/// Totals and per-file outcomes accumulated over one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeRun {
    pub output: PathBuf,
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
    pub total_files_discovered: usize,
    pub total_files_attempted: usize,
    pub total_files_processed: usize,
    pub total_files_failed: usize,
    pub total_rows_written: usize,
    pub sheets: Vec<SheetRecord>,
    pub errors: Vec<FileFailure>,
    /// Files dropped because the sheet ceiling was reached.
    pub skipped_by_limit: Vec<PathBuf>,
    pub discovery_warnings: Vec<DiscoveryWarning>,
}

impl MergeRun {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            started_at: Local::now(),
            finished_at: None,
            total_files_discovered: 0,
            total_files_attempted: 0,
            total_files_processed: 0,
            total_files_failed: 0,
            total_rows_written: 0,
            sheets: Vec::new(),
            errors: Vec::new(),
            skipped_by_limit: Vec::new(),
            discovery_warnings: Vec::new(),
        }
    }

    /// Records a successfully consolidated table.
    pub fn record_success(&mut self, record: SheetRecord) {
        self.total_files_processed += 1;
        self.total_rows_written += record.row_count;
        self.sheets.push(record);
    }

    /// Records a file that could not be consolidated.
    pub fn record_failure(&mut self, source: &SourceFile, message: impl Into<String>) {
        self.total_files_failed += 1;
        self.errors.push(FileFailure {
            path: source.path.clone(),
            root: source.root.clone(),
            message: message.into(),
        });
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Local::now());
    }

    /// `processed + failed == attempted <= discovered`.
    pub fn is_consistent(&self) -> bool {
        self.total_files_processed + self.total_files_failed == self.total_files_attempted
            && self.total_files_attempted <= self.total_files_discovered
    }
}
