use std::path::PathBuf;

use thiserror::Error;

use crate::model::MergeRun;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Error type covering the different failure cases that can occur when the
/// tool discovers, reads, consolidates, or analyses spreadsheet data.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Raised when a delimited text file cannot be tokenised.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Errors bubbled up from the spreadsheet reader implementation.
    #[error("spreadsheet read error: {0}")]
    SpreadsheetRead(#[from] calamine::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// A single input file could not be loaded. Recovered by the engine.
    #[error("failed to read {}: {cause}", .path.display())]
    Read { path: PathBuf, cause: String },

    /// The consolidated workbook could not be materialised.
    #[error("failed to write {}: {cause}", .path.display())]
    Write { path: PathBuf, cause: String },

    /// Nothing was discovered, or every attempted file failed to load.
    #[error(
        "no input could be consolidated ({} discovered, {} failed)",
        .0.total_files_discovered,
        .0.total_files_failed
    )]
    EmptyRun(Box<MergeRun>),

    /// The run was interrupted between two files.
    #[error("consolidation cancelled")]
    Cancelled,

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when configuration values are out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Raised when a workbook does not follow the expected conventions.
    #[error("invalid workbook structure: {0}")]
    InvalidWorkbook(String),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}

impl ToolError {
    /// Builds a [`ToolError::Read`] for the given path from any displayable cause.
    pub fn read(path: impl Into<PathBuf>, cause: impl std::fmt::Display) -> Self {
        ToolError::Read {
            path: path.into(),
            cause: cause.to_string(),
        }
    }

    /// Builds a [`ToolError::Write`] for the given path from any displayable cause.
    pub fn write(path: impl Into<PathBuf>, cause: impl std::fmt::Display) -> Self {
        ToolError::Write {
            path: path.into(),
            cause: cause.to_string(),
        }
    }
}
