//! Adapters between on-disk spreadsheet formats and the in-memory model.

pub mod csv_write;
pub mod excel_write;
pub mod table_read;

use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{Result, ToolError};

/// Prefix of the temporary files written next to an output.
pub const TEMP_PREFIX: &str = ".finsheet-";

/// Fills a temporary sibling of `path` and renames it over `path` once
/// `fill` succeeds. On failure the temporary file is removed and any
/// existing file at `path` is left as it was.
pub(crate) fn write_atomically<F>(path: &Path, suffix: &str, fill: F) -> Result<()>
where
    F: FnOnce(&mut NamedTempFile) -> Result<()>,
{
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut temp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(suffix)
        .tempfile_in(&directory)?;

    fill(&mut temp)?;
    temp.persist(path)
        .map_err(|error| ToolError::write(path, error.error))?;
    Ok(())
}
