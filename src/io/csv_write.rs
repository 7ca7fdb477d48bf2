use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use super::excel_write::{WorkbookData, WorkbookSink};
use super::write_atomically;
use crate::error::{Result, ToolError};
use crate::model::LoadedTable;

/// Byte order mark written first so spreadsheet applications detect UTF-8.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Writes a single stacked table as UTF-8 delimited text.
///
/// Delimited text has no room for a summary sheet, so only the one data
/// table of the workbook is written.
#[derive(Debug, Clone)]
pub struct CsvTableWriter {
    path: PathBuf,
}

impl CsvTableWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl WorkbookSink for CsvTableWriter {
    fn write(&mut self, workbook: &WorkbookData) -> Result<()> {
        let [sheet] = workbook.sheets.as_slice() else {
            return Err(ToolError::write(
                &self.path,
                format!(
                    "delimited output holds exactly one table, got {}",
                    workbook.sheets.len()
                ),
            ));
        };
        write_csv(&self.path, &sheet.table)
    }
}

/// Writes `table` with its header row to `path`, replacing it atomically.
#[instrument(level = "info", skip_all, fields(output = %path.display(), rows = table.row_count()))]
pub fn write_csv(path: &Path, table: &LoadedTable) -> Result<()> {
    write_atomically(path, ".csv.tmp", |temp| {
        temp.as_file_mut().write_all(UTF8_BOM)?;
        let mut writer = csv::Writer::from_writer(temp.as_file_mut());
        writer.write_record(&table.columns)?;
        for row in &table.rows {
            writer.write_record(row.iter().map(|cell| cell.to_string()))?;
        }
        writer.flush()?;
        Ok(())
    })
    .map_err(|error| match error {
        write @ ToolError::Write { .. } => write,
        other => ToolError::write(path, other),
    })?;
    info!("delimited file written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::model::{CellValue, SourceFile, SourceFormat};

    fn table() -> LoadedTable {
        LoadedTable {
            source: SourceFile {
                path: PathBuf::from("/data/a.csv"),
                root: PathBuf::from("/data"),
                format: SourceFormat::Csv,
                index: 0,
            },
            columns: vec!["账户".into(), "amount".into()],
            rows: vec![
                vec![CellValue::from("6222020200112233445"), CellValue::Float(1.5)],
                vec![CellValue::from("a,b"), CellValue::Empty],
            ],
            source_column_count: 2,
            encoding: Some("UTF-8"),
        }
    }

    #[test]
    fn output_starts_with_a_bom_and_quotes_fields() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("merged.csv");

        write_csv(&path, &table()).expect("csv written");

        let bytes = fs::read(&path).expect("csv read back");
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).expect("utf-8");
        assert_eq!(text, "账户,amount\n6222020200112233445,1.5\n\"a,b\",\n");
    }

    #[test]
    fn more_than_one_table_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("merged.csv");
        let mut writer = CsvTableWriter::new(&path);

        let result = writer.write(&WorkbookData::default());

        assert!(matches!(result, Err(ToolError::Write { .. })));
        assert!(!path.exists());
    }
}
