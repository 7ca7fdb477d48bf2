use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Format, Workbook, Worksheet};
use tracing::{debug, info, instrument};

use super::write_atomically;
use crate::error::{Result, ToolError};
use crate::model::{CellValue, LoadedTable, MAX_EXACT_INT, ProvenanceBlock, SheetAssignment};

/// Rows per worksheet supported by the workbook format.
pub const MAX_ROWS: usize = 1_048_576;
/// Columns per worksheet supported by the workbook format.
pub const MAX_COLUMNS: usize = 16_384;
/// Characters per cell supported by the workbook format.
pub const MAX_CELL_CHARS: usize = 32_767;

/// Header of the provenance block written below each data region.
const PROVENANCE_HEADER: [&str; 2] = ["Metadata", "Value"];
const DATE_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

/// One data sheet queued for output.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetData {
    pub assignment: SheetAssignment,
    pub table: LoadedTable,
    pub provenance: Option<ProvenanceBlock>,
}

impl SheetData {
    pub fn name(&self) -> &str {
        &self.assignment.sanitized_name
    }
}

/// Free-form rows written without a header, used for the run summary.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryTable {
    pub name: String,
    pub rows: Vec<Vec<CellValue>>,
}

/// Everything needed to materialise the consolidated workbook.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkbookData {
    pub sheets: Vec<SheetData>,
    pub summary: Option<SummaryTable>,
}

/// Destination for a consolidated workbook. Called once per run.
pub trait WorkbookSink {
    fn write(&mut self, workbook: &WorkbookData) -> Result<()>;
}

/// Writes `.xlsx` files, replacing the target only once the file is complete.
#[derive(Debug, Clone)]
pub struct XlsxWorkbookWriter {
    path: PathBuf,
}

impl XlsxWorkbookWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl WorkbookSink for XlsxWorkbookWriter {
    fn write(&mut self, workbook: &WorkbookData) -> Result<()> {
        write_workbook(&self.path, workbook)
    }
}

/// Writes the provided workbook data to the given path.
///
/// The workbook is saved to a temporary file next to the target and renamed
/// over it on success, so a failure never leaves a truncated file behind.
#[instrument(level = "info", skip_all, fields(output = %path.display(), sheets = workbook.sheets.len()))]
pub fn write_workbook(path: &Path, workbook: &WorkbookData) -> Result<()> {
    build_xlsx(workbook)
        .and_then(|mut xlsx| {
            write_atomically(path, ".xlsx.tmp", |temp| {
                xlsx.save(temp.path())?;
                Ok(())
            })
        })
        .map_err(|error| match error {
            write @ ToolError::Write { .. } => write,
            other => ToolError::write(path, other),
        })?;
    info!("workbook written");
    Ok(())
}

fn build_xlsx(workbook: &WorkbookData) -> Result<Workbook> {
    let mut workbook_writer = Workbook::new();
    let header_format = Format::new().set_bold();
    let date_format = Format::new().set_num_format(DATE_FORMAT);

    for sheet in &workbook.sheets {
        let worksheet = workbook_writer.add_worksheet();
        worksheet.set_name(sheet.name())?;
        write_data_sheet(worksheet, sheet, &header_format, &date_format)?;
        debug!(sheet = %sheet.name(), rows = sheet.table.row_count(), "sheet written");
    }

    if let Some(summary) = &workbook.summary {
        let worksheet = workbook_writer.add_worksheet();
        worksheet.set_name(&summary.name)?;
        for (row_idx, row) in summary.rows.iter().enumerate() {
            for (col_idx, cell) in row.iter().enumerate() {
                write_cell(worksheet, row_idx as u32, col_idx as u16, cell, &date_format)?;
            }
        }
        worksheet.set_column_width(0, 28)?;
    }

    Ok(workbook_writer)
}

fn write_data_sheet(
    worksheet: &mut Worksheet,
    sheet: &SheetData,
    header_format: &Format,
    date_format: &Format,
) -> Result<()> {
    let table = &sheet.table;

    for (col_idx, header) in table.columns.iter().enumerate() {
        worksheet.write_string_with_format(0, col_idx as u16, header, header_format)?;
    }

    for (row_idx, row) in table.rows.iter().enumerate() {
        for (col_idx, cell) in row.iter().enumerate() {
            write_cell(worksheet, (row_idx + 1) as u32, col_idx as u16, cell, date_format)?;
        }
    }

    if !table.columns.is_empty() {
        worksheet.set_freeze_panes(1, 0)?;
        if !table.rows.is_empty() {
            let col_end = (table.columns.len() - 1) as u16;
            worksheet.autofilter(0, 0, table.rows.len() as u32, col_end)?;
        }
    }

    if let Some(block) = &sheet.provenance {
        // Header row, data rows, then one blank separator row.
        let start = (table.rows.len() + 2) as u32;
        for (col_idx, header) in PROVENANCE_HEADER.iter().enumerate() {
            worksheet.write_string_with_format(start, col_idx as u16, *header, header_format)?;
        }
        for (offset, [label, value]) in block.rows().iter().enumerate() {
            let row = start + 1 + offset as u32;
            write_cell(worksheet, row, 0, label, date_format)?;
            write_cell(worksheet, row, 1, value, date_format)?;
        }
    }

    Ok(())
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    cell: &CellValue,
    date_format: &Format,
) -> Result<()> {
    match cell {
        CellValue::Empty => {}
        CellValue::Int(value) if value.unsigned_abs() > MAX_EXACT_INT => {
            worksheet.write_string(row, col, value.to_string())?;
        }
        CellValue::Int(value) => {
            worksheet.write_number(row, col, *value as f64)?;
        }
        CellValue::Float(value) if value.is_finite() => {
            worksheet.write_number(row, col, *value)?;
        }
        CellValue::Float(value) => {
            worksheet.write_string(row, col, value.to_string())?;
        }
        CellValue::Bool(value) => {
            worksheet.write_boolean(row, col, *value)?;
        }
        CellValue::DateTime(serial) => {
            worksheet.write_number_with_format(row, col, *serial, date_format)?;
        }
        CellValue::String(value) => {
            worksheet.write_string(row, col, value)?;
        }
    }
    Ok(())
}

/// Checks that a table fits on one worksheet.
///
/// Returns a human readable reason when it does not.
pub fn check_sheet_limits(table: &LoadedTable, with_provenance: bool) -> Option<String> {
    let block_rows = if with_provenance {
        // Separator, header, then the metadata rows.
        2 + ProvenanceBlock::row_count_for(table)
    } else {
        0
    };
    let needed_rows = table.row_count() + 1 + block_rows;
    if needed_rows > MAX_ROWS {
        return Some(format!(
            "{} rows exceed the worksheet limit of {MAX_ROWS}",
            table.row_count()
        ));
    }
    if table.column_count() > MAX_COLUMNS {
        return Some(format!(
            "{} columns exceed the worksheet limit of {MAX_COLUMNS}",
            table.column_count()
        ));
    }
    let oversized_header = table
        .columns
        .iter()
        .any(|header| header.chars().count() > MAX_CELL_CHARS);
    let oversized_cell = table
        .rows
        .iter()
        .flatten()
        .any(|cell| cell.text_len() > MAX_CELL_CHARS);
    if oversized_header || oversized_cell {
        return Some(format!(
            "a cell exceeds the limit of {MAX_CELL_CHARS} characters"
        ));
    }
    None
}
