use std::borrow::Cow;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use calamine::{DataType, Range, Reader, open_workbook_auto};
use encoding_rs::{Encoding, GBK, UTF_8, WINDOWS_1252};
use tracing::{debug, instrument};

use crate::error::{Result, ToolError};
use crate::model::{
    CellValue, LoadedTable, SOURCE_FILE_COLUMN, SOURCE_FOLDER_COLUMN, SourceFile, SourceFormat,
};

/// Encodings tried, in order, when decoding delimited text.
///
/// This is a heuristic: a file in one legacy encoding can decode without error
/// under another and come out garbled. The last entry maps every byte, so
/// decoding itself never fails.
pub const CSV_ENCODINGS: [&Encoding; 3] = [UTF_8, GBK, WINDOWS_1252];

/// Loads one discovered file into a table with provenance columns appended.
///
/// Any failure, whatever its origin, comes back as [`ToolError::Read`] so the
/// caller can record it and move on to the next file.
#[instrument(level = "debug", skip_all, fields(path = %source.path.display(), format = %source.format))]
pub fn read_table(source: &SourceFile) -> Result<LoadedTable> {
    load(source).map_err(|error| match error {
        read @ ToolError::Read { .. } => read,
        other => ToolError::read(&source.path, other),
    })
}

fn load(source: &SourceFile) -> Result<LoadedTable> {
    let (headers, rows, encoding) = if source.format.is_spreadsheet() {
        let (headers, rows) = read_first_sheet(&source.path)?;
        (headers, rows, None)
    } else {
        let bytes = fs::read(&source.path)?;
        let (text, encoding) = decode_text(&bytes);
        debug!(encoding = encoding.name(), "decoded delimited text");
        let (headers, rows) = parse_csv(&text)?;
        (headers, rows, Some(encoding.name()))
    };

    let source_column_count = headers.len();
    let mut columns = headers;
    columns.push(SOURCE_FILE_COLUMN.to_string());
    columns.push(SOURCE_FOLDER_COLUMN.to_string());
    let columns = normalize_headers(columns);

    let file_name = CellValue::String(source.file_name());
    let folder = CellValue::String(source.folder().display().to_string());
    let rows = rows
        .into_iter()
        .map(|mut row| {
            row.push(file_name.clone());
            row.push(folder.clone());
            row
        })
        .collect();

    Ok(LoadedTable {
        source: source.clone(),
        columns,
        rows,
        source_column_count,
        encoding,
    })
}

/// Decodes bytes with the first encoding in [`CSV_ENCODINGS`] that accepts them.
///
/// A byte order mark, when present, decides the encoding instead.
pub fn decode_text(bytes: &[u8]) -> (Cow<'_, str>, &'static Encoding) {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        if let Some(text) =
            encoding.decode_without_bom_handling_and_without_replacement(&bytes[bom_len..])
        {
            return (text, encoding);
        }
    }

    for encoding in CSV_ENCODINGS {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            return (text, encoding);
        }
    }

    let fallback = CSV_ENCODINGS[CSV_ENCODINGS.len() - 1];
    let (text, _) = fallback.decode_without_bom_handling(bytes);
    (text, fallback)
}

/// Parses decoded delimited text. The first record is the header.
pub fn parse_csv(text: &str) -> Result<(Vec<String>, Vec<Vec<CellValue>>)> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.is_empty() {
        return Err(ToolError::InvalidWorkbook("no columns to parse".into()));
    }
    let width = headers.len();

    let mut rows = Vec::new();
    for (row_idx, record) in reader.records().enumerate() {
        let record = record?;
        let mut cells: Vec<CellValue> = record.iter().map(CellValue::parse).collect();

        if cells.len() > width {
            if cells[width..].iter().any(|cell| !cell.is_empty()) {
                return Err(ToolError::InvalidWorkbook(format!(
                    "row {} has {} fields, expected {width}",
                    row_idx + 2,
                    cells.len()
                )));
            }
            cells.truncate(width);
        }
        cells.resize(width, CellValue::Empty);
        rows.push(cells);
    }

    Ok((headers, rows))
}

fn read_first_sheet(path: &Path) -> Result<(Vec<String>, Vec<Vec<CellValue>>)> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ToolError::InvalidWorkbook("workbook contains no sheets".into()))??;
    Ok(read_sheet_range(&range, false))
}

/// Splits a sheet range into header names and typed rows.
///
/// With `stop_at_blank_row`, reading ends at the first row whose cells are
/// all empty.
pub fn read_sheet_range(
    range: &Range<DataType>,
    stop_at_blank_row: bool,
) -> (Vec<String>, Vec<Vec<CellValue>>) {
    let mut rows_iter = range.rows();
    let headers: Vec<String> = match rows_iter.next() {
        Some(first_row) => first_row
            .iter()
            .map(|cell| cell_value(cell).to_string())
            .collect(),
        None => return (Vec::new(), Vec::new()),
    };

    let mut rows = Vec::new();
    for row in rows_iter {
        let cells: Vec<CellValue> = row.iter().map(cell_value).collect();
        if stop_at_blank_row && cells.iter().all(CellValue::is_empty) {
            break;
        }
        rows.push(cells);
    }

    (normalize_headers(headers), rows)
}

/// Loads every sheet of a consolidated workbook except the excluded names.
///
/// Provenance columns written during consolidation are kept as-is and the
/// trailing provenance block (after the first blank row) is ignored.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn read_workbook_tables(path: &Path, exclude: &[&str]) -> Result<Vec<(String, LoadedTable)>> {
    let mut workbook = open_workbook_auto(path)?;
    let sheet_names: Vec<String> = workbook.sheet_names().to_owned();
    let source = SourceFile {
        path: path.to_path_buf(),
        root: path.parent().map(Path::to_path_buf).unwrap_or_default(),
        format: SourceFormat::Xlsx,
        index: 0,
    };

    let mut tables = Vec::new();
    for (index, name) in sheet_names.into_iter().enumerate() {
        if exclude.iter().any(|skip| skip.eq_ignore_ascii_case(&name)) {
            continue;
        }
        let range = workbook
            .worksheet_range(&name)
            .ok_or_else(|| ToolError::InvalidWorkbook(format!("missing sheet '{name}'")))??;
        let (columns, mut rows) = read_sheet_range(&range, true);
        let width = columns.len();
        for row in &mut rows {
            row.resize(width, CellValue::Empty);
        }
        let provenance = columns
            .iter()
            .filter(|column| *column == SOURCE_FILE_COLUMN || *column == SOURCE_FOLDER_COLUMN)
            .count();
        debug!(sheet = %name, rows = rows.len(), columns = width, "loaded sheet");

        tables.push((
            name,
            LoadedTable {
                source: SourceFile {
                    index,
                    ..source.clone()
                },
                columns,
                rows,
                source_column_count: width - provenance,
                encoding: None,
            },
        ));
    }

    Ok(tables)
}

/// Replaces blank headers with `Unnamed: {index}` and makes duplicates unique
/// by appending `.1`, `.2`, ...
pub fn normalize_headers(raw: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut headers = Vec::with_capacity(raw.len());

    for (index, header) in raw.into_iter().enumerate() {
        let base = if header.trim().is_empty() {
            format!("Unnamed: {index}")
        } else {
            header
        };

        let mut candidate = base.clone();
        let mut counter = 1;
        while seen.contains(&candidate) {
            candidate = format!("{base}.{counter}");
            counter += 1;
        }
        seen.insert(candidate.clone());
        headers.push(candidate);
    }

    headers
}

fn cell_value(cell: &DataType) -> CellValue {
    match cell {
        DataType::Empty => CellValue::Empty,
        DataType::Int(value) => CellValue::Int(*value),
        DataType::Float(value) if value.is_finite() => CellValue::Float(*value),
        DataType::Bool(value) => CellValue::Bool(*value),
        DataType::DateTime(serial) => CellValue::DateTime(*serial),
        DataType::String(value) if value.trim().is_empty() => CellValue::Empty,
        DataType::String(value) => CellValue::String(value.clone()),
        other => CellValue::String(other.to_string()),
    }
}
