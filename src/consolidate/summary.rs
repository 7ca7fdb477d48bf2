use std::collections::HashSet;
use std::path::PathBuf;

use chrono::Local;

use crate::io::excel_write::SummaryTable;
use crate::model::{CellValue, MergeRun};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Renders the run into the heterogeneous rows of the summary sheet.
///
/// Sections, separated by a blank row: run totals, folder statistics, the
/// sheet index, and, when non-empty, failed files, files skipped by the sheet
/// limit, and discovery warnings.
pub fn build_summary(run: &MergeRun, sheet_name: &str) -> SummaryTable {
    let mut rows: Vec<Vec<CellValue>> = Vec::new();

    rows.push(vec!["Consolidation summary".into()]);
    let totals: [(&str, CellValue); 8] = [
        (
            "Processed at",
            Local::now().format(TIMESTAMP_FORMAT).to_string().into(),
        ),
        ("Files discovered", run.total_files_discovered.into()),
        ("Files attempted", run.total_files_attempted.into()),
        ("Files processed", run.total_files_processed.into()),
        ("Files failed", run.total_files_failed.into()),
        ("Sheets written", sheets_written(run).into()),
        ("Rows written", run.total_rows_written.into()),
        ("Output file", run.output.display().to_string().into()),
    ];
    for (label, value) in totals {
        rows.push(vec![label.into(), value]);
    }

    rows.push(Vec::new());
    rows.push(vec!["Folder statistics".into()]);
    rows.push(header(&["root_folder", "file_count", "row_count"]));
    for (folder, files, row_count) in folder_statistics(run) {
        rows.push(vec![
            folder.display().to_string().into(),
            files.into(),
            row_count.into(),
        ]);
    }

    rows.push(Vec::new());
    rows.push(vec!["Sheet index".into()]);
    rows.push(header(&[
        "sheet_name",
        "original_filename",
        "row_count",
        "column_count",
        "source_folder",
        "encoding",
    ]));
    for sheet in &run.sheets {
        let folder = sheet
            .original_path
            .parent()
            .map(|parent| parent.display().to_string())
            .unwrap_or_default();
        rows.push(vec![
            sheet.sheet_name.clone().into(),
            sheet.original_filename.clone().into(),
            sheet.row_count.into(),
            sheet.column_count.into(),
            folder.into(),
            sheet.encoding.map_or(CellValue::Empty, CellValue::from),
        ]);
    }

    if !run.errors.is_empty() {
        rows.push(Vec::new());
        rows.push(vec!["Failed files".into()]);
        rows.push(header(&["file_path", "error_message"]));
        for failure in &run.errors {
            rows.push(vec![
                failure.path.display().to_string().into(),
                failure.message.clone().into(),
            ]);
        }
    }

    if !run.skipped_by_limit.is_empty() {
        rows.push(Vec::new());
        rows.push(vec![
            "Skipped by sheet limit".into(),
            run.skipped_by_limit.len().into(),
        ]);
        rows.push(header(&["file_path"]));
        for path in &run.skipped_by_limit {
            rows.push(vec![path.display().to_string().into()]);
        }
    }

    if !run.discovery_warnings.is_empty() {
        rows.push(Vec::new());
        rows.push(vec!["Discovery warnings".into()]);
        rows.push(header(&["root_folder", "message"]));
        for warning in &run.discovery_warnings {
            rows.push(vec![
                warning.root.display().to_string().into(),
                warning.message.clone().into(),
            ]);
        }
    }

    SummaryTable {
        name: sheet_name.to_string(),
        rows,
    }
}

/// File and row counts per root folder, in order of first appearance.
pub fn folder_statistics(run: &MergeRun) -> Vec<(PathBuf, usize, usize)> {
    let mut stats: Vec<(PathBuf, usize, usize)> = Vec::new();
    for sheet in &run.sheets {
        match stats.iter_mut().find(|(root, _, _)| *root == sheet.root_folder) {
            Some((_, files, rows)) => {
                *files += 1;
                *rows += sheet.row_count;
            }
            None => stats.push((sheet.root_folder.clone(), 1, sheet.row_count)),
        }
    }
    stats
}

/// Distinct data sheets; stacked files all share one.
fn sheets_written(run: &MergeRun) -> usize {
    run.sheets
        .iter()
        .map(|sheet| sheet.sheet_name.as_str())
        .collect::<HashSet<_>>()
        .len()
}

fn header(labels: &[&str]) -> Vec<CellValue> {
    labels.iter().map(|label| CellValue::from(*label)).collect()
}
