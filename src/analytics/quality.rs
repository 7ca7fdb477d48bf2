use std::collections::HashSet;

use serde::Serialize;

use crate::model::{CellValue, LoadedTable};

/// Zero and negative counts of one numeric column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSigns {
    pub column: String,
    pub zeros: usize,
    pub negatives: usize,
}

/// Completeness and duplication of one sheet, provenance columns included.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataQuality {
    pub total_cells: usize,
    pub null_cells: usize,
    /// Fraction of cells that are empty; zero for an empty sheet.
    pub null_share: f64,
    /// Rows identical to an earlier row.
    pub duplicate_rows: usize,
    pub duplicate_share: f64,
    pub column_signs: Vec<ColumnSigns>,
}

/// Profiles `table`, counting signs for the columns at `numeric`.
pub fn assess(table: &LoadedTable, numeric: &[usize]) -> DataQuality {
    let total_cells = table.row_count() * table.column_count();
    let null_cells = table
        .rows
        .iter()
        .flatten()
        .filter(|cell| cell.is_empty())
        .count();

    let mut seen: HashSet<Vec<String>> = HashSet::with_capacity(table.row_count());
    let duplicate_rows = table
        .rows
        .iter()
        .filter(|row| !seen.insert(row.iter().map(CellValue::to_string).collect()))
        .count();

    let column_signs = numeric
        .iter()
        .map(|&index| {
            let values: Vec<f64> = table.column_cells(index).filter_map(CellValue::as_f64).collect();
            ColumnSigns {
                column: table.columns[index].clone(),
                zeros: values.iter().filter(|value| **value == 0.0).count(),
                negatives: values.iter().filter(|value| **value < 0.0).count(),
            }
        })
        .collect();

    DataQuality {
        total_cells,
        null_cells,
        null_share: share(null_cells, total_cells),
        duplicate_rows,
        duplicate_share: share(duplicate_rows, table.row_count()),
        column_signs,
    }
}

fn share(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::model::{SourceFile, SourceFormat};

    fn table(rows: Vec<Vec<CellValue>>) -> LoadedTable {
        LoadedTable {
            source: SourceFile {
                path: PathBuf::from("/data/ledger.csv"),
                root: PathBuf::from("/data"),
                format: SourceFormat::Csv,
                index: 0,
            },
            columns: vec!["amount".into(), "memo".into()],
            source_column_count: 2,
            rows,
            encoding: None,
        }
    }

    #[test]
    fn counts_nulls_duplicates_and_signs() {
        let quality = assess(
            &table(vec![
                vec![CellValue::Float(-5.0), "fee".into()],
                vec![CellValue::Int(0), CellValue::Empty],
                vec![CellValue::Float(-5.0), "fee".into()],
                vec![CellValue::Empty, CellValue::Empty],
            ]),
            &[0],
        );

        assert_eq!(quality.total_cells, 8);
        assert_eq!(quality.null_cells, 3);
        assert!((quality.null_share - 0.375).abs() < 1e-12);
        assert_eq!(quality.duplicate_rows, 1);
        assert!((quality.duplicate_share - 0.25).abs() < 1e-12);
        assert_eq!(
            quality.column_signs,
            vec![ColumnSigns {
                column: "amount".into(),
                zeros: 1,
                negatives: 2
            }]
        );
    }

    #[test]
    fn empty_sheet_has_zero_shares() {
        let quality = assess(&table(Vec::new()), &[]);
        assert_eq!(quality.total_cells, 0);
        assert_eq!(quality.null_share, 0.0);
        assert_eq!(quality.duplicate_share, 0.0);
        assert!(quality.column_signs.is_empty());
    }
}
