use std::collections::HashMap;

use crate::io::table_read::normalize_headers;
use crate::model::{CellValue, LoadedTable, SOURCE_FILE_COLUMN, SOURCE_FOLDER_COLUMN, SourceFile};

/// Stacks loaded tables row-wise into one table.
///
/// Columns are matched by exact name and keep the order in which they first
/// appear. A row gets empty cells for columns its file does not have. The two
/// provenance columns always come last.
#[derive(Debug, Default)]
pub struct TableStack {
    columns: Vec<String>,
    positions: HashMap<String, usize>,
    rows: Vec<Vec<CellValue>>,
    provenance: Vec<Vec<CellValue>>,
    first_source: Option<SourceFile>,
}

impl TableStack {
    pub fn is_empty(&self) -> bool {
        self.first_source.is_none()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns, provenance included, once `table` is stacked.
    pub fn width_with(&self, table: &LoadedTable) -> usize {
        let added = table.columns[..table.source_column_count]
            .iter()
            .filter(|column| !self.positions.contains_key(*column))
            .count();
        self.columns.len() + added + 2
    }

    pub fn push(&mut self, table: LoadedTable) {
        let source_width = table.source_column_count;
        let mut targets = Vec::with_capacity(source_width);
        for column in &table.columns[..source_width] {
            let position = match self.positions.get(column) {
                Some(&position) => position,
                None => {
                    let position = self.columns.len();
                    self.columns.push(column.clone());
                    self.positions.insert(column.clone(), position);
                    position
                }
            };
            targets.push(position);
        }

        for mut row in table.rows {
            let provenance = row.split_off(source_width);
            let mut cells = vec![CellValue::Empty; self.columns.len()];
            for (cell, &target) in row.into_iter().zip(&targets) {
                cells[target] = cell;
            }
            self.rows.push(cells);
            self.provenance.push(provenance);
        }
        self.first_source.get_or_insert(table.source);
    }

    /// Builds the stacked table, or `None` when nothing was pushed.
    ///
    /// The returned table names the first stacked file as its source.
    pub fn finish(self) -> Option<LoadedTable> {
        let source = self.first_source?;
        let width = self.columns.len();

        let mut columns = self.columns;
        columns.push(SOURCE_FILE_COLUMN.to_string());
        columns.push(SOURCE_FOLDER_COLUMN.to_string());

        let rows = self
            .rows
            .into_iter()
            .zip(self.provenance)
            .map(|(mut cells, provenance)| {
                cells.resize(width, CellValue::Empty);
                cells.extend(provenance);
                cells
            })
            .collect();

        Some(LoadedTable {
            source,
            columns: normalize_headers(columns),
            rows,
            source_column_count: width,
            encoding: None,
        })
    }
}
