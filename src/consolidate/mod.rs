//! The consolidation pipeline: discover, read, name, then write once.

pub mod stack;
pub mod summary;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Local;
use tracing::{debug, info, instrument, warn};

use crate::config::{ConsolidationConfig, DEFAULT_COMBINED_SHEET, MergeMode};
use crate::discovery::discover;
use crate::error::{Result, ToolError};
use crate::io::csv_write::CsvTableWriter;
use crate::io::excel_write::{
    MAX_COLUMNS, MAX_ROWS, SheetData, WorkbookData, WorkbookSink, XlsxWorkbookWriter,
    check_sheet_limits,
};
use crate::io::table_read::read_table;
use crate::model::{
    LoadedTable, MergeRun, ProvenanceBlock, RunPhase, SheetAssignment, SheetRecord, SourceFile,
};
use crate::naming::SheetNameRegistry;

pub use stack::TableStack;
pub use summary::build_summary;

/// Merges every discovered file into one output, either one sheet per file
/// or stacked into a single table.
///
/// Individual files that cannot be read are recorded on the [`MergeRun`] and
/// skipped. The run only fails as a whole when nothing could be read or when
/// the workbook cannot be written.
#[derive(Debug, Clone)]
pub struct ConsolidationEngine {
    config: ConsolidationConfig,
    cancel: Option<Arc<AtomicBool>>,
}

impl ConsolidationEngine {
    pub fn new(config: ConsolidationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: None,
        })
    }

    /// Installs a flag that stops the run before the next file when set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Runs the pipeline and writes the configured output, `.csv` or `.xlsx`
    /// depending on its extension.
    pub fn run(&self) -> Result<MergeRun> {
        if self.config.writes_csv() {
            self.run_with(&mut CsvTableWriter::new(&self.config.output))
        } else {
            self.run_with(&mut XlsxWorkbookWriter::new(&self.config.output))
        }
    }

    /// Runs the pipeline against an arbitrary sink.
    ///
    /// The sink is invoked at most once, after every file has been handled.
    #[instrument(
        level = "info",
        skip_all,
        fields(roots = self.config.roots.len(), output = %self.config.output.display())
    )]
    pub fn run_with<S: WorkbookSink>(&self, sink: &mut S) -> Result<MergeRun> {
        let (mut run, workbook) = self.prepare()?;

        info!(phase = %RunPhase::Writing, sheets = workbook.sheets.len(), "writing workbook");
        sink.write(&workbook)?;

        run.finish();
        info!(
            phase = %RunPhase::Done,
            processed = run.total_files_processed,
            failed = run.total_files_failed,
            rows = run.total_rows_written,
            "consolidation finished"
        );
        Ok(run)
    }

    /// Performs discovery and reading, returning the run and the workbook
    /// that would be written. Nothing touches the disk beyond reading inputs.
    pub fn prepare(&self) -> Result<(MergeRun, WorkbookData)> {
        let options = &self.config.options;
        let mut run = MergeRun::new(&self.config.output);
        debug!(phase = %RunPhase::Init, ?options, "starting run");

        info!(phase = %RunPhase::Discovering, "scanning root folders");
        let discovery = discover(&self.config.roots);
        run.total_files_discovered = discovery.files.len();
        run.discovery_warnings = discovery.warnings;

        if discovery.files.is_empty() {
            warn!("no supported files were discovered");
            run.finish();
            return Err(ToolError::EmptyRun(Box::new(run)));
        }

        let mut files = discovery.files;
        if let (MergeMode::PerSheet, Some(limit)) = (options.mode, options.max_sheets) {
            if files.len() > limit {
                let dropped = files.split_off(limit);
                warn!(
                    discovered = run.total_files_discovered,
                    limit,
                    dropped = dropped.len(),
                    "more files than the sheet limit; excess files are not consolidated"
                );
                run.skipped_by_limit = dropped.into_iter().map(|file| file.path).collect();
            }
        }
        run.total_files_attempted = files.len();

        let mut registry = SheetNameRegistry::default();
        let include_summary = options.include_summary && !self.config.writes_csv();
        if include_summary {
            registry.claim(&options.summary_sheet_name);
        }

        info!(phase = %RunPhase::Reading, files = files.len(), mode = ?options.mode, "reading files");
        let sheets = match options.mode {
            MergeMode::PerSheet => self.read_per_sheet(files, &mut registry, &mut run)?,
            MergeMode::Concatenate => self.read_stacked(files, &mut registry, &mut run)?,
        };

        if run.total_files_processed == 0 {
            warn!(failed = run.total_files_failed, "no file could be read");
            run.finish();
            return Err(ToolError::EmptyRun(Box::new(run)));
        }

        let summary = include_summary.then(|| build_summary(&run, &options.summary_sheet_name));

        Ok((run, WorkbookData { sheets, summary }))
    }

    fn read_per_sheet(
        &self,
        files: Vec<SourceFile>,
        registry: &mut SheetNameRegistry,
        run: &mut MergeRun,
    ) -> Result<Vec<SheetData>> {
        let include_file_info = self.config.options.include_file_info;
        let mut sheets = Vec::with_capacity(files.len());
        let total = files.len();
        for (position, source) in files.into_iter().enumerate() {
            self.check_cancelled()?;
            debug!(
                file = position + 1,
                total,
                path = %source.path.display(),
                "reading file"
            );
            let Some(table) = load_table(&source, run) else {
                continue;
            };
            if let Some(reason) = check_sheet_limits(&table, include_file_info) {
                skip_file(&source, reason, run);
                continue;
            }

            let (sanitized_name, collision_suffix) = registry.allocate(&source.file_name());
            info!(
                path = %source.path.display(),
                sheet = %sanitized_name,
                rows = table.row_count(),
                columns = table.source_column_count,
                "file consolidated"
            );
            run.record_success(SheetRecord::new(&sanitized_name, &table));

            let provenance =
                include_file_info.then(|| ProvenanceBlock::for_table(&table, Local::now()));
            sheets.push(SheetData {
                assignment: SheetAssignment {
                    sanitized_name,
                    source,
                    collision_suffix,
                },
                table,
                provenance,
            });
        }
        Ok(sheets)
    }

    /// Stacks every readable file into one table on a single sheet.
    ///
    /// For workbook output a file whose rows or columns would push the
    /// stacked table past the worksheet limits is recorded as failed.
    fn read_stacked(
        &self,
        files: Vec<SourceFile>,
        registry: &mut SheetNameRegistry,
        run: &mut MergeRun,
    ) -> Result<Vec<SheetData>> {
        let workbook_limits = !self.config.writes_csv();
        let (sheet_name, collision_suffix) = registry.allocate(DEFAULT_COMBINED_SHEET);
        let mut stack = TableStack::default();
        let total = files.len();

        for (position, source) in files.into_iter().enumerate() {
            self.check_cancelled()?;
            debug!(
                file = position + 1,
                total,
                path = %source.path.display(),
                "reading file"
            );
            let Some(table) = load_table(&source, run) else {
                continue;
            };
            if workbook_limits {
                if let Some(reason) = check_sheet_limits(&table, false) {
                    skip_file(&source, reason, run);
                    continue;
                }
                // Header row plus every stacked row.
                if stack.row_count() + table.row_count() + 1 > MAX_ROWS
                    || stack.width_with(&table) > MAX_COLUMNS
                {
                    skip_file(
                        &source,
                        "the stacked table would exceed the worksheet limits".to_string(),
                        run,
                    );
                    continue;
                }
            }

            info!(
                path = %source.path.display(),
                rows = table.row_count(),
                columns = table.source_column_count,
                "file stacked"
            );
            run.record_success(SheetRecord::new(&sheet_name, &table));
            stack.push(table);
        }

        let Some(table) = stack.finish() else {
            return Ok(Vec::new());
        };
        Ok(vec![SheetData {
            assignment: SheetAssignment {
                sanitized_name: sheet_name,
                source: table.source.clone(),
                collision_suffix,
            },
            table,
            provenance: None,
        }])
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => {
                warn!("cancellation requested; discarding in-memory results");
                Err(ToolError::Cancelled)
            }
            _ => Ok(()),
        }
    }
}

fn load_table(source: &SourceFile, run: &mut MergeRun) -> Option<LoadedTable> {
    match read_table(source) {
        Ok(table) => Some(table),
        Err(error) => {
            let message = match error {
                ToolError::Read { cause, .. } => cause,
                other => other.to_string(),
            };
            skip_file(source, message, run);
            None
        }
    }
}

fn skip_file(source: &SourceFile, message: String, run: &mut MergeRun) {
    warn!(path = %source.path.display(), %message, "file skipped");
    run.record_failure(source, message);
}
