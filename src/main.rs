use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use finsheet_tools::analytics::analyze_workbook;
use finsheet_tools::config::{ConfigFile, ConsolidationConfig, MergeMode, MergeOptions};
use finsheet_tools::consolidate::ConsolidationEngine;
use finsheet_tools::model::MergeRun;
use finsheet_tools::report::{self, ReportFormat};
use finsheet_tools::{Result, ToolError};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    init_logging(cli.log_level.as_deref())?;
    match cli.command {
        Command::Merge(args) => execute_merge(args),
        Command::Analyze(args) => execute_analyze(args),
    }
}

fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(directive) => {
            EnvFilter::try_new(directive).map_err(|error| ToolError::Logging(error.to_string()))?
        }
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| ToolError::Logging(error.to_string()))
}

fn load_config(path: Option<&PathBuf>) -> Result<ConfigFile> {
    match path {
        Some(path) => ConfigFile::load(path),
        None => Ok(ConfigFile::default()),
    }
}

fn execute_merge(args: MergeArgs) -> Result<()> {
    let file = load_config(args.config.as_ref())?;

    let mut options = if args.data_only {
        MergeOptions::data_only()
    } else {
        file.merge
    };
    if args.concatenate {
        options.mode = MergeMode::Concatenate;
    }
    if args.unlimited_sheets {
        options.max_sheets = None;
    } else if let Some(limit) = args.max_sheets {
        options.max_sheets = Some(limit);
    }
    if args.no_summary {
        options.include_summary = false;
    }
    if args.no_file_info {
        options.include_file_info = false;
    }

    let roots = if args.roots.is_empty() {
        file.roots
    } else {
        args.roots
    };
    let output = args
        .output
        .or(file.output)
        .ok_or_else(|| ToolError::InvalidConfig("an output path is required".into()))?;

    let engine = ConsolidationEngine::new(ConsolidationConfig::new(roots, output, options))?;
    match engine.run() {
        Ok(merge_run) => {
            print_run(&merge_run);
            Ok(())
        }
        Err(ToolError::EmptyRun(merge_run)) => {
            print_run(&merge_run);
            Err(ToolError::EmptyRun(merge_run))
        }
        Err(error) => Err(error),
    }
}

fn print_run(run: &MergeRun) {
    println!(
        "processed {} of {} attempted file(s) ({} discovered), {} failed, {} row(s) written",
        run.total_files_processed,
        run.total_files_attempted,
        run.total_files_discovered,
        run.total_files_failed,
        run.total_rows_written
    );
    if run.total_files_processed > 0 {
        println!("output: {}", run.output.display());
    }
    for failure in &run.errors {
        println!("  failed: {}: {}", failure.path.display(), failure.message);
    }
    if !run.skipped_by_limit.is_empty() {
        println!(
            "  {} file(s) not consolidated because of the sheet limit",
            run.skipped_by_limit.len()
        );
    }
    for warning in &run.discovery_warnings {
        println!("  warning: {}: {}", warning.root.display(), warning.message);
    }
}

fn execute_analyze(args: AnalyzeArgs) -> Result<()> {
    if !args.input.exists() {
        return Err(ToolError::MissingInput(args.input));
    }
    let file = load_config(args.config.as_ref())?;

    let mut config = file.analysis;
    if let Some(rate) = args.risk_free_rate {
        config.risk_free_rate = rate;
    }
    let summary_sheet = args
        .summary_sheet
        .unwrap_or(file.merge.summary_sheet_name);

    let analysis = analyze_workbook(&args.input, &config, &[summary_sheet.as_str()])?;
    let rendered = report::render(&analysis, args.format.into())?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, rendered)?;
            println!("report written to {}", path.display());
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Consolidate spreadsheet folders into one workbook and analyse it."
)]
struct Cli {
    /// Log filter directive, e.g. `debug` or `finsheet_tools=trace`.
    /// Defaults to `RUST_LOG`, then `info`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Merge every spreadsheet under the given roots into one output.
    Merge(MergeArgs),
    /// Compute financial metrics over a consolidated workbook.
    Analyze(AnalyzeArgs),
}

#[derive(clap::Args)]
struct MergeArgs {
    /// Root folder to scan. Repeat for several roots.
    #[arg(long = "root")]
    roots: Vec<PathBuf>,

    /// Output path. A `.csv` output requires `--concatenate`.
    #[arg(long)]
    output: Option<PathBuf>,

    /// JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stack every file into one table instead of one sheet per file.
    #[arg(long)]
    concatenate: bool,

    /// Maximum number of data sheets.
    #[arg(long, conflicts_with = "unlimited_sheets")]
    max_sheets: Option<usize>,

    /// Consolidate every discovered file regardless of count.
    #[arg(long)]
    unlimited_sheets: bool,

    /// Write data sheets only, without summary or provenance blocks.
    #[arg(long)]
    data_only: bool,

    #[arg(long)]
    no_summary: bool,

    #[arg(long)]
    no_file_info: bool,
}

#[derive(clap::Args)]
struct AnalyzeArgs {
    /// Consolidated workbook to analyse.
    #[arg(long)]
    input: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Report destination. Printed to stdout when omitted.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Annual risk-free rate, e.g. `0.03`.
    #[arg(long)]
    risk_free_rate: Option<f64>,

    /// JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sheet to leave out of the analysis.
    #[arg(long)]
    summary_sheet: Option<String>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Html,
    Json,
}

impl From<OutputFormat> for ReportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Text => ReportFormat::Text,
            OutputFormat::Html => ReportFormat::Html,
            OutputFormat::Json => ReportFormat::Json,
        }
    }
}
