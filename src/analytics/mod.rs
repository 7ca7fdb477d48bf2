//! Financial metrics computed over the numeric columns of consolidated sheets.

pub mod anomaly;
pub mod cluster;
pub mod profile;
pub mod quality;
pub mod stats;

pub use profile::{AnalysisReport, SheetAnalysis, analyze_table, analyze_workbook};
