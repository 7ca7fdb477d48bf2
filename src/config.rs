//! Run configuration passed explicitly into the engine and the analytics.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, ToolError};

/// Default ceiling on the number of data sheets in one workbook.
pub const DEFAULT_MAX_SHEETS: usize = 200;
/// Default name of the summary sheet.
pub const DEFAULT_SUMMARY_SHEET: &str = "Summary";

/// Name of the single data sheet written when tables are stacked.
pub const DEFAULT_COMBINED_SHEET: &str = "Consolidated";

/// How discovered tables are laid out in the output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// One worksheet per source file.
    #[default]
    PerSheet,
    /// Every table stacked into one, over the union of their columns.
    /// Written as `.csv` when the output has that extension.
    Concatenate,
}

/// Switches that distinguish one consolidation flavour from another.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    pub mode: MergeMode,
    /// Append a summary sheet after the data sheets.
    pub include_summary: bool,
    /// Write a provenance block below each sheet's data. Stacked tables
    /// carry only the provenance columns.
    pub include_file_info: bool,
    /// Maximum number of data sheets; `None` means unlimited.
    pub max_sheets: Option<usize>,
    pub summary_sheet_name: String,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self::detailed()
    }
}

impl MergeOptions {
    /// Summary sheet, per-sheet provenance blocks, default sheet ceiling.
    pub fn detailed() -> Self {
        Self {
            mode: MergeMode::PerSheet,
            include_summary: true,
            include_file_info: true,
            max_sheets: Some(DEFAULT_MAX_SHEETS),
            summary_sheet_name: DEFAULT_SUMMARY_SHEET.to_string(),
        }
    }

    /// Data sheets only.
    pub fn data_only() -> Self {
        Self {
            include_summary: false,
            include_file_info: false,
            ..Self::detailed()
        }
    }

    /// Every file stacked into one table, with a summary sheet when the
    /// output is a workbook.
    pub fn concatenated() -> Self {
        Self {
            mode: MergeMode::Concatenate,
            include_file_info: false,
            ..Self::detailed()
        }
    }

    pub fn with_max_sheets(mut self, max_sheets: Option<usize>) -> Self {
        self.max_sheets = max_sheets;
        self
    }
}

/// Everything the consolidation engine needs for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidationConfig {
    /// Root directories scanned in order.
    pub roots: Vec<PathBuf>,
    /// Path of the workbook to produce.
    pub output: PathBuf,
    pub options: MergeOptions,
}

impl ConsolidationConfig {
    pub fn new(roots: Vec<PathBuf>, output: impl Into<PathBuf>, options: MergeOptions) -> Self {
        Self {
            roots,
            output: output.into(),
            options,
        }
    }

    /// Whether the output is delimited text rather than a workbook.
    pub fn writes_csv(&self) -> bool {
        self.output
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.roots.is_empty() {
            return Err(ToolError::InvalidConfig(
                "at least one root folder is required".into(),
            ));
        }
        if self.output.as_os_str().is_empty() {
            return Err(ToolError::InvalidConfig("an output path is required".into()));
        }
        if self.writes_csv() && self.options.mode == MergeMode::PerSheet {
            return Err(ToolError::InvalidConfig(
                "one sheet per file needs a workbook output; use the concatenate mode for .csv"
                    .into(),
            ));
        }
        if self.options.max_sheets == Some(0) {
            return Err(ToolError::InvalidConfig(
                "max_sheets must be at least 1".into(),
            ));
        }
        if self.options.include_summary
            && !crate::naming::is_valid_sheet_name(&self.options.summary_sheet_name)
        {
            return Err(ToolError::InvalidConfig(format!(
                "'{}' is not a valid sheet name",
                self.options.summary_sheet_name
            )));
        }
        Ok(())
    }
}

/// Parameters for the financial analytics.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Annual risk-free rate used by the Sharpe ratio.
    pub risk_free_rate: f64,
    /// Observations per year used to annualise.
    pub periods_per_year: f64,
    /// Absolute correlation above which a pair is reported as strong.
    pub strong_correlation_threshold: f64,
    pub z_score_threshold: f64,
    pub cluster_count: usize,
    /// Columns with fewer observations are not analysed.
    pub min_observations: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.03,
            periods_per_year: 252.0,
            strong_correlation_threshold: 0.7,
            z_score_threshold: 3.0,
            cluster_count: 3,
            min_observations: 10,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.risk_free_rate.is_finite() {
            return Err(ToolError::InvalidConfig(
                "risk_free_rate must be finite".into(),
            ));
        }
        if !(self.periods_per_year.is_finite() && self.periods_per_year > 0.0) {
            return Err(ToolError::InvalidConfig(
                "periods_per_year must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.strong_correlation_threshold) {
            return Err(ToolError::InvalidConfig(
                "strong_correlation_threshold must lie in [0, 1]".into(),
            ));
        }
        if !(self.z_score_threshold.is_finite() && self.z_score_threshold > 0.0) {
            return Err(ToolError::InvalidConfig(
                "z_score_threshold must be positive".into(),
            ));
        }
        if self.cluster_count == 0 {
            return Err(ToolError::InvalidConfig(
                "cluster_count must be at least 1".into(),
            ));
        }
        if self.min_observations < 2 {
            return Err(ToolError::InvalidConfig(
                "min_observations must be at least 2".into(),
            ));
        }
        Ok(())
    }
}

/// Optional JSON file holding both configuration sections.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub roots: Vec<PathBuf>,
    pub output: Option<PathBuf>,
    pub merge: MergeOptions,
    pub analysis: AnalysisConfig,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ToolError::MissingInput(path.to_path_buf()));
        }
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_differ_only_in_switches() {
        let detailed = MergeOptions::detailed();
        let data_only = MergeOptions::data_only();
        assert!(detailed.include_summary && detailed.include_file_info);
        assert!(!data_only.include_summary && !data_only.include_file_info);
        assert_eq!(detailed.max_sheets, data_only.max_sheets);
    }

    #[test]
    fn csv_output_requires_concatenation() {
        let per_sheet =
            ConsolidationConfig::new(vec![PathBuf::from("in")], "out.CSV", MergeOptions::detailed());
        assert!(per_sheet.writes_csv());
        assert!(matches!(per_sheet.validate(), Err(ToolError::InvalidConfig(_))));

        let stacked = ConsolidationConfig::new(
            vec![PathBuf::from("in")],
            "out.csv",
            MergeOptions::concatenated(),
        );
        assert!(stacked.validate().is_ok());
    }

    #[test]
    fn zero_sheet_ceiling_is_rejected() {
        let config = ConsolidationConfig::new(
            vec![PathBuf::from("in")],
            "out.xlsx",
            MergeOptions::default().with_max_sheets(Some(0)),
        );
        assert!(matches!(config.validate(), Err(ToolError::InvalidConfig(_))));
    }

    #[test]
    fn config_file_fills_defaults() {
        let file: ConfigFile = serde_json::from_str(
            r#"{"roots": ["a", "b"], "merge": {"max_sheets": null, "mode": "concatenate"}, "analysis": {"risk_free_rate": 0.02}}"#,
        )
        .expect("config parsed");
        assert_eq!(file.roots.len(), 2);
        assert_eq!(file.merge.max_sheets, None);
        assert_eq!(file.merge.mode, MergeMode::Concatenate);
        assert!(file.merge.include_summary);
        assert_eq!(file.analysis.risk_free_rate, 0.02);
        assert_eq!(file.analysis.periods_per_year, 252.0);
    }
}
