use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{debug, info, instrument};

use super::anomaly::{self, AnomalySummary};
use super::cluster::{self, Clustering};
use super::quality::{self, DataQuality};
use super::stats::{self, Trend};
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::io::table_read::read_workbook_tables;
use crate::model::{CellValue, LoadedTable, SOURCE_FILE_COLUMN, SOURCE_FOLDER_COLUMN};

/// Metrics computed for one numeric column.
///
/// Return-based metrics use the period-over-period changes of the column,
/// level-based metrics (drawdown, Calmar, trend) use the values themselves.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnMetrics {
    pub column: String,
    pub observations: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub volatility: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub calmar_ratio: Option<f64>,
    /// 5th percentile of returns.
    pub var_95: Option<f64>,
    /// 1st percentile of returns.
    pub var_99: Option<f64>,
    pub skewness: Option<f64>,
    pub trend: Option<Trend>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationPair {
    pub left: String,
    pub right: String,
    pub coefficient: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnAnomalies {
    pub column: String,
    #[serde(flatten)]
    pub summary: AnomalySummary,
}

/// Analysis of one sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetAnalysis {
    pub sheet_name: String,
    pub row_count: usize,
    pub quality: DataQuality,
    pub numeric_columns: Vec<String>,
    pub metrics: Vec<ColumnMetrics>,
    /// Square matrix over `numeric_columns`; `None` where undefined.
    pub correlation_matrix: Vec<Vec<Option<f64>>>,
    pub strong_correlations: Vec<CorrelationPair>,
    pub anomalies: Vec<ColumnAnomalies>,
    pub clustering: Option<Clustering>,
}

/// Analysis of a whole consolidated workbook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub source: PathBuf,
    pub generated_at: DateTime<Local>,
    pub risk_free_rate: f64,
    pub periods_per_year: f64,
    pub sheets: Vec<SheetAnalysis>,
    /// Sheets without enough numeric data to analyse.
    pub skipped_sheets: Vec<String>,
}

impl AnalysisReport {
    /// Short human readable observations across all sheets.
    pub fn key_findings(&self) -> Vec<String> {
        let mut findings = Vec::new();
        let metrics = || {
            self.sheets.iter().flat_map(|sheet| {
                sheet
                    .metrics
                    .iter()
                    .map(move |metric| (sheet.sheet_name.as_str(), metric))
            })
        };

        if let Some((sheet, metric, volatility)) = metrics()
            .filter_map(|(sheet, metric)| metric.volatility.map(|v| (sheet, metric, v)))
            .max_by(|a, b| a.2.total_cmp(&b.2))
        {
            findings.push(format!(
                "Highest annualised volatility: {sheet}/{} at {:.2}%",
                metric.column,
                volatility * 100.0
            ));
        }
        if let Some((sheet, metric, sharpe)) = metrics()
            .filter_map(|(sheet, metric)| metric.sharpe_ratio.map(|s| (sheet, metric, s)))
            .max_by(|a, b| a.2.total_cmp(&b.2))
        {
            findings.push(format!(
                "Best Sharpe ratio: {sheet}/{} at {sharpe:.3}",
                metric.column
            ));
        }
        if let Some((sheet, metric, drawdown)) = metrics()
            .filter_map(|(sheet, metric)| metric.max_drawdown.map(|d| (sheet, metric, d)))
            .min_by(|a, b| a.2.total_cmp(&b.2))
        {
            findings.push(format!(
                "Deepest drawdown: {sheet}/{} at {:.2}%",
                metric.column,
                drawdown * 100.0
            ));
        }

        let strong: usize = self
            .sheets
            .iter()
            .map(|sheet| sheet.strong_correlations.len())
            .sum();
        if strong > 0 {
            findings.push(format!("{strong} strongly correlated column pair(s)"));
        }
        let duplicates: usize = self
            .sheets
            .iter()
            .map(|sheet| sheet.quality.duplicate_rows)
            .sum();
        if duplicates > 0 {
            findings.push(format!("{duplicates} duplicate row(s)"));
        }
        let outliers: usize = self
            .sheets
            .iter()
            .flat_map(|sheet| &sheet.anomalies)
            .map(|anomalies| anomalies.summary.z_score_outliers)
            .sum();
        if outliers > 0 {
            findings.push(format!("{outliers} z-score outlier(s) detected"));
        }
        findings
    }
}

/// Loads every sheet of a consolidated workbook except `exclude` and analyses it.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn analyze_workbook(
    path: &Path,
    config: &AnalysisConfig,
    exclude: &[&str],
) -> Result<AnalysisReport> {
    config.validate()?;
    let tables = read_workbook_tables(path, exclude)?;

    let mut sheets = Vec::new();
    let mut skipped_sheets = Vec::new();
    for (name, table) in tables {
        let analysis = analyze_table(&name, &table, config);
        if analysis.numeric_columns.is_empty() {
            debug!(sheet = %name, "no numeric columns to analyse");
            skipped_sheets.push(name);
        } else {
            sheets.push(analysis);
        }
    }
    info!(
        analysed = sheets.len(),
        skipped = skipped_sheets.len(),
        "workbook analysed"
    );

    Ok(AnalysisReport {
        source: path.to_path_buf(),
        generated_at: Local::now(),
        risk_free_rate: config.risk_free_rate,
        periods_per_year: config.periods_per_year,
        sheets,
        skipped_sheets,
    })
}

/// Analyses the numeric columns of one table.
pub fn analyze_table(name: &str, table: &LoadedTable, config: &AnalysisConfig) -> SheetAnalysis {
    let numeric = numeric_columns(table, config.min_observations);
    let numeric_columns: Vec<String> = numeric
        .iter()
        .map(|&index| table.columns[index].clone())
        .collect();

    let metrics = numeric
        .iter()
        .zip(&numeric_columns)
        .map(|(&index, column)| column_metrics(column, &column_values(table, index), config))
        .collect();

    let correlation_matrix: Vec<Vec<Option<f64>>> = numeric
        .iter()
        .map(|&lhs| {
            numeric
                .iter()
                .map(|&rhs| {
                    let (a, b) = paired_values(table, lhs, rhs);
                    stats::pearson(&a, &b)
                })
                .collect()
        })
        .collect();

    let mut strong_correlations = Vec::new();
    for (i, row) in correlation_matrix.iter().enumerate() {
        for (j, coefficient) in row.iter().enumerate().skip(i + 1) {
            if let Some(coefficient) = coefficient {
                if coefficient.abs() > config.strong_correlation_threshold {
                    strong_correlations.push(CorrelationPair {
                        left: numeric_columns[i].clone(),
                        right: numeric_columns[j].clone(),
                        coefficient: *coefficient,
                    });
                }
            }
        }
    }

    let anomalies = numeric
        .iter()
        .zip(&numeric_columns)
        .filter_map(|(&index, column)| {
            anomaly::detect(&column_values(table, index), config.z_score_threshold).map(
                |summary| ColumnAnomalies {
                    column: column.clone(),
                    summary,
                },
            )
        })
        .collect();

    let clustering = if numeric.len() >= 2 {
        let rows = complete_rows(table, &numeric);
        if rows.len() > config.min_observations {
            cluster::kmeans(&rows, config.cluster_count)
        } else {
            None
        }
    } else {
        None
    };

    SheetAnalysis {
        sheet_name: name.to_string(),
        row_count: table.row_count(),
        quality: quality::assess(table, &numeric),
        numeric_columns,
        metrics,
        correlation_matrix,
        strong_correlations,
        anomalies,
        clustering,
    }
}

/// Indices of columns whose non-empty cells are all numbers, with at least
/// `min_observations` of them. Provenance columns are never numeric.
pub fn numeric_columns(table: &LoadedTable, min_observations: usize) -> Vec<usize> {
    (0..table.column_count())
        .filter(|&index| {
            let name = table.columns[index].as_str();
            if name == SOURCE_FILE_COLUMN || name == SOURCE_FOLDER_COLUMN {
                return false;
            }
            let mut count = 0;
            for cell in table.column_cells(index) {
                match cell {
                    CellValue::Empty => {}
                    CellValue::Int(_) | CellValue::Float(_) => count += 1,
                    _ => return false,
                }
            }
            count >= min_observations
        })
        .collect()
}

fn column_values(table: &LoadedTable, index: usize) -> Vec<f64> {
    table.column_cells(index).filter_map(CellValue::as_f64).collect()
}

fn paired_values(table: &LoadedTable, lhs: usize, rhs: usize) -> (Vec<f64>, Vec<f64>) {
    table
        .rows
        .iter()
        .filter_map(|row| Some((row.get(lhs)?.as_f64()?, row.get(rhs)?.as_f64()?)))
        .unzip()
}

fn complete_rows(table: &LoadedTable, columns: &[usize]) -> Vec<Vec<f64>> {
    table
        .rows
        .iter()
        .filter_map(|row| {
            columns
                .iter()
                .map(|&index| row.get(index).and_then(CellValue::as_f64))
                .collect::<Option<Vec<f64>>>()
        })
        .collect()
}

fn column_metrics(column: &str, values: &[f64], config: &AnalysisConfig) -> ColumnMetrics {
    let returns = stats::pct_change(values);
    let periods = config.periods_per_year;
    ColumnMetrics {
        column: column.to_string(),
        observations: values.len(),
        mean: stats::mean(values),
        std: stats::sample_std(values),
        min: values.iter().copied().min_by(f64::total_cmp),
        max: values.iter().copied().max_by(f64::total_cmp),
        volatility: stats::annualized_volatility(&returns, periods),
        sharpe_ratio: stats::sharpe_ratio(&returns, config.risk_free_rate, periods),
        max_drawdown: stats::max_drawdown(values),
        calmar_ratio: stats::calmar_ratio(values, periods),
        var_95: stats::percentile(&returns, 5.0),
        var_99: stats::percentile(&returns, 1.0),
        skewness: stats::skewness(&returns),
        trend: stats::linear_trend(values),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SourceFile, SourceFormat};

    fn table(columns: &[&str], rows: Vec<Vec<CellValue>>) -> LoadedTable {
        LoadedTable {
            source: SourceFile {
                path: PathBuf::from("/data/prices.csv"),
                root: PathBuf::from("/data"),
                format: SourceFormat::Csv,
                index: 0,
            },
            columns: columns.iter().map(|c| c.to_string()).collect(),
            source_column_count: columns.len(),
            rows,
            encoding: None,
        }
    }

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            min_observations: 3,
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn only_fully_numeric_columns_are_analysed() {
        let rows = (0..5)
            .map(|i| {
                vec![
                    CellValue::Float(100.0 + i as f64),
                    CellValue::String(format!("t{i}")),
                    CellValue::Int(i),
                    CellValue::from("prices.csv"),
                ]
            })
            .collect();
        let table = table(&["close", "label", "volume", SOURCE_FILE_COLUMN], rows);

        assert_eq!(numeric_columns(&table, 3), vec![0, 2]);
        assert!(numeric_columns(&table, 6).is_empty());
    }

    #[test]
    fn perfectly_correlated_columns_are_reported() {
        let rows = (1..=6)
            .map(|i| vec![CellValue::Int(i), CellValue::Float(i as f64 * 2.0 + 1.0)])
            .collect();
        let analysis = analyze_table("prices", &table(&["a", "b"], rows), &config());

        assert_eq!(analysis.numeric_columns, vec!["a", "b"]);
        assert_eq!(analysis.strong_correlations.len(), 1);
        let pair = &analysis.strong_correlations[0];
        assert_eq!((pair.left.as_str(), pair.right.as_str()), ("a", "b"));
        assert!((pair.coefficient - 1.0).abs() < 1e-9);
        assert_eq!(analysis.metrics[0].max_drawdown, Some(0.0));
        assert_eq!(analysis.quality.total_cells, 12);
        assert_eq!(analysis.quality.duplicate_rows, 0);
        assert_eq!(analysis.quality.column_signs.len(), 2);
    }

    #[test]
    fn empty_cells_are_skipped_not_zeroed() {
        let rows = vec![
            vec![CellValue::Float(10.0)],
            vec![CellValue::Empty],
            vec![CellValue::Float(12.0)],
            vec![CellValue::Float(9.0)],
        ];
        let analysis = analyze_table("gaps", &table(&["close"], rows), &config());
        let metrics = &analysis.metrics[0];
        assert_eq!(metrics.observations, 3);
        assert_eq!(metrics.min, Some(9.0));
        assert!((metrics.max_drawdown.expect("drawdown") + 0.25).abs() < 1e-9);
    }
}
