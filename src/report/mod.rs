//! Renderers for [`AnalysisReport`].

use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};

use crate::analytics::AnalysisReport;
use crate::analytics::profile::{ColumnMetrics, SheetAnalysis};
use crate::analytics::quality::DataQuality;
use crate::error::Result;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const MISSING: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Html,
    Json,
}

pub fn render(report: &AnalysisReport, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Text => Ok(render_text(report)),
        ReportFormat::Html => Ok(render_html(report)),
        ReportFormat::Json => Ok(serde_json::to_string_pretty(report)?),
    }
}

fn percent(value: Option<f64>) -> String {
    value.map_or_else(|| MISSING.to_string(), |v| format!("{:.2}%", v * 100.0))
}

fn number(value: Option<f64>) -> String {
    value.map_or_else(|| MISSING.to_string(), |v| format!("{v:.4}"))
}

fn metric_row(metric: &ColumnMetrics) -> Vec<String> {
    vec![
        metric.column.clone(),
        metric.observations.to_string(),
        number(metric.mean),
        number(metric.std),
        percent(metric.volatility),
        number(metric.sharpe_ratio),
        percent(metric.max_drawdown),
        number(metric.calmar_ratio),
        percent(metric.var_95),
        percent(metric.var_99),
        number(metric.skewness),
        number(metric.trend.map(|trend| trend.slope)),
    ]
}

const METRIC_HEADERS: [&str; 12] = [
    "Column",
    "N",
    "Mean",
    "Std",
    "Volatility",
    "Sharpe",
    "Max drawdown",
    "Calmar",
    "VaR 95%",
    "VaR 99%",
    "Skew",
    "Trend slope",
];

/// Plain text report with box-drawn tables.
pub fn render_text(report: &AnalysisReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("Analysis of {}\n", report.source.display()));
    out.push_str(&format!(
        "Generated {} | risk-free rate {:.2}% | {} periods per year\n",
        report.generated_at.format(TIMESTAMP_FORMAT),
        report.risk_free_rate * 100.0,
        report.periods_per_year
    ));

    let findings = report.key_findings();
    if !findings.is_empty() {
        out.push_str("\nKey findings\n");
        for finding in findings {
            out.push_str(&format!("  * {finding}\n"));
        }
    }

    for sheet in &report.sheets {
        out.push_str(&format!("\n== {} ({} rows) ==\n", sheet.sheet_name, sheet.row_count));
        out.push_str(&format!("{}\n", quality_line(&sheet.quality)));

        let mut metrics = new_table();
        metrics.set_header(METRIC_HEADERS.to_vec());
        for metric in &sheet.metrics {
            metrics.add_row(metric_row(metric));
        }
        out.push_str(&format!("{metrics}\n"));

        if !sheet.quality.column_signs.is_empty() {
            let mut signs = new_table();
            signs.set_header(vec!["Column", "Zeros", "Negatives"]);
            for entry in &sheet.quality.column_signs {
                signs.add_row(vec![
                    entry.column.clone(),
                    entry.zeros.to_string(),
                    entry.negatives.to_string(),
                ]);
            }
            out.push_str(&format!("Value signs\n{signs}\n"));
        }

        if !sheet.strong_correlations.is_empty() {
            let mut pairs = new_table();
            pairs.set_header(vec!["Column", "Column", "Correlation"]);
            for pair in &sheet.strong_correlations {
                pairs.add_row(vec![
                    pair.left.clone(),
                    pair.right.clone(),
                    format!("{:.3}", pair.coefficient),
                ]);
            }
            out.push_str(&format!("Strong correlations\n{pairs}\n"));
        }

        if !sheet.anomalies.is_empty() {
            let mut anomalies = new_table();
            anomalies.set_header(vec!["Column", "Z-score outliers", "IQR outliers", "Fences"]);
            for entry in &sheet.anomalies {
                anomalies.add_row(vec![
                    entry.column.clone(),
                    entry.summary.z_score_outliers.to_string(),
                    entry.summary.iqr_outliers.to_string(),
                    format!(
                        "[{:.4}, {:.4}]",
                        entry.summary.lower_fence, entry.summary.upper_fence
                    ),
                ]);
            }
            out.push_str(&format!("Anomalies\n{anomalies}\n"));
        }

        if let Some(clustering) = &sheet.clustering {
            out.push_str(&format!(
                "Clusters ({} iterations): {}\n",
                clustering.iterations,
                clustering
                    .clusters
                    .iter()
                    .enumerate()
                    .map(|(index, cluster)| format!("#{index}: {} rows", cluster.size))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
    }

    if !report.skipped_sheets.is_empty() {
        out.push_str(&format!(
            "\nSheets without numeric data: {}\n",
            report.skipped_sheets.join(", ")
        ));
    }
    out
}

fn quality_line(quality: &DataQuality) -> String {
    format!(
        "Empty cells: {} of {} ({}) | duplicate rows: {} ({})",
        quality.null_cells,
        quality.total_cells,
        percent(Some(quality.null_share)),
        quality.duplicate_rows,
        percent(Some(quality.duplicate_share))
    )
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Self-contained HTML document.
pub fn render_html(report: &AnalysisReport) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">");
    html.push_str(&format!(
        "<title>Analysis of {}</title>",
        escape_html(&report.source.display().to_string())
    ));
    html.push_str(
        "<style>body{font-family:sans-serif;margin:2em}table{border-collapse:collapse;margin-bottom:1.5em}\
         th,td{border:1px solid #ccc;padding:4px 8px;text-align:right}th{background:#f0f0f0}\
         td:first-child,th:first-child{text-align:left}</style></head><body>",
    );
    html.push_str(&format!(
        "<h1>Analysis of {}</h1><p>Generated {} &middot; risk-free rate {:.2}% &middot; {} periods per year</p>",
        escape_html(&report.source.display().to_string()),
        report.generated_at.format(TIMESTAMP_FORMAT),
        report.risk_free_rate * 100.0,
        report.periods_per_year
    ));

    let findings = report.key_findings();
    if !findings.is_empty() {
        html.push_str("<h2>Key findings</h2><ul>");
        for finding in findings {
            html.push_str(&format!("<li>{}</li>", escape_html(&finding)));
        }
        html.push_str("</ul>");
    }

    for sheet in &report.sheets {
        render_sheet_html(&mut html, sheet);
    }

    if !report.skipped_sheets.is_empty() {
        html.push_str("<p>Sheets without numeric data: ");
        html.push_str(&escape_html(&report.skipped_sheets.join(", ")));
        html.push_str("</p>");
    }
    html.push_str("</body></html>\n");
    html
}

fn render_sheet_html(html: &mut String, sheet: &SheetAnalysis) {
    html.push_str(&format!(
        "<h2>{} <small>({} rows)</small></h2>",
        escape_html(&sheet.sheet_name),
        sheet.row_count
    ));
    html.push_str(&format!("<p>{}</p>", quality_line(&sheet.quality)));

    html.push_str("<table><thead><tr>");
    for header in METRIC_HEADERS {
        html.push_str(&format!("<th>{header}</th>"));
    }
    html.push_str("</tr></thead><tbody>");
    for metric in &sheet.metrics {
        html.push_str("<tr>");
        for cell in metric_row(metric) {
            html.push_str(&format!("<td>{}</td>", escape_html(&cell)));
        }
        html.push_str("</tr>");
    }
    html.push_str("</tbody></table>");

    if !sheet.quality.column_signs.is_empty() {
        html.push_str(
            "<h3>Value signs</h3><table><thead><tr><th>Column</th><th>Zeros</th>\
             <th>Negatives</th></tr></thead><tbody>",
        );
        for entry in &sheet.quality.column_signs {
            html.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_html(&entry.column),
                entry.zeros,
                entry.negatives
            ));
        }
        html.push_str("</tbody></table>");
    }

    if sheet.numeric_columns.len() > 1 {
        html.push_str("<h3>Correlation matrix</h3><table><thead><tr><th></th>");
        for column in &sheet.numeric_columns {
            html.push_str(&format!("<th>{}</th>", escape_html(column)));
        }
        html.push_str("</tr></thead><tbody>");
        for (column, row) in sheet.numeric_columns.iter().zip(&sheet.correlation_matrix) {
            html.push_str(&format!("<tr><th>{}</th>", escape_html(column)));
            for coefficient in row {
                let cell = coefficient.map_or_else(|| MISSING.to_string(), |c| format!("{c:.3}"));
                html.push_str(&format!("<td>{cell}</td>"));
            }
            html.push_str("</tr>");
        }
        html.push_str("</tbody></table>");
    }

    if !sheet.anomalies.is_empty() {
        html.push_str(
            "<h3>Anomalies</h3><table><thead><tr><th>Column</th><th>Z-score outliers</th>\
             <th>IQR outliers</th></tr></thead><tbody>",
        );
        for entry in &sheet.anomalies {
            html.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_html(&entry.column),
                entry.summary.z_score_outliers,
                entry.summary.iqr_outliers
            ));
        }
        html.push_str("</tbody></table>");
    }

    if let Some(clustering) = &sheet.clustering {
        html.push_str("<h3>Clusters</h3><table><thead><tr><th>Cluster</th><th>Rows</th>");
        for column in &sheet.numeric_columns {
            html.push_str(&format!("<th>mean {}</th>", escape_html(column)));
        }
        html.push_str("</tr></thead><tbody>");
        for (index, cluster) in clustering.clusters.iter().enumerate() {
            html.push_str(&format!("<tr><td>#{index}</td><td>{}</td>", cluster.size));
            for value in &cluster.mean_values {
                html.push_str(&format!("<td>{value:.4}</td>"));
            }
            html.push_str("</tr>");
        }
        html.push_str("</tbody></table>");
    }
}

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::Local;

    use super::*;
    use crate::analytics::profile::CorrelationPair;
    use crate::analytics::quality::ColumnSigns;

    fn report() -> AnalysisReport {
        AnalysisReport {
            source: PathBuf::from("merged.xlsx"),
            generated_at: Local::now(),
            risk_free_rate: 0.03,
            periods_per_year: 252.0,
            sheets: vec![SheetAnalysis {
                sheet_name: "<prices>".into(),
                row_count: 4,
                quality: DataQuality {
                    total_cells: 8,
                    null_cells: 2,
                    null_share: 0.25,
                    duplicate_rows: 1,
                    duplicate_share: 0.25,
                    column_signs: vec![ColumnSigns {
                        column: "close".into(),
                        zeros: 0,
                        negatives: 3,
                    }],
                },
                numeric_columns: vec!["close".into(), "open".into()],
                metrics: Vec::new(),
                correlation_matrix: vec![vec![Some(1.0), Some(0.9)], vec![Some(0.9), Some(1.0)]],
                strong_correlations: vec![CorrelationPair {
                    left: "close".into(),
                    right: "open".into(),
                    coefficient: 0.9,
                }],
                anomalies: Vec::new(),
                clustering: None,
            }],
            skipped_sheets: vec!["notes".into()],
        }
    }

    #[test]
    fn html_escapes_sheet_names() {
        let html = render_html(&report());
        assert!(html.contains("&lt;prices&gt;"));
        assert!(!html.contains("<prices>"));
        assert!(html.contains("0.900"));
        assert!(html.contains("<h3>Value signs</h3>"));
        assert!(html.contains("<td>close</td><td>0</td><td>3</td>"));
    }

    #[test]
    fn text_lists_correlations_and_skipped_sheets() {
        let text = render_text(&report());
        assert!(text.contains("Strong correlations"));
        assert!(text.contains("notes"));
        assert!(text.contains("1 strongly correlated column pair(s)"));
        assert!(text.contains("Empty cells: 2 of 8 (25.00%) | duplicate rows: 1 (25.00%)"));
        assert!(text.contains("Value signs"));
    }

    #[test]
    fn json_is_machine_readable() {
        let json = render(&report(), ReportFormat::Json).expect("json");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["sheets"][0]["strong_correlations"][0]["coefficient"], 0.9);
        assert_eq!(value["sheets"][0]["quality"]["duplicate_rows"], 1);
        assert_eq!(value["sheets"][0]["quality"]["column_signs"][0]["negatives"], 3);
    }
}
