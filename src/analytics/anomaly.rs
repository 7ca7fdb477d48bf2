use serde::Serialize;

use super::stats::{is_negligible, mean, percentile, population_std};

/// Multiplier applied to the interquartile range to place the outlier fences.
pub const IQR_FENCE: f64 = 1.5;

/// Outlier counts for one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalySummary {
    pub observations: usize,
    pub z_score_outliers: usize,
    pub iqr_outliers: usize,
    pub lower_fence: f64,
    pub upper_fence: f64,
}

impl AnomalySummary {
    pub fn z_score_share(&self) -> f64 {
        if self.observations == 0 {
            0.0
        } else {
            self.z_score_outliers as f64 / self.observations as f64
        }
    }
}

/// Counts values whose absolute z-score exceeds `threshold`.
///
/// Scores use the population standard deviation; a constant series has none.
pub fn z_score_outliers(values: &[f64], threshold: f64) -> usize {
    let (Some(mean), Some(std)) = (mean(values), population_std(values)) else {
        return 0;
    };
    if is_negligible(std) {
        return 0;
    }
    values
        .iter()
        .filter(|value| ((*value - mean) / std).abs() > threshold)
        .count()
}

/// Returns the `(lower, upper)` Tukey fences.
pub fn iqr_fences(values: &[f64]) -> Option<(f64, f64)> {
    let q1 = percentile(values, 25.0)?;
    let q3 = percentile(values, 75.0)?;
    let iqr = q3 - q1;
    Some((q1 - IQR_FENCE * iqr, q3 + IQR_FENCE * iqr))
}

pub fn detect(values: &[f64], z_threshold: f64) -> Option<AnomalySummary> {
    let (lower_fence, upper_fence) = iqr_fences(values)?;
    let iqr_outliers = values
        .iter()
        .filter(|value| **value < lower_fence || **value > upper_fence)
        .count();
    Some(AnomalySummary {
        observations: values.len(),
        z_score_outliers: z_score_outliers(values, z_threshold),
        iqr_outliers,
        lower_fence,
        upper_fence,
    })
}
