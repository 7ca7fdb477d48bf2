//! Descriptive statistics and risk metrics over plain `f64` series.
//!
//! Every function is pure. Functions return `None` rather than `NaN` when the
//! input is too short or degenerate for the metric to be defined.

use serde::Serialize;

/// Dispersion at or below this is treated as a constant series.
pub const NEGLIGIBLE_STD: f64 = 1e-12;

pub fn is_negligible(std: f64) -> bool {
    std <= NEGLIGIBLE_STD
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (`n - 1` denominator).
pub fn sample_std(values: &[f64]) -> Option<f64> {
    sample_variance(values).map(f64::sqrt)
}

pub fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = mean(values)?;
    let sum_sq: f64 = values.iter().map(|value| (value - mean).powi(2)).sum();
    Some(sum_sq / (values.len() - 1) as f64)
}

/// Population standard deviation (`n` denominator).
pub fn population_std(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    let sum_sq: f64 = values.iter().map(|value| (value - mean).powi(2)).sum();
    Some((sum_sq / values.len() as f64).sqrt())
}

/// Period-over-period fractional change. Steps from a zero value are skipped.
pub fn pct_change(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .filter_map(|pair| {
            let change = (pair[1] - pair[0]) / pair[0];
            change.is_finite().then_some(change)
        })
        .collect()
}

/// Standard deviation of returns scaled by `sqrt(periods_per_year)`.
pub fn annualized_volatility(returns: &[f64], periods_per_year: f64) -> Option<f64> {
    sample_std(returns).map(|std| std * periods_per_year.sqrt())
}

/// Annualised Sharpe ratio.
///
/// The annual risk-free rate is spread evenly over the periods, subtracted
/// from every return, and the mean excess return is divided by the standard
/// deviation of the excess returns. `None` when that deviation is zero.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64, periods_per_year: f64) -> Option<f64> {
    let per_period = risk_free_rate / periods_per_year;
    let excess: Vec<f64> = returns.iter().map(|value| value - per_period).collect();
    let std = sample_std(&excess)?;
    if is_negligible(std) {
        return None;
    }
    Some(mean(&excess)? / std * periods_per_year.sqrt())
}

/// Largest peak-to-trough decline as a non-positive fraction of the peak.
///
/// `None` for an empty series or when a running peak is not positive, since
/// the relative decline is then undefined.
pub fn max_drawdown(values: &[f64]) -> Option<f64> {
    let mut peak = *values.first()?;
    let mut worst = 0.0_f64;
    for &value in values {
        peak = peak.max(value);
        if peak <= 0.0 {
            return None;
        }
        worst = worst.min((value - peak) / peak);
    }
    Some(worst)
}

/// Annualised growth from first to last value divided by the absolute maximum drawdown.
pub fn calmar_ratio(values: &[f64], periods_per_year: f64) -> Option<f64> {
    let first = *values.first()?;
    let last = *values.last()?;
    if first <= 0.0 || last <= 0.0 {
        return None;
    }
    let drawdown = max_drawdown(values)?.abs();
    if drawdown == 0.0 {
        return None;
    }
    let annual_return = (last / first).powf(periods_per_year / values.len() as f64) - 1.0;
    Some(annual_return / drawdown)
}

pub fn covariance(lhs: &[f64], rhs: &[f64]) -> Option<f64> {
    if lhs.len() != rhs.len() || lhs.len() < 2 {
        return None;
    }
    let lhs_mean = mean(lhs)?;
    let rhs_mean = mean(rhs)?;
    let sum: f64 = lhs
        .iter()
        .zip(rhs)
        .map(|(a, b)| (a - lhs_mean) * (b - rhs_mean))
        .sum();
    Some(sum / (lhs.len() - 1) as f64)
}

/// Pearson correlation of two equally long series. `None` if either is constant.
pub fn pearson(lhs: &[f64], rhs: &[f64]) -> Option<f64> {
    let cov = covariance(lhs, rhs)?;
    let (lhs_std, rhs_std) = (sample_std(lhs)?, sample_std(rhs)?);
    if is_negligible(lhs_std) || is_negligible(rhs_std) {
        return None;
    }
    Some((cov / (lhs_std * rhs_std)).clamp(-1.0, 1.0))
}

/// Sensitivity of `asset` returns to `market` returns.
pub fn beta(asset: &[f64], market: &[f64]) -> Option<f64> {
    let variance = sample_variance(market)?;
    if is_negligible(variance.sqrt()) {
        return None;
    }
    Some(covariance(asset, market)? / variance)
}

/// Percentile with linear interpolation between closest ranks, `pct` in `[0, 100]`.
pub fn percentile(values: &[f64], pct: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=100.0).contains(&pct) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

/// Adjusted Fisher-Pearson skewness. Needs at least three observations.
pub fn skewness(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 3 {
        return None;
    }
    let mean = mean(values)?;
    let std = sample_std(values)?;
    if is_negligible(std) {
        return None;
    }
    let n = n as f64;
    let cubed: f64 = values.iter().map(|value| ((value - mean) / std).powi(3)).sum();
    Some(n / ((n - 1.0) * (n - 2.0)) * cubed)
}

/// Least-squares line through `(index, value)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Trend {
    pub slope: f64,
    pub r_squared: f64,
}

pub fn linear_trend(values: &[f64]) -> Option<Trend> {
    if values.len() < 2 {
        return None;
    }
    let xs: Vec<f64> = (0..values.len()).map(|index| index as f64).collect();
    let slope = covariance(&xs, values)? / sample_variance(&xs)?;
    let r_squared = pearson(&xs, values).map_or(0.0, |r| r * r);
    Some(Trend { slope, r_squared })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn close(lhs: f64, rhs: f64) -> bool {
        (lhs - rhs).abs() < EPS
    }

    #[test]
    fn volatility_and_sharpe_follow_the_documented_formulas() {
        let returns = [0.01, 0.02, -0.01, 0.03];
        let n = returns.len() as f64;
        let m = returns.iter().sum::<f64>() / n;
        let std = (returns.iter().map(|r| (r - m).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();

        let volatility = annualized_volatility(&returns, 252.0).expect("volatility");
        assert!(close(volatility, std * 252f64.sqrt()));

        let expected = (m - 0.03 / 252.0) / std * 252f64.sqrt();
        let sharpe = sharpe_ratio(&returns, 0.03, 252.0).expect("sharpe");
        assert!(close(sharpe, expected), "{sharpe} != {expected}");
    }

    #[test]
    fn sharpe_is_undefined_for_constant_returns() {
        assert_eq!(sharpe_ratio(&[0.01, 0.01, 0.01], 0.03, 252.0), None);
        assert_eq!(sharpe_ratio(&[0.01], 0.03, 252.0), None);
    }

    #[test]
    fn drawdown_tracks_running_peak() {
        let drawdown = max_drawdown(&[100.0, 120.0, 90.0, 130.0, 117.0]).expect("drawdown");
        assert!(close(drawdown, -0.25));
        assert_eq!(max_drawdown(&[1.0, 2.0, 3.0]), Some(0.0));
        assert_eq!(max_drawdown(&[0.0, -1.0]), None);
        assert_eq!(max_drawdown(&[]), None);
    }

    #[test]
    fn pct_change_skips_zero_bases() {
        assert_eq!(pct_change(&[100.0, 110.0, 0.0, 5.0]), vec![0.1, -1.0]);
    }

    #[test]
    fn correlation_and_beta() {
        let market = [1.0, 2.0, 3.0, 4.0];
        let asset = [2.0, 4.0, 6.0, 8.0];
        assert!(close(pearson(&market, &asset).expect("r"), 1.0));
        assert!(close(beta(&asset, &market).expect("beta"), 2.0));
        assert_eq!(pearson(&market, &[1.0, 1.0, 1.0, 1.0]), None);
        assert_eq!(pearson(&market, &asset[..3]), None);
    }

    #[test]
    fn percentile_interpolates_linearly() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!(close(percentile(&values, 5.0).expect("p5"), 1.2));
        assert!(close(percentile(&values, 50.0).expect("p50"), 3.0));
        assert_eq!(percentile(&values, 101.0), None);
    }

    #[test]
    fn symmetric_series_has_no_skew() {
        assert!(close(skewness(&[1.0, 2.0, 3.0]).expect("skew"), 0.0));
        assert!(skewness(&[1.0, 1.0, 1.0, 10.0]).expect("skew") > 0.0);
    }

    #[test]
    fn trend_of_a_line_is_exact() {
        let trend = linear_trend(&[1.0, 3.0, 5.0, 7.0]).expect("trend");
        assert!(close(trend.slope, 2.0));
        assert!(close(trend.r_squared, 1.0));
    }
}
