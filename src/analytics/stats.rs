//! Numeric helpers shared by the detector, the trend analyzer and the comparator
//!
//! Every function here is total: empty input, zero variance and zero
//! denominators resolve to 0.0 (or `None` for tests that cannot run) instead
//! of NaN, infinity or a panic.

use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Arithmetic mean, 0.0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divides by N), 0.0 for an empty slice
pub fn stddev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// `numerator / denominator`, or 0.0 when the denominator is zero
pub fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Percentile with linear interpolation between closest ranks.
///
/// `p` is in percent (0..=100). Returns 0.0 for an empty slice.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;

    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

/// Ordinary least squares fit of `y = slope * x + intercept`.
///
/// With fewer than two points, or no spread in `x`, the slope is 0.0 and the
/// intercept is the mean of `y`.
pub fn linear_fit(x: &[f64], y: &[f64]) -> (f64, f64) {
    let n = x.len().min(y.len());
    if n == 0 {
        return (0.0, 0.0);
    }
    let (x, y) = (&x[..n], &y[..n]);

    let x_mean = mean(x);
    let y_mean = mean(y);

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (xi, yi) in x.iter().zip(y) {
        numerator += (xi - x_mean) * (yi - y_mean);
        denominator += (xi - x_mean).powi(2);
    }

    let slope = safe_div(numerator, denominator);
    (slope, y_mean - slope * x_mean)
}

/// `x = 0, 1, .., n-1` for a series of length `n`
pub fn index_axis(n: usize) -> Vec<f64> {
    (0..n).map(|i| i as f64).collect()
}

/// Linear fit over equally spaced points `x = 0..n-1`
pub fn fit_series(values: &[f64]) -> (f64, f64) {
    linear_fit(&index_axis(values.len()), values)
}

/// Coefficient of determination, reported as a magnitude in `[0, 1]`
pub fn r_squared(x: &[f64], y: &[f64], slope: f64, intercept: f64) -> f64 {
    let n = x.len().min(y.len());
    if n == 0 {
        return 0.0;
    }

    let y_mean = mean(&y[..n]);
    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for (xi, yi) in x[..n].iter().zip(&y[..n]) {
        let predicted = slope * xi + intercept;
        ss_res += (yi - predicted).powi(2);
        ss_tot += (yi - y_mean).powi(2);
    }

    if ss_tot == 0.0 {
        return 0.0;
    }
    (1.0 - ss_res / ss_tot).abs().clamp(0.0, 1.0)
}

/// Residuals of `values` around the fitted line over `x = 0..n-1`
pub fn detrend(values: &[f64], slope: f64, intercept: f64) -> Vec<f64> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| v - (slope * i as f64 + intercept))
        .collect()
}

/// Autocorrelation at `lag`, normalized so lag 0 is 1.0.
///
/// A constant series, or a lag at or beyond the series length, yields 0.0.
pub fn autocorrelation(values: &[f64], lag: usize) -> f64 {
    let n = values.len();
    if n == 0 || lag >= n {
        return 0.0;
    }

    let m = mean(values);
    let centered: Vec<f64> = values.iter().map(|v| v - m).collect();

    let denominator: f64 = centered.iter().map(|c| c * c).sum();
    if denominator == 0.0 {
        return 0.0;
    }

    let numerator: f64 = centered
        .iter()
        .zip(centered.iter().skip(lag))
        .map(|(a, b)| a * b)
        .sum();

    numerator / denominator
}

/// Percent change from `baseline` to `comparison`.
///
/// For inverse metrics (lower is better) the sign is flipped so that a
/// positive result always means improvement. A zero baseline gives 0.0 when
/// the comparison is also zero, otherwise ±100.
pub fn percentage_change(baseline: f64, comparison: f64, inverse: bool) -> f64 {
    let change = if baseline == 0.0 {
        if comparison == 0.0 {
            return 0.0;
        }
        if comparison > baseline {
            100.0
        } else {
            -100.0
        }
    } else {
        (comparison - baseline) / baseline * 100.0
    };

    if inverse {
        -change
    } else {
        change
    }
}

/// Outcome of a chi-square test of independence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChiSquareTest {
    pub statistic: f64,
    pub p_value: f64,
}

/// Chi-square test on the 2x2 table `[[s1, n1 - s1], [s2, n2 - s2]]`.
///
/// Applies Yates' continuity correction (one degree of freedom). Returns
/// `None` when a row or column total is zero, since expected counts vanish.
pub fn chi_square_2x2(
    successes_a: f64,
    trials_a: f64,
    successes_b: f64,
    trials_b: f64,
) -> Option<ChiSquareTest> {
    let failures_a = (trials_a - successes_a).max(0.0);
    let failures_b = (trials_b - successes_b).max(0.0);
    let successes_a = successes_a.max(0.0);
    let successes_b = successes_b.max(0.0);

    let observed = [[successes_a, failures_a], [successes_b, failures_b]];
    let row_totals = [successes_a + failures_a, successes_b + failures_b];
    let col_totals = [successes_a + successes_b, failures_a + failures_b];
    let total = row_totals[0] + row_totals[1];

    if row_totals.iter().chain(col_totals.iter()).any(|t| *t <= 0.0) {
        return None;
    }

    let mut statistic = 0.0;
    for (i, row) in observed.iter().enumerate() {
        for (j, observed) in row.iter().enumerate() {
            let expected = row_totals[i] * col_totals[j] / total;
            let corrected = ((observed - expected).abs() - 0.5).max(0.0);
            statistic += corrected * corrected / expected;
        }
    }

    let distribution = ChiSquared::new(1.0).ok()?;
    let p_value = distribution.sf(statistic).clamp(0.0, 1.0);

    Some(ChiSquareTest { statistic, p_value })
}
