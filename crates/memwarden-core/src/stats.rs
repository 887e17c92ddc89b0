//! Small numeric helpers shared by the analysis components.

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

pub fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(0.0, f64::max)
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Normalised autocorrelation of `values` at `lag`. Zero for a flat series
/// or a lag that leaves no overlap.
pub fn autocorrelation(values: &[f64], lag: usize) -> f64 {
    let n = values.len();
    if lag == 0 || lag >= n {
        return 0.0;
    }
    let m = mean(values);
    let denominator: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    if denominator <= f64::EPSILON {
        return 0.0;
    }
    let numerator: f64 = (0..n - lag)
        .map(|i| (values[i] - m) * (values[i + lag] - m))
        .sum();
    numerator / denominator
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mean_and_std_dev() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_relative_eq!(mean(&values), 5.0);
        assert_relative_eq!(std_dev(&values), 2.0);
        assert_relative_eq!(max(&values), 9.0);
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(std_dev(&[]), 0.0);
    }

    #[test]
    fn test_autocorrelation_of_periodic_series() {
        let series: Vec<f64> = (0..60)
            .map(|i| if (i / 5) % 2 == 0 { 0.8 } else { 0.4 })
            .collect();
        let at_period = autocorrelation(&series, 10);
        let at_half_period = autocorrelation(&series, 5);
        assert!(at_period > 0.7, "period lag correlation {at_period}");
        assert!(at_half_period < 0.0);
    }

    #[test]
    fn test_autocorrelation_flat_series() {
        let series = vec![0.5; 30];
        assert_eq!(autocorrelation(&series, 5), 0.0);
        assert_eq!(autocorrelation(&series, 40), 0.0);
    }
}
