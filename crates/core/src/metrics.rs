//! CVaR — tail statistic used for soak-test evaluation.
//!
//! Grounded on `hti/metrics.py`: sort ascending, mean of the worst
//! `k = max(1, ceil(alpha * n))` samples.

use crate::error::EmptyInput;

/// Conditional Value at Risk at level `alpha in (0, 1]`.
///
/// `cvar(xs, 1.0) == mean(xs)`; `cvar(xs, 1/n) == min(xs)`.
pub fn cvar(xs: &[f64], alpha: f64) -> Result<f64, EmptyInput> {
    if xs.is_empty() {
        return Err(EmptyInput);
    }
    let mut sorted = xs.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("NaN in cvar input"));

    let n = sorted.len();
    let k = ((alpha * n as f64).ceil() as usize).max(1).min(n);
    let sum: f64 = sorted[..k].iter().sum();
    Ok(sum / k as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_one_is_the_mean() {
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0];
        let mean = xs.iter().sum::<f64>() / xs.len() as f64;
        assert!((cvar(&xs, 1.0).unwrap() - mean).abs() < 1e-12);
    }

    #[test]
    fn alpha_one_over_n_is_the_min() {
        let xs = [5.0, 1.0, 3.0, 2.0, 4.0];
        let n = xs.len() as f64;
        assert_eq!(cvar(&xs, 1.0 / n).unwrap(), 1.0);
    }

    #[test]
    fn takes_worst_k_of_ascending_sort() {
        let xs = [10.0, 1.0, 2.0, 3.0, 100.0];
        // n=5, alpha=0.4 -> k = ceil(2.0) = 2 -> mean of [1, 2] = 1.5
        assert_eq!(cvar(&xs, 0.4).unwrap(), 1.5);
    }

    #[test]
    fn fractional_k_rounds_up() {
        let xs = [1.0, 2.0, 3.0];
        // n=3, alpha=0.34 -> ceil(1.02) = 2 -> mean of worst two [1,2] = 1.5
        assert_eq!(cvar(&xs, 0.34).unwrap(), 1.5);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(cvar(&[], 0.5), Err(EmptyInput)));
    }
}
