//! One-dimensional earth-mover distance over category ranks.
//!
//! Each weight vector is read as point masses at positions `0, 1, ..., n-1`
//! (the rank of each category, not its natural unit). Both vectors are scaled
//! to unit mass before transport, so the result is the Wasserstein-1
//! distance between the two induced probability distributions:
//!
//! ```text
//! W1(u, v) = sum_{k=0}^{n-2} |U(k) - V(k)|
//! ```
//!
//! where `U` and `V` are the cumulative distributions.

use thiserror::Error;

/// Reasons a pair of weight vectors cannot be compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WeightError {
    #[error("weight vectors differ in length ({0} vs {1})")]
    LengthMismatch(usize, usize),

    #[error("weights must be finite and non-negative")]
    InvalidWeight,

    #[error("weights sum to zero")]
    ZeroMass,
}

fn unit_mass(weights: &[f64]) -> Result<f64, WeightError> {
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(WeightError::InvalidWeight);
    }
    let total: f64 = weights.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return Err(WeightError::ZeroMass);
    }
    Ok(total)
}

/// Wasserstein-1 distance between two weight vectors placed at ranks `0..n`.
pub fn wasserstein_over_ranks(u: &[f64], v: &[f64]) -> Result<f64, WeightError> {
    if u.len() != v.len() {
        return Err(WeightError::LengthMismatch(u.len(), v.len()));
    }
    let u_total = unit_mass(u)?;
    let v_total = unit_mass(v)?;

    let mut u_cdf = 0.0_f64;
    let mut v_cdf = 0.0_f64;
    let mut distance = 0.0_f64;
    // The last rank closes both CDFs at 1 and moves no mass.
    for (a, b) in u.iter().zip(v).take(u.len().saturating_sub(1)) {
        u_cdf += a / u_total;
        v_cdf += b / v_total;
        distance += (u_cdf - v_cdf).abs();
    }
    Ok(distance)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    #[test]
    fn test_identity() {
        let weights = [0.1, 0.2, 0.3, 0.4];
        assert_eq!(wasserstein_over_ranks(&weights, &weights).unwrap(), 0.0);
    }

    #[test]
    fn test_point_masses() {
        assert_eq!(wasserstein_over_ranks(&[1.0, 0.0], &[0.0, 1.0]).unwrap(), 1.0);
        let far = wasserstein_over_ranks(&[1.0, 0.0, 0.0, 0.0], &[0.0, 0.0, 0.0, 1.0]).unwrap();
        assert!((far - 3.0).abs() < TOLERANCE);
    }

    #[test]
    fn test_split_mass() {
        // Half of the mass travels one step.
        let d = wasserstein_over_ranks(&[0.5, 0.5], &[0.0, 1.0]).unwrap();
        assert!((d - 0.5).abs() < TOLERANCE);
    }

    #[test]
    fn test_symmetric() {
        let u = [0.05, 0.2, 0.4, 0.1, 0.1, 0.1, 0.05];
        let v = [0.3, 0.1, 0.1, 0.2, 0.2, 0.05, 0.05];
        assert_eq!(
            wasserstein_over_ranks(&u, &v).unwrap(),
            wasserstein_over_ranks(&v, &u).unwrap()
        );
    }

    #[test]
    fn test_scale_invariant() {
        let u = [2.0, 6.0];
        let v = [0.25, 0.75];
        assert!(wasserstein_over_ranks(&u, &v).unwrap().abs() < TOLERANCE);
    }

    #[test]
    fn test_rejects_invalid_weights() {
        assert_eq!(
            wasserstein_over_ranks(&[0.0, 0.0], &[0.5, 0.5]),
            Err(WeightError::ZeroMass)
        );
        assert_eq!(
            wasserstein_over_ranks(&[-0.5, 1.5], &[0.5, 0.5]),
            Err(WeightError::InvalidWeight)
        );
        assert_eq!(
            wasserstein_over_ranks(&[f64::NAN, 1.0], &[0.5, 0.5]),
            Err(WeightError::InvalidWeight)
        );
        assert_eq!(
            wasserstein_over_ranks(&[1.0], &[0.5, 0.5]),
            Err(WeightError::LengthMismatch(1, 2))
        );
    }
}
