//! Small numeric helpers shared by the density modules.

use dm_core::{Error, Result};
use statrs::function::gamma::ln_gamma;

/// Natural log of `sqrt(2π)`.
pub const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_7;

/// Whether `x` is usable as a log-probability: not NaN and not `±inf`.
#[inline]
pub fn is_computable(x: f64) -> bool {
    x.is_finite()
}

/// `ln B(a, b) = ln Γ(a) + ln Γ(b) − ln Γ(a + b)`.
#[inline]
pub fn ln_beta(a: f64, b: f64) -> f64 {
    ln_gamma(a) + ln_gamma(b) - ln_gamma(a + b)
}

/// Reject a parameter unless it is finite and strictly positive.
#[inline]
pub fn check_positive(name: &str, v: f64) -> Result<()> {
    if !v.is_finite() || v <= 0.0 {
        return Err(Error::Validation(format!("{} must be finite and > 0, got {}", name, v)));
    }
    Ok(())
}

/// Reject a parameter unless it is finite.
#[inline]
pub fn check_finite(name: &str, v: f64) -> Result<()> {
    if !v.is_finite() {
        return Err(Error::Validation(format!("{} must be finite, got {}", name, v)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_is_computable() {
        assert!(is_computable(-1234.5));
        assert!(!is_computable(f64::NAN));
        assert!(!is_computable(f64::NEG_INFINITY));
        assert!(!is_computable(f64::INFINITY));
    }

    #[test]
    fn test_ln_beta_one_one() {
        assert_relative_eq!(ln_beta(1.0, 1.0), 0.0, epsilon = 1e-12);
        // B(2, 3) = 1/12
        assert_relative_eq!(ln_beta(2.0, 3.0), (1.0f64 / 12.0).ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_checks() {
        assert!(check_positive("sd", 1.0).is_ok());
        assert!(check_positive("sd", 0.0).is_err());
        assert!(check_positive("sd", f64::NAN).is_err());
        assert!(check_finite("mean", -3.0).is_ok());
        assert!(check_finite("mean", f64::INFINITY).is_err());
    }
}
