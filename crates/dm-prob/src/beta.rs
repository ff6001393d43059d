//! Beta distribution.

use crate::math::{check_positive, ln_beta};
use dm_core::{Error, Result};
use rand::RngCore;
use rand_distr::Distribution;

/// Log-PDF of `Beta(a, b)` at `x`. Support: `0 <= x <= 1`.
pub fn logpdf(x: f64, a: f64, b: f64) -> Result<f64> {
    check_positive("a", a)?;
    check_positive("b", b)?;
    if !(0.0..=1.0).contains(&x) {
        return Ok(f64::NEG_INFINITY);
    }
    let ln_norm = -ln_beta(a, b);
    // At an edge only the exponent of that edge matters.
    let edge = |shape: f64| -> f64 {
        if shape < 1.0 {
            f64::INFINITY
        } else if shape > 1.0 {
            f64::NEG_INFINITY
        } else {
            ln_norm
        }
    };
    if x == 0.0 {
        return Ok(edge(a));
    }
    if x == 1.0 {
        return Ok(edge(b));
    }
    Ok(ln_norm + (a - 1.0) * x.ln() + (b - 1.0) * (-x).ln_1p())
}

/// Draw from `Beta(a, b)`.
pub fn sample(a: f64, b: f64, rng: &mut dyn RngCore) -> Result<f64> {
    check_positive("a", a)?;
    check_positive("b", b)?;
    let d = rand_distr::Beta::new(a, b).map_err(|e| Error::Validation(e.to_string()))?;
    Ok(d.sample(rng))
}
