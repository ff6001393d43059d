//! Exponential distribution.

use crate::math::check_positive;
use dm_core::{Error, Result};
use rand::RngCore;
use rand_distr::Distribution;

/// Log-PDF of `Exp(rate)` at `x`. Support: `x >= 0`.
pub fn logpdf(x: f64, rate: f64) -> Result<f64> {
    check_positive("rate", rate)?;
    if x < 0.0 {
        return Ok(f64::NEG_INFINITY);
    }
    Ok(rate.ln() - rate * x)
}

/// Draw from `Exp(rate)`.
pub fn sample(rate: f64, rng: &mut dyn RngCore) -> Result<f64> {
    check_positive("rate", rate)?;
    let d = rand_distr::Exp::new(rate).map_err(|e| Error::Validation(e.to_string()))?;
    Ok(d.sample(rng))
}
