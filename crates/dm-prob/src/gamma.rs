//! Gamma distribution (shape / rate parameterization).

use crate::math::check_positive;
use dm_core::{Error, Result};
use rand::RngCore;
use rand_distr::Distribution;
use statrs::function::gamma::ln_gamma;

/// Log-PDF of `Gamma(shape, rate)` at `x`. Support: `x >= 0`.
pub fn logpdf(x: f64, shape: f64, rate: f64) -> Result<f64> {
    check_positive("shape", shape)?;
    check_positive("rate", rate)?;
    if x < 0.0 {
        return Ok(f64::NEG_INFINITY);
    }
    if x == 0.0 {
        // Density at the boundary depends on whether shape is below, at or above 1.
        return Ok(match shape.partial_cmp(&1.0) {
            Some(std::cmp::Ordering::Less) => f64::INFINITY,
            Some(std::cmp::Ordering::Greater) => f64::NEG_INFINITY,
            _ => rate.ln(),
        });
    }
    Ok(shape * rate.ln() - ln_gamma(shape) + (shape - 1.0) * x.ln() - rate * x)
}

/// Draw from `Gamma(shape, rate)`.
pub fn sample(shape: f64, rate: f64, rng: &mut dyn RngCore) -> Result<f64> {
    check_positive("shape", shape)?;
    check_positive("rate", rate)?;
    let d = rand_distr::Gamma::new(shape, 1.0 / rate)
        .map_err(|e| Error::Validation(e.to_string()))?;
    Ok(d.sample(rng))
}
