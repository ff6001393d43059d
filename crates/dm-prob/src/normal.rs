//! Normal distribution.

use crate::math::{LN_SQRT_2PI, check_finite, check_positive};
use dm_core::{Error, Result};
use rand::RngCore;
use rand_distr::Distribution;

/// Log-PDF of `N(mean, sd)` at `x`.
///
/// `log p(x) = -0.5 * ((x-mean)/sd)^2 - ln(sd) - ln(sqrt(2π))`
pub fn logpdf(x: f64, mean: f64, sd: f64) -> Result<f64> {
    check_finite("mean", mean)?;
    check_positive("sd", sd)?;
    let z = (x - mean) / sd;
    Ok(-0.5 * z * z - sd.ln() - LN_SQRT_2PI)
}

/// Draw from `N(mean, sd)`.
pub fn sample(mean: f64, sd: f64, rng: &mut dyn RngCore) -> Result<f64> {
    check_finite("mean", mean)?;
    check_positive("sd", sd)?;
    let d = rand_distr::Normal::new(mean, sd).map_err(|e| Error::Validation(e.to_string()))?;
    Ok(d.sample(rng))
}
