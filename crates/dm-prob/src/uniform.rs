//! Continuous uniform distribution.

use crate::math::check_finite;
use dm_core::{Error, Result};
use rand::{Rng, RngCore};

fn check_bounds(lower: f64, upper: f64) -> Result<()> {
    check_finite("lower", lower)?;
    check_finite("upper", upper)?;
    if upper <= lower {
        return Err(Error::Validation(format!(
            "upper must be > lower, got lower={} upper={}",
            lower, upper
        )));
    }
    Ok(())
}

/// Log-PDF of `U(lower, upper)` at `x`.
pub fn logpdf(x: f64, lower: f64, upper: f64) -> Result<f64> {
    check_bounds(lower, upper)?;
    if x < lower || x > upper {
        return Ok(f64::NEG_INFINITY);
    }
    Ok(-(upper - lower).ln())
}

/// Draw from `U(lower, upper)`.
pub fn sample(lower: f64, upper: f64, rng: &mut dyn RngCore) -> Result<f64> {
    check_bounds(lower, upper)?;
    let u: f64 = rng.random();
    Ok(lower + (upper - lower) * u)
}
