//! Density kinds a stochastic node can carry.
//!
//! A [`Density`] is parameterized positionally: the parameter values are read
//! from the owning node's parents, in parent order. The graph never looks
//! inside a density beyond [`Density::logpdf`] and [`Density::sample`].

use dm_core::{Error, Result};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Scalar density family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Density {
    /// `Normal(mean, sd)`
    Normal,
    /// `LogNormal(mu, sigma)`: `ln X ~ Normal(mu, sigma)`
    LogNormal,
    /// `Exponential(rate)`
    Exponential,
    /// `Gamma(shape, rate)`
    Gamma,
    /// `Beta(a, b)`
    Beta,
    /// `Uniform(lower, upper)`
    Uniform,
}

impl Density {
    /// Human-readable family name.
    pub fn name(&self) -> &'static str {
        match self {
            Density::Normal => "normal",
            Density::LogNormal => "lognormal",
            Density::Exponential => "exponential",
            Density::Gamma => "gamma",
            Density::Beta => "beta",
            Density::Uniform => "uniform",
        }
    }

    /// Names of the positional parameters.
    pub fn param_names(&self) -> &'static [&'static str] {
        match self {
            Density::Normal => &["mean", "sd"],
            Density::LogNormal => &["mu", "sigma"],
            Density::Exponential => &["rate"],
            Density::Gamma => &["shape", "rate"],
            Density::Beta => &["a", "b"],
            Density::Uniform => &["lower", "upper"],
        }
    }

    /// Number of positional parameters.
    pub fn n_params(&self) -> usize {
        self.param_names().len()
    }

    fn check_arity(&self, params: &[f64]) -> Result<()> {
        if params.len() != self.n_params() {
            return Err(Error::Validation(format!(
                "{} expects {} parameters ({}), got {}",
                self.name(),
                self.n_params(),
                self.param_names().join(", "),
                params.len()
            )));
        }
        Ok(())
    }

    /// Log-density of a single value.
    pub fn logpdf(&self, x: f64, params: &[f64]) -> Result<f64> {
        self.check_arity(params)?;
        match self {
            Density::Normal => crate::normal::logpdf(x, params[0], params[1]),
            Density::LogNormal => {
                if !x.is_finite() || x <= 0.0 {
                    // Still validate the parameters so bad models fail loudly.
                    crate::normal::logpdf(0.0, params[0], params[1])?;
                    return Ok(f64::NEG_INFINITY);
                }
                let lx = x.ln();
                Ok(crate::normal::logpdf(lx, params[0], params[1])? - lx)
            }
            Density::Exponential => crate::exponential::logpdf(x, params[0]),
            Density::Gamma => crate::gamma::logpdf(x, params[0], params[1]),
            Density::Beta => crate::beta::logpdf(x, params[0], params[1]),
            Density::Uniform => crate::uniform::logpdf(x, params[0], params[1]),
        }
    }

    /// Sum of log-densities over i.i.d. values.
    pub fn logpdf_iid(&self, xs: &[f64], params: &[f64]) -> Result<f64> {
        let mut acc = 0.0;
        for &x in xs {
            acc += self.logpdf(x, params)?;
        }
        Ok(acc)
    }

    /// Draw a single value.
    pub fn sample(&self, params: &[f64], rng: &mut dyn RngCore) -> Result<f64> {
        self.check_arity(params)?;
        match self {
            Density::Normal => crate::normal::sample(params[0], params[1], rng),
            Density::LogNormal => Ok(crate::normal::sample(params[0], params[1], rng)?.exp()),
            Density::Exponential => crate::exponential::sample(params[0], rng),
            Density::Gamma => crate::gamma::sample(params[0], params[1], rng),
            Density::Beta => crate::beta::sample(params[0], params[1], rng),
            Density::Uniform => crate::uniform::sample(params[0], params[1], rng),
        }
    }
}

impl std::fmt::Display for Density {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
