//! Error types for DagMC

use thiserror::Error;

/// DagMC error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error (bad argument or distribution parameter)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A log-probability could not be computed (NaN, +inf, or invalid parameters).
    ///
    /// Recoverable by redraw during sampler initialization, fatal otherwise.
    #[error("Computation error: {0}")]
    Computation(String),

    /// Invalid sampler setup: empty move list, zero moves per iteration,
    /// a move or monitor that cannot be rebound to a cloned model.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Parent/child edges of a model graph disagree.
    #[error("Structural inconsistency: {0}")]
    Structure(String),
}

impl Error {
    /// Whether a redraw of the starting state may cure this error: a failed
    /// computation or an invalid parameter produced by the current values.
    pub fn is_recoverable_by_redraw(&self) -> bool {
        matches!(self, Error::Computation(_) | Error::Validation(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes() {
        let e = Error::Configuration("no moves".into());
        assert_eq!(e.to_string(), "Configuration error: no moves");
        let e = Error::Structure("edge mismatch".into());
        assert!(e.to_string().starts_with("Structural inconsistency"));
    }

    #[test]
    fn test_recoverable_by_redraw() {
        assert!(Error::Computation("nan".into()).is_recoverable_by_redraw());
        assert!(Error::Validation("sigma".into()).is_recoverable_by_redraw());
        assert!(!Error::Configuration("x".into()).is_recoverable_by_redraw());
    }
}
