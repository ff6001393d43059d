//! Adaptation: acceptance bookkeeping and Metropolis step-size tuning.
//!
//! Moves tune their proposal width between sampling periods so that the
//! acceptance rate drifts toward [`TARGET_ACCEPTANCE`].

/// Acceptance rate that tuning steers toward (optimal for 1-D random walks).
pub const TARGET_ACCEPTANCE: f64 = 0.44;

/// New step size given the acceptance rate observed with `step`.
///
/// Above the target the step grows by up to a factor 2, below it shrinks by up
/// to a factor 2.
pub fn tune_step(step: f64, acceptance_rate: f64) -> f64 {
    let p = TARGET_ACCEPTANCE;
    if acceptance_rate > p {
        step * (1.0 + (acceptance_rate - p) / (1.0 - p))
    } else {
        step / (2.0 - acceptance_rate / p)
    }
}

/// Tried/accepted counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcceptanceCounter {
    /// Proposals made.
    pub tried: u64,
    /// Proposals accepted.
    pub accepted: u64,
}

impl AcceptanceCounter {
    /// Record one proposal.
    pub fn record(&mut self, accepted: bool) {
        self.tried += 1;
        if accepted {
            self.accepted += 1;
        }
    }

    /// Accepted / tried, `None` if nothing was tried.
    pub fn rate(&self) -> Option<f64> {
        (self.tried > 0).then(|| self.accepted as f64 / self.tried as f64)
    }

    /// Zero both counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_tune_step_direction() {
        assert!(tune_step(1.0, 0.9) > 1.0);
        assert!(tune_step(1.0, 0.1) < 1.0);
        assert_relative_eq!(tune_step(1.0, TARGET_ACCEPTANCE), 1.0, epsilon = 1e-15);
    }

    #[test]
    fn test_tune_step_bounds() {
        assert_relative_eq!(tune_step(1.0, 1.0), 2.0, epsilon = 1e-12);
        assert_relative_eq!(tune_step(1.0, 0.0), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_counter() {
        let mut c = AcceptanceCounter::default();
        assert_eq!(c.rate(), None);
        c.record(true);
        c.record(false);
        assert_eq!(c.rate(), Some(0.5));
        c.reset();
        assert_eq!(c.tried, 0);
    }
}
