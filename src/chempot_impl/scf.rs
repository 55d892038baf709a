//! Outer self-consistency loop over repeated solver invocations

use color_eyre::eyre::Result;
use tracing::{info, warn};

use crate::config::ScfParams;
use crate::solver::Eigendecomposition;

/// Iterates a caller-supplied solve step until the eigenvalue spectrum
/// stops drifting between cycles.
///
/// The step closure receives the cycle index and the previous cycle's
/// eigendecomposition (None on the first cycle) and returns the updated
/// one. How the previous solution feeds back into the next solve, for
/// example through rebuilt moments or an updated static part, is entirely
/// the caller's choice.
pub struct SelfConsistentField {
    params: ScfParams,
}

impl SelfConsistentField {
    pub fn new(params: ScfParams) -> Self {
        SelfConsistentField { params }
    }

    /// Maximum absolute eigenvalue change over the shared prefix of two
    /// spectra. Spectra may change length between cycles when the number
    /// of auxiliary poles changes.
    fn drift(prev: &Eigendecomposition, next: &Eigendecomposition) -> f64 {
        let n = prev.eigenvalues.len().min(next.eigenvalues.len());
        (0..n).fold(0.0_f64, |acc, k| {
            acc.max((next.eigenvalues[k] - prev.eigenvalues[k]).abs())
        })
    }

    /// Runs the fixed-point iteration.
    ///
    /// Non-convergence within `max_cycle` is reported through the
    /// `converged` flag of the returned eigendecomposition, never as an
    /// error. Failures inside the step closure propagate as errors.
    pub fn kernel<F>(&self, mut step: F) -> Result<Eigendecomposition>
    where
        F: FnMut(usize, Option<&Eigendecomposition>) -> Result<Eigendecomposition>,
    {
        let tol = self.params.convergence_threshold;
        let mut current = step(0, None)?;
        for cycle in 1..=self.params.max_cycle {
            let next = step(cycle, Some(&current))?;
            let drift = Self::drift(&current, &next);
            info!(
                "self-consistency cycle {}: eigenvalue drift {:.3e}",
                cycle, drift
            );
            current = next;
            if drift < tol {
                info!("self-consistency reached in {} cycles", cycle);
                current.converged = true;
                current.iterations = cycle;
                return Ok(current);
            }
        }
        warn!(
            "self-consistency not reached within {} cycles",
            self.params.max_cycle
        );
        current.converged = false;
        current.iterations = self.params.max_cycle;
        Ok(current)
    }
}
