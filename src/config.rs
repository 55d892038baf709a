//! Solver and addon parameter structures
//!
//! Programmatic configuration surface for the solver family. Every struct
//! carries defaults suitable for small to medium auxiliary spaces; callers
//! override fields as needed.

use serde::{Deserialize, Serialize};

/// Parameters for the Davidson eigensolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DavidsonParams {
    /// Number of lowest eigenpairs to converge.
    pub n_roots: usize,
    /// Residual-norm convergence threshold.
    pub convergence_threshold: f64,
    /// Maximum number of outer iterations before giving up.
    pub max_cycle: usize,
    /// Maximum subspace dimension as a multiple of `n_roots`.
    pub subspace_multiplier: usize,
}

impl Default for DavidsonParams {
    fn default() -> Self {
        DavidsonParams {
            n_roots: 5,
            convergence_threshold: 1e-8,
            max_cycle: 100,
            subspace_multiplier: 6,
        }
    }
}

/// Parameters for the kernel-polynomial (Chebyshev) spectral solver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpmParams {
    /// Number of Chebyshev moments in the expansion.
    pub n_moments: usize,
    /// Number of Chebyshev-Gauss grid points for the reconstructed density.
    pub n_grid: usize,
    /// Explicit spectral bounds (min, max). When absent, bounds are
    /// estimated from the operator diagonal and padded.
    pub bounds: Option<(f64, f64)>,
    /// Relative padding applied to diagonal-derived bounds.
    pub padding: f64,
}

impl Default for KpmParams {
    fn default() -> Self {
        KpmParams {
            n_moments: 100,
            n_grid: 201,
            bounds: None,
            padding: 0.2,
        }
    }
}

/// Parameters for the downfolding solvers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownfoldedParams {
    /// Quasiparticle fixed-point convergence threshold on the energy.
    pub convergence_threshold: f64,
    /// Maximum fixed-point iterations per orbital.
    pub max_cycle: usize,
    /// Mixing factor between successive quasiparticle energies.
    pub mixing: f64,
    /// Regularizer keeping the pole denominators away from zero.
    pub regularizer: f64,
}

impl Default for DownfoldedParams {
    fn default() -> Self {
        DownfoldedParams {
            convergence_threshold: 1e-8,
            max_cycle: 50,
            mixing: 0.5,
            regularizer: 1e-8,
        }
    }
}

/// Parameters for the auxiliary-shift chemical-potential addon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftParams {
    /// Orbital occupancy (2 for restricted references).
    pub occupancy: f64,
    /// Convergence threshold on the particle-number error.
    pub convergence_threshold: f64,
    /// Maximum bisection iterations.
    pub max_cycle: usize,
    /// Initial shift bracket, expanded until the root is enclosed.
    pub bracket: (f64, f64),
}

impl Default for ShiftParams {
    fn default() -> Self {
        ShiftParams {
            occupancy: 2.0,
            convergence_threshold: 1e-8,
            max_cycle: 100,
            bracket: (-1.0, 1.0),
        }
    }
}

/// Parameters for the self-consistent-field wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScfParams {
    /// Convergence threshold on the eigenvalue drift between cycles.
    pub convergence_threshold: f64,
    /// Maximum self-consistency cycles.
    pub max_cycle: usize,
}

impl Default for ScfParams {
    fn default() -> Self {
        ScfParams {
            convergence_threshold: 1e-8,
            max_cycle: 50,
        }
    }
}
