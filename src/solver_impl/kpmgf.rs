//! Kernel-polynomial (Chebyshev) spectral solver

extern crate nalgebra as na;

use std::f64::consts::PI;

use color_eyre::eyre::{bail, Result};
use na::{DMatrix, DVector};
use tracing::info;

use crate::config::KpmParams;
use crate::expression::Expression;
use crate::solver::Solver;

/// Spectral densities reconstructed from a Chebyshev expansion.
#[derive(Debug, Clone)]
pub struct KpmSpectrum {
    /// Energy grid (Chebyshev-Gauss nodes mapped to the physical range).
    pub grid: DVector<f64>,
    /// Per-orbital spectral density; column p is the density of main
    /// orbital p on `grid`.
    pub densities: DMatrix<f64>,
    /// Jackson-damped Chebyshev moments, one row per expansion order.
    pub moments: DMatrix<f64>,
    /// Spectral bounds used for the rescaling.
    pub bounds: (f64, f64),
}

/// Kernel polynomial method for the orbital spectral functions.
///
/// Expands the spectral density in Chebyshev polynomials of the rescaled
/// operator, evaluated through the matrix-vector contract alone. The cost
/// is a fixed number of matvecs per orbital regardless of the
/// auxiliary-space size, trading the exactness of the moment solvers for
/// bounded effort. Jackson damping suppresses Gibbs oscillations.
pub struct KPMGF<'a, E: Expression + ?Sized> {
    expr: &'a E,
    params: KpmParams,
}

impl<'a, E: Expression + ?Sized> KPMGF<'a, E> {
    pub fn new(expr: &'a E, params: KpmParams) -> Self {
        KPMGF { expr, params }
    }

    /// Spectral bounds: explicit from the parameters, or the operator
    /// diagonal range with relative padding.
    fn bounds(&self, diag: &DVector<f64>) -> Result<(f64, f64)> {
        if let Some((lo, hi)) = self.params.bounds {
            if hi <= lo {
                bail!("spectral bounds ({}, {}) are not an interval", lo, hi);
            }
            return Ok((lo, hi));
        }
        let dmin = diag.iter().cloned().fold(f64::INFINITY, f64::min);
        let dmax = diag.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let pad = self.params.padding * (dmax - dmin).max(1e-3);
        Ok((dmin - pad, dmax + pad))
    }
}

/// Jackson kernel damping factor for order `n` of an `n_moments` expansion.
fn jackson(n: usize, n_moments: usize) -> f64 {
    let big_n = (n_moments + 1) as f64;
    let x = PI / big_n;
    let nn = n as f64;
    ((big_n - nn) * (nn * x).cos() + (nn * x).sin() / x.tan()) / big_n
}

impl<'a, E: Expression + ?Sized> Solver for KPMGF<'a, E> {
    type Output = KpmSpectrum;

    fn kernel(&mut self) -> Result<KpmSpectrum> {
        let n_main = self.expr.n_main();
        let n_mom = self.params.n_moments;
        let n_grid = self.params.n_grid;
        if n_mom < 2 {
            bail!("Chebyshev expansion requires at least 2 moments");
        }

        let stat = self.expr.get_static_part();
        let diag = self.expr.diagonal(Some(&stat));
        let (emin, emax) = self.bounds(&diag)?;
        // Affine map taking the spectrum into (-1, 1).
        let half_width = 0.5 * (emax - emin);
        let center = 0.5 * (emax + emin);
        let apply_scaled = |v: &DVector<f64>| -> DVector<f64> {
            (self.expr.apply_hamiltonian(v, Some(&stat)) - v * center) / half_width
        };

        // Chebyshev moments mu[n, p] = <p| T_n(H-scaled) |p> by the
        // three-term recurrence, one seed per main orbital.
        let mut mu = DMatrix::zeros(n_mom, n_main);
        for p in 0..n_main {
            let seed = self.expr.get_wavefunction(p);
            let mut t_prev = seed.clone();
            let mut t_cur = apply_scaled(&seed);
            mu[(0, p)] = seed.dot(&t_prev);
            mu[(1, p)] = seed.dot(&t_cur);
            for n in 2..n_mom {
                let t_next = apply_scaled(&t_cur) * 2.0 - t_prev;
                t_prev = t_cur;
                t_cur = t_next;
                mu[(n, p)] = seed.dot(&t_cur);
            }
        }
        if mu.iter().any(|v| !v.is_finite()) {
            bail!(
                "Chebyshev recursion diverged; spectral bounds ({:.4}, {:.4}) do not enclose the spectrum",
                emin,
                emax
            );
        }

        let damped = DMatrix::from_fn(n_mom, n_main, |n, p| jackson(n, n_mom) * mu[(n, p)]);

        // Density on the Chebyshev-Gauss grid x_k = cos(pi (k + 1/2) / K).
        let mut grid = DVector::zeros(n_grid);
        let mut densities = DMatrix::zeros(n_grid, n_main);
        for k in 0..n_grid {
            let theta = PI * (k as f64 + 0.5) / n_grid as f64;
            let x = theta.cos();
            grid[k] = half_width * x + center;
            let weight = 1.0 / (PI * (1.0 - x * x).sqrt() * half_width);
            for p in 0..n_main {
                let mut series = damped[(0, p)];
                for n in 1..n_mom {
                    series += 2.0 * damped[(n, p)] * (n as f64 * theta).cos();
                }
                densities[(k, p)] = weight * series;
            }
        }

        info!(
            "KPMGF: {} Chebyshev moments on bounds ({:.4}, {:.4}), {} grid points",
            n_mom, emin, emax, n_grid
        );
        Ok(KpmSpectrum {
            grid,
            densities,
            moments: damped,
            bounds: (emin, emax),
        })
    }
}
