//! Downfolding solvers
//!
//! The auxiliary block enters the main-block physics only through the
//! frequency-dependent self-energy Σ(ω) = V (ω − E_aux)⁻¹ W. Both solvers
//! here evaluate Σ strictly through the matrix-vector contract (two
//! applications per column) and reduce the problem to the main block: a
//! model-reduction step for large auxiliary spaces.

extern crate nalgebra as na;

use color_eyre::eyre::Result;
use na::{DMatrix, DVector};
use tracing::{debug, info, warn};

use crate::config::DownfoldedParams;
use crate::expression::Expression;
use crate::linalg;
use crate::solver::{Eigendecomposition, Solver};

/// Downfolded self-energy Σ(ω) as a dense main-block matrix.
///
/// Column y: apply the operator to the main basis vector e_y to read off
/// the auxiliary-to-main coupling column, divide by the (regularized) pole
/// denominators, and apply once more to map back onto the main block.
fn sigma_dense<E: Expression + ?Sized>(
    expr: &E,
    stat: &DMatrix<f64>,
    aux_energies: &DVector<f64>,
    omega: f64,
    regularizer: f64,
) -> DMatrix<f64> {
    let n_main = expr.n_main();
    let n_aux = expr.n_aux();
    let dim = n_main + n_aux;
    let mut sigma = DMatrix::zeros(n_main, n_main);

    let mut probe = DVector::zeros(dim);
    for y in 0..n_main {
        probe.fill(0.0);
        probe[y] = 1.0;
        let down = expr.apply_hamiltonian(&probe, Some(stat));

        probe.fill(0.0);
        for k in 0..n_aux {
            let mut denom = omega - aux_energies[k];
            if denom.abs() < regularizer {
                denom = if denom < 0.0 { -regularizer } else { regularizer };
            }
            probe[n_main + k] = down[n_main + k] / denom;
        }
        let up = expr.apply_hamiltonian(&probe, Some(stat));
        for x in 0..n_main {
            sigma[(x, y)] = up[x];
        }
        probe.fill(0.0);
    }
    sigma
}

/// Quasiparticle solver on the downfolded main block.
///
/// For each main orbital, iterates the fixed point of
/// eig(static + Σ(ω)) with eigenvalue selection by maximum overlap with
/// that orbital, mixing successive energies for stability. Per-root
/// non-convergence is reported through the result flags.
pub struct Downfolded<'a, E: Expression + ?Sized> {
    expr: &'a E,
    params: DownfoldedParams,
}

impl<'a, E: Expression + ?Sized> Downfolded<'a, E> {
    pub fn new(expr: &'a E, params: DownfoldedParams) -> Self {
        Downfolded { expr, params }
    }
}

impl<'a, E: Expression + ?Sized> Solver for Downfolded<'a, E> {
    type Output = Eigendecomposition;

    fn kernel(&mut self) -> Result<Eigendecomposition> {
        let n_main = self.expr.n_main();
        let stat = self.expr.get_static_part();
        let diag_full = self.expr.diagonal(Some(&stat));
        let aux_energies = diag_full.rows(n_main, self.expr.n_aux()).into_owned();

        let mut eigenvalues = DVector::zeros(n_main);
        let mut eigenvectors = DMatrix::zeros(n_main, n_main);
        let mut all_converged = true;
        let mut max_iterations = 0;

        for p in 0..n_main {
            let mut omega = stat[(p, p)];
            let mut converged = false;
            let mut last_vals = DVector::zeros(n_main);
            let mut last_vecs = DMatrix::zeros(n_main, n_main);
            let mut picked = p.min(n_main - 1);

            for it in 1..=self.params.max_cycle {
                max_iterations = max_iterations.max(it);
                let sigma = sigma_dense(
                    self.expr,
                    &stat,
                    &aux_energies,
                    omega,
                    self.params.regularizer,
                );
                let heff = linalg::hermitize(&(&stat + sigma));
                let (vals, vecs) = linalg::eigh_sorted(&heff);

                // Root with the largest weight on orbital p.
                picked = (0..n_main)
                    .max_by(|&i, &j| vecs[(p, i)].abs().total_cmp(&vecs[(p, j)].abs()))
                    .unwrap_or(p);
                let next = vals[picked];
                let delta = (next - omega).abs();
                omega = self.params.mixing * next + (1.0 - self.params.mixing) * omega;
                last_vals = vals;
                last_vecs = vecs;
                if delta < self.params.convergence_threshold {
                    converged = true;
                    break;
                }
            }

            if !converged {
                all_converged = false;
                debug!(
                    "downfolded quasiparticle equation for orbital {} did not converge",
                    p
                );
            }
            eigenvalues[p] = last_vals[picked];
            eigenvectors.set_column(p, &last_vecs.column(picked));
        }

        if all_converged {
            info!(
                "Downfolded: {} quasiparticle energies converged within {} iterations",
                n_main, max_iterations
            );
        } else {
            warn!("Downfolded: some quasiparticle equations did not converge; returning best available energies");
        }
        Ok(Eigendecomposition {
            eigenvalues,
            eigenvectors,
            converged: all_converged,
            iterations: max_iterations,
        })
    }
}

/// Diagonal approximation to the downfolded solver.
///
/// Solves the scalar fixed point ω = static_pp + Σ_pp(ω) per orbital,
/// skipping the main-block diagonalization entirely. Cheaper than
/// [`Downfolded`] and adequate when orbital mixing is weak.
pub struct DiagonalDownfolded<'a, E: Expression + ?Sized> {
    expr: &'a E,
    params: DownfoldedParams,
}

impl<'a, E: Expression + ?Sized> DiagonalDownfolded<'a, E> {
    pub fn new(expr: &'a E, params: DownfoldedParams) -> Self {
        DiagonalDownfolded { expr, params }
    }

    /// Σ_pp(ω) through two matrix-vector products.
    fn sigma_diagonal(
        &self,
        stat: &DMatrix<f64>,
        aux_energies: &DVector<f64>,
        p: usize,
        omega: f64,
    ) -> f64 {
        let n_main = self.expr.n_main();
        let n_aux = self.expr.n_aux();
        let mut probe = DVector::zeros(n_main + n_aux);
        probe[p] = 1.0;
        let down = self.expr.apply_hamiltonian(&probe, Some(stat));

        probe.fill(0.0);
        for k in 0..n_aux {
            let mut denom = omega - aux_energies[k];
            if denom.abs() < self.params.regularizer {
                denom = if denom < 0.0 {
                    -self.params.regularizer
                } else {
                    self.params.regularizer
                };
            }
            probe[n_main + k] = down[n_main + k] / denom;
        }
        self.expr.apply_hamiltonian(&probe, Some(stat))[p]
    }
}

impl<'a, E: Expression + ?Sized> Solver for DiagonalDownfolded<'a, E> {
    type Output = Eigendecomposition;

    fn kernel(&mut self) -> Result<Eigendecomposition> {
        let n_main = self.expr.n_main();
        let stat = self.expr.get_static_part();
        let diag_full = self.expr.diagonal(Some(&stat));
        let aux_energies = diag_full.rows(n_main, self.expr.n_aux()).into_owned();

        let mut eigenvalues = DVector::zeros(n_main);
        let eigenvectors = DMatrix::identity(n_main, n_main);
        let mut all_converged = true;
        let mut max_iterations = 0;

        for p in 0..n_main {
            let mut omega = stat[(p, p)];
            let mut converged = false;
            for it in 1..=self.params.max_cycle {
                max_iterations = max_iterations.max(it);
                let next = stat[(p, p)] + self.sigma_diagonal(&stat, &aux_energies, p, omega);
                let delta = (next - omega).abs();
                omega = self.params.mixing * next + (1.0 - self.params.mixing) * omega;
                if delta < self.params.convergence_threshold {
                    converged = true;
                    break;
                }
            }
            if !converged {
                all_converged = false;
                debug!(
                    "diagonal downfolding for orbital {} did not converge",
                    p
                );
            }
            eigenvalues[p] = omega;
        }

        if all_converged {
            info!(
                "DiagonalDownfolded: {} quasiparticle energies converged within {} iterations",
                n_main, max_iterations
            );
        } else {
            warn!("DiagonalDownfolded: some orbitals did not converge; returning best available energies");
        }
        // Orbital basis vectors stand in for the eigenvectors in the
        // diagonal approximation.
        Ok(Eigendecomposition {
            eigenvalues,
            eigenvectors,
            converged: all_converged,
            iterations: max_iterations,
        })
    }
}
