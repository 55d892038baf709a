//! Davidson iterative eigensolver

extern crate nalgebra as na;

use color_eyre::eyre::Result;
use na::{DMatrix, DVector};
use tracing::{debug, info, warn};

use crate::config::DavidsonParams;
use crate::expression::Expression;
use crate::linalg;
use crate::solver::{Eigendecomposition, Solver};

/// Block Davidson solver for the lowest eigenpairs of an implicit operator.
///
/// Uses only the matrix-vector product and the operator diagonal (as
/// preconditioner); the dense matrix is never formed. Non-convergence after
/// the cycle limit is reported through the result flags, not as an
/// error, so callers can decide whether to retry with relaxed settings.
pub struct Davidson<'a, E: Expression + ?Sized> {
    expr: &'a E,
    params: DavidsonParams,
}

impl<'a, E: Expression + ?Sized> Davidson<'a, E> {
    pub fn new(expr: &'a E, params: DavidsonParams) -> Self {
        Davidson { expr, params }
    }

    /// Unit-vector guesses at the smallest entries of the diagonal.
    fn initial_guess(&self, diag: &DVector<f64>, n_roots: usize) -> Vec<DVector<f64>> {
        let mut order: Vec<usize> = (0..diag.len()).collect();
        order.sort_by(|&a, &b| diag[a].total_cmp(&diag[b]));
        order
            .iter()
            .take(n_roots)
            .map(|&k| {
                let mut v = DVector::zeros(diag.len());
                v[k] = 1.0;
                v
            })
            .collect()
    }
}

/// Project a candidate out of the span of `basis` (two modified
/// Gram-Schmidt passes) and normalize; `None` when the remainder is
/// negligible.
fn orthonormalize(basis: &[DVector<f64>], mut v: DVector<f64>) -> Option<DVector<f64>> {
    let original = v.norm();
    if original == 0.0 {
        return None;
    }
    for _ in 0..2 {
        for b in basis {
            let overlap = b.dot(&v);
            v -= b * overlap;
        }
    }
    let norm = v.norm();
    if norm < 1e-10 * original.max(1.0) {
        return None;
    }
    Some(v / norm)
}

impl<'a, E: Expression + ?Sized> Solver for Davidson<'a, E> {
    type Output = Eigendecomposition;

    fn kernel(&mut self) -> Result<Eigendecomposition> {
        let dim = self.expr.dim();
        let n_roots = self.params.n_roots.min(dim);
        let tol = self.params.convergence_threshold;
        let max_space = (self.params.subspace_multiplier * n_roots).max(2 * n_roots).min(dim);

        let stat = self.expr.get_static_part();
        let diag = self.expr.diagonal(Some(&stat));

        let mut basis = self.initial_guess(&diag, n_roots);
        let mut products: Vec<DVector<f64>> = Vec::new();

        let mut best_values = DVector::zeros(n_roots);
        let mut best_vectors = DMatrix::zeros(dim, n_roots);

        for it in 1..=self.params.max_cycle {
            // Matrix-vector products for the basis vectors added since the
            // last iteration.
            for k in products.len()..basis.len() {
                products.push(self.expr.apply_hamiltonian(&basis[k], Some(&stat)));
            }

            let v = DMatrix::from_columns(&basis);
            let w = DMatrix::from_columns(&products);
            let g = v.transpose() * &w;

            // Subspace eigenproblem: symmetric path when the operator is
            // Hermitian, Schur-based otherwise (falling back to the
            // hermitized projection if a complex pair sneaks in).
            let (sub_values, sub_vectors) = if self.expr.hermitian() {
                linalg::eigh_sorted(&linalg::hermitize(&g))
            } else {
                match linalg::eig_general(&g) {
                    Ok(pair) => pair,
                    Err(err) => {
                        debug!("subspace eigenproblem fell back to hermitized form: {err}");
                        linalg::eigh_sorted(&linalg::hermitize(&g))
                    }
                }
            };

            let n_take = n_roots.min(sub_values.len());
            let mut residual_norms = Vec::with_capacity(n_take);
            let mut residuals = Vec::with_capacity(n_take);
            for r in 0..n_take {
                let y = sub_vectors.column(r).into_owned();
                let ritz = &v * &y;
                let applied = &w * &y;
                let residual = applied - &ritz * sub_values[r];
                residual_norms.push(residual.norm());
                residuals.push(residual);
                best_values[r] = sub_values[r];
                best_vectors.set_column(r, &ritz);
            }

            let n_converged = residual_norms.iter().filter(|&&r| r < tol).count();
            let max_residual = residual_norms.iter().cloned().fold(0.0_f64, f64::max);
            debug!(
                "Davidson cycle {}: subspace {}, converged {}/{}, max residual {:.3e}",
                it,
                basis.len(),
                n_converged,
                n_take,
                max_residual
            );

            if n_take == n_roots && n_converged == n_roots {
                info!(
                    "Davidson converged {} roots in {} cycles (max residual {:.3e})",
                    n_roots, it, max_residual
                );
                return Ok(Eigendecomposition {
                    eigenvalues: best_values,
                    eigenvectors: best_vectors,
                    converged: true,
                    iterations: it,
                });
            }

            // Collapse the subspace onto the current Ritz vectors when the
            // next expansion would overflow it.
            let n_new = n_take - n_converged + (n_roots - n_take);
            if basis.len() + n_new > max_space {
                let mut collapsed: Vec<DVector<f64>> = Vec::with_capacity(n_take);
                for r in 0..n_take {
                    if let Some(q) = orthonormalize(&collapsed, best_vectors.column(r).into_owned())
                    {
                        collapsed.push(q);
                    }
                }
                basis = collapsed;
                products.clear();
                continue;
            }

            // Preconditioned correction vectors for the unconverged roots.
            let mut added = 0;
            for r in 0..n_take {
                if residual_norms[r] < tol {
                    continue;
                }
                let mut c = residuals[r].clone();
                for k in 0..dim {
                    let mut denom = sub_values[r] - diag[k];
                    if denom.abs() < 1e-8 {
                        denom = if denom < 0.0 { -1e-8 } else { 1e-8 };
                    }
                    c[k] /= denom;
                }
                if let Some(q) = orthonormalize(&basis, c) {
                    basis.push(q);
                    added += 1;
                }
            }

            if added == 0 {
                warn!(
                    "Davidson stalled at cycle {}: no new search directions (max residual {:.3e})",
                    it, max_residual
                );
                return Ok(Eigendecomposition {
                    eigenvalues: best_values,
                    eigenvectors: best_vectors,
                    converged: max_residual < tol,
                    iterations: it,
                });
            }
        }

        warn!(
            "Davidson did not converge within {} cycles; returning best available eigenpairs",
            self.params.max_cycle
        );
        Ok(Eigendecomposition {
            eigenvalues: best_values,
            eigenvectors: best_vectors,
            converged: false,
            iterations: self.params.max_cycle,
        })
    }
}
