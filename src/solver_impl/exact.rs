//! Exact dense diagonalization

extern crate nalgebra as na;

use color_eyre::eyre::Result;
use tracing::info;

use crate::expression::Expression;
use crate::linalg;
use crate::solver::{build_dense_operator, Eigendecomposition, Solver};

/// Full diagonalization of the materialized operator.
///
/// Builds the dense matrix by applying the expression to every standard
/// basis vector and diagonalizes it completely. Only meant for small
/// auxiliary spaces: validation, testing and as the reference for the
/// iterative solvers.
pub struct Exact<'a, E: Expression + ?Sized> {
    expr: &'a E,
}

impl<'a, E: Expression + ?Sized> Exact<'a, E> {
    pub fn new(expr: &'a E) -> Self {
        Exact { expr }
    }
}

impl<'a, E: Expression + ?Sized> Solver for Exact<'a, E> {
    type Output = Eigendecomposition;

    fn kernel(&mut self) -> Result<Eigendecomposition> {
        let h = build_dense_operator(self.expr);
        let scale = h.iter().fold(0.0_f64, |acc, &x| acc.max(x.abs())).max(1.0);

        let (eigenvalues, eigenvectors) = if linalg::hermiticity_error(&h) <= 1e-12 * scale {
            linalg::eigh_sorted(&h)
        } else {
            linalg::eig_general(&h)?
        };

        info!(
            "Exact diagonalization: dimension {}, eigenvalue range [{:.6}, {:.6}]",
            h.nrows(),
            eigenvalues[0],
            eigenvalues[eigenvalues.len() - 1]
        );
        Ok(Eigendecomposition::converged(eigenvalues, eigenvectors))
    }
}
