//! Shared solver contract and result types

extern crate nalgebra as na;

use color_eyre::eyre::Result;
use na::{DMatrix, DVector};

use crate::expression::Expression;

/// A solver consumes an expression through the operator contract and
/// produces its own flavor of spectral result.
pub trait Solver {
    type Output;

    /// Run the solve to completion. Numerical non-convergence is not an
    /// error; it is reported through the flags on the output. Errors are
    /// reserved for contract violations and irrecoverable conditioning
    /// failures.
    fn kernel(&mut self) -> Result<Self::Output>;
}

/// Eigenvalues and eigenvectors together with the convergence record of the
/// iteration that produced them.
#[derive(Debug, Clone)]
pub struct Eigendecomposition {
    pub eigenvalues: DVector<f64>,
    pub eigenvectors: DMatrix<f64>,
    pub converged: bool,
    pub iterations: usize,
}

impl Eigendecomposition {
    pub fn converged(eigenvalues: DVector<f64>, eigenvectors: DMatrix<f64>) -> Self {
        Eigendecomposition {
            eigenvalues,
            eigenvectors,
            converged: true,
            iterations: 1,
        }
    }

    /// Main-space spectral weight of each eigenvector: the squared norm of
    /// its first `n_main` components.
    pub fn main_weights(&self, n_main: usize) -> DVector<f64> {
        let n = self.eigenvalues.len();
        DVector::from_fn(n, |k, _| {
            let col = self.eigenvectors.column(k);
            let norm2 = col.norm_squared();
            if norm2 == 0.0 {
                return 0.0;
            }
            col.rows(0, n_main).norm_squared() / norm2
        })
    }
}

/// Discrete pole representation of a self-energy or Green's function:
/// energies plus the coupling (transition amplitude) of each pole to every
/// main orbital.
#[derive(Debug, Clone)]
pub struct AuxiliarySpace {
    pub energies: DVector<f64>,
    /// `n_main × n_poles` coupling matrix.
    pub couplings: DMatrix<f64>,
}

impl AuxiliarySpace {
    pub fn n_poles(&self) -> usize {
        self.energies.len()
    }

    /// Spectral moment of order `n`: Σ_k v_k e_k^n v_kᵀ. Used to verify the
    /// moment-matching round trip of the fitted representation.
    pub fn moment(&self, n: usize) -> DMatrix<f64> {
        let n_main = self.couplings.nrows();
        let mut t = DMatrix::zeros(n_main, n_main);
        for k in 0..self.n_poles() {
            let w = self.energies[k].powi(n as i32);
            for x in 0..n_main {
                for y in 0..n_main {
                    t[(x, y)] += self.couplings[(x, k)] * w * self.couplings[(y, k)];
                }
            }
        }
        t
    }

    /// Extended Hamiltonian [[static, V], [Vᵀ, diag e]] coupling the main
    /// block to this pole representation.
    pub fn extended_hamiltonian(&self, static_part: &DMatrix<f64>) -> DMatrix<f64> {
        let n_main = self.couplings.nrows();
        let n_poles = self.n_poles();
        let dim = n_main + n_poles;
        let mut h = DMatrix::zeros(dim, dim);
        for x in 0..n_main {
            for y in 0..n_main {
                h[(x, y)] = static_part[(x, y)];
            }
        }
        for k in 0..n_poles {
            for x in 0..n_main {
                h[(x, n_main + k)] = self.couplings[(x, k)];
                h[(n_main + k, x)] = self.couplings[(x, k)];
            }
            h[(n_main + k, n_main + k)] = self.energies[k];
        }
        h
    }
}

/// Materialize the dense operator by applying the expression to every
/// standard basis vector. Intended for small auxiliary spaces; this is the
/// regression oracle for the implicit matrix-vector product.
pub fn build_dense_operator<E: Expression + ?Sized>(expr: &E) -> DMatrix<f64> {
    let dim = expr.dim();
    let stat = expr.get_static_part();
    let mut h = DMatrix::zeros(dim, dim);
    let mut e_k = DVector::zeros(dim);
    for k in 0..dim {
        e_k[k] = 1.0;
        h.set_column(k, &expr.apply_hamiltonian(&e_k, Some(&stat)));
        e_k[k] = 0.0;
    }
    h
}
