//! Moment-conserving block Lanczos for self-energies (MBLSE)

extern crate nalgebra as na;

use color_eyre::eyre::Result;
use tracing::info;

use super::mblgf::block_lanczos;
use crate::expression::Expression;
use crate::linalg;
use crate::solver::{AuxiliarySpace, Eigendecomposition, Solver};

/// Result of a self-energy moment fit: the auxiliary pole representation
/// of the self-energy together with the eigendecomposition of the extended
/// Hamiltonian it defines.
#[derive(Debug, Clone)]
pub struct MblseResult {
    pub aux: AuxiliarySpace,
    pub eig: Eigendecomposition,
}

/// Mixed moment-based low-energy solver.
///
/// Fits an auxiliary (pole + coupling) representation whose moments match
/// the expression's self-energy moments up to the requested order, then
/// diagonalizes the much smaller extended Hamiltonian
/// [[static, V], [Vᵀ, diag e]] for the low-energy spectrum. The auxiliary
/// space of the fit grows with the moment order, not with the size of the
/// original configuration space.
pub struct MBLSE<'a, E: Expression + ?Sized> {
    expr: &'a E,
    n_moments: usize,
}

impl<'a, E: Expression + ?Sized> MBLSE<'a, E> {
    /// `n_moments` must be even; the fit conserves moments 0..n_moments-1.
    pub fn new(expr: &'a E, n_moments: usize) -> Self {
        MBLSE { expr, n_moments }
    }
}

impl<'a, E: Expression + ?Sized> Solver for MBLSE<'a, E> {
    type Output = MblseResult;

    fn kernel(&mut self) -> Result<MblseResult> {
        let moments = self.expr.build_se_moments(self.n_moments)?;
        let aux = block_lanczos(&moments)?;

        let stat = self.expr.get_static_part();
        let h = aux.extended_hamiltonian(&stat);
        let (eigenvalues, eigenvectors) = linalg::eigh_sorted(&h);

        info!(
            "MBLSE: {} self-energy poles conserving {} moments; extended problem dimension {}",
            aux.n_poles(),
            self.n_moments,
            h.nrows()
        );
        Ok(MblseResult {
            aux,
            eig: Eigendecomposition::converged(eigenvalues, eigenvectors),
        })
    }
}
