//! Operator contract between expressions and solvers
//!
//! An expression represents an implicit linear operator over a composite
//! state space: a "main" orbital block of size `n_main` coupled to an
//! auxiliary block of `n_aux` many-body configurations. The operator is
//! never materialized; solvers consume it only through the matrix-vector
//! product, the diagonal, the static (frequency-independent) block and the
//! self-energy moments exposed here.

extern crate nalgebra as na;

use color_eyre::eyre::{eyre, Result};
use na::{DMatrix, DVector};

use crate::tensor::Tensor4;

/// Read-only mean-field data handed over by the electronic-structure
/// provider: molecular-orbital coefficients, orbital energies, occupation
/// numbers and the two-electron repulsion integrals in chemist convention
/// (μν|λσ) over the atomic-orbital basis.
#[derive(Debug, Clone)]
pub struct MeanField {
    pub mo_coeff: DMatrix<f64>,
    pub mo_energy: DVector<f64>,
    pub mo_occ: DVector<f64>,
    pub eri: Tensor4,
}

impl MeanField {
    /// Bundle the provider data, validating that all shapes agree.
    pub fn new(
        mo_coeff: DMatrix<f64>,
        mo_energy: DVector<f64>,
        mo_occ: DVector<f64>,
        eri: Tensor4,
    ) -> Result<Self> {
        let nmo = mo_coeff.ncols();
        let nao = mo_coeff.nrows();
        if mo_energy.len() != nmo {
            return Err(eyre!(
                "orbital energy vector has {} entries but there are {} molecular orbitals",
                mo_energy.len(),
                nmo
            ));
        }
        if mo_occ.len() != nmo {
            return Err(eyre!(
                "occupation vector has {} entries but there are {} molecular orbitals",
                mo_occ.len(),
                nmo
            ));
        }
        if eri.dims() != [nao, nao, nao, nao] {
            return Err(eyre!(
                "integral tensor has dimensions {:?} but the orbital basis has {} functions",
                eri.dims(),
                nao
            ));
        }
        Ok(MeanField {
            mo_coeff,
            mo_energy,
            mo_occ,
            eri,
        })
    }

    pub fn n_mo(&self) -> usize {
        self.mo_coeff.ncols()
    }

    /// Indices of orbitals with non-zero occupation.
    pub fn occupied(&self) -> Vec<usize> {
        (0..self.n_mo()).filter(|&p| self.mo_occ[p] > 0.0).collect()
    }

    /// Indices of orbitals with zero occupation.
    pub fn virtual_orbitals(&self) -> Vec<usize> {
        (0..self.n_mo())
            .filter(|&p| self.mo_occ[p] == 0.0)
            .collect()
    }
}

/// Implicit-operator contract consumed by every solver.
///
/// Implementations must guarantee that `apply_hamiltonian` is linear and
/// agrees with the matrix-vector product of the dense operator obtained by
/// applying it to every standard basis vector, and that `diagonal` equals
/// the diagonal of that same dense operator.
pub trait Expression {
    /// Size of the main (orbital) block.
    fn n_main(&self) -> usize;

    /// Number of auxiliary configurations.
    fn n_aux(&self) -> usize;

    /// Total dimension of the composite state space.
    fn dim(&self) -> usize {
        self.n_main() + self.n_aux()
    }

    /// Whether the implicit operator is symmetric. A hint for solvers; the
    /// MP2 expressions are not, due to the asymmetric exchange coupling.
    fn hermitian(&self) -> bool {
        true
    }

    /// Frequency-independent effective Hamiltonian on the main block,
    /// symmetric by construction.
    fn get_static_part(&self) -> DMatrix<f64>;

    /// Apply the implicit operator to a state vector of length `dim()`.
    /// A precomputed static part can be passed to avoid rebuilding it
    /// across repeated solver iterations.
    fn apply_hamiltonian(
        &self,
        vector: &DVector<f64>,
        static_part: Option<&DMatrix<f64>>,
    ) -> DVector<f64>;

    /// Diagonal of the implicit operator: the static-block diagonal followed
    /// by the per-configuration auxiliary energies.
    fn diagonal(&self, static_part: Option<&DMatrix<f64>>) -> DVector<f64>;

    /// Unit basis vector seeding solvers that target one orbital.
    fn get_wavefunction(&self, orbital: usize) -> DVector<f64>;

    /// Self-energy spectral moments 0..n_moments-1, each `n_main × n_main`.
    /// Fails if the energy-power weighting overflows to non-finite values.
    fn build_se_moments(&self, n_moments: usize) -> Result<Vec<DMatrix<f64>>>;
}
