//! Cached molecular-orbital integral projections
//!
//! An expression only ever reads a reduced projection of the two-electron
//! integral tensor. The (x i | j a) block needed for the matrix-vector
//! product and the moments is computed here once per mode and kept for the
//! lifetime of the expression; switching the non-Dyson mode rebuilds it.

extern crate nalgebra as na;

use color_eyre::eyre::{eyre, Result};
use na::DMatrix;
use tracing::debug;

use crate::expression::MeanField;
use crate::tensor::Tensor4;

/// Reduced integral block (x i | j a): `x` runs over the main orbital
/// subspace, `i`, `j` over the coupling-inner subspace and `a` over the
/// coupling-outer subspace.
#[derive(Debug, Clone)]
pub struct IntegralCache {
    pub xija: Tensor4,
}

impl IntegralCache {
    /// Project the raw integral tensor onto the given orbital subsets.
    ///
    /// The projected shape is validated against the orbital counts; a
    /// mismatch is a contract violation and surfaces as a fatal error.
    pub fn build(
        mean_field: &MeanField,
        main: &[usize],
        inner: &[usize],
        outer: &[usize],
    ) -> Result<Self> {
        let c_main = select_columns(&mean_field.mo_coeff, main);
        let c_inner = select_columns(&mean_field.mo_coeff, inner);
        let c_outer = select_columns(&mean_field.mo_coeff, outer);

        let xija = mean_field
            .eri
            .transform(&c_main, &c_inner, &c_inner, &c_outer)?;

        let expected = [main.len(), inner.len(), inner.len(), outer.len()];
        if xija.dims() != expected {
            return Err(eyre!(
                "projected integral block has shape {:?} but the orbital subsets require {:?}",
                xija.dims(),
                expected
            ));
        }
        debug!(
            "built (x i | j a) integral block with shape {:?}",
            xija.dims()
        );
        Ok(IntegralCache { xija })
    }
}

/// Gather a subset of molecular-orbital coefficient columns.
pub fn select_columns(c: &DMatrix<f64>, indices: &[usize]) -> DMatrix<f64> {
    let mut out = DMatrix::zeros(c.nrows(), indices.len());
    for (dst, &src) in indices.iter().enumerate() {
        out.set_column(dst, &c.column(src));
    }
    out
}
