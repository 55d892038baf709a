//! Moment-conserving block Lanczos for Green's functions (MBLGF)

extern crate nalgebra as na;

use color_eyre::eyre::{bail, eyre, Result};
use na::{Cholesky, DMatrix, DVector};
use tracing::{debug, info, warn};

use crate::expression::Expression;
use crate::linalg;
use crate::solver::{AuxiliarySpace, Solver};

/// Fit a discrete pole representation to a sequence of spectral moments by
/// a block-Lanczos (block Golub-Welsch) recursion.
///
/// Given moments T_0 .. T_{2N-1} of a positive matrix-valued measure, the
/// zeroth moment is Löwdin-orthonormalized (projecting out its null space),
/// the block Hankel matrix of orthonormalized moments is Cholesky-factored
/// and the resulting block Jacobi matrix diagonalized. The returned poles
/// and couplings reproduce the (hermitized) input moments up to order
/// 2N - 1.
///
/// Ill-conditioning policy: a Hankel matrix that is not positive definite is
/// truncated to its largest positive-definite leading block, producing a
/// lower-order fit with a warning instead of NaNs. Only a zeroth moment
/// with no positive spectrum is a hard error.
pub fn block_lanczos(moments: &[DMatrix<f64>]) -> Result<AuxiliarySpace> {
    if moments.len() < 2 {
        bail!(
            "moment fitting requires at least 2 moments, got {}",
            moments.len()
        );
    }
    if moments.len() % 2 != 0 {
        bail!(
            "moment fitting requires an even number of moments, got {}",
            moments.len()
        );
    }
    let n_main = moments[0].nrows();
    let n_block = moments.len() / 2;

    let scale = moments[0]
        .iter()
        .fold(0.0_f64, |acc, &x| acc.max(x.abs()))
        .max(1.0);
    let asym = moments
        .iter()
        .map(linalg::hermiticity_error)
        .fold(0.0_f64, f64::max);
    if asym > 1e-8 * scale {
        warn!(
            "hermitizing input moments (max asymmetry {:.3e}); the fit matches their symmetric part",
            asym
        );
    }
    let sym: Vec<DMatrix<f64>> = moments.iter().map(linalg::hermitize).collect();

    // Löwdin orthonormalization of the zeroth moment, projecting out its
    // null space. `a` back-transforms couplings, `b` orthonormalizes.
    let (a, b) = linalg::lowdin_pair(&sym[0], 1e-12)
        .map_err(|err| eyre!("zeroth moment has no positive spectrum: {err}"))?;
    let rank = a.ncols();
    if rank < n_main {
        debug!(
            "projected out {} null-space directions of the zeroth moment",
            n_main - rank
        );
    }
    let ortho: Vec<DMatrix<f64>> = sym.iter().map(|t| b.transpose() * t * &b).collect();

    // Largest leading block count for which the Hankel matrix stays
    // positive definite.
    let mut chol: Option<(usize, Cholesky<f64, na::Dyn>)> = None;
    for k in (1..=n_block).rev() {
        let h = block_hankel(&ortho, k, rank, 0);
        if let Some(c) = Cholesky::new(h) {
            chol = Some((k, c));
            break;
        }
    }
    let (k_block, chol) = chol.ok_or_else(|| {
        eyre!("moment Hankel matrix is not positive definite at any order")
    })?;
    if k_block < n_block {
        warn!(
            "near-singular moment recursion: truncating from {} to {} blocks",
            n_block, k_block
        );
    }

    // Block Jacobi matrix J = L^-1 H' L^-T from the shifted Hankel matrix.
    let h_shift = block_hankel(&ortho, k_block, rank, 1);
    let l = chol.l();
    let x = l
        .solve_lower_triangular(&h_shift)
        .ok_or_else(|| eyre!("triangular solve failed in the moment recursion"))?;
    let y = l
        .solve_lower_triangular(&x.transpose())
        .ok_or_else(|| eyre!("triangular solve failed in the moment recursion"))?;
    let j = linalg::hermitize(&y.transpose());

    let (energies, vectors) = linalg::eigh_sorted(&j);

    // Couplings: back-transform the first block row of the eigenvectors.
    let couplings = &a * vectors.rows(0, rank);
    if couplings.iter().any(|v| !v.is_finite()) || energies.iter().any(|v| !v.is_finite()) {
        bail!("moment recursion produced non-finite pole parameters");
    }

    Ok(AuxiliarySpace {
        energies,
        couplings,
    })
}

/// Block Hankel matrix H[i, j] = T_{i+j+shift} over `k` blocks of size `m`.
fn block_hankel(moments: &[DMatrix<f64>], k: usize, m: usize, shift: usize) -> DMatrix<f64> {
    let mut h = DMatrix::zeros(k * m, k * m);
    for bi in 0..k {
        for bj in 0..k {
            let t = &moments[bi + bj + shift];
            for p in 0..m {
                for q in 0..m {
                    h[(bi * m + p, bj * m + q)] = t[(p, q)];
                }
            }
        }
    }
    h
}

/// Moment-conserving Green's-function solver.
///
/// Accumulates the projected moments (H^n)[main, main] of the full implicit
/// operator by repeated matrix-vector products on the main-orbital basis
/// vectors, then fits a pole representation of the Green's function whose
/// moments match them. The poles approximate the full spectral function at
/// a cost independent of the auxiliary-space size beyond the matvecs.
pub struct MBLGF<'a, E: Expression + ?Sized> {
    expr: &'a E,
    n_moments: usize,
}

impl<'a, E: Expression + ?Sized> MBLGF<'a, E> {
    /// `n_moments` must be even; the fit conserves moments 0..n_moments-1.
    pub fn new(expr: &'a E, n_moments: usize) -> Self {
        MBLGF { expr, n_moments }
    }

    /// Projected operator moments (H^n)[main, main] for n = 0..n_moments-1.
    pub fn build_gf_moments(&self) -> Result<Vec<DMatrix<f64>>> {
        let n_main = self.expr.n_main();
        let stat = self.expr.get_static_part();

        let mut vectors: Vec<DVector<f64>> = (0..n_main)
            .map(|p| self.expr.get_wavefunction(p))
            .collect();

        let mut moments = Vec::with_capacity(self.n_moments);
        for n in 0..self.n_moments {
            let mut t = DMatrix::zeros(n_main, n_main);
            for (x, v) in vectors.iter().enumerate() {
                for y in 0..n_main {
                    t[(y, x)] = v[y];
                }
            }
            if t.iter().any(|v| !v.is_finite()) {
                bail!("Green's function moment {} overflowed", n);
            }
            moments.push(t);
            if n + 1 < self.n_moments {
                for v in vectors.iter_mut() {
                    *v = self.expr.apply_hamiltonian(v, Some(&stat));
                }
            }
        }
        Ok(moments)
    }
}

impl<'a, E: Expression + ?Sized> Solver for MBLGF<'a, E> {
    type Output = AuxiliarySpace;

    fn kernel(&mut self) -> Result<AuxiliarySpace> {
        let moments = self.build_gf_moments()?;
        let poles = block_lanczos(&moments)?;
        info!(
            "MBLGF: fitted {} poles conserving {} Green's function moments",
            poles.n_poles(),
            self.n_moments
        );
        Ok(poles)
    }
}
