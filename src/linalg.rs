//! Dense eigensolver helpers shared by the solver family
//!
//! nalgebra provides symmetric eigensolvers and the real Schur decomposition
//! but no general nonsymmetric eigensolver, so the mildly non-Hermitian
//! operators produced by the expressions are handled here: eigenvalues come
//! from the quasi-triangular Schur factor and eigenvectors from triangular
//! back-substitution. Complex conjugate pairs are reported as errors rather
//! than silently truncated; the physical operators in this crate have real
//! spectra, so a complex pair means the input violated its contract.

extern crate nalgebra as na;

use color_eyre::eyre::{eyre, Result};
use na::linalg::Schur;
use na::{DMatrix, DVector, SymmetricEigen};
use num_complex::Complex64;

/// Symmetric eigendecomposition with eigenvalues sorted ascending and
/// eigenvector columns permuted to match.
pub fn eigh_sorted(m: &DMatrix<f64>) -> (DVector<f64>, DMatrix<f64>) {
    let se = SymmetricEigen::new(m.clone());
    let n = se.eigenvalues.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| se.eigenvalues[a].total_cmp(&se.eigenvalues[b]));

    let eigenvalues = DVector::from_fn(n, |i, _| se.eigenvalues[order[i]]);
    let mut eigenvectors = DMatrix::zeros(n, n);
    for (dst, &src) in order.iter().enumerate() {
        eigenvectors.set_column(dst, &se.eigenvectors.column(src));
    }
    (eigenvalues, eigenvectors)
}

/// Largest absolute deviation between a matrix and its transpose.
pub fn hermiticity_error(m: &DMatrix<f64>) -> f64 {
    let mut err: f64 = 0.0;
    for i in 0..m.nrows() {
        for j in (i + 1)..m.ncols() {
            err = err.max((m[(i, j)] - m[(j, i)]).abs());
        }
    }
    err
}

/// Symmetric part 0.5 (M + Mᵀ).
pub fn hermitize(m: &DMatrix<f64>) -> DMatrix<f64> {
    (m + m.transpose()) * 0.5
}

/// Löwdin square-root pair of a symmetric positive semi-definite matrix.
///
/// Diagonalizes `s` and keeps the eigenvectors whose eigenvalues exceed
/// `tol` times the largest eigenvalue, returning `(a, b)` with
/// `a = U_kept Λ^{1/2}` and `b = U_kept Λ^{-1/2}`, both of shape
/// (n × n_kept). The products satisfy `a aᵀ ≈ s` and `bᵀ s b ≈ I` on the
/// retained subspace. Fails if no eigenvalue survives the cutoff.
pub fn lowdin_pair(s: &DMatrix<f64>, tol: f64) -> Result<(DMatrix<f64>, DMatrix<f64>)> {
    let (lam, u) = eigh_sorted(s);
    let n = lam.len();
    let lam_max = lam.iter().cloned().fold(0.0_f64, f64::max);
    if lam_max <= 0.0 {
        return Err(eyre!("matrix has no positive spectrum"));
    }

    let kept: Vec<usize> = (0..n).filter(|&k| lam[k] > tol * lam_max).collect();
    if kept.is_empty() {
        return Err(eyre!(
            "all {} eigenvalues fall below the projection tolerance {:.3e}",
            n,
            tol
        ));
    }

    let r = kept.len();
    let mut a = DMatrix::zeros(n, r);
    let mut b = DMatrix::zeros(n, r);
    for (dst, &k) in kept.iter().enumerate() {
        let sqrt = lam[k].sqrt();
        for i in 0..n {
            a[(i, dst)] = u[(i, k)] * sqrt;
            b[(i, dst)] = u[(i, k)] / sqrt;
        }
    }
    Ok((a, b))
}

/// Eigendecomposition of a general real matrix with a real spectrum.
///
/// Uses the real Schur form; right eigenvectors are recovered from the
/// triangular factor by back-substitution with a small-pivot guard, which is
/// valid whenever every Schur block is 1×1. If a 2×2 block (complex
/// conjugate pair) is present the decomposition is rejected with the
/// magnitude of the offending imaginary part.
pub fn eig_general(m: &DMatrix<f64>) -> Result<(DVector<f64>, DMatrix<f64>)> {
    let n = m.nrows();
    if n == 0 {
        return Ok((DVector::zeros(0), DMatrix::zeros(0, 0)));
    }
    if m.ncols() != n {
        return Err(eyre!(
            "eigendecomposition requires a square matrix, got {}x{}",
            m.nrows(),
            m.ncols()
        ));
    }

    let scale = m.iter().fold(0.0_f64, |acc, &x| acc.max(x.abs())).max(1.0);
    let schur = Schur::try_new(m.clone(), f64::EPSILON * scale, 0)
        .ok_or_else(|| eyre!("Schur decomposition did not converge"))?;
    let (q, t) = schur.unpack();

    // Any surviving subdiagonal entry marks a 2x2 block, i.e. a complex pair.
    let block_tol = 1e-12 * scale;
    for k in 0..n - 1 {
        if t[(k + 1, k)].abs() > block_tol {
            let max_im = m
                .complex_eigenvalues()
                .iter()
                .fold(0.0_f64, |acc, z: &Complex64| acc.max(z.im.abs()));
            return Err(eyre!(
                "operator has complex eigenvalue pairs (max |Im| = {:.3e}); spectrum is not real",
                max_im
            ));
        }
    }

    let smlnum = f64::EPSILON * scale;
    let mut pairs: Vec<(f64, DVector<f64>)> = Vec::with_capacity(n);
    for k in 0..n {
        let lam = t[(k, k)];
        let mut y = DVector::zeros(n);
        y[k] = 1.0;
        for i in (0..k).rev() {
            let mut sum = 0.0;
            for j in (i + 1)..=k {
                sum += t[(i, j)] * y[j];
            }
            let mut denom = lam - t[(i, i)];
            if denom.abs() < smlnum {
                denom = if denom < 0.0 { -smlnum } else { smlnum };
            }
            y[i] = sum / denom;
        }
        let mut v = &q * y;
        let norm = v.norm();
        if norm > 0.0 {
            v /= norm;
        }
        pairs.push((lam, v));
    }

    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    let eigenvalues = DVector::from_fn(n, |i, _| pairs[i].0);
    let mut eigenvectors = DMatrix::zeros(n, n);
    for (k, (_, v)) in pairs.iter().enumerate() {
        eigenvectors.set_column(k, v);
    }
    Ok((eigenvalues, eigenvectors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{DMatrix, DVector};

    #[test]
    fn test_eigh_sorted_ascending() {
        let m = DMatrix::from_row_slice(3, 3, &[2.0, 1.0, 0.0, 1.0, 3.0, 1.0, 0.0, 1.0, 4.0]);
        let (vals, vecs) = eigh_sorted(&m);
        assert!(vals[0] <= vals[1] && vals[1] <= vals[2]);
        for k in 0..3 {
            let v = vecs.column(k).into_owned();
            let r = &m * &v - &v * vals[k];
            assert!(r.norm() < 1e-10, "residual {} for eigenpair {}", r.norm(), k);
        }
    }

    #[test]
    fn test_lowdin_pair_inverse_square_root() {
        let m = DMatrix::from_row_slice(2, 2, &[2.0, 0.5, 0.5, 1.0]);
        let (a, b) = lowdin_pair(&m, 1e-12).unwrap();
        let re = &a * a.transpose() - &m;
        assert!(re.norm() < 1e-12);
        let ortho = b.transpose() * &m * &b;
        let eye = DMatrix::identity(2, 2);
        assert!((ortho - eye).norm() < 1e-12);
    }

    #[test]
    fn test_lowdin_pair_projects_null_space() {
        // Rank-1 matrix: one direction must be discarded.
        let v = DVector::from_column_slice(&[1.0, 2.0]);
        let m = &v * v.transpose();
        let (a, b) = lowdin_pair(&m, 1e-10).unwrap();
        assert_eq!(a.ncols(), 1);
        assert_eq!(b.ncols(), 1);
        assert!((a.column(0).norm_squared() - 5.0).abs() < 1e-10);
    }

    #[test]
    fn test_eig_general_upper_triangular() {
        let m = DMatrix::from_row_slice(3, 3, &[2.0, 1.0, 0.5, 0.0, 3.0, 1.0, 0.0, 0.0, 5.0]);
        let (vals, vecs) = eig_general(&m).unwrap();
        let expected = [2.0, 3.0, 5.0];
        for k in 0..3 {
            assert!((vals[k] - expected[k]).abs() < 1e-10);
            let v = vecs.column(k).into_owned();
            let r = &m * &v - &v * vals[k];
            assert!(r.norm() < 1e-9, "residual {} for eigenpair {}", r.norm(), k);
        }
    }

    #[test]
    fn test_eig_general_nonsymmetric_real_spectrum() {
        // Similar to diag(1, 4) under a non-orthogonal similarity transform.
        let p = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 0.0, 1.0]);
        let p_inv = DMatrix::from_row_slice(2, 2, &[1.0, -1.0, 0.0, 1.0]);
        let d = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 4.0]);
        let m = &p * d * p_inv;
        let (vals, vecs) = eig_general(&m).unwrap();
        assert!((vals[0] - 1.0).abs() < 1e-10);
        assert!((vals[1] - 4.0).abs() < 1e-10);
        for k in 0..2 {
            let v = vecs.column(k).into_owned();
            let r = &m * &v - &v * vals[k];
            assert!(r.norm() < 1e-9);
        }
    }

    #[test]
    fn test_eig_general_rejects_complex_pairs() {
        // Rotation by 90 degrees has eigenvalues ±i.
        let m = DMatrix::from_row_slice(2, 2, &[0.0, -1.0, 1.0, 0.0]);
        assert!(eig_general(&m).is_err());
    }

    #[test]
    fn test_hermiticity_helpers() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 0.0, 1.0]);
        assert!((hermiticity_error(&m) - 2.0).abs() < 1e-15);
        let h = hermitize(&m);
        assert!(hermiticity_error(&h) < 1e-15);
        assert!((h[(0, 1)] - 1.0).abs() < 1e-15);
    }
}
