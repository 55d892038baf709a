//! Tests for the solver family on an explicit pole model

use std::f64::consts::PI;

use color_eyre::eyre::Result;
use nalgebra::{DMatrix, DVector};

use super::{
    block_lanczos, Davidson, DiagonalDownfolded, Downfolded, Exact, KPMGF, MBLGF, MBLSE,
};
use crate::config::{DavidsonParams, DownfoldedParams, KpmParams};
use crate::expression::{Expression, MeanField};
use crate::linalg;
use crate::mp2_impl::{Channel, MP2};
use crate::solver::{build_dense_operator, Solver};
use crate::tensor::Tensor4;

/// Explicit operator with a dense static block and diagonal auxiliary
/// energies, coupled through separate up and down coupling matrices so
/// both the symmetric and the asymmetric solver paths can be exercised.
struct ModelExpression {
    static_part: DMatrix<f64>,
    aux_energies: DVector<f64>,
    /// `n_main x n_aux` main-from-auxiliary coupling.
    up: DMatrix<f64>,
    /// `n_main x n_aux` auxiliary-from-main coupling.
    down: DMatrix<f64>,
}

impl Expression for ModelExpression {
    fn n_main(&self) -> usize {
        self.static_part.nrows()
    }

    fn n_aux(&self) -> usize {
        self.aux_energies.len()
    }

    fn hermitian(&self) -> bool {
        self.up == self.down
    }

    fn get_static_part(&self) -> DMatrix<f64> {
        self.static_part.clone()
    }

    fn apply_hamiltonian(
        &self,
        vector: &DVector<f64>,
        static_part: Option<&DMatrix<f64>>,
    ) -> DVector<f64> {
        let n_main = self.n_main();
        let owned_static;
        let stat = match static_part {
            Some(s) => s,
            None => {
                owned_static = self.get_static_part();
                &owned_static
            }
        };
        let x_main = vector.rows(0, n_main).into_owned();
        let x_aux = vector.rows(n_main, self.n_aux()).into_owned();
        let y_main = stat * &x_main + &self.up * &x_aux;
        let mut y_aux = self.down.transpose() * &x_main;
        for k in 0..self.n_aux() {
            y_aux[k] += self.aux_energies[k] * x_aux[k];
        }
        let mut y = DVector::zeros(self.dim());
        y.rows_mut(0, n_main).copy_from(&y_main);
        y.rows_mut(n_main, self.n_aux()).copy_from(&y_aux);
        y
    }

    fn diagonal(&self, static_part: Option<&DMatrix<f64>>) -> DVector<f64> {
        let owned_static;
        let stat = match static_part {
            Some(s) => s,
            None => {
                owned_static = self.get_static_part();
                &owned_static
            }
        };
        let mut d = DVector::zeros(self.dim());
        for p in 0..self.n_main() {
            d[p] = stat[(p, p)];
        }
        for k in 0..self.n_aux() {
            d[self.n_main() + k] = self.aux_energies[k];
        }
        d
    }

    fn get_wavefunction(&self, orbital: usize) -> DVector<f64> {
        assert!(orbital < self.n_main());
        let mut w = DVector::zeros(self.dim());
        w[orbital] = 1.0;
        w
    }

    fn build_se_moments(&self, n_moments: usize) -> Result<Vec<DMatrix<f64>>> {
        let n_main = self.n_main();
        let mut moments = Vec::with_capacity(n_moments);
        for n in 0..n_moments {
            let mut t = DMatrix::zeros(n_main, n_main);
            for k in 0..self.n_aux() {
                let w = self.aux_energies[k].powi(n as i32);
                for x in 0..n_main {
                    for y in 0..n_main {
                        t[(x, y)] += self.up[(x, k)] * w * self.down[(y, k)];
                    }
                }
            }
            moments.push(t);
        }
        Ok(moments)
    }
}

/// Four main orbitals weakly coupled to twelve well-separated poles.
fn symmetric_model() -> ModelExpression {
    let energies = [-1.0, -0.3, 0.4, 1.1];
    let static_part = DMatrix::from_fn(4, 4, |i, j| if i == j { energies[i] } else { 0.05 });
    let aux_energies = DVector::from_fn(12, |k, _| {
        let magnitude = 2.5 + 0.2 * k as f64;
        if k % 2 == 0 {
            -magnitude
        } else {
            magnitude
        }
    });
    let couplings = DMatrix::from_fn(4, 12, |p, k| {
        0.1 * (0.4 + (1.3 * p as f64 + 0.7 * k as f64).sin())
    });
    ModelExpression {
        static_part,
        aux_energies,
        up: couplings.clone(),
        down: couplings,
    }
}

/// Variant with unequal up and down couplings; the couplings are small
/// against the level spacing, so the spectrum stays real.
fn asymmetric_model() -> ModelExpression {
    let energies = [-1.0, -0.3, 0.4, 1.1];
    let static_part = DMatrix::from_diagonal(&DVector::from_column_slice(&energies));
    let aux_energies = DVector::from_fn(6, |k, _| {
        let magnitude = 2.6 + 0.3 * k as f64;
        if k % 2 == 0 {
            -magnitude
        } else {
            magnitude
        }
    });
    let up = DMatrix::from_fn(4, 6, |p, k| {
        0.05 * (0.5 + (1.7 * p as f64 + 0.9 * k as f64).sin())
    });
    let down = &up * 1.3;
    ModelExpression {
        static_part,
        aux_energies,
        up,
        down,
    }
}

#[test]
fn test_exact_matches_dense_reference() {
    let model = symmetric_model();
    let mut solver = Exact::new(&model);
    let result = solver.kernel().unwrap();
    assert!(result.converged);

    let h = build_dense_operator(&model);
    let (reference, _) = linalg::eigh_sorted(&h);
    assert_eq!(result.eigenvalues.len(), 16);
    for k in 0..16 {
        assert!((result.eigenvalues[k] - reference[k]).abs() < 1e-10);
    }
}

#[test]
fn test_exact_handles_asymmetric_coupling() {
    let model = asymmetric_model();
    let h = build_dense_operator(&model);
    assert!(linalg::hermiticity_error(&h) > 1e-6);

    let mut solver = Exact::new(&model);
    let result = solver.kernel().unwrap();
    for k in 0..model.dim() {
        let v = result.eigenvectors.column(k).into_owned();
        let r = &h * &v - &v * result.eigenvalues[k];
        assert!(r.norm() < 1e-8, "residual {} for eigenpair {}", r.norm(), k);
        if k > 0 {
            assert!(result.eigenvalues[k] >= result.eigenvalues[k - 1]);
        }
    }
}

#[test]
fn test_davidson_matches_exact_lowest_roots() {
    let model = symmetric_model();
    let reference = Exact::new(&model).kernel().unwrap();

    let params = DavidsonParams {
        n_roots: 3,
        ..DavidsonParams::default()
    };
    let mut solver = Davidson::new(&model, params);
    let result = solver.kernel().unwrap();
    assert!(result.converged);
    for r in 0..3 {
        assert!(
            (result.eigenvalues[r] - reference.eigenvalues[r]).abs() < 1e-6,
            "root {}: {} vs {}",
            r,
            result.eigenvalues[r],
            reference.eigenvalues[r]
        );
    }
}

#[test]
fn test_davidson_flags_non_convergence_without_error() {
    let model = symmetric_model();
    let params = DavidsonParams {
        n_roots: 3,
        max_cycle: 1,
        ..DavidsonParams::default()
    };
    let mut solver = Davidson::new(&model, params);
    let result = solver.kernel().unwrap();
    assert!(!result.converged);
    assert_eq!(result.iterations, 1);
    assert_eq!(result.eigenvalues.len(), 3);
    assert!(result.eigenvalues.iter().all(|v| v.is_finite()));
}

#[test]
fn test_block_lanczos_rejects_bad_moment_counts() {
    let t = DMatrix::identity(2, 2);
    assert!(block_lanczos(&[t.clone()]).is_err());
    assert!(block_lanczos(&[t.clone(), t.clone(), t]).is_err());
}

#[test]
fn test_block_lanczos_rejects_empty_measure() {
    let z = DMatrix::zeros(2, 2);
    assert!(block_lanczos(&[z.clone(), z]).is_err());
}

#[test]
fn test_self_energy_moment_round_trip() {
    let model = symmetric_model();
    let moments = model.build_se_moments(4).unwrap();

    let mut solver = MBLSE::new(&model, 4);
    let result = solver.kernel().unwrap();
    assert!(result.eig.converged);
    assert_eq!(
        result.eig.eigenvalues.len(),
        model.n_main() + result.aux.n_poles()
    );

    for (n, reference) in moments.iter().enumerate() {
        let fitted = result.aux.moment(n);
        let err = (&fitted - reference).norm() / reference.norm().max(1.0);
        assert!(err < 1e-6, "moment {} mismatch {:.3e}", n, err);
    }
}

#[test]
fn test_greens_function_moment_round_trip() {
    let model = symmetric_model();
    let solver = MBLGF::new(&model, 4);
    let moments = solver.build_gf_moments().unwrap();
    // The zeroth projected moment is the main-block identity.
    assert!((&moments[0] - DMatrix::identity(4, 4)).norm() < 1e-14);

    let aux = MBLGF::new(&model, 4).kernel().unwrap();
    for (n, reference) in moments.iter().enumerate() {
        let fitted = aux.moment(n);
        let err = (&fitted - reference).norm() / reference.norm().max(1.0);
        assert!(err < 1e-6, "moment {} mismatch {:.3e}", n, err);
    }
    // All fitted poles lie within the operator's spectral range.
    let h = build_dense_operator(&model);
    let (spectrum, _) = linalg::eigh_sorted(&h);
    for k in 0..aux.n_poles() {
        assert!(aux.energies[k] >= spectrum[0] - 1e-8);
        assert!(aux.energies[k] <= spectrum[15] + 1e-8);
    }
}

#[test]
fn test_kpm_density_is_normalized() {
    let model = symmetric_model();
    let params = KpmParams {
        n_moments: 100,
        n_grid: 201,
        bounds: Some((-6.5, 6.5)),
        ..KpmParams::default()
    };
    let spectrum = KPMGF::new(&model, params).kernel().unwrap();
    assert_eq!(spectrum.bounds, (-6.5, 6.5));

    let half_width = 6.5;
    let n_grid = spectrum.grid.len();
    for p in 0..model.n_main() {
        let mut total = 0.0;
        let mut first = 0.0;
        for k in 0..n_grid {
            let theta = PI * (k as f64 + 0.5) / n_grid as f64;
            let x = theta.cos();
            let weight = PI / n_grid as f64 * (1.0 - x * x).sqrt() * half_width;
            total += spectrum.densities[(k, p)] * weight;
            first += spectrum.grid[k] * spectrum.densities[(k, p)] * weight;
        }
        assert!((total - 1.0).abs() < 1e-9, "orbital {} weight {}", p, total);
        // First spectral moment, damped by the order-1 Jackson factor.
        let g1 = (PI / 101.0).cos();
        let expected = g1 * model.static_part[(p, p)];
        assert!((first - expected).abs() < 1e-9);
    }
}

#[test]
fn test_kpm_density_is_nonnegative() {
    let model = symmetric_model();
    let params = KpmParams {
        bounds: Some((-6.5, 6.5)),
        ..KpmParams::default()
    };
    let spectrum = KPMGF::new(&model, params).kernel().unwrap();
    let min = spectrum.densities.iter().cloned().fold(f64::INFINITY, f64::min);
    assert!(min > -1e-9, "Jackson-damped density dipped to {}", min);
}

#[test]
fn test_kpm_rejects_inverted_bounds() {
    let model = symmetric_model();
    let params = KpmParams {
        bounds: Some((2.0, -2.0)),
        ..KpmParams::default()
    };
    assert!(KPMGF::new(&model, params).kernel().is_err());
}

/// Synthetic mean field: identity orbital coefficients, a 2-occupied /
/// 2-virtual reference and deterministic non-degenerate integrals.
fn make_mean_field() -> MeanField {
    let mo_coeff = DMatrix::identity(4, 4);
    let mo_energy = DVector::from_column_slice(&[-1.0, -0.5, 0.5, 1.0]);
    let mo_occ = DVector::from_column_slice(&[2.0, 2.0, 0.0, 0.0]);
    let eri = Tensor4::from_fn([4, 4, 4, 4], |p, q, r, s| {
        0.1 * ((1 + p) as f64 * 1.3 + (1 + q) as f64 * 0.7 + (1 + r) as f64 * 2.1
            + (1 + s) as f64 * 0.9)
            .sin()
    });
    MeanField::new(mo_coeff, mo_energy, mo_occ, eri).unwrap()
}

#[test]
fn test_mp2_self_energy_moments_survive_the_fit() {
    let mp2 = MP2::new(make_mean_field(), Channel::Hole, false).unwrap();
    let moments = mp2.build_se_moments(4).unwrap();
    // The i <-> j relabeling symmetry of the coupling blocks makes the
    // moments symmetric, so the fit must reproduce them exactly.
    for t in &moments {
        assert!(linalg::hermiticity_error(t) < 1e-12);
    }

    let result = MBLSE::new(&mp2, 4).kernel().unwrap();
    for (n, reference) in moments.iter().enumerate() {
        let fitted = result.aux.moment(n);
        let err = (&fitted - reference).norm() / reference.norm().max(1.0);
        assert!(err < 1e-6, "moment {} mismatch {:.3e}", n, err);
    }
}

#[test]
fn test_downfolded_without_coupling_reduces_to_static() {
    let model = ModelExpression {
        up: DMatrix::zeros(4, 12),
        down: DMatrix::zeros(4, 12),
        ..symmetric_model()
    };
    let mut solver = Downfolded::new(&model, DownfoldedParams::default());
    let result = solver.kernel().unwrap();
    assert!(result.converged);

    let (reference, _) = linalg::eigh_sorted(&model.static_part);
    let mut sorted: Vec<f64> = result.eigenvalues.iter().cloned().collect();
    sorted.sort_by(f64::total_cmp);
    for p in 0..4 {
        assert!((sorted[p] - reference[p]).abs() < 1e-6);
    }
}

#[test]
fn test_diagonal_downfolded_satisfies_fixed_point() {
    let model = symmetric_model();
    let mut solver = DiagonalDownfolded::new(&model, DownfoldedParams::default());
    let result = solver.kernel().unwrap();
    assert!(result.converged);

    for p in 0..model.n_main() {
        let omega = result.eigenvalues[p];
        let sigma: f64 = (0..model.n_aux())
            .map(|k| model.up[(p, k)] * model.down[(p, k)] / (omega - model.aux_energies[k]))
            .sum();
        let residual = (omega - model.static_part[(p, p)] - sigma).abs();
        assert!(residual < 1e-6, "orbital {} residual {:.3e}", p, residual);
    }
}
