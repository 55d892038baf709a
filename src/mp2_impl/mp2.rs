//! MP2 self-energy expression

extern crate nalgebra as na;

use color_eyre::eyre::{bail, Result};
use na::{DMatrix, DVector};
use tracing::info;

use super::integrals::{select_columns, IntegralCache};
use crate::expression::{Expression, MeanField};
use crate::tensor::Tensor4;

/// Which single-particle channel the expression describes.
///
/// The hole (1h, particle-removal) and particle (1p, particle-addition)
/// flavors differ only in which occupation predicate plays the "inner"
/// coupling role; everything else is one parameterized implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Particle removal: occupied orbitals couple to (i, j, a) =
    /// (occ, occ, vir) configurations.
    Hole,
    /// Particle addition: virtual orbitals couple to (a, b, i) =
    /// (vir, vir, occ) configurations.
    Particle,
}

/// MP2 expression: an implicit operator over the main orbital block plus
/// the auxiliary space of all (inner, inner, outer) orbital triples.
///
/// The operator is never stored densely. Only the main-block static matrix
/// and the cached (x i | j a) integral projection exist in memory; the
/// matrix-vector product, diagonal and self-energy moments follow from the
/// closed-form block structure.
pub struct MP2 {
    mean_field: MeanField,
    channel: Channel,
    non_dyson: bool,
    cache: IntegralCache,
    static_part: DMatrix<f64>,
}

impl MP2 {
    /// Build the expression for a given channel and mode. The reduced
    /// integral projection and the static block are computed once here.
    pub fn new(mean_field: MeanField, channel: Channel, non_dyson: bool) -> Result<Self> {
        let inner = inner_indices(&mean_field, channel);
        let outer = outer_indices(&mean_field, channel);
        let main = main_indices(&mean_field, channel, non_dyson);
        let cache = IntegralCache::build(&mean_field, &main, &inner, &outer)?;
        let static_part = build_static_part(&mean_field, &main, &inner, &outer)?;

        let expr = MP2 {
            mean_field,
            channel,
            non_dyson,
            cache,
            static_part,
        };
        info!(
            "MP2 expression ({:?}, non_dyson = {}): n_main = {}, n_aux = {}",
            expr.channel,
            expr.non_dyson,
            expr.n_main(),
            expr.n_aux()
        );
        Ok(expr)
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn non_dyson(&self) -> bool {
        self.non_dyson
    }

    /// Switch between the Dyson and non-Dyson main blocks. Changing the
    /// mode invalidates the cached integral projection and static block
    /// and rebuilds both; the old state is kept on failure.
    pub fn set_non_dyson(&mut self, non_dyson: bool) -> Result<()> {
        if non_dyson == self.non_dyson {
            return Ok(());
        }
        let inner = inner_indices(&self.mean_field, self.channel);
        let outer = outer_indices(&self.mean_field, self.channel);
        let main = main_indices(&self.mean_field, self.channel, non_dyson);
        let cache = IntegralCache::build(&self.mean_field, &main, &inner, &outer)?;
        let static_part = build_static_part(&self.mean_field, &main, &inner, &outer)?;
        self.cache = cache;
        self.static_part = static_part;
        self.non_dyson = non_dyson;
        Ok(())
    }

    /// Cached (x i | j a) integral block.
    pub fn integrals(&self) -> &Tensor4 {
        &self.cache.xija
    }

    fn inner(&self) -> Vec<usize> {
        inner_indices(&self.mean_field, self.channel)
    }

    fn outer(&self) -> Vec<usize> {
        outer_indices(&self.mean_field, self.channel)
    }

    fn main(&self) -> Vec<usize> {
        main_indices(&self.mean_field, self.channel, self.non_dyson)
    }

    fn energies(&self, indices: &[usize]) -> DVector<f64> {
        DVector::from_fn(indices.len(), |k, _| self.mean_field.mo_energy[indices[k]])
    }

    /// Per-configuration energies e_i + e_j - e_a over the (i, j, a)
    /// auxiliary triples, in the same row-major order as the cached
    /// integral block.
    fn aux_energies(&self) -> DVector<f64> {
        let e_in = self.energies(&self.inner());
        let e_out = self.energies(&self.outer());
        let (n_in, n_out) = (e_in.len(), e_out.len());
        let mut e = DVector::zeros(n_in * n_in * n_out);
        let mut idx = 0;
        for i in 0..n_in {
            for j in 0..n_in {
                for a in 0..n_out {
                    e[idx] = e_in[i] + e_in[j] - e_out[a];
                    idx += 1;
                }
            }
        }
        e
    }
}

fn inner_indices(mean_field: &MeanField, channel: Channel) -> Vec<usize> {
    match channel {
        Channel::Hole => mean_field.occupied(),
        Channel::Particle => mean_field.virtual_orbitals(),
    }
}

fn outer_indices(mean_field: &MeanField, channel: Channel) -> Vec<usize> {
    match channel {
        Channel::Hole => mean_field.virtual_orbitals(),
        Channel::Particle => mean_field.occupied(),
    }
}

fn main_indices(mean_field: &MeanField, channel: Channel, non_dyson: bool) -> Vec<usize> {
    if non_dyson {
        inner_indices(mean_field, channel)
    } else {
        (0..mean_field.n_mo()).collect()
    }
}

/// Static effective Hamiltonian on the main block: the second-order
/// denominator-weighted contraction, symmetrized, with the bare orbital
/// energies on the diagonal.
fn build_static_part(
    mean_field: &MeanField,
    main: &[usize],
    inner: &[usize],
    outer: &[usize],
) -> Result<DMatrix<f64>> {
    let energies = |indices: &[usize]| {
        DVector::from_fn(indices.len(), |k, _| mean_field.mo_energy[indices[k]])
    };
    let e_main = energies(main);
    let e_in = energies(inner);
    let e_out = energies(outer);
    let n_main = main.len();
    let (n_in, n_out) = (inner.len(), outer.len());

    let c_main = select_columns(&mean_field.mo_coeff, main);
    let c_in = select_columns(&mean_field.mo_coeff, inner);
    let c_out = select_columns(&mean_field.mo_coeff, outer);

    // (x a | j b) block, used only here; not worth caching.
    let xajb = mean_field.eri.transform(&c_main, &c_out, &c_in, &c_out)?;

    // h1[x, y] = 0.5 sum_ajb (2 (xa|jb) - (xb|ja)) (ya|jb) / (e_y - e_a + e_j - e_b)
    let mut h1 = DMatrix::zeros(n_main, n_main);
    for x in 0..n_main {
        for y in 0..n_main {
            let mut acc = 0.0;
            for a in 0..n_out {
                for j in 0..n_in {
                    for b in 0..n_out {
                        let anti = 2.0 * xajb.get(x, a, j, b) - xajb.get(x, b, j, a);
                        let denom = e_main[y] - e_out[a] + e_in[j] - e_out[b];
                        acc += anti * xajb.get(y, a, j, b) / denom;
                    }
                }
            }
            h1[(x, y)] = 0.5 * acc;
        }
    }

    h1 = &h1 + h1.transpose();
    for x in 0..n_main {
        h1[(x, x)] += e_main[x];
    }
    Ok(h1)
}

impl Expression for MP2 {
    fn n_main(&self) -> usize {
        self.main().len()
    }

    fn n_aux(&self) -> usize {
        let n_in = self.inner().len();
        n_in * n_in * self.outer().len()
    }

    fn hermitian(&self) -> bool {
        false
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
        let n_aux = self.n_aux();
        assert_eq!(
            vector.len(),
            n_main + n_aux,
            "state vector length does not match the expression dimension"
        );

        let owned_static;
        let stat = match static_part {
            Some(s) => s,
            None => {
                owned_static = self.get_static_part();
                &owned_static
            }
        };

        let xija = &self.cache.xija;
        let [_, n_in, _, n_out] = xija.dims();
        let e_aux = self.aux_energies();

        let v_main = vector.rows(0, n_main);
        let v_aux = vector.rows(n_main, n_aux);
        let mut r = DVector::zeros(n_main + n_aux);

        // Main block: static part plus the coupling contraction with the
        // auxiliary amplitudes.
        let r_main = stat * v_main;
        for x in 0..n_main {
            let mut acc = r_main[x];
            let mut idx = 0;
            for i in 0..n_in {
                for j in 0..n_in {
                    for a in 0..n_out {
                        acc += xija.get(x, i, j, a) * v_aux[idx];
                        idx += 1;
                    }
                }
            }
            r[x] = acc;
        }

        // Auxiliary block: direct and exchange coupling back to the main
        // block (same-spin factor of 2, opposite exchange sign) plus the
        // block-diagonal configuration energies.
        let mut idx = 0;
        for i in 0..n_in {
            for j in 0..n_in {
                for a in 0..n_out {
                    let mut acc = 0.0;
                    for x in 0..n_main {
                        acc += (2.0 * xija.get(x, i, j, a) - xija.get(x, j, i, a)) * v_main[x];
                    }
                    r[n_main + idx] = acc + v_aux[idx] * e_aux[idx];
                    idx += 1;
                }
            }
        }

        r
    }

    fn diagonal(&self, static_part: Option<&DMatrix<f64>>) -> DVector<f64> {
        let n_main = self.n_main();
        let owned_static;
        let stat = match static_part {
            Some(s) => s,
            None => {
                owned_static = self.get_static_part();
                &owned_static
            }
        };

        let e_aux = self.aux_energies();
        let mut d = DVector::zeros(n_main + e_aux.len());
        for x in 0..n_main {
            d[x] = stat[(x, x)];
        }
        for (k, &e) in e_aux.iter().enumerate() {
            d[n_main + k] = e;
        }
        d
    }

    fn get_wavefunction(&self, orbital: usize) -> DVector<f64> {
        let dim = self.dim();
        assert!(
            orbital < dim,
            "orbital index {} out of range for dimension {}",
            orbital,
            dim
        );
        let mut r = DVector::zeros(dim);
        r[orbital] = 1.0;
        r
    }

    fn build_se_moments(&self, n_moments: usize) -> Result<Vec<DMatrix<f64>>> {
        let n_main = self.n_main();
        let xija = &self.cache.xija;
        let [_, n_in, _, n_out] = xija.dims();
        let e_in = self.energies(&self.inner());
        let e_out = self.energies(&self.outer());

        let mut moments = Vec::with_capacity(n_moments);
        for n in 0..n_moments {
            let mut t = DMatrix::<f64>::zeros(n_main, n_main);
            for i in 0..n_in {
                for j in 0..n_in {
                    for a in 0..n_out {
                        let w = (e_in[i] + e_in[j] - e_out[a]).powi(n as i32);
                        for x in 0..n_main {
                            let vl = xija.get(x, i, j, a);
                            if vl == 0.0 {
                                continue;
                            }
                            for y in 0..n_main {
                                let vr = 2.0 * xija.get(y, i, j, a) - xija.get(y, j, i, a);
                                t[(x, y)] += vl * vr * w;
                            }
                        }
                    }
                }
            }
            if t.iter().any(|v| !v.is_finite()) {
                bail!(
                    "self-energy moment {} overflowed; auxiliary energies are too spread for this order",
                    n
                );
            }
            moments.push(t);
        }
        Ok(moments)
    }
}
