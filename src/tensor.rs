//! Dense 4-index tensor used for two-electron repulsion integrals
//!
//! Expressions never materialize the full many-body Hamiltonian, but they do
//! need reduced projections of the two-electron integral tensor such as
//! (x i | j a). This module provides the dense 4-index storage and the
//! four-fold basis transformation
//!
//! (pq|rs) = Σ_μνλσ C0_μp C1_νq C2_λr C3_σs (μν|λσ)
//!
//! carried out one index at a time as four quarter transformations.

extern crate nalgebra as na;

use color_eyre::eyre::{eyre, Result};
use na::DMatrix;

/// Dense real 4-index tensor with row-major storage (last index fastest).
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor4 {
    dims: [usize; 4],
    data: Vec<f64>,
}

impl Tensor4 {
    /// Create a zero-filled tensor with the given dimensions.
    pub fn zeros(dims: [usize; 4]) -> Self {
        let len = dims[0] * dims[1] * dims[2] * dims[3];
        Tensor4 {
            dims,
            data: vec![0.0; len],
        }
    }

    /// Create a tensor by evaluating `f` at every index quadruple.
    pub fn from_fn<F>(dims: [usize; 4], mut f: F) -> Self
    where
        F: FnMut(usize, usize, usize, usize) -> f64,
    {
        let mut t = Tensor4::zeros(dims);
        for p in 0..dims[0] {
            for q in 0..dims[1] {
                for r in 0..dims[2] {
                    for s in 0..dims[3] {
                        let v = f(p, q, r, s);
                        t.set(p, q, r, s, v);
                    }
                }
            }
        }
        t
    }

    /// Create a tensor with every element set to `value`.
    pub fn from_element(dims: [usize; 4], value: f64) -> Self {
        let len = dims[0] * dims[1] * dims[2] * dims[3];
        Tensor4 {
            dims,
            data: vec![value; len],
        }
    }

    /// Build a tensor from an existing flat buffer in row-major order.
    pub fn from_vec(dims: [usize; 4], data: Vec<f64>) -> Result<Self> {
        let len = dims[0] * dims[1] * dims[2] * dims[3];
        if data.len() != len {
            return Err(eyre!(
                "tensor buffer has {} elements but dimensions {:?} require {}",
                data.len(),
                dims,
                len
            ));
        }
        Ok(Tensor4 { dims, data })
    }

    pub fn dims(&self) -> [usize; 4] {
        self.dims
    }

    /// Flat row-major view of the tensor data.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    #[inline]
    fn offset(&self, p: usize, q: usize, r: usize, s: usize) -> usize {
        ((p * self.dims[1] + q) * self.dims[2] + r) * self.dims[3] + s
    }

    #[inline]
    pub fn get(&self, p: usize, q: usize, r: usize, s: usize) -> f64 {
        self.data[self.offset(p, q, r, s)]
    }

    #[inline]
    pub fn set(&mut self, p: usize, q: usize, r: usize, s: usize, value: f64) {
        let idx = self.offset(p, q, r, s);
        self.data[idx] = value;
    }

    /// Transform every index with its own coefficient matrix, producing
    /// the projected tensor (pq|rs) = Σ C0_μp C1_νq C2_λr C3_σs (μν|λσ).
    ///
    /// Each coefficient matrix has the source dimension as rows and the
    /// target dimension as columns; the transformation is performed as four
    /// sequential quarter transforms.
    pub fn transform(
        &self,
        c0: &DMatrix<f64>,
        c1: &DMatrix<f64>,
        c2: &DMatrix<f64>,
        c3: &DMatrix<f64>,
    ) -> Result<Tensor4> {
        for (axis, c) in [c0, c1, c2, c3].iter().enumerate() {
            if c.nrows() != self.dims[axis] {
                return Err(eyre!(
                    "coefficient matrix for index {} has {} rows but the tensor dimension is {}",
                    axis,
                    c.nrows(),
                    self.dims[axis]
                ));
            }
        }

        let t = self.quarter_transform(0, c0);
        let t = t.quarter_transform(1, c1);
        let t = t.quarter_transform(2, c2);
        let t = t.quarter_transform(3, c3);
        Ok(t)
    }

    /// Contract one index with a coefficient matrix (source rows, target
    /// columns), leaving the other three indices untouched.
    fn quarter_transform(&self, axis: usize, c: &DMatrix<f64>) -> Tensor4 {
        let mut dims = self.dims;
        let n_src = dims[axis];
        let n_dst = c.ncols();
        dims[axis] = n_dst;
        let mut out = Tensor4::zeros(dims);

        // Loop over the untouched indices, accumulating the contraction of
        // the transformed axis.
        let loops: Vec<usize> = (0..4).filter(|&i| i != axis).collect();
        let (d0, d1, d2) = (dims[loops[0]], dims[loops[1]], dims[loops[2]]);
        let mut idx_src = [0usize; 4];
        let mut idx_dst = [0usize; 4];
        for i0 in 0..d0 {
            for i1 in 0..d1 {
                for i2 in 0..d2 {
                    idx_src[loops[0]] = i0;
                    idx_src[loops[1]] = i1;
                    idx_src[loops[2]] = i2;
                    idx_dst[loops[0]] = i0;
                    idx_dst[loops[1]] = i1;
                    idx_dst[loops[2]] = i2;
                    for dst in 0..n_dst {
                        let mut acc = 0.0;
                        for src in 0..n_src {
                            idx_src[axis] = src;
                            acc += c[(src, dst)]
                                * self.get(idx_src[0], idx_src[1], idx_src[2], idx_src[3]);
                        }
                        idx_dst[axis] = dst;
                        out.set(idx_dst[0], idx_dst[1], idx_dst[2], idx_dst[3], acc);
                    }
                }
            }
        }
        out
    }
}
