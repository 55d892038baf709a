//! MP2 (Møller-Plesset perturbation theory, second order) self-energy
//! expression
//!
//! This module implements the MP2 many-body expression as an implicit linear
//! operator over the composite (orbital + auxiliary) state space consumed by
//! the iterative solvers.
//!
//! # Theory
//!
//! The particle-removal (1h) expression couples each main orbital x to the
//! auxiliary space of occupied-occupied-virtual triples (i, j, a) through the
//! molecular-orbital integrals (x i | j a):
//!
//! - static block: H1_xy = 0.5 Σ_ajb (2(xa|jb) − (xb|ja))(ya|jb) / Δ_yajb,
//!   symmetrized and shifted by the orbital energies on the diagonal;
//! - coupling: main → auxiliary uses 2(xi|ja) − (xj|ia) (same-spin factor of
//!   2 and the opposite-sign exchange term), auxiliary → main uses (xi|ja);
//! - auxiliary block: diagonal configuration energies e_i + e_j − e_a.
//!
//! The particle-addition (1p) expression is the same structure with the
//! occupied and virtual roles swapped; both are provided by one type
//! parameterized over [`Channel`].
//!
//! # Usage
//!
//! ```ignore
//! let mean_field = MeanField::new(mo_coeff, mo_energy, mo_occ, eri)?;
//! let mp2 = MP2::new(mean_field, Channel::Hole, false)?;
//! let moments = mp2.build_se_moments(4)?;
//! ```

mod integrals;
mod mp2;

pub use integrals::IntegralCache;
pub use mp2::{Channel, MP2};
