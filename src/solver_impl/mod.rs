//! Solver family
//!
//! Every solver consumes an expression through the operator contract
//! (`apply_hamiltonian`, `diagonal`, `get_static_part`, `build_se_moments`)
//! and nothing else:
//!
//! - [`Exact`]: dense materialization + full diagonalization, the reference
//!   for everything else (small spaces only);
//! - [`Davidson`]: matrix-free Krylov solver for a few extremal eigenpairs;
//! - [`MBLGF`] / [`MBLSE`]: block-Lanczos moment fits of the Green's
//!   function / self-energy;
//! - [`KPMGF`]: Chebyshev kernel-polynomial spectral densities;
//! - [`Downfolded`] / [`DiagonalDownfolded`]: auxiliary-space reduction via
//!   the frequency-dependent self-energy.

mod davidson;
mod downfolded;
mod exact;
mod kpmgf;
mod mblgf;
mod mblse;
#[cfg(test)]
mod tests;

pub use davidson::Davidson;
pub use downfolded::{DiagonalDownfolded, Downfolded};
pub use exact::Exact;
pub use kpmgf::{KpmSpectrum, KPMGF};
pub use mblgf::{block_lanczos, MBLGF};
pub use mblse::{MblseResult, MBLSE};
