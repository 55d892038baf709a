//! Chemical potential optimization and outer self-consistency
//!
//! # Theory
//!
//! A physical Green's function must place the correct number of electrons
//! below the chemical potential. The Aufbau rule fills the poles of the
//! spectrum from the bottom up, weighting each pole by its main-space
//! spectral weight. When plain filling misses the target particle number,
//! a uniform shift of the auxiliary energies moves spectral weight across
//! the gap until the sum rule holds; the shift is found by bisection on
//! the monotonic occupation curve. The outer self-consistency loop repeats
//! an entire solve, feeding each cycle's spectrum back into the next,
//! until the eigenvalues stop drifting.

mod aufbau;
mod scf;
mod shift;


pub use aufbau::AufbauPrinciple;
pub use scf::SelfConsistentField;
pub use shift::{AuxiliaryShift, ShiftResult};
