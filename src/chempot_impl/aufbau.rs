//! Aufbau chemical-potential placement

extern crate nalgebra as na;

use color_eyre::eyre::{eyre, Result};
use na::DVector;
use tracing::info;

/// Places the chemical potential by Aufbau filling of the solver's poles.
#[derive(Debug, Clone)]
pub struct AufbauPrinciple {
    /// Orbital occupancy (2 for restricted references).
    pub occupancy: f64,
}

impl Default for AufbauPrinciple {
    fn default() -> Self {
        AufbauPrinciple { occupancy: 2.0 }
    }
}

impl AufbauPrinciple {
    pub fn new(occupancy: f64) -> Self {
        AufbauPrinciple { occupancy }
    }

    /// Chemical potential for unit-weight poles: the midpoint between the
    /// highest occupied and lowest unoccupied pole.
    ///
    /// Fails when the requested particle number does not fill an integer
    /// number of poles at the given occupancy, or when it fills none or
    /// all of them (no gap to place the potential in).
    pub fn kernel(&self, energies: &DVector<f64>, n_elec: f64) -> Result<f64> {
        let n_filled_f = n_elec / self.occupancy;
        let n_filled = n_filled_f.round();
        if (n_filled_f - n_filled).abs() > 1e-8 {
            return Err(eyre!(
                "particle number {} does not fill an integer number of poles at occupancy {}",
                n_elec,
                self.occupancy
            ));
        }
        let n_filled = n_filled as usize;
        if n_filled == 0 {
            return Err(eyre!("particle number {} fills no poles", n_elec));
        }
        if n_filled >= energies.len() {
            return Err(eyre!(
                "particle number {} requires {} poles but only {} are available",
                n_elec,
                n_filled + 1,
                energies.len()
            ));
        }

        let mut sorted: Vec<f64> = energies.iter().cloned().collect();
        sorted.sort_by(f64::total_cmp);
        let chempot = 0.5 * (sorted[n_filled - 1] + sorted[n_filled]);
        info!(
            "Aufbau chemical potential {:.6} between poles {:.6} and {:.6}",
            chempot,
            sorted[n_filled - 1],
            sorted[n_filled]
        );
        Ok(chempot)
    }

    /// Weighted variant for Green's-function poles carrying main-space
    /// spectral weights. Picks the gap whose cumulative weighted filling is
    /// closest to the target and returns the midpoint chemical potential
    /// together with the signed filling error at that gap.
    pub fn kernel_weighted(
        &self,
        energies: &DVector<f64>,
        weights: &DVector<f64>,
        n_elec: f64,
    ) -> Result<(f64, f64)> {
        let n = energies.len();
        if n < 2 {
            return Err(eyre!("weighted Aufbau requires at least 2 poles, got {}", n));
        }
        if weights.len() != n {
            return Err(eyre!(
                "{} weights supplied for {} poles",
                weights.len(),
                n
            ));
        }
        let total: f64 = weights.iter().map(|w| w * self.occupancy).sum();
        if n_elec > total + 1e-8 {
            return Err(eyre!(
                "particle number {} exceeds the total spectral weight {}",
                n_elec,
                total
            ));
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| energies[a].total_cmp(&energies[b]));

        // Gap after k+1 poles minimizing the absolute filling error.
        let mut cum = 0.0;
        let mut best: Option<(usize, f64)> = None;
        for (pos, &k) in order.iter().enumerate().take(n - 1) {
            cum += weights[k] * self.occupancy;
            let err = cum - n_elec;
            if best.is_none() || err.abs() < best.map(|(_, e)| e.abs()).unwrap_or(f64::INFINITY) {
                best = Some((pos, err));
            }
        }
        let (pos, err) = best.ok_or_else(|| eyre!("no gap available for the chemical potential"))?;
        let chempot = 0.5 * (energies[order[pos]] + energies[order[pos + 1]]);
        Ok((chempot, err))
    }
}
