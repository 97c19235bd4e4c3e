//! The stochastic collision engine.
//!
//! Each populated cell is handled by one worker: the cross-section model
//! fixes the number of candidate pairs, then the cell is either relaxed
//! pair by pair (DSMC) or redrawn in one go (EPSM) when it expects many
//! collisions per body.

pub mod accumulator;
pub mod cross_section;
mod engine;
pub mod epsm;
pub mod interaction;
pub mod pair_selection;
pub mod scheduler;

pub use accumulator::{CollisionTotals, MfpRecord, PassSamples, PhaseRecord, ThreadAccumulator};
pub use cross_section::{CrossSection, CrossSectionModel};
pub use engine::CollisionEngine;
pub use epsm::ResamplingStrategy;
pub use interaction::{
    CellContext, ElasticScattering, FractionalLoss, InteractionError, InteractionOutcome,
    InteractionPolicy,
};

use crate::body::{pair_mut, Body, VelocityMoments};
use crate::cell::Cell;
use crate::config::{CollideConfig, CBA_MAX_CELL_FRACTION};
use accumulator::tdiag_bin;
use cross_section::{pairs_to_select, selection_count, CellKinematics};
use epsm::{epsm_cell, mean_and_dispersion, EpsmResult, EpsmTarget};
use log::{debug, warn};
use pair_selection::{displace, scatter, PairSampler};
use ultraviolet::DVec3;

/// Everything a worker needs to process cells during one pass.
pub(crate) struct CellPass<'a, P> {
    pub config: &'a CollideConfig,
    pub policy: &'a P,
    pub model: CrossSectionModel,
    pub strategy: ResamplingStrategy,
    pub fn_: f64,
    pub tau: f64,
    pub cells: &'a [Cell],
    pub samples: &'a [VelocityMoments],
}

impl<P: InteractionPolicy> CellPass<'_, P> {
    pub fn run_cell(&self, index: usize, bodies: &mut [Body], acc: &mut ThreadAccumulator) {
        let cell = &self.cells[index];
        let number = bodies.len();
        acc.samples.numcnt.push(number as u32);

        if number < 2 {
            acc.samples.colcnt.push(0);
            return;
        }

        let crm = self.samples[cell.sample].relative_speed_estimate();
        let kedsp = cell.moments.internal_energy();
        let volume = cell.volume();
        let mass = cell.moments.mass;
        let kin = CellKinematics { volume, mass, number, crm, tau: self.tau, fn_: self.fn_ };

        let (cs, budget) = {
            let ctx = CellContext { cell, bodies: &*bodies, crm, tau: self.tau, fn_: self.fn_ };
            let Some(cs) = self.model.evaluate(&kin, self.policy.cross_section(&ctx)) else {
                debug!(
                    "cell {}: degenerate (volume={:e}, mass={:e}, crm={:e}), skipped",
                    index, volume, mass, crm
                );
                acc.totals.degenerate_cells += 1;
                acc.samples.colcnt.push(0);
                return;
            };
            let budget = if self.config.no_cool { 0.0 } else { self.policy.initialize_cell(&ctx) };
            (cs, budget)
        };

        let select = selection_count(&kin, cs.cross);
        self.record_cell(cell, bodies, &kin, cs.cross, select, kedsp, acc);
        acc.samples.tdelt.push(budget / number as f64);
        acc.totals.cells_processed += 1;

        if self.config.dry_run {
            acc.totals.dry_run_skipped += 1;
            return;
        }

        let decel = if (number as f64) / select < self.config.epsm_ratio {
            self.equilibrate(index, bodies, mass, budget, acc)
        } else {
            let length = volume.cbrt();
            let diam_cba = (self.fn_ * mass).sqrt() * cs.diameter;
            self.pair_collisions(index, bodies, crm, select, diam_cba, length, acc)
        };

        self.record_dispersion(bodies, acc);

        if budget > 0.0 && mass > 0.0 {
            if kedsp > 0.0 {
                acc.samples.derat.push((decel - budget) / kedsp);
            }
            if let Some(attr) = self.config.excess_energy_attr {
                let de = (decel - budget) / mass;
                for b in bodies.iter_mut() {
                    if let Some(x) = b.attrib.get_mut(attr) {
                        *x += de * b.mass;
                    }
                }
            }
        }
    }

    /// DSMC loop. Returns the energy the interaction policy reported lost.
    #[allow(clippy::too_many_arguments)]
    fn pair_collisions(
        &self,
        index: usize,
        bodies: &mut [Body],
        crm: f64,
        select: f64,
        diam_cba: f64,
        length: f64,
        acc: &mut ThreadAccumulator,
    ) -> f64 {
        let nsel = pairs_to_select(select);
        let mut sampler = PairSampler::new(crm, bodies.len());
        let rng = &mut acc.rng;
        let mut decel = 0.0;
        let mut colc: u32 = 0;

        for _ in 0..nsel {
            let (k1, k2) = sampler.draw(rng);
            let (p1, p2) = pair_mut(bodies, k1, k2);
            let crel = p1.vel - p2.vel;
            let cr = crel.mag();

            if !sampler.trial(cr, rng) {
                continue;
            }

            let cr = match self.policy.apply(p1, p2, cr, rng) {
                Ok(InteractionOutcome::Elastic) => cr,
                Ok(InteractionOutcome::Inelastic { energy_loss, rel_speed }) => {
                    decel += energy_loss;
                    acc.totals.interaction_energy_lost += energy_loss;
                    rel_speed
                }
                Err(e) => {
                    debug!("cell {}: interaction discarded: {}", index, e);
                    acc.totals.interaction_errors += 1;
                    continue;
                }
            };

            colc += 1;
            scatter(p1, p2, cr, rng);

            if self.config.cba
                && displace(p1, p2, crel, diam_cba, CBA_MAX_CELL_FRACTION * length)
            {
                warn!(
                    "cell {}: huge CBA displacement, diam={:e} len={:e}",
                    index, diam_cba, length
                );
                acc.totals.cba_violations += 1;
            }
        }

        acc.samples.colcnt.push(colc);
        acc.totals.collisions += colc as u64;
        decel
    }

    /// EPSM branch. Returns the internal energy removed.
    fn equilibrate(
        &self,
        index: usize,
        bodies: &mut [Body],
        mass: f64,
        budget: f64,
        acc: &mut ThreadAccumulator,
    ) -> f64 {
        let attr = self.config.excess_energy_attr;
        let excess: f64 = attr.map_or(0.0, |a| {
            bodies.iter().filter_map(|b| b.attrib.get(a)).sum()
        });

        let target = EpsmTarget {
            budget,
            floor_energy: self.config.units.thermal_energy(mass, self.config.temperature_floor),
        };
        let before = total_momentum(bodies);

        match epsm_cell(bodies, target, excess, self.strategy, &mut acc.rng) {
            EpsmResult::Relaxed { energy_lost, internal_energy } => {
                let tol = self.config.conservation_tolerance;
                let drift = (total_momentum(bodies) - before).mag();
                let scale = before.mag().max((internal_energy * mass).sqrt());
                let (_, _, disp) = mean_and_dispersion(bodies);
                let after = 0.5 * mass * disp.iter().sum::<f64>();
                let deficit = (after - (internal_energy - energy_lost)).abs();
                // Negated so a NaN counts as a violation
                if !(drift <= tol * scale) || !(deficit <= tol * internal_energy) {
                    warn!(
                        "cell {}: EPSM conservation, momentum drift {:e} (scale {:e}), energy error {:e}",
                        index, drift, scale, deficit
                    );
                    acc.totals.conservation_violations += 1;
                }
                // The excess is now part of the energy removed
                if let Some(a) = attr {
                    for b in bodies.iter_mut() {
                        if let Some(x) = b.attrib.get_mut(a) {
                            *x = 0.0;
                        }
                    }
                }
                acc.totals.epsm_energy_lost += energy_lost;
                acc.totals.epsm_particles += bodies.len() as u64;
                acc.totals.epsm_cells += 1;
                energy_lost
            }
            EpsmResult::Idle => 0.0,
            EpsmResult::Skipped { mdisp, ratio } => {
                warn!(
                    "cell {}: crazy values, mdisp={:e} Eratio={:e} nbods={}",
                    index,
                    mdisp,
                    ratio,
                    bodies.len()
                );
                acc.totals.epsm_skipped += 1;
                0.0
            }
        }
    }

    /// Per-cell diagnostic samples taken before any body moves.
    #[allow(clippy::too_many_arguments)]
    fn record_cell(
        &self,
        cell: &Cell,
        bodies: &[Body],
        kin: &CellKinematics,
        cross: f64,
        select: f64,
        kedsp: f64,
        acc: &mut ThreadAccumulator,
    ) {
        let volume = kin.volume;
        let number = kin.number as f64;
        let s = &mut acc.samples;

        s.tsrat.push(kin.crm / 1.5 * kin.tau / volume.cbrt());
        s.tdens.push(number / volume);
        s.tvolc.push(volume);
        s.ttemp.push(self.config.units.temperature(kedsp, kin.mass));
        s.tseln.push(number / select);

        let mut pos = DVec3::zero();
        for b in bodies {
            pos += b.pos * b.mass;
        }
        pos /= kin.mass;
        s.mfp.push(MfpRecord {
            ratio: volume.powf(2.0 / 3.0) / (kin.fn_ * kin.mass * cross * number),
            cylindrical_radius: (pos.x * pos.x + pos.y * pos.y).sqrt(),
            height: pos.z,
            spherical_radius: pos.mag(),
            density: kin.mass / volume,
            volume,
        });
        s.phase.push(PhaseRecord {
            density: kin.mass / volume,
            temperature: self.config.units.temperature(kedsp, kin.mass),
            number,
            mass: kin.mass,
            volume,
        });

        let m = &cell.moments;
        let side = cell.side();
        let mut taudiag = 1.0e40_f64;
        for k in 0..3 {
            taudiag = taudiag.min(side / ((m.mv2[k] / m.mass).sqrt() + 1.0e-40));
        }
        s.tdiag[tdiag_bin(taudiag, kin.tau)] += 1;
    }

    fn record_dispersion(&self, bodies: &[Body], acc: &mut ThreadAccumulator) {
        let (mass, _, disp) = mean_and_dispersion(bodies);
        if mass <= 0.0 {
            return;
        }
        let mut any = false;
        for k in 0..3 {
            if disp[k] > 0.0 {
                acc.tdisp[k] += mass * disp[k];
                any = true;
            }
        }
        if any {
            acc.tmass += mass;
        }
    }
}

fn total_momentum(bodies: &[Body]) -> DVec3 {
    bodies.iter().fold(DVec3::zero(), |acc, b| acc + b.momentum())
}

#[cfg(test)]
mod tests;
