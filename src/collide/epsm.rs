//! Equilibrium resampling for cells that expect many collisions per body.
//!
//! Instead of simulating pairs, the cell's velocities are redrawn from an
//! isotropic distribution that keeps the cell's momentum and carries a
//! cooled internal energy.

use crate::body::Body;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use ultraviolet::DVec3;

/// How the new velocities are drawn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResamplingStrategy {
    /// Gaussian draw rescaled to the exact mean and total dispersion.
    #[default]
    Gaussian,
    /// Uniform point on the constant-energy sphere of the cell's
    /// center-of-mass subspace. Exact without rescaling.
    ExactPartition,
}

/// Per-cell inputs that do not come from the bodies themselves.
#[derive(Clone, Copy, Debug)]
pub struct EpsmTarget {
    /// Energy the cell should lose this step.
    pub budget: f64,
    /// Internal energy at the temperature floor for this cell's mass.
    pub floor_energy: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EpsmResult {
    Relaxed { energy_lost: f64, internal_energy: f64 },
    /// No mass or no internal energy: nothing to relax.
    Idle,
    /// Target dispersion or realized draw was unusable; velocities untouched.
    Skipped { mdisp: f64, ratio: f64 },
}

/// Mass-weighted mean velocity and per-axis variance.
pub fn mean_and_dispersion(bodies: &[Body]) -> (f64, DVec3, [f64; 3]) {
    let mut mass = 0.0;
    let mut mv = [0.0; 3];
    let mut mv2 = [0.0; 3];
    for b in bodies {
        let v = [b.vel.x, b.vel.y, b.vel.z];
        mass += b.mass;
        for k in 0..3 {
            mv[k] += b.mass * v[k];
            mv2[k] += b.mass * v[k] * v[k];
        }
    }
    if mass <= 0.0 {
        return (mass, DVec3::zero(), [0.0; 3]);
    }
    let mut disp = [0.0; 3];
    for k in 0..3 {
        mv[k] /= mass;
        disp[k] = ((mv2[k] - mv[k] * mv[k] * mass) / mass).max(0.0);
    }
    (mass, DVec3::new(mv[0], mv[1], mv[2]), disp)
}

/// Fraction of the internal energy the cell keeps.
pub fn energy_ratio(internal: f64, floor_energy: f64, budget: f64, excess: f64) -> f64 {
    let ratio = if internal - floor_energy > budget + excess {
        (internal - budget - excess) / internal
    } else {
        floor_energy.min(internal) / internal
    };
    ratio.min(1.0)
}

/// Relax one cell. `excess` is energy already owed by the bodies.
pub fn epsm_cell(
    bodies: &mut [Body],
    target: EpsmTarget,
    excess: f64,
    strategy: ResamplingStrategy,
    rng: &mut StdRng,
) -> EpsmResult {
    if bodies.len() < 2 {
        return EpsmResult::Idle;
    }
    let (mass, mvel, disp) = mean_and_dispersion(bodies);
    if mass <= 0.0 {
        return EpsmResult::Idle;
    }
    let sum_disp: f64 = disp.iter().sum();
    let internal = 0.5 * mass * sum_disp;
    if internal <= 0.0 {
        return EpsmResult::Idle;
    }

    let ratio = energy_ratio(internal, target.floor_energy, target.budget, excess);
    let mdisp = (ratio * sum_disp / 3.0).sqrt();
    if !(mdisp > 0.0) || !mdisp.is_finite() {
        return EpsmResult::Skipped { mdisp, ratio };
    }

    let applied = match strategy {
        ResamplingStrategy::Gaussian => gaussian(bodies, mvel, mdisp, rng),
        ResamplingStrategy::ExactPartition => exact_partition(bodies, mvel, mdisp, rng),
    };
    if !applied {
        return EpsmResult::Skipped { mdisp, ratio };
    }

    EpsmResult::Relaxed { energy_lost: internal * (1.0 - ratio), internal_energy: internal }
}

/// Draw, then shift and scale about the realized mean so the realized mean is
/// `mvel` and the realized total dispersion is `3 mdisp²`.
fn gaussian(bodies: &mut [Body], mvel: DVec3, mdisp: f64, rng: &mut StdRng) -> bool {
    let drawn: Vec<DVec3> = bodies
        .iter()
        .map(|_| {
            let x: f64 = StandardNormal.sample(&mut *rng);
            let y: f64 = StandardNormal.sample(&mut *rng);
            let z: f64 = StandardNormal.sample(&mut *rng);
            mvel + DVec3::new(x, y, z) * mdisp
        })
        .collect();

    let mut mass = 0.0;
    let mut tmvel = DVec3::zero();
    for (b, v) in bodies.iter().zip(&drawn) {
        mass += b.mass;
        tmvel += *v * b.mass;
    }
    tmvel /= mass;
    let mut tdisp = 0.0;
    for (b, v) in bodies.iter().zip(&drawn) {
        tdisp += b.mass * (*v - tmvel).mag_sq();
    }
    let tmdisp = (tdisp / mass / 3.0).sqrt();
    if !(tmdisp > 0.0) || !tmdisp.is_finite() {
        return false;
    }

    let scale = mdisp / tmdisp;
    for (b, v) in bodies.iter_mut().zip(drawn) {
        b.vel = mvel + (v - tmvel) * scale;
    }
    true
}

/// Energy split of a uniform point on a sphere of squared radius `energy` in
/// `dim` dimensions, built two coordinates at a time.
fn sphere_point(dim: usize, energy: f64, rng: &mut StdRng) -> Vec<f64> {
    let mut out = Vec::with_capacity(dim);
    let mut remaining = energy;
    while dim - out.len() >= 2 {
        let rest = dim - out.len() - 2;
        let keep = if rest == 0 {
            0.0
        } else {
            rng.random::<f64>().powf(2.0 / rest as f64)
        };
        let pair = remaining * (1.0 - keep);
        remaining *= keep;
        let theta = 2.0 * PI * rng.random::<f64>();
        let r = pair.max(0.0).sqrt();
        out.push(r * theta.cos());
        out.push(r * theta.sin());
    }
    if out.len() < dim {
        let sign = if rng.random::<f64>() > 0.5 { 1.0 } else { -1.0 };
        out.push(sign * remaining.max(0.0).sqrt());
    }
    out
}

/// Map coordinates in the `N-1` dimensional zero-momentum subspace onto
/// per-body velocity offsets using a mass-weighted Helmert basis.
fn helmert_offsets(masses: &[f64], coords: &[f64]) -> Vec<f64> {
    let n = masses.len();
    let sqrt_m: Vec<f64> = masses.iter().map(|m| m.sqrt()).collect();
    let mut w = vec![0.0; n];
    let mut partial = masses[0];
    for j in 1..n {
        let total = partial + masses[j];
        let norm = (partial * total).sqrt();
        let a = coords[j - 1] / norm;
        for i in 0..j {
            w[i] += a * sqrt_m[i] * sqrt_m[j];
        }
        w[j] -= a * partial;
        partial = total;
    }
    w.iter().zip(&sqrt_m).map(|(wi, si)| wi / si).collect()
}

/// Massless bodies carry no momentum or energy and are parked at `mvel`; the
/// sphere is drawn over the rest. Fails when fewer than two bodies have mass.
fn exact_partition(bodies: &mut [Body], mvel: DVec3, mdisp: f64, rng: &mut StdRng) -> bool {
    let massive: Vec<usize> = (0..bodies.len()).filter(|&i| bodies[i].mass > 0.0).collect();
    if massive.len() < 2 {
        return false;
    }
    let masses: Vec<f64> = massive.iter().map(|&i| bodies[i].mass).collect();
    let mass: f64 = masses.iter().sum();
    let dim = massive.len() - 1;
    let axis_energy = mass * mdisp * mdisp;

    let mut offsets = [Vec::new(), Vec::new(), Vec::new()];
    for axis in offsets.iter_mut() {
        let coords = sphere_point(dim, axis_energy, rng);
        *axis = helmert_offsets(&masses, &coords);
    }
    if offsets.iter().flatten().any(|w| !w.is_finite()) {
        return false;
    }
    for b in bodies.iter_mut() {
        b.vel = mvel;
    }
    for (k, &i) in massive.iter().enumerate() {
        bodies[i].vel += DVec3::new(offsets[0][k], offsets[1][k], offsets[2][k]);
    }
    true
}
