// body/types.rs
// Contains the Body struct and the moment helpers used by the collision engine

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use ultraviolet::DVec3;

/// A simulation (super-)particle.
///
/// `attrib` and `iattrib` are opaque to the engine; only interaction policies
/// and the excess-energy bookkeeping read or write them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Body {
    pub pos: DVec3,
    pub vel: DVec3,
    pub mass: f64,
    /// Multistep time level assigned by the host integrator.
    pub level: usize,
    pub id: u64,
    /// Floating attributes (internal energy, excess energy, ...).
    pub attrib: SmallVec<[f64; 4]>,
    /// Integer attributes (species, ionization level, ...).
    pub iattrib: SmallVec<[i32; 2]>,
}

use std::sync::atomic::{AtomicU64, Ordering};
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

impl Body {
    pub fn new(pos: DVec3, vel: DVec3, mass: f64) -> Self {
        Self {
            pos,
            vel,
            mass,
            level: 0,
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            attrib: SmallVec::new(),
            iattrib: SmallVec::new(),
        }
    }

    pub fn with_level(mut self, level: usize) -> Self {
        self.level = level;
        self
    }

    pub fn with_attrib(mut self, attrib: &[f64]) -> Self {
        self.attrib = SmallVec::from_slice(attrib);
        self
    }

    #[inline]
    pub fn kinetic_energy(&self) -> f64 {
        0.5 * self.mass * self.vel.mag_sq()
    }

    #[inline]
    pub fn momentum(&self) -> DVec3 {
        self.vel * self.mass
    }

    /// Value of a floating attribute, or zero when the body does not carry it.
    pub fn attr(&self, index: usize) -> f64 {
        self.attrib.get(index).copied().unwrap_or(0.0)
    }
}

/// Split one slice into mutable references to two distinct bodies.
///
/// Panics if `i == j`; callers draw `j` so that it never equals `i`.
pub fn pair_mut(bodies: &mut [Body], i: usize, j: usize) -> (&mut Body, &mut Body) {
    assert_ne!(i, j, "a pair needs two distinct bodies");
    if i < j {
        let (lo, hi) = bodies.split_at_mut(j);
        (&mut lo[i], &mut hi[0])
    } else {
        let (lo, hi) = bodies.split_at_mut(i);
        (&mut hi[0], &mut lo[j])
    }
}

/// Mass, first and second velocity moments of a set of bodies, per axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VelocityMoments {
    pub mass: f64,
    /// Σ m·v
    pub mv: [f64; 3],
    /// Σ m·v²
    pub mv2: [f64; 3],
}

impl VelocityMoments {
    pub fn from_bodies(bodies: &[Body]) -> Self {
        let mut m = Self::default();
        for b in bodies {
            m.add(b);
        }
        m
    }

    pub fn add(&mut self, b: &Body) {
        let v = [b.vel.x, b.vel.y, b.vel.z];
        self.mass += b.mass;
        for k in 0..3 {
            self.mv[k] += b.mass * v[k];
            self.mv2[k] += b.mass * v[k] * v[k];
        }
    }

    pub fn merge(&mut self, other: &VelocityMoments) {
        self.mass += other.mass;
        for k in 0..3 {
            self.mv[k] += other.mv[k];
            self.mv2[k] += other.mv2[k];
        }
    }

    /// Kinetic energy in the center-of-mass frame.
    pub fn internal_energy(&self) -> f64 {
        if self.mass <= 0.0 {
            return 0.0;
        }
        (0..3)
            .map(|k| 0.5 * (self.mv2[k] - self.mv[k] * self.mv[k] / self.mass))
            .sum()
    }

    /// Reference relative speed `crm`: 1.5 times the mean relative speed
    /// implied by the velocity dispersion.
    pub fn relative_speed_estimate(&self) -> f64 {
        let mut crm = 0.0;
        if self.mass > 0.0 {
            for k in 0..3 {
                crm += (self.mv2[k] - self.mv[k] * self.mv[k] / self.mass) / self.mass;
            }
        }
        1.5 * (2.0 * crm.abs()).sqrt()
    }
}
