use crate::body::Body;
use rand::rngs::StdRng;
use rand::Rng;
use std::f64::consts::PI;
use ultraviolet::DVec3;

/// Candidate-pair draws and the rejection envelope for one cell's DSMC loop.
#[derive(Clone, Debug)]
pub struct PairSampler {
    /// Rejection envelope. Never decreases while the cell is processed.
    pub crm: f64,
    number: usize,
}

impl PairSampler {
    pub fn new(crm: f64, number: usize) -> Self {
        Self { crm, number }
    }

    /// Two distinct indices, uniform over ordered pairs.
    pub fn draw(&self, rng: &mut StdRng) -> (usize, usize) {
        let n = self.number;
        let k1 = ((rng.random::<f64>() * n as f64).floor() as usize).min(n - 1);
        let k2 = ((rng.random::<f64>() * (n - 1) as f64).floor() as usize + k1 + 1) % n;
        (k1, k2)
    }

    /// Widen the envelope to `cr` if needed, then accept with probability `cr / crm`.
    pub fn trial(&mut self, cr: f64, rng: &mut StdRng) -> bool {
        if cr > self.crm {
            self.crm = cr;
        }
        cr / self.crm > rng.random::<f64>()
    }
}

/// Isotropic scattering of a pair about its center of mass with the given
/// post-interaction relative speed.
pub fn scatter(p1: &mut Body, p2: &mut Body, rel_speed: f64, rng: &mut StdRng) {
    let tmass = p1.mass + p2.mass;
    let vcm = (p1.vel * p1.mass + p2.vel * p2.mass) / tmass;

    let cos_th = 1.0 - 2.0 * rng.random::<f64>();
    let sin_th = (1.0 - cos_th * cos_th).max(0.0).sqrt();
    let phi = 2.0 * PI * rng.random::<f64>();

    let vrel = DVec3::new(
        rel_speed * cos_th,
        rel_speed * sin_th * phi.cos(),
        rel_speed * sin_th * phi.sin(),
    );

    p1.vel = vcm + vrel * (p2.mass / tmass);
    p2.vel = vcm - vrel * (p1.mass / tmass);
}

/// Positional nudge applied after an accepted collision.
///
/// `crel_before` is the pre-collision relative velocity. The bodies move
/// apart along the change in relative velocity by `diameter`. Returns `true`
/// when some component exceeded `max_component`; the shift is applied anyway.
pub fn displace(
    p1: &mut Body,
    p2: &mut Body,
    crel_before: DVec3,
    diameter: f64,
    max_component: f64,
) -> bool {
    let crel = (p1.vel - p2.vel) - crel_before;
    let cr = crel.mag();
    if !(cr > 0.0) {
        return false;
    }
    let displ = crel * (diameter / cr);
    p1.pos += displ;
    p2.pos -= displ;
    displ.x.abs() > max_component || displ.y.abs() > max_component || displ.z.abs() > max_component
}
