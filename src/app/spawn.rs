use crate::body::Body;
use crate::init_config::SimulationConfig;
use crate::units::SystemUnits;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use ultraviolet::DVec3;

/// Per-axis standard deviation of a Maxwellian at temperature `t`.
pub fn thermal_sigma(units: &SystemUnits, mass: f64, t: f64) -> f64 {
    if mass <= 0.0 {
        return 0.0;
    }
    (units.thermal_energy(mass, t) / (1.5 * mass)).sqrt()
}

/// Sample a random velocity vector from a Maxwell-Boltzmann distribution.
pub fn sample_velocity(rng: &mut StdRng, sigma: f64) -> DVec3 {
    let vx: f64 = StandardNormal.sample(&mut *rng);
    let vy: f64 = StandardNormal.sample(&mut *rng);
    let vz: f64 = StandardNormal.sample(&mut *rng);
    DVec3::new(vx, vy, vz) * sigma
}

/// Uniform gas filling the box, with levels spread evenly over the multistep
/// ladder. Bodies carry `attribs` zeroed floating attributes.
pub fn spawn_gas(
    sim: &SimulationConfig,
    units: &SystemUnits,
    count: usize,
    attribs: usize,
    seed: u64,
) -> Vec<Body> {
    let mut rng = StdRng::seed_from_u64(seed);
    let sigma = thermal_sigma(units, sim.particle_mass, sim.temperature);
    let half = 0.5 * sim.box_size;
    let zeros = vec![0.0; attribs];

    (0..count)
        .map(|_| {
            let pos = DVec3::new(
                rng.random_range(-half..half),
                rng.random_range(-half..half),
                rng.random_range(-half..half),
            );
            let vel = sample_velocity(&mut rng, sigma);
            let level = rng.random_range(0..sim.levels.max(1));
            Body::new(pos, vel, sim.particle_mass)
                .with_level(level)
                .with_attrib(&zeros)
        })
        .collect()
}
