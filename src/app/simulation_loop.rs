use crate::body::Body;
use crate::collide::{CollisionEngine, InteractionPolicy};
use crate::comm::Communicator;
use crate::diagnostics::DiagnosticLog;
use crate::init_config::SimulationConfig;
use crate::octree::Octree;
use crate::profile_scope;
use crate::Result;
use log::{debug, info};

/// A box of gas owned by one rank.
pub struct Simulation {
    pub bodies: Vec<Body>,
    pub octree: Octree,
    pub config: SimulationConfig,
    pub step: usize,
    pub time: f64,
}

/// Summary returned after the last step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunSummary {
    pub steps: usize,
    pub collisions: u64,
    pub epsm_energy_lost: f64,
}

impl Simulation {
    pub fn new(config: SimulationConfig, bodies: Vec<Body>) -> Self {
        Self {
            octree: Octree::new(config.leaf_capacity, config.sample_min, config.max_depth),
            bodies,
            config,
            step: 0,
            time: 0.0,
        }
    }

    /// Free flight over `dt` with specular walls.
    pub fn drift(&mut self, dt: f64) {
        profile_scope!("drift");
        let half = 0.5 * self.config.box_size;
        for b in &mut self.bodies {
            b.pos += b.vel * dt;
            reflect(&mut b.pos.x, &mut b.vel.x, half);
            reflect(&mut b.pos.y, &mut b.vel.y, half);
            reflect(&mut b.pos.z, &mut b.vel.z, half);
        }
    }

    /// Rebuild the octree, run one collision pass at the level due this step,
    /// then hand the (reordered) bodies back.
    pub fn collide<P, C>(&mut self, engine: &mut CollisionEngine<P, C>) -> Result<u64>
    where
        P: InteractionPolicy,
        C: Communicator,
    {
        let mlevel = self.config.active_level(self.step);
        self.octree.build(&mut self.bodies);
        let bodies = std::mem::take(&mut self.bodies);
        let mut tree = self.octree.cells(bodies)?;
        let result = engine.collide(&mut tree, self.config.fn_, self.config.tau, mlevel);
        self.bodies = tree.bodies;
        result
    }

    pub fn step<P, C>(&mut self, engine: &mut CollisionEngine<P, C>) -> Result<u64>
    where
        P: InteractionPolicy,
        C: Communicator,
    {
        profile_scope!("step");
        self.drift(self.config.tau);
        let n = self.collide(engine)?;
        self.step += 1;
        self.time += self.config.tau;
        Ok(n)
    }
}

/// Fold a coordinate back into `[-half, half]`, flipping the velocity.
fn reflect(x: &mut f64, v: &mut f64, half: f64) {
    let width = 2.0 * half;
    for _ in 0..4 {
        if *x > half {
            *x = width - *x;
            *v = -v.abs();
        } else if *x < -half {
            *x = -width - *x;
            *v = v.abs();
        } else {
            return;
        }
    }
    // Faster than several box widths per step
    *x = x.clamp(-half, half);
}

/// Step the simulation to completion, emitting diagnostics at the
/// configured interval. Collective over the engine's communicator.
pub fn run_simulation_loop<P, C>(
    simulation: &mut Simulation,
    engine: &mut CollisionEngine<P, C>,
    log: Option<&DiagnosticLog>,
) -> Result<RunSummary>
where
    P: InteractionPolicy,
    C: Communicator,
{
    let rank = engine.comm().rank();
    let mut summary = RunSummary::default();
    while simulation.step < simulation.config.steps {
        let n = simulation.step(engine)?;
        summary.collisions += n;
        summary.steps += 1;
        debug!("rank {} step {}: {} collisions", rank, simulation.step, n);

        if let Some(log) = log {
            if log.due(simulation.step) {
                log.emit(engine, simulation.step, simulation.time)?;
            }
        }

        #[cfg(feature = "profiling")]
        {
            if engine.comm().is_root() {
                crate::PROFILER.lock().log_and_clear();
            }
        }
    }
    summary.epsm_energy_lost = engine.epsm_energy_lost();
    if engine.comm().is_root() {
        info!(
            "finished {} steps: {} collisions, EPSM removed {:e}",
            summary.steps, summary.collisions, summary.epsm_energy_lost
        );
    }
    Ok(summary)
}
