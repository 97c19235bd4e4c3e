use crate::collide::accumulator::derive_seed;
use crate::collide::{CollisionEngine, FractionalLoss};
use crate::comm::{Communicator, LocalWorld};
use crate::diagnostics::DiagnosticLog;
use crate::init_config::{RunConfig, DEFAULT_RUN_FILE};
use crate::{Error, Result};
use log::info;

pub mod simulation_loop;
pub mod spawn;

pub use simulation_loop::{run_simulation_loop, RunSummary, Simulation};

/// Entry point of the binary: `dsmc_collide [run.toml]`.
pub fn run() -> Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_RUN_FILE.to_string());
    let config = RunConfig::load_or_default(&path)?;
    config.validate()?;
    let summary = run_config(&config)?;
    info!(
        "{} steps, {} collisions over {} rank(s)",
        summary.steps, summary.collisions, config.simulation.ranks
    );
    Ok(())
}

/// Run the configured simulation on `simulation.ranks` in-process ranks.
/// Returns rank 0's summary.
pub fn run_config(config: &RunConfig) -> Result<RunSummary> {
    let ranks = config.simulation.ranks.max(1);
    let log = DiagnosticLog::new(&config.collide.diagnostics)?;
    info!(
        "{} bodies per rank, {} rank(s), {} thread(s) each",
        config.simulation.particles / ranks,
        ranks,
        config.collide.thread_count()
    );

    let results: Vec<Result<RunSummary>> = std::thread::scope(|s| {
        let handles: Vec<_> = LocalWorld::new(ranks)
            .into_iter()
            .map(|comm| {
                let log = &log;
                s.spawn(move || run_rank(config, comm, log))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join().unwrap_or_else(|_| {
                    Err(Error::Comm { rank: 0, reason: "rank thread panicked".into() })
                })
            })
            .collect()
    });

    let mut summaries = Vec::with_capacity(ranks);
    for r in results {
        summaries.push(r?);
    }
    Ok(summaries.into_iter().next().unwrap_or_default())
}

fn run_rank<C: Communicator>(config: &RunConfig, comm: C, log: &DiagnosticLog) -> Result<RunSummary> {
    let sim = &config.simulation;
    let rank = comm.rank();
    let count = sim.particles / comm.size();
    let attribs = config.collide.excess_energy_attr.map_or(0, |a| a + 1);
    let bodies = spawn::spawn_gas(
        sim,
        &config.collide.units,
        count,
        attribs,
        derive_seed(config.collide.seed, rank, usize::MAX),
    );

    let policy = FractionalLoss::new(sim.loss_fraction).with_cooling_rate(sim.cooling_rate);
    let mut engine = CollisionEngine::new(config.collide.clone(), policy, comm)?;
    let mut simulation = Simulation::new(sim.clone(), bodies);
    run_simulation_loop(&mut simulation, &mut engine, Some(log))
}
