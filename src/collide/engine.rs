use super::accumulator::{derive_seed, CollisionTotals, PassSamples, ThreadAccumulator};
use super::scheduler;
use super::{CellPass, CrossSectionModel, InteractionPolicy, ResamplingStrategy};
use crate::body::Body;
use crate::cell::CellTree;
use crate::comm::{Communicator, SingleRank};
use crate::config::{CollideConfig, NUM_DIAG};
use crate::diagnostics::{self, QuantileReport, SortedSamples};
use crate::profile_scope;
use crate::profiler::PassTimings;
use crate::{Error, Result};
use log::{debug, info};
use std::time::Instant;

/// Drives collision passes over a [`CellTree`] and keeps their diagnostics.
///
/// Owns one [`ThreadAccumulator`] per worker; nothing is shared between
/// workers during a pass. Every method that talks to the communicator is a
/// collective: all ranks must call it in the same order.
pub struct CollisionEngine<P: InteractionPolicy, C: Communicator = SingleRank> {
    config: CollideConfig,
    policy: P,
    comm: C,
    model: CrossSectionModel,
    strategy: ResamplingStrategy,
    pool: Option<rayon::ThreadPool>,
    accumulators: Vec<ThreadAccumulator>,
    /// Local samples of the last pass.
    samples: PassSamples,
    /// Global counters of the last pass.
    last: CollisionTotals,
    /// Global counters since construction.
    cumulative: CollisionTotals,
    /// Global crossing-time histogram since the last drain.
    tdiag: [u64; NUM_DIAG],
    disptot: [f64; 3],
    masstot: f64,
    timings: PassTimings,
}

impl<P: InteractionPolicy> CollisionEngine<P, SingleRank> {
    pub fn single(config: CollideConfig, policy: P) -> Result<Self> {
        Self::new(config, policy, SingleRank)
    }
}

impl<P: InteractionPolicy, C: Communicator> CollisionEngine<P, C> {
    pub fn new(config: CollideConfig, policy: P, comm: C) -> Result<Self> {
        config.validate()?;
        let nthreads = config.thread_count();
        let pool = if nthreads > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(nthreads)
                    .thread_name(|i| format!("collide-{i}"))
                    .build()?,
            )
        } else {
            None
        };
        let accumulators = (0..nthreads)
            .map(|t| ThreadAccumulator::new(derive_seed(config.seed, comm.rank(), t)))
            .collect();

        debug!(
            "collision engine on rank {}/{}: {} worker(s), {:?} resampling",
            comm.rank(),
            comm.size(),
            nthreads,
            config.resampling
        );

        Ok(Self {
            model: CrossSectionModel::new(config.diameter, config.cnum),
            strategy: config.resampling,
            config,
            policy,
            comm,
            pool,
            accumulators,
            samples: PassSamples::default(),
            last: CollisionTotals::default(),
            cumulative: CollisionTotals::default(),
            tdiag: [0; NUM_DIAG],
            disptot: [0.0; 3],
            masstot: 0.0,
            timings: PassTimings::default(),
        })
    }

    pub fn config(&self) -> &CollideConfig {
        &self.config
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn threads(&self) -> usize {
        self.accumulators.len()
    }

    /// Run one collision pass over every populated cell at level `mlevel` or
    /// above. Returns the number of accepted collisions summed over ranks.
    pub fn collide(&mut self, tree: &mut CellTree, fn_: f64, tau: f64, mlevel: usize) -> Result<u64> {
        profile_scope!("collide");
        if !(fn_ > 0.0) || !fn_.is_finite() {
            return Err(Error::InvalidParam(format!("Fn must be positive, got {fn_}")));
        }
        if !(tau > 0.0) || !tau.is_finite() {
            return Err(Error::InvalidParam(format!("tau must be positive, got {tau}")));
        }

        let serial_start = Instant::now();
        for acc in &mut self.accumulators {
            acc.reset();
        }
        let worklist = scheduler::build_worklist(tree, mlevel, self.accumulators.len());
        let listed = worklist.iter().map(Vec::len).sum::<usize>() as u64;
        let mut serial = serial_start.elapsed();

        let fork = Instant::now();
        {
            let (cells, samples, jobs) = scheduler::assign(tree, &worklist)?;
            let pass = CellPass {
                config: &self.config,
                policy: &self.policy,
                model: self.model,
                strategy: self.strategy,
                fn_,
                tau,
                cells,
                samples,
            };
            let work = |cell: usize, bodies: &mut [Body], acc: &mut ThreadAccumulator| {
                pass.run_cell(cell, bodies, acc)
            };
            scheduler::run(self.pool.as_ref(), jobs, &mut self.accumulators, &work);
        }
        let parallel = fork.elapsed();

        let serial_start = Instant::now();
        let mut local = CollisionTotals { cells_listed: listed, ..Default::default() };
        let mut disp = [0.0; 4];
        self.samples.clear();
        for acc in &self.accumulators {
            local.merge(&acc.totals);
            self.samples.append(&acc.samples);
            for k in 0..3 {
                disp[k] += acc.tdisp[k];
            }
            disp[3] += acc.tmass;
        }

        let mut counters = local.counters();
        let mut energies = local.energies();
        let mut tdiag = self.samples.tdiag;
        self.comm.sum_u64(&mut counters)?;
        self.comm.sum_f64(&mut energies)?;
        self.comm.sum_u64(&mut tdiag)?;
        self.comm.sum_f64(&mut disp)?;

        self.last = CollisionTotals::from_parts(&counters, &energies);
        self.cumulative.merge(&self.last);
        for (a, b) in self.tdiag.iter_mut().zip(tdiag) {
            *a += b;
        }
        for k in 0..3 {
            self.disptot[k] += disp[k];
        }
        self.masstot += disp[3];

        serial += serial_start.elapsed();
        self.timings = PassTimings {
            serial,
            parallel,
            busy: self.accumulators.iter().map(|a| a.busy).collect(),
        };

        if self.last.interaction_errors > 0 || self.last.epsm_skipped > 0 {
            info!(
                "collide: {} interaction error(s), {} EPSM cell(s) skipped this pass",
                self.last.interaction_errors, self.last.epsm_skipped
            );
        }
        Ok(self.last.collisions)
    }

    /// Mass-weighted velocity variance per axis since the last call; resets it.
    pub fn dispersion(&mut self) -> [f64; 3] {
        let mut disp = self.disptot;
        if self.masstot > 0.0 {
            for d in disp.iter_mut() {
                *d /= self.masstot;
            }
        }
        self.disptot = [0.0; 3];
        self.masstot = 0.0;
        disp
    }

    /// Crossing-time histogram since the last call; resets it.
    pub fn take_tdiag(&mut self) -> [u64; NUM_DIAG] {
        std::mem::replace(&mut self.tdiag, [0; NUM_DIAG])
    }

    /// Median cell occupancy of the last pass (rank 0 only).
    pub fn median_number(&self) -> Result<Option<u32>> {
        let all = self.comm.gather_u32(&self.samples.numcnt)?;
        Ok(all.and_then(diagnostics::median_u32))
    }

    /// Median accepted collisions per DSMC cell of the last pass (rank 0 only).
    pub fn median_collisions(&self) -> Result<Option<u32>> {
        let all = self.comm.gather_u32(&self.samples.colcnt)?;
        Ok(all.and_then(diagnostics::median_u32))
    }

    /// Per-cell collision counts at the given quantile levels, with the full
    /// sorted sample (rank 0 only).
    pub fn collision_quantiles(&self, levels: &[f64]) -> Result<Option<(Vec<f64>, Vec<u32>)>> {
        let all = self.comm.gather_u32(&self.samples.colcnt)?;
        Ok(all.map(|mut v| {
            v.sort_unstable();
            let q = diagnostics::quantiles_u32(&v, levels);
            (q, v)
        }))
    }

    /// Globally sorted per-cell samples of the last pass (rank 0 only).
    pub fn sorted_samples(&self) -> Result<Option<SortedSamples>> {
        diagnostics::gather_sorted(&self.comm, &self.samples)
    }

    /// Quantiles of the per-cell diagnostics of the last pass (rank 0 only).
    pub fn quantiles(&self, levels: &[f64]) -> Result<Option<QuantileReport>> {
        Ok(self.sorted_samples()?.map(|s| s.report(levels)))
    }

    /// Local samples of the last pass, before any reduction.
    pub fn local_samples(&self) -> &PassSamples {
        &self.samples
    }

    /// Global counters of the last pass.
    pub fn last_pass(&self) -> &CollisionTotals {
        &self.last
    }

    /// Global counters since construction.
    pub fn totals(&self) -> &CollisionTotals {
        &self.cumulative
    }

    /// Internal energy removed by EPSM since construction, summed over ranks.
    pub fn epsm_energy_lost(&self) -> f64 {
        self.cumulative.epsm_energy_lost
    }

    pub fn timings(&self) -> &PassTimings {
        &self.timings
    }
}
