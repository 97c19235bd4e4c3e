use crate::config::NUM_DIAG;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;

/// Mean-free-path sample: MFP over cell size plus where the cell sits.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MfpRecord {
    pub ratio: f64,
    pub cylindrical_radius: f64,
    pub height: f64,
    pub spherical_radius: f64,
    pub density: f64,
    pub volume: f64,
}

impl MfpRecord {
    pub const FIELDS: usize = 6;

    pub fn to_array(&self) -> [f64; Self::FIELDS] {
        [
            self.ratio,
            self.cylindrical_radius,
            self.height,
            self.spherical_radius,
            self.density,
            self.volume,
        ]
    }

    pub fn from_slice(v: &[f64]) -> Self {
        Self {
            ratio: v[0],
            cylindrical_radius: v[1],
            height: v[2],
            spherical_radius: v[3],
            density: v[4],
            volume: v[5],
        }
    }
}

/// Per-cell thermodynamic state.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PhaseRecord {
    pub density: f64,
    pub temperature: f64,
    pub number: f64,
    pub mass: f64,
    pub volume: f64,
}

impl PhaseRecord {
    pub const FIELDS: usize = 5;

    pub fn to_array(&self) -> [f64; Self::FIELDS] {
        [self.density, self.temperature, self.number, self.mass, self.volume]
    }

    pub fn from_slice(v: &[f64]) -> Self {
        Self { density: v[0], temperature: v[1], number: v[2], mass: v[3], volume: v[4] }
    }
}

/// Event counters for one pass, or summed over many.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CollisionTotals {
    pub collisions: u64,
    pub epsm_particles: u64,
    pub epsm_cells: u64,
    pub interaction_errors: u64,
    pub degenerate_cells: u64,
    pub epsm_skipped: u64,
    pub cba_violations: u64,
    pub dry_run_skipped: u64,
    /// EPSM cells whose momentum or energy drifted past the tolerance.
    pub conservation_violations: u64,
    /// Cells that reached `initialize_cell`.
    pub cells_processed: u64,
    /// Cells handed to the workers.
    pub cells_listed: u64,
    /// Internal energy removed by EPSM.
    pub epsm_energy_lost: f64,
    /// Energy reported lost by the interaction policy.
    pub interaction_energy_lost: f64,
}

impl CollisionTotals {
    pub const COUNTERS: usize = 11;
    pub const ENERGIES: usize = 2;

    pub fn merge(&mut self, other: &CollisionTotals) {
        let mut c = self.counters();
        for (a, b) in c.iter_mut().zip(other.counters()) {
            *a += b;
        }
        let mut e = self.energies();
        for (a, b) in e.iter_mut().zip(other.energies()) {
            *a += b;
        }
        *self = Self::from_parts(&c, &e);
    }

    pub fn counters(&self) -> [u64; Self::COUNTERS] {
        [
            self.collisions,
            self.epsm_particles,
            self.epsm_cells,
            self.interaction_errors,
            self.degenerate_cells,
            self.epsm_skipped,
            self.cba_violations,
            self.dry_run_skipped,
            self.conservation_violations,
            self.cells_processed,
            self.cells_listed,
        ]
    }

    pub fn energies(&self) -> [f64; Self::ENERGIES] {
        [self.epsm_energy_lost, self.interaction_energy_lost]
    }

    pub fn from_parts(c: &[u64; Self::COUNTERS], e: &[f64; Self::ENERGIES]) -> Self {
        Self {
            collisions: c[0],
            epsm_particles: c[1],
            epsm_cells: c[2],
            interaction_errors: c[3],
            degenerate_cells: c[4],
            epsm_skipped: c[5],
            cba_violations: c[6],
            dry_run_skipped: c[7],
            conservation_violations: c[8],
            cells_processed: c[9],
            cells_listed: c[10],
            epsm_energy_lost: e[0],
            interaction_energy_lost: e[1],
        }
    }
}

/// Per-cell samples collected during one pass, in processing order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PassSamples {
    /// Occupancy of every listed cell.
    pub numcnt: Vec<u32>,
    /// Accepted collisions per DSMC cell (0 for cells too small or degenerate).
    pub colcnt: Vec<u32>,
    /// Flight time across the cell over the time step.
    pub tsrat: Vec<f64>,
    pub tdens: Vec<f64>,
    pub tvolc: Vec<f64>,
    pub ttemp: Vec<f64>,
    /// Cooling budget per body.
    pub tdelt: Vec<f64>,
    /// Bodies per selected pair.
    pub tseln: Vec<f64>,
    /// Deviation of the energy actually lost from the budget, over the cell's
    /// internal energy.
    pub derat: Vec<f64>,
    pub mfp: Vec<MfpRecord>,
    pub phase: Vec<PhaseRecord>,
    /// Cell crossing time over the step, in factors of four around 1.
    pub tdiag: [u64; NUM_DIAG],
}

impl PassSamples {
    pub fn clear(&mut self) {
        self.numcnt.clear();
        self.colcnt.clear();
        self.tsrat.clear();
        self.tdens.clear();
        self.tvolc.clear();
        self.ttemp.clear();
        self.tdelt.clear();
        self.tseln.clear();
        self.derat.clear();
        self.mfp.clear();
        self.phase.clear();
        self.tdiag = [0; NUM_DIAG];
    }

    pub fn append(&mut self, other: &PassSamples) {
        self.numcnt.extend_from_slice(&other.numcnt);
        self.colcnt.extend_from_slice(&other.colcnt);
        self.tsrat.extend_from_slice(&other.tsrat);
        self.tdens.extend_from_slice(&other.tdens);
        self.tvolc.extend_from_slice(&other.tvolc);
        self.ttemp.extend_from_slice(&other.ttemp);
        self.tdelt.extend_from_slice(&other.tdelt);
        self.tseln.extend_from_slice(&other.tseln);
        self.derat.extend_from_slice(&other.derat);
        self.mfp.extend_from_slice(&other.mfp);
        self.phase.extend_from_slice(&other.phase);
        for (a, b) in self.tdiag.iter_mut().zip(other.tdiag) {
            *a += b;
        }
    }

    /// Lengths of every sample vector, for storage diagnostics.
    pub fn sizes(&self) -> [usize; 11] {
        [
            self.numcnt.len(),
            self.colcnt.len(),
            self.tsrat.len(),
            self.derat.len(),
            self.tdens.len(),
            self.tvolc.len(),
            self.ttemp.len(),
            self.tdelt.len(),
            self.tseln.len(),
            self.phase.len(),
            self.mfp.len(),
        ]
    }
}

/// Histogram bin for a cell whose crossing time is `taudiag` at step `tau`.
pub fn tdiag_bin(taudiag: f64, tau: f64) -> usize {
    let x = ((taudiag / tau).ln() / 4f64.ln() + 5.0).floor();
    if x.is_nan() || x < 0.0 {
        0
    } else {
        (x as usize).min(NUM_DIAG - 1)
    }
}

/// Scratch state owned by one worker for the duration of a pass.
pub struct ThreadAccumulator {
    pub rng: StdRng,
    pub totals: CollisionTotals,
    pub samples: PassSamples,
    /// Σ M·variance per axis over the cells this worker processed.
    pub tdisp: [f64; 3],
    pub tmass: f64,
    pub busy: Duration,
}

impl ThreadAccumulator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            totals: CollisionTotals::default(),
            samples: PassSamples::default(),
            tdisp: [0.0; 3],
            tmass: 0.0,
            busy: Duration::ZERO,
        }
    }

    /// Zero everything but the random stream.
    pub fn reset(&mut self) {
        self.totals = CollisionTotals::default();
        self.samples.clear();
        self.tdisp = [0.0; 3];
        self.tmass = 0.0;
        self.busy = Duration::ZERO;
    }
}

/// Seed for the stream of worker `thread` on `rank` (splitmix64 finalizer).
pub fn derive_seed(seed: u64, rank: usize, thread: usize) -> u64 {
    let mut z = seed
        .wrapping_add((rank as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
        .wrapping_add((thread as u64 + 1).wrapping_mul(0xBF58_476D_1CE4_E5B9));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
