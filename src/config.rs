// Centralized configuration for the collision engine

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::collide::ResamplingStrategy;
use crate::units::SystemUnits;

// ====================
// Cross Section
// ====================
/// Baseline hard-sphere diameter in code length units.
pub const DEFAULT_DIAMETER: f64 = 1.0;
/// Target collisions per cell for the adaptive cross section; 0 disables it.
pub const DEFAULT_CNUM: u32 = 0;

// ====================
// Regime Switching
// ====================
/// Cells with fewer than this many particles per selected pair use EPSM.
/// Negative keeps every cell on the DSMC branch.
pub const DEFAULT_EPSM_RATIO: f64 = -1.0;
/// Temperature floor (K) below which EPSM does not cool.
pub const DEFAULT_TEMPERATURE_FLOOR: f64 = 1000.0;
/// Relative tolerance used to check conservation after an EPSM resample.
pub const CONSERVATION_TOLERANCE: f64 = 1.0e-10;

// ====================
// Displacement (CBA)
// ====================
/// Apply the post-collision positional displacement by default.
pub const CBA_ENABLED: bool = true;
/// Fraction of the cell's linear size above which a displacement is flagged.
pub const CBA_MAX_CELL_FRACTION: f64 = 0.5;

// ====================
// Threading/Parallelism
// ====================
pub const MIN_THREADS: usize = 1; // Minimum number of worker threads
pub const THREADS_LEAVE_FREE: usize = 2; // Number of logical cores to leave free
/// Base seed for the per-thread generators; rank and thread id are mixed in.
pub const DEFAULT_SEED: u64 = 11;

// ====================
// Diagnostics
// ====================
/// Number of bins in the cell time-step histogram.
pub const NUM_DIAG: usize = 11;
/// Steps between diagnostic emissions in the driver.
pub const DEFAULT_DIAG_INTERVAL: usize = 10;

pub fn default_quantiles() -> Vec<f64> {
    vec![0.05, 0.1, 0.25, 0.5, 0.75, 0.9, 0.95]
}

/// Worker count derived from the machine, leaving a few cores for the host.
pub fn default_threads() -> usize {
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(MIN_THREADS);
    available.saturating_sub(THREADS_LEAVE_FREE).max(MIN_THREADS)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Prefix for every diagnostic file.
    pub run_tag: String,
    pub output_dir: PathBuf,
    /// Quantile levels reported at each emission.
    pub quantiles: Vec<f64>,
    /// Dump the full sorted per-cell table at each emission.
    pub sorted: bool,
    /// Dump the density/temperature phase table at each emission.
    pub phase: bool,
    /// Extra debugging output (storage sizes, full collision-count dumps).
    pub extra: bool,
    /// Steps between emissions.
    pub interval: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            run_tag: "run".to_string(),
            output_dir: PathBuf::from("."),
            quantiles: default_quantiles(),
            sorted: false,
            phase: false,
            extra: false,
            interval: DEFAULT_DIAG_INTERVAL,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollideConfig {
    pub diameter: f64,
    /// Target number of collisions per cell (adaptive cross section when > 0)
    pub cnum: u32,
    pub epsm_ratio: f64,
    /// Temperature floor for EPSM cooling (K)
    pub temperature_floor: f64,
    pub resampling: ResamplingStrategy,
    /// Post-collision positional displacement
    pub cba: bool,
    /// Ignore the cooling budget supplied by the interaction policy
    pub no_cool: bool,
    /// Bookkeeping only: no particle is ever mutated
    pub dry_run: bool,
    /// Worker threads per rank; `None` derives it from the machine
    pub threads: Option<usize>,
    pub seed: u64,
    /// Body attribute holding per-particle excess energy, if any
    pub excess_energy_attr: Option<usize>,
    pub conservation_tolerance: f64,
    pub units: SystemUnits,
    pub diagnostics: DiagnosticsConfig,
}

impl Default for CollideConfig {
    fn default() -> Self {
        Self {
            diameter: DEFAULT_DIAMETER,
            cnum: DEFAULT_CNUM,
            epsm_ratio: DEFAULT_EPSM_RATIO,
            temperature_floor: DEFAULT_TEMPERATURE_FLOOR,
            resampling: ResamplingStrategy::default(),
            cba: CBA_ENABLED,
            no_cool: false,
            dry_run: false,
            threads: None,
            seed: DEFAULT_SEED,
            excess_energy_attr: None,
            conservation_tolerance: CONSERVATION_TOLERANCE,
            units: SystemUnits::default(),
            diagnostics: DiagnosticsConfig::default(),
        }
    }
}

impl CollideConfig {
    pub fn thread_count(&self) -> usize {
        self.threads.unwrap_or_else(default_threads).max(1)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;
        if !self.diameter.is_finite() || self.diameter < 0.0 {
            return Err(Error::InvalidParam("diameter must be finite and >= 0".into()));
        }
        if !self.epsm_ratio.is_finite() {
            return Err(Error::InvalidParam("epsm_ratio must be finite".into()));
        }
        if !self.temperature_floor.is_finite() || self.temperature_floor < 0.0 {
            return Err(Error::InvalidParam("temperature_floor must be finite and >= 0".into()));
        }
        if !(self.conservation_tolerance > 0.0) {
            return Err(Error::InvalidParam("conservation_tolerance must be > 0".into()));
        }
        if self.threads == Some(0) {
            return Err(Error::InvalidParam("threads must be > 0".into()));
        }
        if self.diagnostics.quantiles.iter().any(|q| !(0.0..=1.0).contains(q)) {
            return Err(Error::InvalidParam("quantile levels must lie in [0, 1]".into()));
        }
        Ok(())
    }
}
