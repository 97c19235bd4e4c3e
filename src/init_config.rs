// init_config.rs
// Handles loading and parsing the run file (simulation setup plus collision settings)

use crate::config::CollideConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Default run file looked up by the binary when no path is given.
pub const DEFAULT_RUN_FILE: &str = "collide.toml";

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RunConfig {
    pub simulation: SimulationConfig,
    pub collide: CollideConfig,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub steps: usize,
    /// Time step of the coarsest level.
    pub tau: f64,
    /// Physical particles represented by one unit of body mass.
    #[serde(rename = "fn")]
    pub fn_: f64,
    /// Edge length of the reflecting box, centered on the origin.
    pub box_size: f64,
    pub particles: usize,
    /// Initial gas temperature (K in the configured unit system).
    pub temperature: f64,
    pub particle_mass: f64,
    /// Number of multistep levels bodies are spread over.
    pub levels: usize,
    pub leaf_capacity: usize,
    /// Minimum population of the node used to estimate `crm`.
    pub sample_min: usize,
    pub max_depth: usize,
    /// In-process ranks, each evolving its own box.
    pub ranks: usize,
    /// Fraction of the relative kinetic energy every accepted pair loses.
    pub loss_fraction: f64,
    /// Energy per unit mass per unit time each cell is asked to shed.
    pub cooling_rate: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            steps: 100,
            tau: 0.01,
            fn_: 1.0,
            box_size: 1.0,
            particles: 4000,
            temperature: 1.0,
            particle_mass: 1.0e-4,
            levels: 1,
            leaf_capacity: 32,
            sample_min: 64,
            max_depth: 12,
            ranks: 1,
            loss_fraction: 0.0,
            cooling_rate: 0.0,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("tau", self.tau),
            ("fn", self.fn_),
            ("box_size", self.box_size),
            ("particle_mass", self.particle_mass),
        ] {
            if !(v > 0.0) || !v.is_finite() {
                return Err(Error::InvalidParam(format!("simulation.{name} must be positive")));
            }
        }
        if self.levels == 0 || self.leaf_capacity == 0 || self.ranks == 0 {
            return Err(Error::InvalidParam(
                "simulation.levels, leaf_capacity and ranks must be > 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.loss_fraction) || !(self.cooling_rate >= 0.0) {
            return Err(Error::InvalidParam(
                "simulation.loss_fraction must lie in [0, 1] and cooling_rate be >= 0".into(),
            ));
        }
        Ok(())
    }

    /// Lowest multistep level that is due at `step`: level `l` runs every
    /// `2^(levels-1-l)` steps, so step 0 runs everything.
    pub fn active_level(&self, step: usize) -> usize {
        let top = self.levels.saturating_sub(1);
        let tz = if step == 0 { u32::MAX } else { step.trailing_zeros() };
        top - (tz as usize).min(top)
    }
}

impl RunConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: RunConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, or the defaults when the file does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        match Self::load_from_file(path.as_ref()) {
            Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => {
                log::warn!("{} not found, using default settings", path.as_ref().display());
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.simulation.validate()?;
        self.collide.validate()
    }
}
