use crate::body::Body;
use crate::cell::Cell;
use rand::rngs::StdRng;
use thiserror::Error;

/// State of a cell as seen by an interaction policy at the start of its pass.
#[derive(Clone, Copy, Debug)]
pub struct CellContext<'a> {
    pub cell: &'a Cell,
    pub bodies: &'a [Body],
    /// Reference relative speed estimated from the sample cell.
    pub crm: f64,
    pub tau: f64,
    pub fn_: f64,
}

impl CellContext<'_> {
    pub fn number(&self) -> usize {
        self.bodies.len()
    }

    pub fn mass(&self) -> f64 {
        self.cell.moments.mass
    }

    pub fn volume(&self) -> f64 {
        self.cell.volume()
    }
}

/// Result of a successful interaction between an accepted pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InteractionOutcome {
    /// Relative speed and energy unchanged.
    Elastic,
    /// Kinetic energy went into internal degrees of freedom or radiation.
    Inelastic { energy_loss: f64, rel_speed: f64 },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InteractionError {
    #[error("non-finite relative speed after interaction")]
    NonFinite,
    #[error("invalid interaction parameter: {0}")]
    InvalidParameter(String),
}

/// Domain physics plugged into the collision engine.
///
/// The engine calls `initialize_cell` once per populated cell, then `apply`
/// for every accepted DSMC pair. Policies are shared by all worker threads.
pub trait InteractionPolicy: Sync {
    /// Overrides the fixed-diameter cross section when `Some`.
    fn cross_section(&self, _ctx: &CellContext<'_>) -> Option<f64> {
        None
    }

    /// Energy the cell should radiate during this step.
    fn initialize_cell(&self, _ctx: &CellContext<'_>) -> f64 {
        0.0
    }

    fn apply(
        &self,
        p1: &mut Body,
        p2: &mut Body,
        rel_speed: f64,
        rng: &mut StdRng,
    ) -> Result<InteractionOutcome, InteractionError>;
}

/// Hard-sphere scattering with no energy exchange.
#[derive(Clone, Copy, Debug, Default)]
pub struct ElasticScattering;

impl InteractionPolicy for ElasticScattering {
    fn apply(
        &self,
        _p1: &mut Body,
        _p2: &mut Body,
        _rel_speed: f64,
        _rng: &mut StdRng,
    ) -> Result<InteractionOutcome, InteractionError> {
        Ok(InteractionOutcome::Elastic)
    }
}

/// Removes a fixed fraction of each pair's relative kinetic energy.
///
/// The removed energy is split evenly between the two bodies' `deposit`
/// attribute when one is configured. `cooling_rate` is the energy per unit
/// mass per unit time each cell is asked to shed.
#[derive(Clone, Debug)]
pub struct FractionalLoss {
    pub fraction: f64,
    pub deposit: Option<usize>,
    pub cooling_rate: f64,
}

impl FractionalLoss {
    pub fn new(fraction: f64) -> Self {
        Self { fraction, deposit: None, cooling_rate: 0.0 }
    }

    pub fn with_deposit(mut self, attr: usize) -> Self {
        self.deposit = Some(attr);
        self
    }

    pub fn with_cooling_rate(mut self, rate: f64) -> Self {
        self.cooling_rate = rate;
        self
    }

    fn deposit_into(body: &mut Body, attr: usize, energy: f64) {
        if body.attrib.len() <= attr {
            body.attrib.resize(attr + 1, 0.0);
        }
        body.attrib[attr] += energy;
    }
}

impl InteractionPolicy for FractionalLoss {
    fn initialize_cell(&self, ctx: &CellContext<'_>) -> f64 {
        (self.cooling_rate * ctx.mass() * ctx.tau).max(0.0)
    }

    fn apply(
        &self,
        p1: &mut Body,
        p2: &mut Body,
        rel_speed: f64,
        _rng: &mut StdRng,
    ) -> Result<InteractionOutcome, InteractionError> {
        if !(0.0..=1.0).contains(&self.fraction) {
            return Err(InteractionError::InvalidParameter(format!(
                "loss fraction {} outside [0, 1]",
                self.fraction
            )));
        }
        let mu = p1.mass * p2.mass / (p1.mass + p2.mass);
        let available = 0.5 * mu * rel_speed * rel_speed;
        let energy_loss = self.fraction * available;
        let rel_speed = (2.0 * (available - energy_loss) / mu).sqrt();
        if !rel_speed.is_finite() {
            return Err(InteractionError::NonFinite);
        }
        if let Some(attr) = self.deposit {
            Self::deposit_into(p1, attr, 0.5 * energy_loss);
            Self::deposit_into(p2, attr, 0.5 * energy_loss);
        }
        Ok(InteractionOutcome::Inelastic { energy_loss, rel_speed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use ultraviolet::DVec3;

    fn pair(m: f64) -> (Body, Body) {
        (
            Body::new(DVec3::zero(), DVec3::new(1.0, 0.0, 0.0), m),
            Body::new(DVec3::zero(), DVec3::new(-1.0, 0.0, 0.0), m),
        )
    }

    #[test]
    fn loss_is_a_fraction_of_the_relative_energy() {
        let (mut a, mut b) = pair(2.0);
        let mut rng = StdRng::seed_from_u64(1);
        let policy = FractionalLoss::new(0.75).with_deposit(1);
        let out = policy.apply(&mut a, &mut b, 2.0, &mut rng).unwrap();
        // mu = 1, available = 2
        let InteractionOutcome::Inelastic { energy_loss, rel_speed } = out else {
            panic!("expected an inelastic outcome");
        };
        assert!((energy_loss - 1.5).abs() < 1e-12);
        assert!((rel_speed - 1.0).abs() < 1e-12);
        assert_eq!(a.attrib[1], 0.75);
        assert_eq!(b.attrib[1], 0.75);
    }

    #[test]
    fn full_loss_stops_the_pair() {
        let (mut a, mut b) = pair(1.0);
        let mut rng = StdRng::seed_from_u64(1);
        let out = FractionalLoss::new(1.0).apply(&mut a, &mut b, 2.0, &mut rng).unwrap();
        assert!(matches!(out, InteractionOutcome::Inelastic { rel_speed, .. } if rel_speed == 0.0));
    }

    #[test]
    fn bad_inputs_are_reported() {
        let mut rng = StdRng::seed_from_u64(1);
        let (mut a, mut b) = pair(1.0);
        let err = FractionalLoss::new(1.5).apply(&mut a, &mut b, 2.0, &mut rng).unwrap_err();
        assert!(matches!(err, InteractionError::InvalidParameter(_)));

        let (mut a, mut b) = pair(0.0);
        let err = FractionalLoss::new(0.5).apply(&mut a, &mut b, 2.0, &mut rng).unwrap_err();
        assert_eq!(err, InteractionError::NonFinite);
    }
}
