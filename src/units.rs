//! Physical constants and the code-unit system used by the collision engine.
//!
//! Constants are cgs. Body masses and energies are in code units; the
//! conversion to cgs is given by [`SystemUnits`]. The default system measures
//! mass in proton masses and energy in `k`·K, so a unit-mass body at 1 K has
//! unit velocity variance per axis.

use serde::{Deserialize, Serialize};

/// Proton mass in grams.
pub const PROTON_MASS: f64 = 1.672_621_58e-24;
/// Boltzmann constant in erg/K.
pub const BOLTZMANN_CONSTANT: f64 = 1.3810e-16;

/// Code mass and energy units expressed in grams and ergs.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SystemUnits {
    pub mass_unit: f64,
    pub energy_unit: f64,
}

impl Default for SystemUnits {
    fn default() -> Self {
        Self { mass_unit: PROTON_MASS, energy_unit: BOLTZMANN_CONSTANT }
    }
}

impl SystemUnits {
    /// Thermal energy `3/2 k T` carried by `mass` code units of hydrogen gas
    /// at temperature `t`, in code energy units.
    pub fn thermal_energy(&self, mass: f64, t: f64) -> f64 {
        1.5 * BOLTZMANN_CONSTANT * t * mass / PROTON_MASS * self.mass_unit / self.energy_unit
    }

    /// Inverse of [`Self::thermal_energy`]: the temperature at which `mass`
    /// holds `energy` in its center-of-mass frame.
    pub fn temperature(&self, energy: f64, mass: f64) -> f64 {
        let per_kelvin = self.thermal_energy(mass, 1.0);
        if per_kelvin > 0.0 {
            energy / per_kelvin
        } else {
            0.0
        }
    }
}
