use std::f64::consts::PI;

/// Inputs to the cross-section model for one cell.
#[derive(Clone, Copy, Debug)]
pub struct CellKinematics {
    pub volume: f64,
    pub mass: f64,
    pub number: usize,
    pub crm: f64,
    pub tau: f64,
    pub fn_: f64,
}

/// Effective cross section and the hard-sphere diameter it implies.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CrossSection {
    pub cross: f64,
    pub diameter: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CrossSectionModel {
    /// `π d²`
    Fixed { diameter: f64 },
    /// Tuned so that each cell expects `cnum` collisions per step.
    Adaptive { cnum: u32 },
}

impl CrossSectionModel {
    pub fn new(diameter: f64, cnum: u32) -> Self {
        if cnum > 0 {
            CrossSectionModel::Adaptive { cnum }
        } else {
            CrossSectionModel::Fixed { diameter }
        }
    }

    /// `None` when the cell cannot collide this step (no mass, no volume or a
    /// non-finite adaptive solution). `baseline` replaces the fixed `π d²`.
    pub fn evaluate(&self, cell: &CellKinematics, baseline: Option<f64>) -> Option<CrossSection> {
        if cell.volume <= 0.0 || cell.mass <= 0.0 {
            return None;
        }
        let result = match *self {
            CrossSectionModel::Fixed { diameter } => {
                let cross = baseline.unwrap_or(PI * diameter * diameter);
                CrossSection { cross, diameter: (cross / PI).sqrt() }
            }
            CrossSectionModel::Adaptive { cnum } => {
                let n = cell.number as f64;
                let cross = 2.0 * cnum as f64 * cell.volume
                    / (cell.fn_ * cell.mass * cell.tau * cell.crm * n * (n - 1.0));
                CrossSection { cross, diameter: (cross / PI).sqrt() }
            }
        };
        (result.cross.is_finite() && result.cross >= 0.0).then_some(result)
    }
}

/// Expected candidate pairs before rounding: `0.5 N (N-1) Fn M / V σ τ crm`.
pub fn selection_count(cell: &CellKinematics, cross: f64) -> f64 {
    let n = cell.number as f64;
    0.5 * n * (n - 1.0) * cell.fn_ * cell.mass / cell.volume * cross * cell.tau * cell.crm
}

/// Number of candidate pairs actually tried: `select` rounded half up.
pub fn pairs_to_select(select: f64) -> u64 {
    if select.is_finite() && select > 0.0 {
        (select + 0.5).floor() as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell() -> CellKinematics {
        CellKinematics { volume: 4.0, mass: 2.0, number: 10, crm: 3.0, tau: 0.1, fn_: 1.0 }
    }

    #[test]
    fn fixed_unit_diameter_gives_pi() {
        let model = CrossSectionModel::new(1.0, 0);
        for volume in [0.1, 1.0, 37.0] {
            let c = CellKinematics { volume, ..cell() };
            let cs = model.evaluate(&c, None).unwrap();
            assert!((cs.cross - PI).abs() < 1e-15);
            assert!((cs.diameter - 1.0).abs() < 1e-15);
        }
    }

    #[test]
    fn adaptive_matches_target_count() {
        let model = CrossSectionModel::new(1.0, 5);
        let cs = model.evaluate(&cell(), None).unwrap();
        let expected = 2.0 * 5.0 * 4.0 / (1.0 * 2.0 * 0.1 * 3.0 * 10.0 * 9.0);
        assert!((cs.cross - expected).abs() < 1e-14);
        assert!((cs.diameter - (expected / PI).sqrt()).abs() < 1e-14);
        // The selection count recovers CNUM
        assert!((selection_count(&cell(), cs.cross) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn degenerate_cells_have_no_cross_section() {
        let model = CrossSectionModel::new(1.0, 0);
        assert!(model.evaluate(&CellKinematics { volume: 0.0, ..cell() }, None).is_none());
        assert!(model.evaluate(&CellKinematics { mass: -1.0, ..cell() }, None).is_none());
        let adaptive = CrossSectionModel::new(1.0, 5);
        assert!(adaptive.evaluate(&CellKinematics { crm: 0.0, ..cell() }, None).is_none());
    }

    #[test]
    fn baseline_overrides_fixed_diameter() {
        let model = CrossSectionModel::new(1.0, 0);
        let cs = model.evaluate(&cell(), Some(2.0)).unwrap();
        assert_eq!(cs.cross, 2.0);
    }

    #[test]
    fn nsel_is_deterministic_and_rounded() {
        let c = cell();
        let a = pairs_to_select(selection_count(&c, 0.7));
        let b = pairs_to_select(selection_count(&c, 0.7));
        assert_eq!(a, b);
        assert_eq!(pairs_to_select(2.49), 2);
        assert_eq!(pairs_to_select(2.5), 3);
        assert_eq!(pairs_to_select(0.0), 0);
        assert_eq!(pairs_to_select(f64::NAN), 0);
    }
}
