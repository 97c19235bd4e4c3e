use crate::body::Body;
use serde::{Deserialize, Serialize};
use ultraviolet::DVec3;

/// Axis-aligned cube given by its center and edge length.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cube {
    pub center: DVec3,
    pub size: f64,
}

impl Cube {
    pub fn new(center: DVec3, size: f64) -> Self {
        Self { center, size }
    }

    pub fn new_containing(bodies: &[Body]) -> Self {
        if bodies.is_empty() {
            return Self { center: DVec3::zero(), size: 1.0 };
        }

        let mut min = [f64::MAX; 3];
        let mut max = [f64::MIN; 3];

        for body in bodies {
            let p = [body.pos.x, body.pos.y, body.pos.z];
            for k in 0..3 {
                min[k] = min[k].min(p[k]);
                max[k] = max[k].max(p[k]);
            }
        }

        let center = DVec3::new(min[0] + max[0], min[1] + max[1], min[2] + max[2]) * 0.5;
        let size = (0..3).map(|k| max[k] - min[k]).fold(0.0, f64::max);
        // Degenerate clouds still get a finite volume
        let size = if size > 0.0 { size } else { 1.0 };

        Self { center, size }
    }

    pub fn into_octant(mut self, octant: usize) -> Self {
        self.size *= 0.5;
        self.center.x += ((octant & 1) as f64 - 0.5) * self.size;
        self.center.y += (((octant >> 1) & 1) as f64 - 0.5) * self.size;
        self.center.z += (((octant >> 2) & 1) as f64 - 0.5) * self.size;
        self
    }

    pub fn subdivide(&self) -> [Cube; 8] {
        [0, 1, 2, 3, 4, 5, 6, 7].map(|i| self.into_octant(i))
    }

    pub fn volume(&self) -> f64 {
        self.size * self.size * self.size
    }

    pub fn contains(&self, pos: DVec3) -> bool {
        let half = 0.5 * self.size;
        let d = pos - self.center;
        d.x.abs() <= half && d.y.abs() <= half && d.z.abs() <= half
    }
}
