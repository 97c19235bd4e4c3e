use crate::body::{Body, VelocityMoments};
use crate::octree::Cube;
use crate::{Error, Result};
use std::ops::Range;

/// A leaf cell of the spatial partition: a contiguous run of the body arena.
#[derive(Clone, Debug)]
pub struct Cell {
    pub bodies: Range<usize>,
    pub cube: Cube,
    /// Multistep level: the finest level of any body in the cell.
    pub level: usize,
    /// Index into [`CellTree::samples`] of the coarser moments used for `crm`.
    pub sample: usize,
    pub moments: VelocityMoments,
}

impl Cell {
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn volume(&self) -> f64 {
        self.cube.volume()
    }

    /// Linear size of the cell.
    pub fn side(&self) -> f64 {
        self.cube.size
    }
}

/// Cell view consumed by the collision engine.
///
/// Bodies live in one arena; every cell owns a disjoint index range of it,
/// which lets a collision pass hand out `&mut [Body]` per cell without any
/// two workers touching the same particle.
pub struct CellTree {
    pub bodies: Vec<Body>,
    pub cells: Vec<Cell>,
    pub samples: Vec<VelocityMoments>,
    pub max_level: usize,
}

impl CellTree {
    /// Build a view from explicit cell ranges; each cell is its own sample.
    pub fn from_cells(bodies: Vec<Body>, layout: Vec<(Range<usize>, Cube)>) -> Result<Self> {
        let mut cells = Vec::with_capacity(layout.len());
        let mut samples = Vec::with_capacity(layout.len());
        for (range, cube) in layout {
            if range.end > bodies.len() || range.start > range.end {
                return Err(Error::Partition(format!(
                    "cell range {:?} outside arena of {} bodies",
                    range,
                    bodies.len()
                )));
            }
            let slice = &bodies[range.clone()];
            let moments = VelocityMoments::from_bodies(slice);
            let level = slice.iter().map(|b| b.level).min().unwrap_or(0);
            samples.push(moments);
            cells.push(Cell { bodies: range, cube, level, sample: samples.len() - 1, moments });
        }
        Self::from_parts(bodies, cells, samples)
    }

    /// Assemble a view from prepared cells, checking that their ranges are disjoint.
    pub fn from_parts(
        bodies: Vec<Body>,
        cells: Vec<Cell>,
        samples: Vec<VelocityMoments>,
    ) -> Result<Self> {
        if let Some(c) = cells.iter().find(|c| c.sample >= samples.len()) {
            return Err(Error::Partition(format!("cell sample index {} out of range", c.sample)));
        }
        let max_level = bodies.iter().map(|b| b.level).max().unwrap_or(0);
        let tree = Self { bodies, cells, samples, max_level };
        tree.check_disjoint()?;
        Ok(tree)
    }

    pub fn body(&self, index: usize) -> &Body {
        &self.bodies[index]
    }

    pub fn number_of_cells(&self) -> usize {
        self.cells.len()
    }

    /// Indices of populated cells at or above multistep level `mlevel`.
    pub fn active_cells(&self, mlevel: usize) -> Vec<usize> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| c.level >= mlevel && c.level <= self.max_level && !c.is_empty())
            .map(|(i, _)| i)
            .collect()
    }

    fn check_disjoint(&self) -> Result<()> {
        let mut ranges: Vec<Range<usize>> = self.cells.iter().map(|c| c.bodies.clone()).collect();
        ranges.sort_by_key(|r| r.start);
        for w in ranges.windows(2) {
            if w[0].end > w[1].start {
                return Err(Error::Partition(format!("cells {:?} and {:?} overlap", w[0], w[1])));
            }
        }
        Ok(())
    }

    /// Hand out one mutable body slice per requested cell, in request order,
    /// together with shared access to the cell and sample tables.
    pub fn partition_mut(
        &mut self,
        order: &[usize],
    ) -> Result<(&[Cell], &[VelocityMoments], Vec<&mut [Body]>)> {
        let cells = &self.cells;
        let mut sorted: Vec<(usize, usize)> = order.iter().copied().enumerate().collect();
        for &(_, c) in &sorted {
            if c >= cells.len() {
                return Err(Error::Partition(format!("cell index {c} out of range")));
            }
        }
        sorted.sort_by_key(|&(_, c)| cells[c].bodies.start);

        let mut slots: Vec<Option<&mut [Body]>> = (0..order.len()).map(|_| None).collect();
        let mut rest: &mut [Body] = &mut self.bodies;
        let mut offset = 0usize;
        for (slot, c) in sorted {
            let range = cells[c].bodies.clone();
            if range.start < offset || range.end > offset + rest.len() {
                return Err(Error::Partition(format!(
                    "cell {c} range {range:?} overlaps a previous cell or leaves the arena"
                )));
            }
            let tail = std::mem::take(&mut rest);
            let (_, tail) = tail.split_at_mut(range.start - offset);
            let (mine, tail) = tail.split_at_mut(range.len());
            slots[slot] = Some(mine);
            rest = tail;
            offset = range.end;
        }
        let slices = slots.into_iter().map(|s| s.unwrap_or_default()).collect();
        Ok((cells, &self.samples, slices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ultraviolet::DVec3;

    fn gas(n: usize) -> Vec<Body> {
        (0..n)
            .map(|i| Body::new(DVec3::new(i as f64, 0.0, 0.0), DVec3::new(1.0, 0.0, 0.0), 1.0))
            .collect()
    }

    fn unit() -> Cube {
        Cube { center: DVec3::zero(), size: 1.0 }
    }

    #[test]
    fn overlapping_layout_is_rejected() {
        let err = CellTree::from_cells(gas(4), vec![(0..3, unit()), (2..4, unit())]);
        assert!(matches!(err, Err(Error::Partition(_))));
    }

    #[test]
    fn partition_follows_request_order() {
        let mut tree = CellTree::from_cells(gas(5), vec![(0..2, unit()), (2..5, unit())]).unwrap();
        let (cells, _, slices) = tree.partition_mut(&[1, 0]).unwrap();
        assert_eq!(cells.len(), 2);
        assert_eq!(slices[0].len(), 3);
        assert_eq!(slices[1].len(), 2);
        assert_eq!(slices[0][0].pos.x, 2.0);
    }

    #[test]
    fn repeated_cell_is_rejected() {
        let mut tree = CellTree::from_cells(gas(4), vec![(0..2, unit()), (2..4, unit())]).unwrap();
        assert!(tree.partition_mut(&[0, 0]).is_err());
    }

    #[test]
    fn active_cells_respect_level_and_population() {
        let mut bodies = gas(4);
        bodies[2].level = 2;
        bodies[3].level = 2;
        let tree = CellTree::from_cells(
            bodies,
            vec![(0..2, unit()), (2..4, unit()), (4..4, unit())],
        )
        .unwrap();
        assert_eq!(tree.max_level, 2);
        assert_eq!(tree.active_cells(0), vec![0, 1]);
        assert_eq!(tree.active_cells(1), vec![1]);
    }
}
