use super::cube::Cube;
use crate::body::VelocityMoments;
use std::ops::Range;

#[derive(Clone, Debug)]
pub struct Node {
    /// Index of the first of eight children, 0 for a leaf.
    pub children: usize,
    pub parent: usize,
    pub depth: usize,
    pub cube: Cube,
    pub bodies: Range<usize>,
    pub moments: VelocityMoments,
}

impl Node {
    pub fn new(parent: usize, depth: usize, cube: Cube, bodies: Range<usize>) -> Self {
        Self {
            children: 0,
            parent,
            depth,
            cube,
            bodies,
            moments: VelocityMoments::default(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children == 0
    }

    pub fn is_branch(&self) -> bool {
        self.children != 0
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}
