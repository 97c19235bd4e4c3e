use super::cube::Cube;
use super::node::Node;
use crate::body::{Body, VelocityMoments};
use crate::cell::{Cell, CellTree};
use crate::partition::Partition;
use crate::profile_scope;
use crate::Result;
use std::collections::HashMap;
use std::ops::Range;

/// Reference spatial partition: an octree whose leaves become collision cells.
///
/// Building reorders the body slice in place so every node owns a contiguous
/// index range, the same layout the collision engine consumes.
pub struct Octree {
    pub leaf_capacity: usize,
    /// Minimum population of the node used to estimate a cell's `crm`.
    pub sample_min: usize,
    pub max_depth: usize,
    pub nodes: Vec<Node>,
}

impl Octree {
    pub const ROOT: usize = 0;

    pub fn new(leaf_capacity: usize, sample_min: usize, max_depth: usize) -> Self {
        Self {
            leaf_capacity: leaf_capacity.max(1),
            sample_min,
            max_depth,
            nodes: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Split `node` into eight children. Returns `None` when the node must stay a leaf.
    fn subdivide(&mut self, node: usize, bodies: &mut [Body]) -> Option<usize> {
        let range = self.nodes[node].bodies.clone();
        let cube = self.nodes[node].cube;
        let depth = self.nodes[node].depth;

        // Coincident bodies or a vanishing cube cannot be separated further
        let all_same_pos = bodies[range.clone()]
            .windows(2)
            .all(|w| (w[0].pos - w[1].pos).mag_sq() < 1e-24);
        if all_same_pos || cube.size < 1e-12 || depth >= self.max_depth {
            return None;
        }

        let center = cube.center;
        let mut split = [range.start, 0, 0, 0, 0, 0, 0, 0, range.end];

        let predicate = |body: &Body| body.pos.z < center.z;
        split[4] = split[0] + bodies[split[0]..split[8]].partition(predicate);

        let predicate = |body: &Body| body.pos.y < center.y;
        split[2] = split[0] + bodies[split[0]..split[4]].partition(predicate);
        split[6] = split[4] + bodies[split[4]..split[8]].partition(predicate);

        let predicate = |body: &Body| body.pos.x < center.x;
        split[1] = split[0] + bodies[split[0]..split[2]].partition(predicate);
        split[3] = split[2] + bodies[split[2]..split[4]].partition(predicate);
        split[5] = split[4] + bodies[split[4]..split[6]].partition(predicate);
        split[7] = split[6] + bodies[split[6]..split[8]].partition(predicate);

        let children = self.nodes.len();
        self.nodes[node].children = children;
        let cubes = cube.subdivide();
        for i in 0..8 {
            self.nodes
                .push(Node::new(node, depth + 1, cubes[i], split[i]..split[i + 1]));
        }
        Some(children)
    }

    /// Accumulate leaf moments up to the root. Children always follow their
    /// parent in `nodes`, so one reverse sweep suffices.
    fn propagate(&mut self, bodies: &[Body]) {
        for node in self.nodes.iter_mut().filter(|n| n.is_leaf()) {
            node.moments = VelocityMoments::from_bodies(&bodies[node.bodies.clone()]);
        }
        for i in (1..self.nodes.len()).rev() {
            let parent = self.nodes[i].parent;
            let moments = self.nodes[i].moments;
            self.nodes[parent].moments.merge(&moments);
        }
    }

    pub fn build(&mut self, bodies: &mut [Body]) {
        profile_scope!("octree_build");
        self.clear();
        if bodies.is_empty() {
            return;
        }

        self.nodes.reserve(bodies.len() / self.leaf_capacity * 8 + 8);
        let cube = Cube::new_containing(bodies);
        self.nodes.push(Node::new(Self::ROOT, 0, cube, 0..bodies.len()));

        let mut stack = vec![Self::ROOT];
        while let Some(node) = stack.pop() {
            if self.nodes[node].bodies.len() <= self.leaf_capacity {
                continue;
            }
            if let Some(children) = self.subdivide(node, bodies) {
                for child in children..children + 8 {
                    if !self.nodes[child].is_empty() {
                        stack.push(child);
                    }
                }
            }
        }

        self.propagate(bodies);
    }

    /// Populated leaves in arena order.
    pub fn leaves(&self) -> Vec<usize> {
        let mut leaves: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| self.nodes[i].is_leaf() && !self.nodes[i].is_empty())
            .collect();
        leaves.sort_by_key(|&i| self.nodes[i].bodies.start);
        leaves
    }

    /// Nearest ancestor (or the node itself) holding at least `sample_min` bodies.
    pub fn sample_node(&self, mut node: usize) -> usize {
        while node != Self::ROOT && self.nodes[node].bodies.len() < self.sample_min {
            node = self.nodes[node].parent;
        }
        node
    }

    /// Turn the leaves into the cell view used by the collision engine.
    /// `bodies` must be the slice this tree was built over.
    pub fn cells(&self, bodies: Vec<Body>) -> Result<CellTree> {
        let mut sample_index: HashMap<usize, usize> = HashMap::new();
        let mut samples = Vec::new();
        let mut cells = Vec::new();

        for leaf in self.leaves() {
            let node = &self.nodes[leaf];
            let sample_node = self.sample_node(leaf);
            let sample = *sample_index.entry(sample_node).or_insert_with(|| {
                samples.push(self.nodes[sample_node].moments);
                samples.len() - 1
            });
            cells.push(Cell {
                bodies: node.bodies.clone(),
                cube: node.cube,
                level: min_level(&bodies, node.bodies.clone()),
                sample,
                moments: node.moments,
            });
        }

        CellTree::from_parts(bodies, cells, samples)
    }
}

fn min_level(bodies: &[Body], range: Range<usize>) -> usize {
    bodies[range].iter().map(|b| b.level).min().unwrap_or(0)
}
