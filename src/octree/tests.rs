#[cfg(test)]
mod tests {
    use crate::body::Body;
    use crate::octree::{Cube, Octree};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use ultraviolet::DVec3;

    fn cloud(n: usize, seed: u64) -> Vec<Body> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let pos = DVec3::new(rng.random(), rng.random(), rng.random());
                let vel = DVec3::new(
                    rng.random::<f64>() - 0.5,
                    rng.random::<f64>() - 0.5,
                    rng.random::<f64>() - 0.5,
                );
                Body::new(pos, vel, 1.0)
            })
            .collect()
    }

    #[test]
    fn leaves_cover_every_body_once() {
        let mut bodies = cloud(500, 3);
        let mut tree = Octree::new(16, 32, 20);
        tree.build(&mut bodies);

        let mut covered = vec![0usize; bodies.len()];
        for leaf in tree.leaves() {
            let node = &tree.nodes[leaf];
            assert!(node.bodies.len() <= 16);
            for i in node.bodies.clone() {
                covered[i] += 1;
                let d = bodies[i].pos - node.cube.center;
                let half = 0.5 * node.cube.size * (1.0 + 1e-9);
                assert!(
                    d.x.abs() <= half && d.y.abs() <= half && d.z.abs() <= half,
                    "body {} outside its leaf",
                    i
                );
            }
        }
        assert!(covered.iter().all(|&c| c == 1));
    }

    #[test]
    fn root_moments_match_bodies() {
        let mut bodies = cloud(200, 9);
        let mut tree = Octree::new(8, 16, 20);
        tree.build(&mut bodies);
        let root = tree.nodes[Octree::ROOT].moments;
        let mass: f64 = bodies.iter().map(|b| b.mass).sum();
        let px: f64 = bodies.iter().map(|b| b.mass * b.vel.x).sum();
        assert!((root.mass - mass).abs() < 1e-9);
        assert!((root.mv[0] - px).abs() < 1e-9);
    }

    #[test]
    fn sample_cells_reach_minimum_population() {
        let mut bodies = cloud(300, 5);
        let mut tree = Octree::new(4, 40, 20);
        tree.build(&mut bodies);
        for leaf in tree.leaves() {
            let s = tree.sample_node(leaf);
            assert!(tree.nodes[s].bodies.len() >= 40 || s == Octree::ROOT);
            let r = &tree.nodes[s].bodies;
            let l = &tree.nodes[leaf].bodies;
            assert!(r.start <= l.start && l.end <= r.end);
        }
    }

    #[test]
    fn coincident_bodies_stay_in_one_leaf() {
        let mut bodies: Vec<Body> = (0..10)
            .map(|_| Body::new(DVec3::new(0.5, 0.5, 0.5), DVec3::zero(), 1.0))
            .collect();
        let mut tree = Octree::new(2, 2, 20);
        tree.build(&mut bodies);
        assert_eq!(tree.leaves().len(), 1);
    }

    #[test]
    fn cells_carry_levels_and_volumes() {
        let mut bodies = cloud(100, 1);
        for (i, b) in bodies.iter_mut().enumerate() {
            b.level = i % 3;
        }
        let mut tree = Octree::new(10, 20, 20);
        tree.build(&mut bodies);
        let cells = tree.cells(bodies).unwrap();
        assert_eq!(cells.max_level, 2);
        let total: usize = cells.cells.iter().map(|c| c.len()).sum();
        assert_eq!(total, 100);
        for c in &cells.cells {
            let min = cells.bodies[c.bodies.clone()].iter().map(|b| b.level).min().unwrap();
            assert_eq!(c.level, min);
            assert!(c.volume() > 0.0);
            assert!(c.sample < cells.samples.len());
        }
    }

    #[test]
    fn octants_tile_the_parent() {
        let cube = Cube::new(DVec3::new(1.0, 1.0, 1.0), 2.0);
        let children = cube.subdivide();
        let vol: f64 = children.iter().map(|c| c.volume()).sum();
        assert!((vol - cube.volume()).abs() < 1e-12);
        assert_eq!(children[0].center, DVec3::new(0.5, 0.5, 0.5));
        assert_eq!(children[7].center, DVec3::new(1.5, 1.5, 1.5));
    }
}
