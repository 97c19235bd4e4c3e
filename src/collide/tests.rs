use super::*;
use crate::cell::CellTree;
use crate::octree::Cube;
use crate::Error;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

const TAU: f64 = 0.01;
const FN: f64 = 0.01;

/// Cells of unit side laid out along x, each filled with a drifting
/// Gaussian gas of unit-mass bodies.
fn gas(sizes: &[usize], seed: u64) -> CellTree {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut bodies = Vec::new();
    let mut layout = Vec::new();
    for (c, &n) in sizes.iter().enumerate() {
        let center = DVec3::new(2.0 * c as f64, 0.0, 0.0);
        let start = bodies.len();
        for _ in 0..n {
            let mut g = || -> f64 { StandardNormal.sample(&mut rng) };
            let pos = center + DVec3::new(g(), g(), g()) * 0.1;
            let vel = DVec3::new(0.7 + g(), -0.3 + g(), g());
            bodies.push(Body::new(pos, vel, 1.0).with_attrib(&[0.0]));
        }
        layout.push((start..bodies.len(), Cube::new(center, 1.0)));
    }
    CellTree::from_cells(bodies, layout).unwrap()
}

fn config() -> CollideConfig {
    CollideConfig { threads: Some(1), temperature_floor: 0.0, cba: false, ..Default::default() }
}

fn momentum(tree: &CellTree) -> DVec3 {
    total_momentum(&tree.bodies)
}

fn kinetic(tree: &CellTree) -> f64 {
    tree.bodies.iter().map(Body::kinetic_energy).sum()
}

fn assert_close(a: f64, b: f64, rel: f64) {
    assert!((a - b).abs() <= rel * a.abs().max(b.abs()).max(1.0), "{a} vs {b}");
}

fn assert_momentum(before: DVec3, after: DVec3) {
    assert_close(before.x, after.x, 1e-10);
    assert_close(before.y, after.y, 1e-10);
    assert_close(before.z, after.z, 1e-10);
}

#[test]
fn empty_and_singleton_cells_do_nothing() {
    let mut tree = gas(&[0, 1], 1);
    let vel = tree.bodies[0].vel;
    let mut engine = CollisionEngine::single(config(), ElasticScattering).unwrap();
    assert_eq!(engine.collide(&mut tree, FN, TAU, 0).unwrap(), 0);
    assert_eq!(tree.bodies[0].vel, vel);
    assert_eq!(engine.local_samples().numcnt, vec![1]);
    assert_eq!(engine.local_samples().colcnt, vec![0]);
    assert_eq!(engine.last_pass().cells_processed, 0);
}

#[test]
fn dry_run_mutates_nothing() {
    let mut tree = gas(&[20, 25], 2);
    let before: Vec<(DVec3, DVec3)> = tree.bodies.iter().map(|b| (b.pos, b.vel)).collect();
    let cfg = CollideConfig { dry_run: true, cba: true, ..config() };
    let mut engine = CollisionEngine::single(cfg, FractionalLoss::new(0.5)).unwrap();

    assert_eq!(engine.collide(&mut tree, FN, TAU, 0).unwrap(), 0);
    for (b, (pos, vel)) in tree.bodies.iter().zip(before) {
        assert_eq!(b.pos, pos);
        assert_eq!(b.vel, vel);
    }
    let last = engine.last_pass();
    assert_eq!(last.dry_run_skipped, 2);
    assert_eq!(last.cells_processed, 2);
    // Bookkeeping still runs
    assert_eq!(engine.local_samples().tseln.len(), 2);
    assert!(engine.local_samples().colcnt.is_empty());
}

#[test]
fn dsmc_conserves_momentum_and_energy() {
    let mut tree = gas(&[30, 40, 25], 3);
    let (p0, e0) = (momentum(&tree), kinetic(&tree));
    let mut engine = CollisionEngine::single(config(), ElasticScattering).unwrap();

    let n = engine.collide(&mut tree, FN, TAU, 0).unwrap();
    assert!(n > 0);
    assert_momentum(p0, momentum(&tree));
    assert_close(e0, kinetic(&tree), 1e-10);
    assert_eq!(engine.local_samples().colcnt.iter().map(|&c| c as u64).sum::<u64>(), n);
    assert_eq!(engine.totals().collisions, n);
}

#[test]
fn epsm_conserves_momentum_for_both_strategies() {
    for mode in [ResamplingStrategy::Gaussian, ResamplingStrategy::ExactPartition] {
        let mut tree = gas(&[12, 2, 30], 4);
        let (p0, e0) = (momentum(&tree), kinetic(&tree));
        let cfg = CollideConfig { epsm_ratio: 1.0e30, resampling: mode, ..config() };
        let mut engine = CollisionEngine::single(cfg, ElasticScattering).unwrap();

        assert_eq!(engine.collide(&mut tree, FN, TAU, 0).unwrap(), 0);
        assert_momentum(p0, momentum(&tree));
        // No budget: the internal energy is only redistributed
        assert_close(e0, kinetic(&tree), 1e-9);
        let last = engine.last_pass();
        assert_eq!(last.epsm_cells, 3);
        assert_eq!(last.epsm_particles, 44);
        assert_eq!(last.conservation_violations, 0);
        assert!(engine.local_samples().colcnt.is_empty());
    }
}

#[test]
fn epsm_removes_the_cooling_budget() {
    let mut tree = gas(&[40, 50], 5);
    let internal: f64 = tree.cells.iter().map(|c| c.moments.internal_energy()).sum();
    let masses: f64 = tree.cells.iter().map(|c| c.moments.mass).sum();
    let (p0, e0) = (momentum(&tree), kinetic(&tree));
    let rate = 0.1 * internal / masses / TAU;
    let cfg = CollideConfig { epsm_ratio: 1.0e30, ..config() };
    let mut engine =
        CollisionEngine::single(cfg, FractionalLoss::new(0.0).with_cooling_rate(rate)).unwrap();

    engine.collide(&mut tree, FN, TAU, 0).unwrap();
    let lost = engine.epsm_energy_lost();
    assert_close(lost, rate * masses * TAU, 1e-9);
    assert!(lost <= internal);
    assert_close(e0 - kinetic(&tree), lost, 1e-9);
    assert_momentum(p0, momentum(&tree));
    for d in &engine.local_samples().derat {
        assert!(d.abs() < 1e-9);
    }
}

#[test]
fn cooling_stops_at_the_temperature_floor() {
    let mut tree = gas(&[30], 6);
    let internal = tree.cells[0].moments.internal_energy();
    let mass = tree.cells[0].moments.mass;
    let mut cfg = CollideConfig { epsm_ratio: 1.0e30, ..config() };
    cfg.temperature_floor = cfg.units.temperature(0.5 * internal, mass);
    let huge = 10.0 * internal / mass / TAU;
    let mut engine =
        CollisionEngine::single(cfg, FractionalLoss::new(0.0).with_cooling_rate(huge)).unwrap();

    engine.collide(&mut tree, FN, TAU, 0).unwrap();
    assert_close(engine.epsm_energy_lost(), 0.5 * internal, 1e-9);
}

#[test]
fn epsm_absorbs_excess_energy() {
    let mut tree = gas(&[30], 7);
    for b in tree.bodies.iter_mut() {
        b.attrib[0] = 0.01;
    }
    let cfg = CollideConfig { epsm_ratio: 1.0e30, excess_energy_attr: Some(0), ..config() };
    let mut engine = CollisionEngine::single(cfg, ElasticScattering).unwrap();

    engine.collide(&mut tree, FN, TAU, 0).unwrap();
    assert_close(engine.epsm_energy_lost(), 0.3, 1e-9);
    assert!(tree.bodies.iter().all(|b| b.attrib[0] == 0.0));
}

#[test]
fn skipped_epsm_cell_keeps_owed_excess() {
    let mut tree = gas(&[20], 17);
    let internal = tree.cells[0].moments.internal_energy();
    for b in tree.bodies.iter_mut() {
        b.attrib[0] = internal;
    }
    let vel: Vec<DVec3> = tree.bodies.iter().map(|b| b.vel).collect();
    let cfg = CollideConfig { epsm_ratio: 1.0e30, excess_energy_attr: Some(0), ..config() };
    let mut engine = CollisionEngine::single(cfg, ElasticScattering).unwrap();

    engine.collide(&mut tree, FN, TAU, 0).unwrap();
    assert_eq!(engine.last_pass().epsm_skipped, 1);
    assert_eq!(engine.epsm_energy_lost(), 0.0);
    assert!(tree.bodies.iter().zip(vel).all(|(b, v)| b.vel == v));
    assert!(tree.bodies.iter().all(|b| b.attrib[0] == internal));
}

#[test]
fn massless_body_in_epsm_cell_stays_finite() {
    let mut bodies = gas(&[6], 18).bodies;
    bodies[0].mass = 0.0;
    let mut tree = CellTree::from_cells(bodies, vec![(0..6, Cube::new(DVec3::zero(), 1.0))]).unwrap();
    let p0 = momentum(&tree);
    let cfg = CollideConfig {
        epsm_ratio: 1.0e30,
        resampling: ResamplingStrategy::ExactPartition,
        ..config()
    };
    let mut engine = CollisionEngine::single(cfg, ElasticScattering).unwrap();

    engine.collide(&mut tree, FN, TAU, 0).unwrap();
    assert!(tree.bodies.iter().all(|b| b.vel.x.is_finite() && b.vel.y.is_finite() && b.vel.z.is_finite()));
    assert_momentum(p0, momentum(&tree));
    assert_eq!(engine.last_pass().conservation_violations, 0);
    assert_eq!(engine.last_pass().epsm_cells, 1);
}

#[test]
fn dsmc_books_unmet_budget_as_excess() {
    let mut tree = gas(&[30], 8);
    let mass = tree.cells[0].moments.mass;
    let rate = 2.0;
    let cfg = CollideConfig { excess_energy_attr: Some(0), ..config() };
    let mut engine =
        CollisionEngine::single(cfg, FractionalLoss::new(0.0).with_cooling_rate(rate)).unwrap();

    engine.collide(&mut tree, FN, TAU, 0).unwrap();
    let owed: f64 = tree.bodies.iter().map(|b| b.attrib[0]).sum();
    assert_close(owed, -rate * mass * TAU, 1e-12);
}

#[test]
fn inelastic_pairs_lose_reported_energy() {
    let mut tree = gas(&[40], 9);
    let (p0, e0) = (momentum(&tree), kinetic(&tree));
    let mut engine = CollisionEngine::single(config(), FractionalLoss::new(0.25)).unwrap();

    let n = engine.collide(&mut tree, FN, 5.0 * TAU, 0).unwrap();
    assert!(n > 0);
    let lost = engine.last_pass().interaction_energy_lost;
    assert!(lost > 0.0);
    assert_close(e0 - kinetic(&tree), lost, 1e-9);
    assert_momentum(p0, momentum(&tree));
}

#[test]
fn interaction_errors_are_counted_and_discarded() {
    let mut tree = gas(&[40], 10);
    let before: Vec<DVec3> = tree.bodies.iter().map(|b| b.vel).collect();
    let mut engine = CollisionEngine::single(config(), FractionalLoss::new(2.0)).unwrap();

    assert_eq!(engine.collide(&mut tree, FN, 5.0 * TAU, 0).unwrap(), 0);
    assert!(engine.last_pass().interaction_errors > 0);
    assert!(tree.bodies.iter().zip(before).all(|(b, v)| b.vel == v));
    assert_eq!(engine.local_samples().colcnt, vec![0]);
}

#[test]
fn oversized_displacements_are_counted_and_applied() {
    let mut tree = gas(&[30], 11);
    let before: Vec<DVec3> = tree.bodies.iter().map(|b| b.pos).collect();
    let p0 = momentum(&tree);
    let cfg = CollideConfig { cba: true, diameter: 10.0, ..config() };
    let mut engine = CollisionEngine::single(cfg, ElasticScattering).unwrap();

    let n = engine.collide(&mut tree, FN, 1.0e-3, 0).unwrap();
    assert!(n > 0);
    assert!(engine.last_pass().cba_violations > 0);
    assert!(tree.bodies.iter().zip(before).any(|(b, p)| b.pos != p));
    assert_momentum(p0, momentum(&tree));
}

#[test]
fn thread_count_does_not_change_coverage() {
    let sizes = [12, 0, 7, 30, 3, 18, 1, 9];
    let mut results = Vec::new();
    for threads in [1, 4] {
        let mut tree = gas(&sizes, 12);
        let p0 = momentum(&tree);
        let cfg = CollideConfig { threads: Some(threads), ..config() };
        let mut engine = CollisionEngine::single(cfg, ElasticScattering).unwrap();
        engine.collide(&mut tree, FN, TAU, 0).unwrap();
        assert_momentum(p0, momentum(&tree));
        assert_eq!(engine.timings().busy.len(), threads);

        let mut numcnt = engine.local_samples().numcnt.clone();
        numcnt.sort_unstable();
        results.push((numcnt, engine.last_pass().cells_listed));
    }
    assert_eq!(results[0], results[1]);
    assert_eq!(results[0].1, 7);
}

#[test]
fn coarse_cells_wait_for_their_level() {
    let mut tree = gas(&[10, 10], 13);
    let layout = tree.cells.iter().map(|c| (c.bodies.clone(), c.cube)).collect();
    let mut bodies = std::mem::take(&mut tree.bodies);
    for b in &mut bodies[10..] {
        b.level = 2;
    }
    let mut tree = CellTree::from_cells(bodies, layout).unwrap();
    let mut engine = CollisionEngine::single(config(), ElasticScattering).unwrap();
    engine.collide(&mut tree, FN, TAU, 1).unwrap();
    assert_eq!(engine.local_samples().numcnt, vec![10]);
}

#[test]
fn dispersion_drains() {
    let mut tree = gas(&[25, 25], 14);
    let mut engine = CollisionEngine::single(config(), ElasticScattering).unwrap();
    engine.collide(&mut tree, FN, TAU, 0).unwrap();
    let d = engine.dispersion();
    assert!(d.iter().all(|&x| x > 0.1 && x < 10.0));
    assert_eq!(engine.dispersion(), [0.0; 3]);

    let tdiag = engine.take_tdiag();
    assert_eq!(tdiag.iter().sum::<u64>(), 2);
    assert_eq!(engine.take_tdiag().iter().sum::<u64>(), 0);
}

#[test]
fn order_statistics_on_a_single_rank() {
    let mut tree = gas(&[4, 8, 6], 15);
    let mut engine = CollisionEngine::single(config(), ElasticScattering).unwrap();
    engine.collide(&mut tree, FN, TAU, 0).unwrap();

    assert_eq!(engine.median_number().unwrap(), Some(6));
    assert!(engine.median_collisions().unwrap().is_some());
    let (q, all) = engine.collision_quantiles(&[0.0, 1.0]).unwrap().unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(q, vec![all[0] as f64, all[2] as f64]);

    let report = engine.quantiles(&[0.25, 0.5, 0.75]).unwrap().unwrap();
    assert_eq!(report.mfp_ratio.len(), 3);
    assert!(report.mfp_ratio.windows(2).all(|w| w[0] <= w[1]));
    assert!(report.selection_ratio.iter().all(|&s| s > 0.0));
}

#[test]
fn rejects_bad_step_parameters() {
    let mut tree = gas(&[5], 16);
    let mut engine = CollisionEngine::single(config(), ElasticScattering).unwrap();
    assert!(matches!(engine.collide(&mut tree, 0.0, TAU, 0), Err(Error::InvalidParam(_))));
    assert!(matches!(engine.collide(&mut tree, FN, f64::NAN, 0), Err(Error::InvalidParam(_))));
}

#[test]
fn engine_rejects_invalid_config() {
    let cfg = CollideConfig { threads: Some(0), ..config() };
    assert!(CollisionEngine::single(cfg, ElasticScattering).is_err());
}
