use super::accumulator::ThreadAccumulator;
use crate::body::{Body, VelocityMoments};
use crate::cell::{Cell, CellTree};
use crate::Result;
use rayon::ThreadPool;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

/// Cells owned by one worker for one pass, each paired with its bodies.
pub type CellJobs<'a> = Vec<(usize, &'a mut [Body])>;

/// Round-robin assignment of the populated cells at or above `mlevel`.
pub fn build_worklist(tree: &CellTree, mlevel: usize, nthreads: usize) -> Vec<Vec<usize>> {
    let nthreads = nthreads.max(1);
    let mut lists = vec![Vec::new(); nthreads];
    for (n, cell) in tree.active_cells(mlevel).into_iter().enumerate() {
        lists[n % nthreads].push(cell);
    }
    lists
}

/// Split the body arena along the worklist so each worker gets exclusive
/// slices for exactly the cells it was assigned.
pub fn assign<'t>(
    tree: &'t mut CellTree,
    worklist: &[Vec<usize>],
) -> Result<(&'t [Cell], &'t [VelocityMoments], Vec<CellJobs<'t>>)> {
    let flat: Vec<usize> = worklist.iter().flatten().copied().collect();
    let (cells, samples, slices) = tree.partition_mut(&flat)?;
    let mut slices = slices.into_iter();
    let mut jobs = Vec::with_capacity(worklist.len());
    for list in worklist {
        let job: CellJobs<'t> = list.iter().copied().zip(slices.by_ref()).collect();
        jobs.push(job);
    }
    Ok((cells, samples, jobs))
}

fn run_list<F>(jobs: CellJobs<'_>, acc: &mut ThreadAccumulator, work: &F)
where
    F: Fn(usize, &mut [Body], &mut ThreadAccumulator) + Sync,
{
    let start = Instant::now();
    for (cell, bodies) in jobs {
        work(cell, bodies, acc);
    }
    acc.busy += start.elapsed();
}

/// Fork one task per worker list and join them all.
///
/// A panic inside any worker means some cells were never processed; the pass
/// cannot be completed, so the process aborts.
pub fn run<F>(
    pool: Option<&ThreadPool>,
    jobs: Vec<CellJobs<'_>>,
    accumulators: &mut [ThreadAccumulator],
    work: &F,
) where
    F: Fn(usize, &mut [Body], &mut ThreadAccumulator) + Sync,
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| match pool {
        Some(pool) if jobs.len() > 1 => pool.scope(|s| {
            for (list, acc) in jobs.into_iter().zip(accumulators.iter_mut()) {
                s.spawn(move |_| run_list(list, acc, work));
            }
        }),
        _ => {
            for (list, acc) in jobs.into_iter().zip(accumulators.iter_mut()) {
                run_list(list, acc, work);
            }
        }
    }));

    if outcome.is_err() {
        log::error!("collision worker panicked; pass incomplete, aborting");
        std::process::abort();
    }
}
