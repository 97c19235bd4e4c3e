// diagnostics/mod.rs
// Cross-rank aggregation of the per-cell samples and the text logs they feed

pub mod logfile;
pub mod quantile;

pub use logfile::DiagnosticLog;
pub use quantile::*;

use crate::collide::{MfpRecord, PassSamples, PhaseRecord};
use crate::comm::Communicator;
use crate::Result;

/// Quantiles of the last pass's per-cell diagnostics, one entry per level.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QuantileReport {
    pub levels: Vec<f64>,
    /// Mean free path over cell size.
    pub mfp_ratio: Vec<f64>,
    /// Cell crossing time at `crm` over the step.
    pub timescale_ratio: Vec<f64>,
    /// Accepted collisions per DSMC cell.
    pub collision_count: Vec<f64>,
    /// Bodies per selected candidate pair.
    pub selection_ratio: Vec<f64>,
    /// Relative deviation of the energy lost from the cooling budget.
    pub cooling_rate: Vec<f64>,
}

/// Every per-cell sample of a pass from all ranks, each column sorted
/// independently. MFP records sort by ratio, phase records by density.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SortedSamples {
    pub numcnt: Vec<u32>,
    pub colcnt: Vec<u32>,
    pub tsrat: Vec<f64>,
    pub tdens: Vec<f64>,
    pub tvolc: Vec<f64>,
    pub ttemp: Vec<f64>,
    pub tdelt: Vec<f64>,
    pub tseln: Vec<f64>,
    pub derat: Vec<f64>,
    pub mfp: Vec<MfpRecord>,
    pub phase: Vec<PhaseRecord>,
}

impl SortedSamples {
    pub fn report(&self, levels: &[f64]) -> QuantileReport {
        let mfp: Vec<f64> = self.mfp.iter().map(|r| r.ratio).collect();
        QuantileReport {
            levels: levels.to_vec(),
            mfp_ratio: quantiles_f64(&mfp, levels),
            timescale_ratio: quantiles_f64(&self.tsrat, levels),
            collision_count: quantiles_u32(&self.colcnt, levels),
            selection_ratio: quantiles_f64(&self.tseln, levels),
            cooling_rate: quantiles_f64(&self.derat, levels),
        }
    }

    /// Rows of the per-cell table; every column has one entry per recorded cell.
    pub fn rows(&self) -> usize {
        self.mfp.len()
    }
}

fn gather_sorted_f64<C: Communicator + ?Sized>(comm: &C, local: &[f64]) -> Result<Option<Vec<f64>>> {
    Ok(comm.gather_f64(local)?.map(|mut v| {
        sort_f64(&mut v);
        v
    }))
}

fn gather_records<C, T, const N: usize>(
    comm: &C,
    local: &[T],
    to_array: impl Fn(&T) -> [f64; N],
    from_slice: impl Fn(&[f64]) -> T,
) -> Result<Option<Vec<T>>>
where
    C: Communicator + ?Sized,
{
    let flat: Vec<f64> = local.iter().flat_map(|r| to_array(r)).collect();
    Ok(comm.gather_f64(&flat)?.map(|all| all.chunks_exact(N).map(&from_slice).collect()))
}

/// Gather every sample vector to rank 0 and sort it there. Collective.
pub fn gather_sorted<C: Communicator + ?Sized>(
    comm: &C,
    samples: &PassSamples,
) -> Result<Option<SortedSamples>> {
    let numcnt = comm.gather_u32(&samples.numcnt)?;
    let colcnt = comm.gather_u32(&samples.colcnt)?;
    let tsrat = gather_sorted_f64(comm, &samples.tsrat)?;
    let tdens = gather_sorted_f64(comm, &samples.tdens)?;
    let tvolc = gather_sorted_f64(comm, &samples.tvolc)?;
    let ttemp = gather_sorted_f64(comm, &samples.ttemp)?;
    let tdelt = gather_sorted_f64(comm, &samples.tdelt)?;
    let tseln = gather_sorted_f64(comm, &samples.tseln)?;
    let derat = gather_sorted_f64(comm, &samples.derat)?;
    let mfp = gather_records(comm, &samples.mfp, MfpRecord::to_array, MfpRecord::from_slice)?;
    let phase =
        gather_records(comm, &samples.phase, PhaseRecord::to_array, PhaseRecord::from_slice)?;

    let (
        Some(mut numcnt),
        Some(mut colcnt),
        Some(tsrat),
        Some(tdens),
        Some(tvolc),
        Some(ttemp),
        Some(tdelt),
        Some(tseln),
        Some(derat),
        Some(mut mfp),
        Some(mut phase),
    ) = (numcnt, colcnt, tsrat, tdens, tvolc, ttemp, tdelt, tseln, derat, mfp, phase)
    else {
        return Ok(None);
    };

    numcnt.sort_unstable();
    colcnt.sort_unstable();
    mfp.sort_unstable_by(|a, b| a.ratio.total_cmp(&b.ratio));
    phase.sort_unstable_by(|a, b| a.density.total_cmp(&b.density));

    Ok(Some(SortedSamples {
        numcnt,
        colcnt,
        tsrat,
        tdens,
        tvolc,
        ttemp,
        tdelt,
        tseln,
        derat,
        mfp,
        phase,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{LocalWorld, SingleRank};
    use std::thread;

    /// Rank r holds the values r, r + size, r + 2 size, ... so the union is
    /// 0..n in a known order.
    fn interleaved(rank: usize, size: usize, n: usize) -> PassSamples {
        let mut s = PassSamples::default();
        for v in (rank..n).step_by(size) {
            let x = v as f64;
            s.numcnt.push(v as u32);
            s.colcnt.push(v as u32);
            s.tsrat.push(x);
            s.tseln.push(x);
            s.derat.push(-x);
            s.mfp.push(MfpRecord { ratio: x, volume: 2.0 * x, ..Default::default() });
            s.phase.push(PhaseRecord { density: x, ..Default::default() });
        }
        s
    }

    #[test]
    fn distributed_quantiles_match_known_order() {
        let size = 3;
        let handles: Vec<_> = LocalWorld::new(size)
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let samples = interleaved(comm.rank(), size, 100);
                    let sorted = gather_sorted(&comm, &samples).unwrap();
                    (comm.rank(), sorted.map(|s| (s.report(&[0.25, 0.5, 0.75]), s)))
                })
            })
            .collect();

        for h in handles {
            let (rank, result) = h.join().unwrap();
            if rank != 0 {
                assert!(result.is_none());
                continue;
            }
            let (report, sorted) = result.unwrap();
            assert_eq!(report.mfp_ratio, vec![25.0, 50.0, 75.0]);
            assert_eq!(report.timescale_ratio, vec![25.0, 50.0, 75.0]);
            assert_eq!(report.collision_count, vec![25.0, 50.0, 75.0]);
            assert_eq!(report.selection_ratio, vec![25.0, 50.0, 75.0]);
            assert_eq!(report.cooling_rate, vec![-75.0, -50.0, -25.0]);
            // Records keep their own columns through the sort
            assert!(sorted.mfp.iter().all(|r| r.volume == 2.0 * r.ratio));
            assert_eq!(sorted.rows(), 100);
            assert_eq!(sorted.numcnt[99], 99);
        }
    }

    #[test]
    fn empty_samples_report_zeros() {
        let sorted = gather_sorted(&SingleRank, &PassSamples::default()).unwrap().unwrap();
        let r = sorted.report(&[0.5]);
        assert_eq!(r.mfp_ratio, vec![0.0]);
        assert_eq!(r.collision_count, vec![0.0]);
    }
}
