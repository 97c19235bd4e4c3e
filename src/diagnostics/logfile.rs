// diagnostics/logfile.rs
// Fixed-width text output for the collision diagnostics, written by rank 0

use super::{quantiles_u32, QuantileReport, SortedSamples};
use crate::collide::{CollisionEngine, CollisionTotals, InteractionPolicy};
use crate::comm::Communicator;
use crate::config::{DiagnosticsConfig, NUM_DIAG};
use crate::profiler::PassTimings;
use crate::Result;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

const STATS_COLUMNS: [&str; 15] = [
    "Time",
    "Step",
    "Collisions",
    "EPSM cells",
    "EPSM parts",
    "Int errors",
    "EPSM skip",
    "CBA viol",
    "Cons viol",
    "EPSM dE",
    "Int dE",
    "Disp(x)",
    "Disp(y)",
    "Disp(z)",
    "Imbalance",
];

const SORTED_COLUMNS: [&str; 12] = [
    "MFP/L",
    "Cyl radius",
    "Vertical",
    "Sph radius",
    "Density(MFP)",
    "Volume(MFP)",
    "TOF/TS",
    "Density",
    "Cell vol",
    "Cell temp",
    "Cool/part",
    "Number/Nsel",
];

const PHASE_COLUMNS: [&str; 5] = ["Density", "Temp", "Number", "Mass", "Volume"];

/// Writer for the per-run diagnostic files.
///
/// Every file is named `<run_tag>.<kind>` under `output_dir`. Running logs are
/// opened in append mode and get a header only when created; per-step dumps
/// are truncated.
pub struct DiagnosticLog {
    config: DiagnosticsConfig,
}

impl DiagnosticLog {
    pub fn new(config: &DiagnosticsConfig) -> Result<Self> {
        fs::create_dir_all(&config.output_dir)?;
        Ok(Self { config: config.clone() })
    }

    pub fn config(&self) -> &DiagnosticsConfig {
        &self.config
    }

    pub fn path(&self, kind: &str) -> PathBuf {
        self.config.output_dir.join(format!("{}.{}", self.config.run_tag, kind))
    }

    /// Whether `step` is an emission step.
    pub fn due(&self, step: usize) -> bool {
        self.config.interval > 0 && step % self.config.interval == 0
    }

    fn append(&self, kind: &str) -> Result<(BufWriter<File>, bool)> {
        let path = self.path(kind);
        let fresh = fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok((BufWriter::new(file), fresh))
    }

    /// One row of pass counters, EPSM/interaction energy loss, velocity
    /// dispersion and load balance, followed by the requested quantiles.
    pub fn write_stats(
        &self,
        time: f64,
        step: usize,
        totals: &CollisionTotals,
        dispersion: [f64; 3],
        timings: &PassTimings,
        report: Option<&QuantileReport>,
    ) -> Result<()> {
        let (mut w, fresh) = self.append("collide_stats")?;
        if fresh {
            for name in STATS_COLUMNS {
                write!(w, "{:>18}", name)?;
            }
            if let Some(r) = report {
                for q in &r.levels {
                    write!(w, "{:>18}", format!("MFP/L({q})"))?;
                    write!(w, "{:>18}", format!("TOF/TS({q})"))?;
                    write!(w, "{:>18}", format!("Coll({q})"))?;
                }
            }
            writeln!(w)?;
        }

        write!(w, "{:>18.6e}{:>18}", time, step)?;
        for c in [
            totals.collisions,
            totals.epsm_cells,
            totals.epsm_particles,
            totals.interaction_errors,
            totals.epsm_skipped,
            totals.cba_violations,
            totals.conservation_violations,
        ] {
            write!(w, "{:>18}", c)?;
        }
        write!(w, "{:>18.6e}{:>18.6e}", totals.epsm_energy_lost, totals.interaction_energy_lost)?;
        for d in dispersion {
            write!(w, "{:>18.6e}", d)?;
        }
        write!(w, "{:>18.4}", timings.imbalance())?;
        if let Some(r) = report {
            for i in 0..r.levels.len() {
                write!(
                    w,
                    "{:>18.6e}{:>18.6e}{:>18.6e}",
                    r.mfp_ratio[i], r.timescale_ratio[i], r.collision_count[i]
                )?;
            }
        }
        writeln!(w)?;
        w.flush()?;
        Ok(())
    }

    /// Crossing-time histogram, one column per bin.
    pub fn write_tdiag(&self, time: f64, tdiag: &[u64; NUM_DIAG]) -> Result<()> {
        let (mut w, _) = self.append("tdiag")?;
        write!(w, "{:>18.6e}", time)?;
        for n in tdiag {
            write!(w, "{:>8}", n)?;
        }
        writeln!(w)?;
        w.flush()?;
        Ok(())
    }

    /// Sorted collision counts per cell and their quantiles.
    pub fn write_colcnt(&self, time: f64, colcnt: &[u32], levels: &[f64]) -> Result<()> {
        let (mut w, _) = self.append("colcnt")?;
        writeln!(w, "Time: {:e}", time)?;
        writeln!(w, "Cell data:")?;
        for (i, c) in colcnt.iter().enumerate() {
            writeln!(w, "{:>8}{:>8}", i, c)?;
        }
        writeln!(w, "Quantiles:")?;
        for (q, v) in levels.iter().zip(quantiles_u32(colcnt, levels)) {
            writeln!(w, "{:>8}{:>18}", q, v)?;
        }
        w.flush()?;
        Ok(())
    }

    /// Full per-cell table for one step; each column sorted on its own.
    /// Occupancy covers every populated cell and is written as a separate
    /// block after the table.
    pub fn write_sorted(&self, step: usize, sorted: &SortedSamples) -> Result<()> {
        let mut w = BufWriter::new(File::create(self.path(&format!("collide.{step}")))?);
        for (i, name) in SORTED_COLUMNS.iter().enumerate() {
            writeln!(w, "# {:>2}: {}", i + 1, name)?;
        }

        let rows = sorted.rows();
        let at = |v: &[f64], i: usize| v.get(i).copied().unwrap_or(0.0);
        for i in 0..rows {
            let m = &sorted.mfp[i];
            for x in [
                m.ratio,
                m.cylindrical_radius,
                m.height,
                m.spherical_radius,
                m.density,
                m.volume,
                at(&sorted.tsrat, i),
                at(&sorted.tdens, i),
                at(&sorted.tvolc, i),
                at(&sorted.ttemp, i),
                at(&sorted.tdelt, i),
                at(&sorted.tseln, i),
            ] {
                write!(w, "{:>18.8e}", x)?;
            }
            writeln!(w)?;
        }
        writeln!(w, "# Occupancy: {} cells", sorted.numcnt.len())?;
        for n in &sorted.numcnt {
            writeln!(w, "{:>8}", n)?;
        }
        w.flush()?;
        Ok(())
    }

    /// Density-ordered phase-space table for one step.
    pub fn write_phase(&self, step: usize, sorted: &SortedSamples) -> Result<()> {
        let mut w = BufWriter::new(File::create(self.path(&format!("phase.{step}")))?);
        for name in PHASE_COLUMNS {
            write!(w, "{:>18}", name)?;
        }
        writeln!(w)?;
        for p in &sorted.phase {
            for x in p.to_array() {
                write!(w, "{:>18.8e}", x)?;
            }
            writeln!(w)?;
        }
        w.flush()?;
        Ok(())
    }

    /// Sample vector lengths per rank, `sizes` flattened rank-major.
    pub fn write_storage(&self, time: f64, sizes: &[u32], per_rank: usize) -> Result<()> {
        let (mut w, _) = self.append("collide_storage")?;
        for (rank, row) in sizes.chunks(per_rank.max(1)).enumerate() {
            write!(w, "{:>18.6e}{:>6}", time, rank)?;
            for s in row {
                write!(w, "{:>10}", s)?;
            }
            writeln!(w)?;
        }
        w.flush()?;
        Ok(())
    }

    /// Emit everything the configuration asks for after a pass.
    ///
    /// Collective: every rank must call it at the same step. Drains the
    /// engine's dispersion and crossing-time accumulators on every rank.
    pub fn emit<P, C>(
        &self,
        engine: &mut CollisionEngine<P, C>,
        step: usize,
        time: f64,
    ) -> Result<()>
    where
        P: InteractionPolicy,
        C: Communicator,
    {
        let dispersion = engine.dispersion();
        let tdiag = engine.take_tdiag();
        let sorted = engine.sorted_samples()?;
        let sizes: Vec<u32> =
            engine.local_samples().sizes().iter().map(|&s| s as u32).collect();
        let all_sizes = engine.comm().gather_u32(&sizes)?;

        let Some(sorted) = sorted else {
            return Ok(());
        };

        let levels = &self.config.quantiles;
        let report = sorted.report(levels);
        self.write_stats(
            time,
            step,
            engine.last_pass(),
            dispersion,
            engine.timings(),
            Some(&report),
        )?;
        self.write_tdiag(time, &tdiag)?;

        let medians = quantiles_u32(&sorted.numcnt, &[0.5]);
        let colls = quantiles_u32(&sorted.colcnt, &[0.5]);
        log::info!(
            "step {}: {} collisions, median N {} median coll {}, {} EPSM cells",
            step,
            engine.last_pass().collisions,
            medians[0],
            colls[0],
            engine.last_pass().epsm_cells
        );

        if self.config.sorted {
            self.write_sorted(step, &sorted)?;
        }
        if self.config.phase {
            self.write_phase(step, &sorted)?;
        }
        if self.config.extra {
            self.write_colcnt(time, &sorted.colcnt, levels)?;
            if let Some(all) = all_sizes {
                self.write_storage(time, &all, sizes.len())?;
            }
        }
        Ok(())
    }
}
