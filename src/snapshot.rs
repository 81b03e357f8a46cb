//! Matrix-market dumps of the Newton systems.
//!
//! For a due iteration `k` the assembled matrix goes to
//! `{prefix}_{k}_kkt.mtx` (coordinate, symmetric, upper triangle) and every
//! right-hand side to `{prefix}_{k}_{tag}.mtx` (dense array, one column).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use sprs::io::{write_matrix_market_sym, SymmetryMode};

use crate::common::SnapshotPolicy;
use crate::error::SolverError;
use crate::kkt::KktSystem;
use crate::traits::Real;

/// Writes the snapshot of `iteration` when `policy` says it is due and
/// returns the number of files written. Nothing in the solver state is
/// touched.
pub fn maybe_snapshot<T: Real>(
    iteration: usize,
    system: Option<&KktSystem<T>>,
    rhs: &[(&str, Vec<T>)],
    policy: &SnapshotPolicy,
) -> Result<usize, SolverError> {
    if !policy.is_due(iteration) {
        return Ok(0);
    }
    write_snapshot(iteration, system, rhs, policy)
        .map_err(|err| SolverError::SnapshotWrite(format!("{:#}", err)))
}

/// `{prefix}_{iteration}_{tag}.mtx`
pub fn snapshot_path(policy: &SnapshotPolicy, iteration: usize, tag: &str) -> PathBuf {
    let mut name = policy.prefix.clone().into_os_string();
    name.push(format!("_{}_{}.mtx", iteration, tag));
    PathBuf::from(name)
}

fn write_snapshot<T: Real>(
    iteration: usize,
    system: Option<&KktSystem<T>>,
    rhs: &[(&str, Vec<T>)],
    policy: &SnapshotPolicy,
) -> anyhow::Result<usize> {
    let mut written = 0;
    if let Some(system) = system {
        let path = snapshot_path(policy, iteration, "kkt");
        let matrix = system.matrix().map(|&v| v.as_f64());
        write_matrix_market_sym(&path, &matrix, SymmetryMode::Symmetric)
            .with_context(|| format!("cannot write {}", path.display()))?;
        written += 1;
    }
    for (tag, values) in rhs {
        let path = snapshot_path(policy, iteration, tag);
        write_dense(&path, values).with_context(|| format!("cannot write {}", path.display()))?;
        written += 1;
    }
    Ok(written)
}

fn write_dense<T: Real>(path: &Path, values: &[T]) -> anyhow::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "%%MatrixMarket matrix array real general")?;
    writeln!(writer, "{} 1", values.len())?;
    for v in values {
        writeln!(writer, "{:e}", v.as_f64())?;
    }
    writer.flush()?;
    Ok(())
}
