use anyhow::{Context, Result};
use sprs::CsMat;

use crate::common::{Config, Statistics};
use crate::ipm::solve_with_progress;
use crate::problem::Problem;
use crate::traits::ProgressMonitor;

/// Quadratic Program Solver based on an interior point method.
///
/// Solve the following QP (quadratic programming) problem:
///
/// ```txt
///       min 1/2 x'*H*x + c'*x
///        x
/// ```
///
/// subject to
///
/// ```txt
///       l <= A*x <= u       (linear constraints)
///       xmin <= x <= xmax   (variable bounds)
/// ```
///
/// `h_mat` is a sparse symmetric matrix of quadratic cost coefficients.
/// `c` is a vector of linear cost coefficients.
/// `a_mat`, `l`, `u` define the linear constraints; infinite limits are
/// allowed and `l[i] == u[i]` makes row `i` an equality.
/// `xmin` and `xmax` define bounds on the `x` variables.
///
/// The multipliers in [`Statistics::y`] belong to the rows of `A` that have
/// at least one finite limit, in order, followed by one row per fixed
/// variable. They are positive where a lower limit is binding.
pub fn qp(
    h_mat: &CsMat<f64>,
    c: &[f64],
    a_mat: &CsMat<f64>,
    l: &[f64],
    u: &[f64],
    xmin: &[f64],
    xmax: &[f64],
    config: &Config,
    progress: Option<&dyn ProgressMonitor>,
) -> Result<Statistics> {
    let problem = Problem::with_ranges(
        h_mat,
        c.to_vec(),
        0.0,
        a_mat,
        l,
        u,
        xmin.to_vec(),
        xmax.to_vec(),
    )
    .context("invalid QP data")?;

    let stats = solve_with_progress(&problem, config, progress).context("QP solve failed")?;
    Ok(stats)
}
