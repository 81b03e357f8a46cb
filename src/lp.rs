use anyhow::Result;
use sprs::CsMat;

use crate::common::{Config, Statistics};
use crate::qp::qp;
use crate::traits::ProgressMonitor;

/// Linear Program solver based on an interior point method.
///
/// Solve the following LP (linear programming) problem:
///
/// ```txt
///       min c'*x
///        x
/// ```
///
/// subject to
///
/// ```txt
///       l <= A*x <= u       (linear constraints)
///       xmin <= x <= xmax   (variable bounds)
/// ```
pub fn lp(
    c: &[f64],
    a_mat: &CsMat<f64>,
    l: &[f64],
    u: &[f64],
    xmin: &[f64],
    xmax: &[f64],
    config: &Config,
    progress: Option<&dyn ProgressMonitor>,
) -> Result<Statistics> {
    let nx = c.len();
    let h_mat = CsMat::zero((nx, nx));

    qp(&h_mat, c, a_mat, l, u, xmin, xmax, config, progress)
}
