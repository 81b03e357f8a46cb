mod kkt;
mod ldl;
mod linsol;

use sprs::{CsMat, TriMat};

use crate::Problem;

#[cfg(test)]
#[ctor::ctor]
fn init() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Debug)
        // .filter_level(log::LevelFilter::Trace)
        .format_module_path(false)
        .format_timestamp(None)
        .format_target(false)
        // .is_test(true)
        .init();
}

/// Sparse copy of a dense row-major matrix.
pub(crate) fn from_dense(rows: &[Vec<f64>]) -> CsMat<f64> {
    let ncols = rows.first().map_or(0, |row| row.len());
    let mut tri = TriMat::new((rows.len(), ncols));
    for (i, row) in rows.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            if v != 0.0 {
                tri.add_triplet(i, j, v);
            }
        }
    }
    tri.to_csr()
}

/// Three variables, two equalities, nonnegative variables.
///
/// Optimal at `x = (1, 1, 2)` with `y = (1, -1)` and objective `-12.5`.
pub(crate) fn toy_problem() -> Problem<f64> {
    let h_mat = from_dense(&[
        vec![4.0, 1.0, 0.0],
        vec![1.0, 3.0, 1.0],
        vec![0.0, 1.0, 5.0],
    ]);
    let a_mat = from_dense(&[vec![1.0, 1.0, 1.0], vec![1.0, -1.0, 0.0]]);
    Problem::new(
        &h_mat,
        vec![-5.0, -4.0, -10.0],
        0.0,
        &a_mat,
        vec![4.0, 0.0],
        vec![0.0; 3],
        vec![f64::INFINITY; 3],
    )
}
