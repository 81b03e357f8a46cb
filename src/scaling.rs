//! Ruiz equilibration.
//!
//! Each pass divides every column `j` of `[H A'; A 0]` by the square root of
//! its infinity norm and every constraint row `i` of `A` likewise, so all
//! norms approach one. With `D = diag(col)` and `R = diag(row)` the scaled
//! problem is
//!
//! ```txt
//!     H~ = D H D,  A~ = R A D,  c~ = D c,  b~ = R b,  l~ = l / d,  u~ = u / d
//! ```
//!
//! and a scaled solution maps back through `x = D x~`, `y = R y~` and
//! `s = s~ / d`.

use sprs::{CsMat, TriMat};

use crate::point::Point;
use crate::problem::Problem;

// Factors are kept within [1/MAX_SCALE, MAX_SCALE].
const MAX_SCALE: f64 = 1e4;
const MIN_NORM: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub struct Scaling {
    /// Column factors `d` (one per variable).
    pub col: Vec<f64>,
    /// Row factors `r` (one per constraint).
    pub row: Vec<f64>,
}

impl Scaling {
    pub fn identity(n: usize, m: usize) -> Self {
        Self {
            col: vec![1.0; n],
            row: vec![1.0; m],
        }
    }

    /// Accumulated factors of up to `passes` equilibration passes.
    pub fn ruiz(problem: &Problem<f64>, passes: usize) -> Self {
        let (n, m) = (problem.nvar(), problem.ncon());
        let mut scaling = Self::identity(n, m);

        for _ in 0..passes {
            let mut col_norms = vec![0.0_f64; n];
            let mut row_norms = vec![0.0_f64; m];

            for (&v, (i, j)) in problem.hessian().iter() {
                let v = (scaling.col[i] * v * scaling.col[j]).abs();
                col_norms[j] = col_norms[j].max(v);
                if i != j {
                    col_norms[i] = col_norms[i].max(v);
                }
            }
            for (&v, (i, j)) in problem.jacobian().iter() {
                let v = (scaling.row[i] * v * scaling.col[j]).abs();
                col_norms[j] = col_norms[j].max(v);
                row_norms[i] = row_norms[i].max(v);
            }

            let settled = col_norms
                .iter()
                .chain(&row_norms)
                .all(|&norm| norm < MIN_NORM || (1.0 - norm).abs() < 1e-3);
            if settled {
                break;
            }

            for (d, &norm) in scaling.col.iter_mut().zip(&col_norms) {
                *d = update(*d, norm);
            }
            for (r, &norm) in scaling.row.iter_mut().zip(&row_norms) {
                *r = update(*r, norm);
            }
        }
        scaling
    }

    pub fn is_identity(&self) -> bool {
        self.col.iter().chain(&self.row).all(|&v| v == 1.0)
    }

    /// The equilibrated problem.
    pub fn scale_problem(&self, problem: &Problem<f64>) -> Problem<f64> {
        if self.is_identity() {
            return problem.clone();
        }
        let (d, r) = (&self.col, &self.row);

        let hessian = scale_entries(problem.hessian(), d, d).to_csc();
        let jacobian = scale_entries(problem.jacobian(), r, d).to_csr();
        let cost = problem.cost().iter().zip(d).map(|(&c, &dj)| c * dj).collect();
        let rhs = problem.rhs().iter().zip(r).map(|(&b, &ri)| b * ri).collect();
        // Infinite bounds stay infinite.
        let lower = problem.lower().iter().zip(d).map(|(&l, &dj)| l / dj).collect();
        let upper = problem.upper().iter().zip(d).map(|(&u, &dj)| u / dj).collect();

        Problem::from_parts(
            hessian,
            jacobian,
            rhs,
            cost,
            problem.offset(),
            lower,
            upper,
            problem.original_nvar(),
        )
    }

    /// Maps a solution of the scaled problem back to the original one.
    pub fn unscale_point(&self, point: &mut Point<f64>) {
        for (j, &dj) in self.col.iter().enumerate() {
            point.x[j] *= dj;
            point.s_l[j] /= dj;
            point.s_u[j] /= dj;
        }
        for (y, &ri) in point.y.iter_mut().zip(&self.row) {
            *y *= ri;
        }
    }
}

fn update(factor: f64, norm: f64) -> f64 {
    if norm < MIN_NORM {
        return factor;
    }
    (factor / norm.sqrt()).clamp(1.0 / MAX_SCALE, MAX_SCALE)
}

fn scale_entries(mat: &CsMat<f64>, left: &[f64], right: &[f64]) -> TriMat<f64> {
    let mut tri = TriMat::with_capacity((mat.rows(), mat.cols()), mat.nnz());
    for (&v, (i, j)) in mat.iter() {
        tri.add_triplet(i, j, left[i] * v * right[j]);
    }
    tri
}
