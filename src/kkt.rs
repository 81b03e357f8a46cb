//! Regularized augmented (K2) system.
//!
//! ```txt
//!     [ -H - D - rho*I    A'      ]
//!     [       A          delta*I  ]
//! ```
//!
//! `D` holds the bound-slack ratios `s_l/(x - l)` and `s_u/(u - x)`. Only the
//! upper triangle is stored (CSC) and every diagonal entry is structurally
//! present, so refreshing the system for a new iterate only rewrites the
//! diagonal values.

use sprs::{CsMat, TriMat};

use crate::error::SolverError;
use crate::math::sym_upper_mat_vec;
use crate::point::Point;
use crate::problem::Problem;
use crate::traits::Real;

#[derive(Debug, Clone)]
pub struct KktSystem<T> {
    n: usize,
    m: usize,
    matrix: CsMat<T>,
    // Position of each diagonal entry in `matrix.data()`.
    diag_pos: Vec<usize>,
    hess_diag: Vec<T>,
    rho: T,
    delta: T,
}

/// Builds the regularized system for `point`.
pub fn assemble<T: Real>(
    problem: &Problem<T>,
    point: &Point<T>,
    rho: T,
    delta: T,
) -> Result<KktSystem<T>, SolverError> {
    let (n, m) = (problem.hessian().rows(), problem.ncon());
    check_dims(problem, point, n)?;

    let mut hess_diag = vec![T::zero(); n];
    let mut tri = TriMat::with_capacity(
        (n + m, n + m),
        problem.hessian().nnz() + problem.jacobian().nnz() + n + m,
    );
    for (&v, (i, j)) in problem.hessian().iter() {
        if i == j {
            hess_diag[i] += v;
        } else {
            tri.add_triplet(i, j, -v);
        }
    }
    for (&v, (i, j)) in problem.jacobian().iter() {
        tri.add_triplet(j, n + i, v);
    }
    for k in 0..n + m {
        tri.add_triplet(k, k, T::zero());
    }
    let matrix: CsMat<T> = tri.to_csc();

    let diag_pos = {
        let indptr = matrix.indptr();
        let a_p = indptr.raw_storage();
        let a_i = matrix.indices();
        // Present by construction.
        let pos: Vec<usize> = (0..n + m)
            .map(|k| {
                (a_p[k]..a_p[k + 1])
                    .find(|&p| a_i[p] == k)
                    .unwrap_or(a_p[k])
            })
            .collect();
        pos
    };

    let mut kkt = KktSystem {
        n,
        m,
        matrix,
        diag_pos,
        hess_diag,
        rho,
        delta,
    };
    kkt.update_diagonal(problem, point, rho, delta)?;
    Ok(kkt)
}

fn check_dims<T: Real>(problem: &Problem<T>, point: &Point<T>, n: usize) -> Result<(), SolverError> {
    let checks = [
        ("hessian cols", n, problem.hessian().cols()),
        ("jacobian cols", n, problem.jacobian().cols()),
        ("cost", n, problem.nvar()),
        ("x", n, point.x.len()),
        ("y", problem.ncon(), point.y.len()),
        ("s_l", n, point.s_l.len()),
        ("s_u", n, point.s_u.len()),
    ];
    for (what, expected, found) in checks {
        if expected != found {
            return Err(SolverError::DimensionMismatch {
                what,
                expected,
                found,
            });
        }
    }
    Ok(())
}

impl<T: Real> KktSystem<T> {
    /// Rewrites the iterate-dependent diagonal and the regularization.
    pub fn update_diagonal(
        &mut self,
        problem: &Problem<T>,
        point: &Point<T>,
        rho: T,
        delta: T,
    ) -> Result<(), SolverError> {
        check_dims(problem, point, self.n)?;
        self.rho = rho;
        self.delta = delta;

        let data = self.matrix.data_mut();
        for j in 0..self.n {
            let mut d = T::zero();
            if problem.has_lower(j) {
                d += point.s_l[j] / point.lower_gap(problem, j);
            }
            if problem.has_upper(j) {
                d += point.s_u[j] / point.upper_gap(problem, j);
            }
            data[self.diag_pos[j]] = -self.hess_diag[j] - d - rho;
        }
        for i in 0..self.m {
            data[self.diag_pos[self.n + i]] = delta;
        }
        Ok(())
    }

    /// `y = K0 x` with `K0` the system without `rho` and `delta`.
    pub fn mul_unregularized(&self, x: &[T], y: &mut [T]) {
        sym_upper_mat_vec(&self.matrix, x, y);
        for j in 0..self.n {
            y[j] += self.rho * x[j];
        }
        for i in self.n..self.n + self.m {
            y[i] -= self.delta * x[i];
        }
    }

    /// Upper triangle in CSC storage.
    pub fn matrix(&self) -> &CsMat<T> {
        &self.matrix
    }

    pub fn dim(&self) -> usize {
        self.n + self.m
    }

    /// Size of the primal block.
    pub fn nvar(&self) -> usize {
        self.n
    }

    pub fn ncon(&self) -> usize {
        self.m
    }

    pub fn rho(&self) -> T {
        self.rho
    }

    pub fn delta(&self) -> T {
        self.delta
    }

    pub fn diagonal(&self, k: usize) -> T {
        self.matrix.data()[self.diag_pos[k]]
    }
}
