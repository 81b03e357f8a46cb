use crate::math::{dot, mat_t_vec, mat_vec, norm_inf, sym_upper_mat_vec};
use crate::problem::Problem;
use crate::traits::Real;

/// Primal-dual iterate.
///
/// `s_l[j]` and `s_u[j]` are the duals of the lower and upper bound of
/// variable `j`. They stay zero for bounds that are infinite.
#[derive(Debug, Clone, PartialEq)]
pub struct Point<T> {
    pub x: Vec<T>,
    pub y: Vec<T>,
    pub s_l: Vec<T>,
    pub s_u: Vec<T>,
}

impl<T: Real> Point<T> {
    /// Starting point: `x` strictly inside all finite bounds and close to
    /// the origin, `y = 0` and unit bound duals.
    pub fn initial(problem: &Problem<T>) -> Self {
        let n = problem.nvar();
        let (one, half) = (T::one(), T::of(0.5));
        let mut x = vec![T::zero(); n];
        let mut s_l = vec![T::zero(); n];
        let mut s_u = vec![T::zero(); n];

        for j in 0..n {
            let (l, u) = (problem.lower()[j], problem.upper()[j]);
            x[j] = match (problem.has_lower(j), problem.has_upper(j)) {
                (true, true) => {
                    let theta = one.min(half * (u - l));
                    T::zero().max(l + theta).min(u - theta)
                }
                (true, false) => T::zero().max(l + one),
                (false, true) => T::zero().min(u - one),
                (false, false) => T::zero(),
            };
            if problem.has_lower(j) {
                s_l[j] = one;
            }
            if problem.has_upper(j) {
                s_u[j] = one;
            }
        }

        Self {
            x,
            y: vec![T::zero(); problem.ncon()],
            s_l,
            s_u,
        }
    }

    /// Pushes `x` and the bound duals back into the strict interior.
    ///
    /// Rounding while changing precision can land a variable on its bound.
    pub fn ensure_interior(&mut self, problem: &Problem<T>) {
        let eps = T::epsilon().sqrt();
        for j in 0..problem.nvar() {
            let (l, u) = (problem.lower()[j], problem.upper()[j]);
            if problem.has_lower(j) {
                let margin = eps * T::one().max(l.abs());
                if self.x[j] - l < margin {
                    self.x[j] = l + margin;
                }
                self.s_l[j] = self.s_l[j].max(eps);
            }
            if problem.has_upper(j) {
                let margin = eps * T::one().max(u.abs());
                if u - self.x[j] < margin {
                    self.x[j] = u - margin;
                }
                self.s_u[j] = self.s_u[j].max(eps);
            }
            if problem.has_lower(j) && problem.has_upper(j) && self.x[j] <= l {
                self.x[j] = l + T::of(0.5) * (u - l);
            }
        }
    }

    /// Copy at another precision.
    pub fn cast<U: Real>(&self) -> Point<U> {
        let conv = |v: &[T]| v.iter().map(|&x| U::of(x.as_f64())).collect::<Vec<U>>();
        Point {
            x: conv(&self.x),
            y: conv(&self.y),
            s_l: conv(&self.s_l),
            s_u: conv(&self.s_u),
        }
    }

    /// `x - lower` for variable `j`.
    pub fn lower_gap(&self, problem: &Problem<T>, j: usize) -> T {
        self.x[j] - problem.lower()[j]
    }

    /// `upper - x` for variable `j`.
    pub fn upper_gap(&self, problem: &Problem<T>, j: usize) -> T {
        problem.upper()[j] - self.x[j]
    }

    /// True if every finite bound is strictly satisfied and every bound
    /// dual is strictly positive.
    pub fn is_interior(&self, problem: &Problem<T>) -> bool {
        (0..problem.nvar()).all(|j| {
            (!problem.has_lower(j)
                || (self.lower_gap(problem, j) > T::zero() && self.s_l[j] > T::zero()))
                && (!problem.has_upper(j)
                    || (self.upper_gap(problem, j) > T::zero() && self.s_u[j] > T::zero()))
        })
    }

    /// Average complementarity over the finite bounds.
    pub fn mu(&self, problem: &Problem<T>) -> T {
        let nbounds = problem.nbounds();
        if nbounds == 0 {
            return T::zero();
        }
        let mut sum = T::zero();
        for j in 0..problem.nvar() {
            if problem.has_lower(j) {
                sum += self.lower_gap(problem, j) * self.s_l[j];
            }
            if problem.has_upper(j) {
                sum += self.upper_gap(problem, j) * self.s_u[j];
            }
        }
        sum / T::of(nbounds as f64)
    }
}

/// Residuals of the KKT conditions at a point.
#[derive(Debug, Clone)]
pub struct Residuals<T> {
    /// `A x - b`
    pub rb: Vec<T>,
    /// `H x + c - A'y - s_l + s_u`
    pub rc: Vec<T>,
    pub primal_obj: T,
    pub dual_obj: T,
    pub mu: T,
    /// `|primal_obj - dual_obj| / (1 + |primal_obj|)`
    pub gap: T,
    pub rb_norm: T,
    pub rc_norm: T,
}

impl<T: Real> Residuals<T> {
    pub fn new(problem: &Problem<T>, point: &Point<T>) -> Self {
        let (n, m) = (problem.nvar(), problem.ncon());
        let mut res = Self {
            rb: vec![T::zero(); m],
            rc: vec![T::zero(); n],
            primal_obj: T::zero(),
            dual_obj: T::zero(),
            mu: T::zero(),
            gap: T::zero(),
            rb_norm: T::zero(),
            rc_norm: T::zero(),
        };
        res.update(problem, point);
        res
    }

    /// Recomputes every residual in place.
    pub fn update(&mut self, problem: &Problem<T>, point: &Point<T>) {
        let n = problem.nvar();
        let half = T::of(0.5);

        let mut hx = vec![T::zero(); n];
        sym_upper_mat_vec(problem.hessian(), &point.x, &mut hx);
        let mut aty = vec![T::zero(); n];
        mat_t_vec(problem.jacobian(), &point.y, &mut aty);
        mat_vec(problem.jacobian(), &point.x, &mut self.rb);

        for (rb, &b) in self.rb.iter_mut().zip(problem.rhs()) {
            *rb -= b;
        }
        for j in 0..n {
            self.rc[j] = hx[j] + problem.cost()[j] - aty[j] - point.s_l[j] + point.s_u[j];
        }

        let xhx = dot(&point.x, &hx);
        self.primal_obj = dot(problem.cost(), &point.x) + half * xhx + problem.offset();

        let mut bound_term = T::zero();
        for j in 0..n {
            if problem.has_lower(j) {
                bound_term += problem.lower()[j] * point.s_l[j];
            }
            if problem.has_upper(j) {
                bound_term -= problem.upper()[j] * point.s_u[j];
            }
        }
        self.dual_obj =
            dot(problem.rhs(), &point.y) - half * xhx + bound_term + problem.offset();

        self.mu = point.mu(problem);
        self.gap = (self.primal_obj - self.dual_obj).abs() / (T::one() + self.primal_obj.abs());
        self.rb_norm = norm_inf(&self.rb);
        self.rc_norm = norm_inf(&self.rc);
    }

    /// True if any quantity is NaN or infinite.
    pub fn is_non_finite(&self) -> bool {
        !(self.rb_norm.is_finite()
            && self.rc_norm.is_finite()
            && self.gap.is_finite()
            && self.mu.is_finite())
    }
}
