use log::warn;
use sprs::{CsMat, TriMat};

use crate::error::SolverError;
use crate::math::{dot, sym_upper_mat_vec};
use crate::traits::Real;

/// Convex quadratic program in equality form:
///
/// ```txt
///       min c'*x + 1/2 x'*H*x + c0
///        x
/// ```
///
/// subject to
///
/// ```txt
///       A*x = b
///       lower <= x <= upper
/// ```
///
/// The Hessian is kept as its upper triangle in CSC storage. The solver
/// only ever reads a `Problem`, so one instance may be shared between
/// concurrent solves.
#[derive(Debug, Clone)]
pub struct Problem<T> {
    hessian: CsMat<T>,
    jacobian: CsMat<T>,
    rhs: Vec<T>,
    cost: Vec<T>,
    offset: T,
    lower: Vec<T>,
    upper: Vec<T>,
    // Number of caller variables; trailing columns are constraint slacks.
    n_orig: usize,
}

impl<T: Real> Problem<T> {
    /// Equality-form problem. `h_mat` is the full symmetric Hessian in any
    /// storage; entries below the diagonal are ignored. Nothing is validated
    /// here, see [`Problem::check`].
    pub fn new(
        h_mat: &CsMat<T>,
        c: Vec<T>,
        c0: T,
        a_mat: &CsMat<T>,
        b: Vec<T>,
        lower: Vec<T>,
        upper: Vec<T>,
    ) -> Self {
        let n = c.len();
        Self {
            hessian: upper_triangle(h_mat, h_mat.rows(), h_mat.cols()),
            jacobian: a_mat.to_csr(),
            rhs: b,
            cost: c,
            offset: c0,
            lower,
            upper,
            n_orig: n,
        }
    }

    /// Problem with ranged linear constraints `lcon <= A*x <= ucon`.
    ///
    /// Rows with `lcon == ucon` become equalities, rows with both limits
    /// infinite are dropped and every other row gets a bounded slack
    /// variable. Fixed variables become equality rows.
    pub fn with_ranges(
        h_mat: &CsMat<T>,
        c: Vec<T>,
        c0: T,
        a_mat: &CsMat<T>,
        lcon: &[T],
        ucon: &[T],
        lower: Vec<T>,
        upper: Vec<T>,
    ) -> Result<Self, SolverError> {
        let n = c.len();
        expect_len("hessian rows", n, h_mat.rows())?;
        expect_len("hessian cols", n, h_mat.cols())?;
        expect_len("jacobian cols", n, a_mat.cols())?;
        expect_len("lcon", a_mat.rows(), lcon.len())?;
        expect_len("ucon", a_mat.rows(), ucon.len())?;
        expect_len("lower", n, lower.len())?;
        expect_len("upper", n, upper.len())?;
        check_bounds(&lower, &upper)?;
        check_bounds(lcon, ucon)?;

        Ok(standard_form(h_mat, c, c0, a_mat, lcon, ucon, lower, upper, n))
    }

    /// Validates sizes and bounds.
    pub fn check(&self) -> Result<(), SolverError> {
        let n = self.cost.len();
        expect_len("hessian rows", n, self.hessian.rows())?;
        expect_len("hessian cols", n, self.hessian.cols())?;
        expect_len("jacobian cols", n, self.jacobian.cols())?;
        expect_len("rhs", self.jacobian.rows(), self.rhs.len())?;
        expect_len("lower", n, self.lower.len())?;
        expect_len("upper", n, self.upper.len())?;
        if self.n_orig > n {
            return Err(SolverError::DimensionMismatch {
                what: "original variables",
                expected: n,
                found: self.n_orig,
            });
        }
        check_bounds(&self.lower, &self.upper)
    }

    /// True if some variable has equal finite lower and upper bounds.
    pub fn has_fixed_variables(&self) -> bool {
        self.lower
            .iter()
            .zip(&self.upper)
            .any(|(&l, &u)| l.is_finite() && l == u)
    }

    /// Moves fixed variables into equality rows.
    pub fn without_fixed_variables(&self) -> Self {
        standard_form(
            &self.hessian,
            self.cost.clone(),
            self.offset,
            &self.jacobian,
            &self.rhs,
            &self.rhs,
            self.lower.clone(),
            self.upper.clone(),
            self.n_orig,
        )
    }

    /// Copy of the problem at another precision.
    ///
    /// Finite bounds outside the range of `U` are clamped to its largest
    /// finite value so that they stay bounds.
    pub fn cast<U: Real>(&self) -> Problem<U> {
        let conv = |v: &[T]| v.iter().map(|&x| U::of(x.as_f64())).collect::<Vec<U>>();
        Problem {
            hessian: self.hessian.map(|&v| U::of(v.as_f64())),
            jacobian: self.jacobian.map(|&v| U::of(v.as_f64())),
            rhs: conv(&self.rhs),
            cost: conv(&self.cost),
            offset: U::of(self.offset.as_f64()),
            lower: cast_bounds(&self.lower, "lower"),
            upper: cast_bounds(&self.upper, "upper"),
            n_orig: self.n_orig,
        }
    }

    /// `c'*x + 1/2 x'*H*x + c0`
    pub fn objective(&self, x: &[T]) -> T {
        let mut hx = vec![T::zero(); x.len()];
        sym_upper_mat_vec(&self.hessian, x, &mut hx);
        dot(&self.cost, x) + T::of(0.5) * dot(x, &hx) + self.offset
    }

    pub fn nvar(&self) -> usize {
        self.cost.len()
    }

    pub fn ncon(&self) -> usize {
        self.jacobian.rows()
    }

    /// Number of variables the caller passed in.
    pub fn original_nvar(&self) -> usize {
        self.n_orig
    }

    /// Upper triangle of the Hessian.
    pub fn hessian(&self) -> &CsMat<T> {
        &self.hessian
    }

    pub fn jacobian(&self) -> &CsMat<T> {
        &self.jacobian
    }

    pub fn rhs(&self) -> &[T] {
        &self.rhs
    }

    pub fn cost(&self) -> &[T] {
        &self.cost
    }

    pub fn offset(&self) -> T {
        self.offset
    }

    pub fn lower(&self) -> &[T] {
        &self.lower
    }

    pub fn upper(&self) -> &[T] {
        &self.upper
    }

    pub fn has_lower(&self, j: usize) -> bool {
        self.lower[j].is_finite()
    }

    pub fn has_upper(&self, j: usize) -> bool {
        self.upper[j].is_finite()
    }

    /// Number of finite bounds, i.e. complementarity pairs.
    pub fn nbounds(&self) -> usize {
        self.lower.iter().filter(|v| v.is_finite()).count()
            + self.upper.iter().filter(|v| v.is_finite()).count()
    }

    pub(crate) fn from_parts(
        hessian: CsMat<T>,
        jacobian: CsMat<T>,
        rhs: Vec<T>,
        cost: Vec<T>,
        offset: T,
        lower: Vec<T>,
        upper: Vec<T>,
        n_orig: usize,
    ) -> Self {
        Self {
            hessian,
            jacobian,
            rhs,
            cost,
            offset,
            lower,
            upper,
            n_orig,
        }
    }
}

fn expect_len(what: &'static str, expected: usize, found: usize) -> Result<(), SolverError> {
    if expected != found {
        Err(SolverError::DimensionMismatch {
            what,
            expected,
            found,
        })
    } else {
        Ok(())
    }
}

fn check_bounds<T: Real>(lower: &[T], upper: &[T]) -> Result<(), SolverError> {
    for (index, (&l, &u)) in lower.iter().zip(upper).enumerate() {
        if l.is_nan() || u.is_nan() || l > u || l == T::infinity() || u == T::neg_infinity() {
            return Err(SolverError::InvalidBounds {
                index,
                lower: l.as_f64(),
                upper: u.as_f64(),
            });
        }
    }
    Ok(())
}

fn upper_triangle<T: Real>(h_mat: &CsMat<T>, rows: usize, cols: usize) -> CsMat<T> {
    let mut tri = TriMat::new((rows, cols));
    for (&v, (i, j)) in h_mat.iter() {
        if i <= j {
            tri.add_triplet(i, j, v);
        }
    }
    tri.to_csc()
}

/// Builds the equality form described on [`Problem::with_ranges`].
fn standard_form<T: Real>(
    h_mat: &CsMat<T>,
    mut c: Vec<T>,
    c0: T,
    a_mat: &CsMat<T>,
    lcon: &[T],
    ucon: &[T],
    mut lower: Vec<T>,
    mut upper: Vec<T>,
    n_orig: usize,
) -> Problem<T> {
    let n = c.len();

    // Row map: None for dropped rows, Some((new_row, slack column)) otherwise.
    let mut row_map: Vec<Option<(usize, Option<usize>)>> = Vec::with_capacity(lcon.len());
    let mut rhs = Vec::new();
    let mut nslack = 0;
    for (&l, &u) in lcon.iter().zip(ucon) {
        if !l.is_finite() && !u.is_finite() {
            row_map.push(None);
        } else if l == u {
            row_map.push(Some((rhs.len(), None)));
            rhs.push(l);
        } else {
            row_map.push(Some((rhs.len(), Some(n + nslack))));
            rhs.push(T::zero());
            lower.push(l);
            upper.push(u);
            nslack += 1;
        }
    }
    let nx = n + nslack;
    c.resize(nx, T::zero());

    let mut triplets = Vec::new();
    for (&v, (i, j)) in a_mat.iter() {
        if let Some((r, _)) = row_map[i] {
            triplets.push((r, j, v));
        }
    }
    for (r, slack) in row_map.iter().flatten() {
        if let Some(k) = slack {
            triplets.push((*r, *k, -T::one()));
        }
    }
    for j in 0..nx {
        if lower[j].is_finite() && lower[j] == upper[j] {
            triplets.push((rhs.len(), j, T::one()));
            rhs.push(lower[j]);
            lower[j] = T::neg_infinity();
            upper[j] = T::infinity();
        }
    }
    let mut a_tri = TriMat::with_capacity((rhs.len(), nx), triplets.len());
    for (i, j, v) in triplets {
        a_tri.add_triplet(i, j, v);
    }
    let mut h_tri = TriMat::new((nx, nx));
    for (&v, (i, j)) in h_mat.iter() {
        if i <= j {
            h_tri.add_triplet(i, j, v);
        }
    }

    Problem::from_parts(
        h_tri.to_csc(),
        a_tri.to_csr(),
        rhs,
        c,
        c0,
        lower,
        upper,
        n_orig,
    )
}

fn cast_bounds<T: Real, U: Real>(bounds: &[T], which: &str) -> Vec<U> {
    let mut clamped = 0;
    let cast = bounds
        .iter()
        .map(|&b| {
            let v = U::of(b.as_f64());
            if b.is_finite() && v.is_infinite() {
                clamped += 1;
                v.signum() * U::max_value()
            } else {
                v
            }
        })
        .collect();
    if clamped > 0 {
        warn!(
            "{} finite {} bounds overflow {:?} precision, clamped to {:e}",
            clamped,
            which,
            U::PRECISION,
            U::max_value()
        );
    }
    cast
}
