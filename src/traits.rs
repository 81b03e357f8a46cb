use std::fmt::{Debug, Display, LowerExp};

use faer::traits::RealField;
use num_traits::{Float, NumAssign};

use crate::common::{PluginCounters, Precision, RegularizationParams};
use crate::error::SolverError;
use crate::kkt::KktSystem;
use crate::point::Point;
use crate::problem::Problem;

/// Floating point type the solver can iterate in.
///
/// `RealField` lets the sparse LDL' kernels run in the same precision.
pub trait Real:
    Float + NumAssign + RealField + Default + Debug + Display + LowerExp + Send + Sync + 'static
{
    const PRECISION: Precision;

    /// Converts a constant.
    fn of(v: f64) -> Self;

    fn as_f64(self) -> f64;

    /// Dispatches to the factory entry point for this precision.
    fn initialize_plugin(
        factory: &dyn PluginFactory,
        problem: &Problem<Self>,
        point: &Point<Self>,
        params: &RegularizationParams,
    ) -> Result<Box<dyn LinearSolverPlugin<Self>>, SolverError>;
}

impl Real for f32 {
    const PRECISION: Precision = Precision::Single;

    fn of(v: f64) -> Self {
        v as f32
    }

    fn as_f64(self) -> f64 {
        self as f64
    }

    fn initialize_plugin(
        factory: &dyn PluginFactory,
        problem: &Problem<f32>,
        point: &Point<f32>,
        params: &RegularizationParams,
    ) -> Result<Box<dyn LinearSolverPlugin<f32>>, SolverError> {
        factory.single(problem, point, params)
    }
}

impl Real for f64 {
    const PRECISION: Precision = Precision::Double;

    fn of(v: f64) -> Self {
        v
    }

    fn as_f64(self) -> f64 {
        self
    }

    fn initialize_plugin(
        factory: &dyn PluginFactory,
        problem: &Problem<f64>,
        point: &Point<f64>,
        params: &RegularizationParams,
    ) -> Result<Box<dyn LinearSolverPlugin<f64>>, SolverError> {
        factory.double(problem, point, params)
    }
}

/// Solves the regularized Newton systems of one solve.
///
/// An instance is the preallocated state of a single solve: it is created
/// (and the first factorization computed) by a [`PluginFactory`], refreshed
/// once per iteration and asked for any number of solves in between.
pub trait LinearSolverPlugin<T: Real> {
    /// Updates the iterate-dependent diagonal and refactorizes.
    /// The sparsity pattern must not change.
    fn refresh(&mut self, problem: &Problem<T>, point: &Point<T>) -> Result<(), SolverError>;

    /// Overwrites `rhs` with the solution of the factorized system.
    fn solve_in_place(&mut self, rhs: &mut [T]) -> Result<(), SolverError>;

    /// Current primal and dual regularization `(rho, delta)`.
    fn regularization(&self) -> (T, T);

    fn counters(&self) -> PluginCounters;

    /// The assembled system, for plugins that build one.
    fn system(&self) -> Option<&KktSystem<T>> {
        None
    }
}

/// Creates plugin instances, one entry point per precision.
pub trait PluginFactory: Send + Sync {
    fn name(&self) -> &str;

    fn single(
        &self,
        problem: &Problem<f32>,
        point: &Point<f32>,
        params: &RegularizationParams,
    ) -> Result<Box<dyn LinearSolverPlugin<f32>>, SolverError>;

    fn double(
        &self,
        problem: &Problem<f64>,
        point: &Point<f64>,
        params: &RegularizationParams,
    ) -> Result<Box<dyn LinearSolverPlugin<f64>>, SolverError>;
}

/// Called on each iteration of the solver with the current
/// iteration number, precision, primal and dual residual norms,
/// relative gap, complementarity, objective function value and
/// the two step lengths.
pub trait ProgressMonitor {
    fn update(
        &self,
        i: usize,
        precision: Precision,
        primal_res: f64,
        dual_res: f64,
        gap: f64,
        mu: f64,
        obj: f64,
        alpha_p: f64,
        alpha_d: f64,
    );
}
