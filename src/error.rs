use std::time::Duration;

use thiserror::Error;

/// Errors and stop reasons reported by the solver.
///
/// Only the input and configuration variants are returned as `Err` from
/// [`solve`](crate::solve). The remaining variants end up in
/// [`Statistics::reason`](crate::Statistics) next to a terminal status.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    /// Problem data with inconsistent sizes.
    #[error("dimension mismatch in {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    /// Variable bounds with `lower > upper` or NaN.
    #[error("invalid bounds for variable {index}: [{lower}, {upper}]")]
    InvalidBounds {
        index: usize,
        lower: f64,
        upper: f64,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Regularization could not restore quasi-definiteness.
    #[error("factorization failed after {attempts} attempts (rho = {rho:e}, delta = {delta:e})")]
    Factorization {
        attempts: usize,
        rho: f64,
        delta: f64,
    },

    /// The linear solve produced NaN or Inf.
    #[error("linear solve produced non-finite values")]
    NonFiniteSolution,

    /// Progress stalled; consecutive gap ratio shown.
    #[error("numerical stagnation (gap ratio {ratio:e})")]
    NumericalStagnation { ratio: f64 },

    #[error("iteration budget of {max_iter} exceeded")]
    IterationBudgetExceeded { max_iter: usize },

    #[error("time budget of {0:?} exceeded")]
    TimeBudgetExceeded(Duration),

    /// Residual norms grew past the divergence limit.
    #[error("residuals diverged ({residual:e})")]
    Divergence { residual: f64 },

    #[error("snapshot write failed: {0}")]
    SnapshotWrite(String),
}
