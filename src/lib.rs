mod common;
mod error;
mod ipm;
pub mod kkt;
pub mod ldl;
mod linsol;
mod lp;
mod math;
mod point;
mod precision;
mod problem;
mod qp;
pub mod scaling;
pub mod snapshot;
#[cfg(test)]
mod tests;
mod traits;

pub use common::*;
pub use error::SolverError;
pub use ipm::{solve, solve_with_progress, step_length};
pub use linsol::{LdlFactory, LdlPlugin, RefinedLdlFactory, RefinedLdlPlugin};
pub use lp::lp;
pub use point::{Point, Residuals};
pub use problem::Problem;
pub use qp::qp;
pub use traits::*;
