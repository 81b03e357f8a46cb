use std::fmt;
use std::ops::AddAssign;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::SolverError;
use crate::linsol::LdlFactory;
use crate::traits::{PluginFactory, Real};

/// Floating point precision of an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Precision {
    Single,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrecisionMode {
    FixedSingle,
    #[default]
    FixedDouble,
    /// Starts in single precision and promotes to double when progress stalls
    /// or the single precision tolerances are reached.
    StagedMulti,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Mehrotra predictor-corrector, two solves per factorization.
    #[default]
    PredictorCorrector,
    /// One solve per iteration with a fixed centering parameter.
    InfeasiblePathFollowing,
}

/// Terminal state of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Converged,
    MaxIterReached,
    Diverged,
    Failed,
}

/// Relative stopping tolerances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances {
    /// `‖A x - b‖∞ <= primal (1 + ‖b‖∞)`
    pub primal: f64,
    /// `‖H x + c - A'y - s_l + s_u‖∞ <= dual (1 + ‖c‖∞)`
    pub dual: f64,
    /// `|p - d| / (1 + |p|) <= gap`
    pub gap: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            primal: 1e-6,
            dual: 1e-6,
            gap: 1e-8,
        }
    }
}

impl Tolerances {
    /// Tolerances attainable in `precision`.
    pub fn for_precision(&self, precision: Precision) -> Self {
        let floor = match precision {
            Precision::Single => (f32::EPSILON as f64).sqrt(),
            Precision::Double => 100.0 * f64::EPSILON,
        };
        Self {
            primal: self.primal.max(floor),
            dual: self.dual.max(floor),
            gap: self.gap.max(floor),
        }
    }
}

/// Primal (rho) and dual (delta) regularization schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegularizationParams {
    pub rho0: f64,
    pub delta0: f64,
    pub rho_min: f64,
    pub delta_min: f64,
    /// Divisor applied on every refresh until the minimum is reached.
    pub decrease: f64,
    /// Multiplier applied after a failed factorization.
    pub increase: f64,
    /// Factorization attempts per refresh before giving up.
    pub max_attempts: usize,
}

impl Default for RegularizationParams {
    fn default() -> Self {
        Self {
            rho0: 1e-4,
            delta0: 1e-4,
            rho_min: 1e-9,
            delta_min: 1e-9,
            decrease: 10.0,
            increase: 100.0,
            max_attempts: 6,
        }
    }
}

impl RegularizationParams {
    /// Lower limits for `rho` and `delta` in precision `T`.
    pub fn floors<T: Real>(&self) -> (T, T) {
        let floor = 0.1 * T::epsilon().sqrt().as_f64();
        (
            T::of(self.rho_min.max(floor)),
            T::of(self.delta_min.max(floor)),
        )
    }

    /// Starting `rho` and `delta` in precision `T`.
    pub fn initial<T: Real>(&self) -> (T, T) {
        let (rho_min, delta_min) = self.floors::<T>();
        (
            T::of(self.rho0).max(rho_min),
            T::of(self.delta0).max(delta_min),
        )
    }
}

/// When to dump the assembled system and right-hand sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPolicy {
    pub enabled: bool,
    /// Path prefix of the written files.
    pub prefix: PathBuf,
    pub first: usize,
    /// Zero writes only at `first`.
    pub period: usize,
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            prefix: PathBuf::from("kkt"),
            first: 0,
            period: 1,
        }
    }
}

impl SnapshotPolicy {
    pub fn is_due(&self, iteration: usize) -> bool {
        if !self.enabled || iteration < self.first {
            return false;
        }
        match self.period {
            0 => iteration == self.first,
            period => (iteration - self.first) % period == 0,
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub mode: PrecisionMode,
    /// Ruiz equilibration of the problem data.
    pub scaling: bool,
    /// Number of equilibration passes.
    pub scaling_passes: usize,
    pub strategy: Strategy,

    /// Maximum number of iterations over all precisions.
    pub max_iter: usize,
    /// Maximum number of single precision iterations in staged mode.
    pub max_iter_single: usize,
    /// Checked once per iteration.
    pub max_time: Option<Duration>,

    pub tolerances: Tolerances,
    pub regularization: RegularizationParams,
    pub snapshot: SnapshotPolicy,
    pub plugin: Arc<dyn PluginFactory>,

    /// Keep the relative gap of every iteration in the statistics.
    pub record_history: bool,

    /// Fraction of the distance to the boundary a step may cover.
    pub step_safety: f64,
    /// Centering parameter of infeasible path-following.
    pub ipf_sigma: f64,
    /// Steps below this length count as collapsed.
    pub min_step: f64,
    /// Consecutive collapsed steps before giving up.
    pub max_small_steps: usize,
    /// Residual norm treated as divergence.
    pub divergence_limit: f64,

    /// Minimal relative gap reduction per iteration in single precision.
    pub stagnation_threshold: f64,
    /// Consecutive stalled iterations that trigger a promotion.
    pub stagnation_window: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: PrecisionMode::default(),
            scaling: true,
            scaling_passes: 10,
            strategy: Strategy::default(),

            max_iter: 200,
            max_iter_single: 60,
            max_time: None,

            tolerances: Tolerances::default(),
            regularization: RegularizationParams::default(),
            snapshot: SnapshotPolicy::default(),
            plugin: Arc::new(LdlFactory::default()),

            record_history: false,

            step_safety: 0.99,
            ipf_sigma: 0.1,
            min_step: 1e-8,
            max_small_steps: 5,
            divergence_limit: 1e20,

            stagnation_threshold: 0.05,
            stagnation_window: 3,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("mode", &self.mode)
            .field("scaling", &self.scaling)
            .field("strategy", &self.strategy)
            .field("max_iter", &self.max_iter)
            .field("max_time", &self.max_time)
            .field("tolerances", &self.tolerances)
            .field("regularization", &self.regularization)
            .field("snapshot", &self.snapshot)
            .field("plugin", &self.plugin.name())
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), SolverError> {
        let invalid = |msg: String| Err(SolverError::InvalidConfig(msg));
        if !(self.step_safety > 0.0 && self.step_safety < 1.0) {
            return invalid(format!(
                "step_safety ({}) must be between 0 and 1",
                self.step_safety
            ));
        }
        if !(self.ipf_sigma > 0.0 && self.ipf_sigma <= 1.0) {
            return invalid(format!(
                "ipf_sigma ({}) must be in (0, 1]",
                self.ipf_sigma
            ));
        }
        let tol = &self.tolerances;
        if !(tol.primal > 0.0 && tol.dual > 0.0 && tol.gap > 0.0) {
            return invalid(format!("tolerances must be positive: {:?}", tol));
        }
        let reg = &self.regularization;
        if !(reg.rho0 > 0.0 && reg.delta0 > 0.0 && reg.rho_min > 0.0 && reg.delta_min > 0.0) {
            return invalid("regularization must be strictly positive".to_string());
        }
        if !(reg.increase > 1.0 && reg.decrease >= 1.0) || reg.max_attempts == 0 {
            return invalid(format!("invalid regularization schedule: {:?}", reg));
        }
        if self.snapshot.enabled && self.snapshot.prefix.as_os_str().is_empty() {
            return invalid("snapshot prefix must not be empty".to_string());
        }
        if !(self.stagnation_threshold >= 0.0 && self.stagnation_threshold < 1.0) {
            return invalid(format!(
                "stagnation_threshold ({}) must be in [0, 1)",
                self.stagnation_threshold
            ));
        }
        Ok(())
    }
}

/// Work done by a linear solver plugin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PluginCounters {
    pub factorizations: usize,
    pub solves: usize,
    /// Factorizations repeated with increased regularization.
    pub retries: usize,
    pub refinement_steps: usize,
}

impl AddAssign for PluginCounters {
    fn add_assign(&mut self, other: Self) {
        self.factorizations += other.factorizations;
        self.solves += other.solves;
        self.retries += other.retries;
        self.refinement_steps += other.refinement_steps;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub iterations_single: usize,
    pub iterations_double: usize,
    pub plugin: PluginCounters,
    pub promotions: usize,
    pub snapshots_written: usize,
    pub snapshot_failures: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timers {
    /// Validation, scaling, starting point and first factorization.
    pub setup: Duration,
    /// Refreshes (assembly and factorization).
    pub factorization: Duration,
    pub solve: Duration,
    pub snapshot: Duration,
}

/// Result of a solve.
#[derive(Debug, Clone)]
pub struct Statistics {
    pub status: Status,
    /// Why iteration stopped when it did not converge.
    pub reason: Option<SolverError>,
    pub iterations: usize,
    pub elapsed: Duration,

    pub objective: f64,
    /// `‖A x - b‖∞`
    pub primal_residual: f64,
    /// `‖H x + c - A'y - s_l + s_u‖∞`
    pub dual_residual: f64,
    /// Relative primal-dual gap.
    pub gap: f64,

    /// Primal solution.
    pub x: Vec<f64>,
    /// Multipliers on the constraints.
    pub y: Vec<f64>,
    /// Multipliers on the lower bounds.
    pub s_l: Vec<f64>,
    /// Multipliers on the upper bounds.
    pub s_u: Vec<f64>,

    pub counters: Counters,
    pub timers: Timers,

    pub final_precision: Precision,
    /// Precision of every iteration.
    pub precision_history: Vec<Precision>,
    /// Relative gap after every iteration, if requested.
    pub gap_history: Option<Vec<f64>>,
}

impl Statistics {
    pub fn converged(&self) -> bool {
        self.status == Status::Converged
    }
}
