use std::time::Instant;

use log::{debug, info, warn};

use crate::common::*;
use crate::error::SolverError;
use crate::math::norm_inf;
use crate::point::{Point, Residuals};
use crate::precision::{self, StallDetector};
use crate::problem::Problem;
use crate::scaling::Scaling;
use crate::snapshot;
use crate::traits::*;

/// Regularized primal-dual interior point method for convex quadratic
/// programs. Minimizes
///
/// ```txt
///       c'*x + 1/2 x'*H*x + c0
/// ```
///
/// subject to `A*x = b` and `lower <= x <= upper`.
///
/// `Err` is only returned for a malformed problem or configuration. Every
/// other outcome, including numerical failure, is reported through
/// [`Statistics::status`] and [`Statistics::reason`].
pub fn solve(problem: &Problem<f64>, config: &Config) -> Result<Statistics, SolverError> {
    solve_with_progress(problem, config, None)
}

/// Same as [`solve`], calling `progress` once per iteration.
pub fn solve_with_progress(
    problem: &Problem<f64>,
    config: &Config,
    progress: Option<&dyn ProgressMonitor>,
) -> Result<Statistics, SolverError> {
    let mut session = Session::new();

    config.validate()?;
    problem.check()?;

    let fixed_free;
    let problem = if problem.has_fixed_variables() {
        fixed_free = problem.without_fixed_variables();
        &fixed_free
    } else {
        problem
    };

    let setup = Instant::now();
    let scaling = if config.scaling {
        Scaling::ruiz(problem, config.scaling_passes)
    } else {
        Scaling::identity(problem.nvar(), problem.ncon())
    };
    let scaled = scaling.scale_problem(problem);
    session.timers.setup += setup.elapsed();

    let precision::Outcome {
        status,
        reason,
        mut point,
        precision,
    } = precision::run(&scaled, config, &mut session, progress);
    drop(scaled);

    scaling.unscale_point(&mut point);
    let res = Residuals::new(problem, &point);

    match status {
        Status::Converged => info!(
            "converged in {} iterations, objective = {:e}",
            session.iterations, res.primal_obj
        ),
        _ => info!(
            "stopped with {:?} after {} iterations: {}",
            status,
            session.iterations,
            reason
                .as_ref()
                .map_or_else(|| "no reason".to_string(), |err| err.to_string())
        ),
    }

    let n = problem.original_nvar();
    Ok(Statistics {
        status,
        reason,
        iterations: session.iterations,
        elapsed: session.start.elapsed(),
        objective: res.primal_obj,
        primal_residual: res.rb_norm,
        dual_residual: res.rc_norm,
        gap: res.gap,
        x: point.x[..n].to_vec(),
        y: point.y,
        s_l: point.s_l[..n].to_vec(),
        s_u: point.s_u[..n].to_vec(),
        counters: session.counters,
        timers: session.timers,
        final_precision: precision,
        precision_history: session.precision_history,
        gap_history: config.record_history.then_some(session.gap_history),
    })
}

/// Bookkeeping shared by the phases of one solve.
pub(crate) struct Session {
    pub start: Instant,
    pub iterations: usize,
    pub counters: Counters,
    pub timers: Timers,
    pub precision_history: Vec<Precision>,
    pub gap_history: Vec<f64>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            iterations: 0,
            counters: Counters::default(),
            timers: Timers::default(),
            precision_history: Vec::new(),
            gap_history: Vec::new(),
        }
    }
}

/// Why a single precision phase hands over to double precision.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Promotion {
    Tolerances,
    Stagnation { ratio: f64 },
    IterationLimit,
    Failure(SolverError),
}

impl Promotion {
    pub fn into_error(self) -> Option<SolverError> {
        match self {
            Promotion::Tolerances | Promotion::IterationLimit => None,
            Promotion::Stagnation { ratio } => Some(SolverError::NumericalStagnation { ratio }),
            Promotion::Failure(err) => Some(err),
        }
    }
}

pub(crate) enum PhaseEnd {
    Finished(Status, Option<SolverError>),
    Promote(Promotion),
}

/// Newton direction and the buffers used to compute it.
struct Workspace<T> {
    rhs: Vec<T>,
    t_l: Vec<T>,
    t_u: Vec<T>,
    dx: Vec<T>,
    dy: Vec<T>,
    ds_l: Vec<T>,
    ds_u: Vec<T>,
}

impl<T: Real> Workspace<T> {
    fn new(problem: &Problem<T>) -> Self {
        let (n, m) = (problem.nvar(), problem.ncon());
        Self {
            rhs: vec![T::zero(); n + m],
            t_l: vec![T::zero(); n],
            t_u: vec![T::zero(); n],
            dx: vec![T::zero(); n],
            dy: vec![T::zero(); m],
            ds_l: vec![T::zero(); n],
            ds_u: vec![T::zero(); n],
        }
    }

    /// Right-hand side of the reduced Newton system for the complementarity
    /// targets in `t_l` and `t_u`.
    fn build_rhs(&mut self, problem: &Problem<T>, point: &Point<T>, res: &Residuals<T>) {
        let n = problem.nvar();
        for j in 0..n {
            let mut r = res.rc[j];
            if problem.has_lower(j) {
                r -= self.t_l[j] / point.lower_gap(problem, j);
            }
            if problem.has_upper(j) {
                r += self.t_u[j] / point.upper_gap(problem, j);
            }
            self.rhs[j] = r;
        }
        for (r, &rb) in self.rhs[n..].iter_mut().zip(&res.rb) {
            *r = -rb;
        }
    }

    /// Recovers the bound dual directions from the solved system.
    fn back_substitute(&mut self, problem: &Problem<T>, point: &Point<T>) {
        let n = problem.nvar();
        self.dx.copy_from_slice(&self.rhs[..n]);
        self.dy.copy_from_slice(&self.rhs[n..]);
        for j in 0..n {
            self.ds_l[j] = if problem.has_lower(j) {
                (self.t_l[j] - point.s_l[j] * self.dx[j]) / point.lower_gap(problem, j)
            } else {
                T::zero()
            };
            self.ds_u[j] = if problem.has_upper(j) {
                (self.t_u[j] + point.s_u[j] * self.dx[j]) / point.upper_gap(problem, j)
            } else {
                T::zero()
            };
        }
    }

    fn solve(
        &mut self,
        problem: &Problem<T>,
        point: &Point<T>,
        res: &Residuals<T>,
        plugin: &mut dyn LinearSolverPlugin<T>,
        tag: &'static str,
        captured: &mut Option<Vec<(&'static str, Vec<T>)>>,
        timers: &mut Timers,
    ) -> Result<(), SolverError> {
        self.build_rhs(problem, point, res);
        if let Some(captured) = captured.as_mut() {
            captured.push((tag, self.rhs.clone()));
        }
        let t0 = Instant::now();
        let solved = plugin.solve_in_place(&mut self.rhs);
        timers.solve += t0.elapsed();
        solved?;
        self.back_substitute(problem, point);
        Ok(())
    }

    fn primal_step(&self, problem: &Problem<T>, point: &Point<T>, safety: T) -> T {
        let pairs = (0..problem.nvar()).flat_map(|j| {
            let lower = problem
                .has_lower(j)
                .then(|| (point.lower_gap(problem, j), self.dx[j]));
            let upper = problem
                .has_upper(j)
                .then(|| (point.upper_gap(problem, j), -self.dx[j]));
            lower.into_iter().chain(upper)
        });
        step_length(pairs, safety)
    }

    fn dual_step(&self, problem: &Problem<T>, point: &Point<T>, safety: T) -> T {
        let pairs = (0..problem.nvar()).flat_map(|j| {
            let lower = problem.has_lower(j).then(|| (point.s_l[j], self.ds_l[j]));
            let upper = problem.has_upper(j).then(|| (point.s_u[j], self.ds_u[j]));
            lower.into_iter().chain(upper)
        });
        step_length(pairs, safety)
    }
}

/// Largest step `alpha <= 1` keeping `value + alpha * delta` positive for
/// every `(value, delta)` pair, reduced by the `safety` fraction:
/// `min(1, safety * alpha_max)`.
pub fn step_length<T: Real>(pairs: impl IntoIterator<Item = (T, T)>, safety: T) -> T {
    let alpha_max = pairs
        .into_iter()
        .filter(|&(_, delta)| delta < T::zero())
        .map(|(value, delta)| value / -delta)
        .fold(T::infinity(), T::min);
    (safety * alpha_max).min(T::one())
}

/// Mehrotra predictor-corrector: affine and corrector solves on one
/// factorization.
fn predictor_corrector<T: Real>(
    problem: &Problem<T>,
    point: &Point<T>,
    res: &Residuals<T>,
    plugin: &mut dyn LinearSolverPlugin<T>,
    work: &mut Workspace<T>,
    safety: T,
    captured: &mut Option<Vec<(&'static str, Vec<T>)>>,
    timers: &mut Timers,
) -> Result<(T, T), SolverError> {
    let n = problem.nvar();

    // Predictor.
    for j in 0..n {
        work.t_l[j] = if problem.has_lower(j) {
            -point.lower_gap(problem, j) * point.s_l[j]
        } else {
            T::zero()
        };
        work.t_u[j] = if problem.has_upper(j) {
            -point.upper_gap(problem, j) * point.s_u[j]
        } else {
            T::zero()
        };
    }
    work.solve(problem, point, res, plugin, "affine", captured, timers)?;
    let alpha_p = work.primal_step(problem, point, T::one());
    let alpha_d = work.dual_step(problem, point, T::one());

    let mu = res.mu;
    let sigma = if problem.nbounds() > 0 && mu > T::zero() {
        let mut comp = T::zero();
        for j in 0..n {
            if problem.has_lower(j) {
                comp += (point.lower_gap(problem, j) + alpha_p * work.dx[j])
                    * (point.s_l[j] + alpha_d * work.ds_l[j]);
            }
            if problem.has_upper(j) {
                comp += (point.upper_gap(problem, j) - alpha_p * work.dx[j])
                    * (point.s_u[j] + alpha_d * work.ds_u[j]);
            }
        }
        let mu_aff = comp / T::of(problem.nbounds() as f64);
        (mu_aff / mu).powi(3).max(T::zero()).min(T::one())
    } else {
        T::zero()
    };

    // Corrector, with Mehrotra's second order term.
    let target = sigma * mu;
    for j in 0..n {
        if problem.has_lower(j) {
            work.t_l[j] = target
                - point.lower_gap(problem, j) * point.s_l[j]
                - work.dx[j] * work.ds_l[j];
        }
        if problem.has_upper(j) {
            work.t_u[j] = target - point.upper_gap(problem, j) * point.s_u[j]
                + work.dx[j] * work.ds_u[j];
        }
    }
    work.solve(problem, point, res, plugin, "corrector", captured, timers)?;

    Ok((
        work.primal_step(problem, point, safety),
        work.dual_step(problem, point, safety),
    ))
}

/// Infeasible path-following: one solve targeting `sigma * mu`.
fn path_following<T: Real>(
    problem: &Problem<T>,
    point: &Point<T>,
    res: &Residuals<T>,
    plugin: &mut dyn LinearSolverPlugin<T>,
    work: &mut Workspace<T>,
    sigma: T,
    safety: T,
    captured: &mut Option<Vec<(&'static str, Vec<T>)>>,
    timers: &mut Timers,
) -> Result<(T, T), SolverError> {
    let target = sigma * res.mu;
    for j in 0..problem.nvar() {
        work.t_l[j] = if problem.has_lower(j) {
            target - point.lower_gap(problem, j) * point.s_l[j]
        } else {
            T::zero()
        };
        work.t_u[j] = if problem.has_upper(j) {
            target - point.upper_gap(problem, j) * point.s_u[j]
        } else {
            T::zero()
        };
    }
    work.solve(problem, point, res, plugin, "combined", captured, timers)?;

    Ok((
        work.primal_step(problem, point, safety),
        work.dual_step(problem, point, safety),
    ))
}

fn take_step<T: Real>(point: &mut Point<T>, work: &Workspace<T>, alpha_p: T, alpha_d: T) {
    for (x, &dx) in point.x.iter_mut().zip(&work.dx) {
        *x += alpha_p * dx;
    }
    for (y, &dy) in point.y.iter_mut().zip(&work.dy) {
        *y += alpha_d * dy;
    }
    for (s, &ds) in point.s_l.iter_mut().zip(&work.ds_l) {
        *s += alpha_d * ds;
    }
    for (s, &ds) in point.s_u.iter_mut().zip(&work.ds_u) {
        *s += alpha_d * ds;
    }
}

/// Iterates in precision `T` until a terminal state is reached or, when
/// `staged` is set, until the phase should continue in double precision.
///
/// On return `point` is the last iterate, or the best one seen when the
/// phase stopped without converging.
pub(crate) fn run_phase<T: Real>(
    problem: &Problem<T>,
    point: &mut Point<T>,
    plugin: &mut dyn LinearSolverPlugin<T>,
    config: &Config,
    staged: bool,
    session: &mut Session,
    progress: Option<&dyn ProgressMonitor>,
) -> PhaseEnd {
    let tol = config.tolerances.for_precision(T::PRECISION);
    let b_scale = T::one() + norm_inf(problem.rhs());
    let c_scale = T::one() + norm_inf(problem.cost());
    let (tol_p, tol_d, tol_gap) = (
        T::of(tol.primal) * b_scale,
        T::of(tol.dual) * c_scale,
        T::of(tol.gap),
    );
    let safety = T::of(config.step_safety);
    let sigma_ipf = T::of(config.ipf_sigma);

    // Diverged and Failed hand over to double precision in staged mode.
    let give_up = |status: Status, err: SolverError| {
        if staged {
            PhaseEnd::Promote(Promotion::Failure(err))
        } else {
            PhaseEnd::Finished(status, Some(err))
        }
    };

    // A zero budget stops before the convergence test.
    if config.max_iter == 0 {
        return PhaseEnd::Finished(
            Status::MaxIterReached,
            Some(SolverError::IterationBudgetExceeded { max_iter: 0 }),
        );
    }

    let mut res = Residuals::new(problem, point);
    let mut work = Workspace::new(problem);
    let mut best: Option<(T, Point<T>)> = None;
    let mut stall = StallDetector::new(config.stagnation_threshold, config.stagnation_window);
    let mut small_steps = 0;
    let mut phase_iterations = 0;

    loop {
        if res.is_non_finite() {
            return give_up(Status::Failed, SolverError::NonFiniteSolution);
        }
        if res.rb_norm <= tol_p && res.rc_norm <= tol_d && res.gap <= tol_gap {
            return if staged {
                PhaseEnd::Promote(Promotion::Tolerances)
            } else {
                PhaseEnd::Finished(Status::Converged, None)
            };
        }
        let merit = (res.rb_norm / b_scale)
            .max(res.rc_norm / c_scale)
            .max(res.gap);
        if best.as_ref().map_or(true, |(m, _)| merit < *m) {
            best = Some((merit, point.clone()));
        }

        let residual = res.rb_norm.max(res.rc_norm).as_f64();
        if residual > config.divergence_limit {
            restore_best(point, &mut best);
            return give_up(Status::Diverged, SolverError::Divergence { residual });
        }
        if session.iterations >= config.max_iter {
            restore_best(point, &mut best);
            return PhaseEnd::Finished(
                Status::MaxIterReached,
                Some(SolverError::IterationBudgetExceeded {
                    max_iter: config.max_iter,
                }),
            );
        }
        if staged && phase_iterations >= config.max_iter_single {
            return PhaseEnd::Promote(Promotion::IterationLimit);
        }
        if let Some(limit) = config.max_time {
            if session.start.elapsed() >= limit {
                restore_best(point, &mut best);
                return PhaseEnd::Finished(
                    Status::MaxIterReached,
                    Some(SolverError::TimeBudgetExceeded(limit)),
                );
            }
        }

        session.iterations += 1;
        phase_iterations += 1;
        let iteration = session.iterations;

        let t0 = Instant::now();
        let refreshed = plugin.refresh(problem, point);
        session.timers.factorization += t0.elapsed();
        if let Err(err) = refreshed {
            warn!("refresh failed at iteration {}: {}", iteration, err);
            return give_up(Status::Failed, err);
        }

        let mut captured = config.snapshot.is_due(iteration).then(Vec::new);
        let step = match config.strategy {
            Strategy::PredictorCorrector => predictor_corrector(
                problem,
                point,
                &res,
                plugin,
                &mut work,
                safety,
                &mut captured,
                &mut session.timers,
            ),
            Strategy::InfeasiblePathFollowing => path_following(
                problem,
                point,
                &res,
                plugin,
                &mut work,
                sigma_ipf,
                safety,
                &mut captured,
                &mut session.timers,
            ),
        };

        if let Some(captured) = captured {
            let t0 = Instant::now();
            match snapshot::maybe_snapshot(iteration, plugin.system(), &captured, &config.snapshot)
            {
                Ok(written) => session.counters.snapshots_written += written,
                Err(err) => {
                    warn!("{}", err);
                    session.counters.snapshot_failures += 1;
                }
            }
            session.timers.snapshot += t0.elapsed();
        }

        let (alpha_p, alpha_d) = match step {
            Ok(alphas) => alphas,
            Err(err) => {
                warn!("linear solve failed at iteration {}: {}", iteration, err);
                return give_up(Status::Failed, err);
            }
        };

        take_step(point, &work, alpha_p, alpha_d);
        res.update(problem, point);

        session.precision_history.push(T::PRECISION);
        match T::PRECISION {
            Precision::Single => session.counters.iterations_single += 1,
            Precision::Double => session.counters.iterations_double += 1,
        }
        if config.record_history {
            session.gap_history.push(res.gap.as_f64());
        }

        let (rho, delta) = plugin.regularization();
        debug!(
            "{:>4} {:?} pres = {:.3e} dres = {:.3e} gap = {:.3e} mu = {:.3e} ap = {:.3} ad = {:.3} rho = {:.1e} delta = {:.1e}",
            iteration,
            T::PRECISION,
            res.rb_norm,
            res.rc_norm,
            res.gap,
            res.mu,
            alpha_p,
            alpha_d,
            rho,
            delta
        );
        if let Some(progress) = progress {
            progress.update(
                iteration,
                T::PRECISION,
                res.rb_norm.as_f64(),
                res.rc_norm.as_f64(),
                res.gap.as_f64(),
                res.mu.as_f64(),
                res.primal_obj.as_f64(),
                alpha_p.as_f64(),
                alpha_d.as_f64(),
            );
        }

        let min_step = T::of(config.min_step);
        if alpha_p < min_step && alpha_d < min_step {
            small_steps += 1;
        } else {
            small_steps = 0;
        }
        let stalled = stall.update(res.gap.as_f64());
        if small_steps >= config.max_small_steps {
            restore_best(point, &mut best);
            return give_up(
                Status::Diverged,
                SolverError::NumericalStagnation {
                    ratio: stall.last_ratio(),
                },
            );
        }
        if staged {
            if let Some(ratio) = stalled {
                return PhaseEnd::Promote(Promotion::Stagnation { ratio });
            }
        }
    }
}

fn restore_best<T: Real>(point: &mut Point<T>, best: &mut Option<(T, Point<T>)>) {
    if let Some((_, best)) = best.take() {
        *point = best;
    }
}
