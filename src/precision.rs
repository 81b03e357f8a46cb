//! Precision selection and single to double promotion.
//!
//! In staged mode the solve starts on an `f32` copy of the problem. Once the
//! single precision phase hands over (tolerances met, gap stagnation, its
//! iteration limit or a numerical failure) the `f32` data is dropped, the
//! iterate is cast to `f64` and pushed back into the interior, and a new
//! plugin instance is created on the caller's `f64` problem. There is no way
//! back to single precision.

use std::time::Instant;

use log::{info, warn};

use crate::common::{Config, Precision, PrecisionMode, Status};
use crate::error::SolverError;
use crate::ipm::{run_phase, PhaseEnd, Promotion, Session};
use crate::math::all_finite;
use crate::point::Point;
use crate::problem::Problem;
use crate::traits::{ProgressMonitor, Real};

pub(crate) struct Outcome {
    pub status: Status,
    pub reason: Option<SolverError>,
    pub point: Point<f64>,
    pub precision: Precision,
}

/// Runs the phases `config.mode` asks for on `problem`.
pub(crate) fn run(
    problem: &Problem<f64>,
    config: &Config,
    session: &mut Session,
    progress: Option<&dyn ProgressMonitor>,
) -> Outcome {
    match config.mode {
        PrecisionMode::FixedDouble => {
            let point = Point::initial(problem);
            fixed(problem, point, config, session, progress)
        }
        PrecisionMode::FixedSingle => {
            let single = problem.cast::<f32>();
            let point = Point::initial(&single);
            fixed(&single, point, config, session, progress)
        }
        PrecisionMode::StagedMulti => staged(problem, config, session, progress),
    }
}

fn fixed<T: Real>(
    problem: &Problem<T>,
    point: Point<T>,
    config: &Config,
    session: &mut Session,
    progress: Option<&dyn ProgressMonitor>,
) -> Outcome {
    let (end, point) = phase(problem, point, config, false, session, progress);
    let (status, reason) = match end {
        PhaseEnd::Finished(status, reason) => (status, reason),
        // Only staged phases promote.
        PhaseEnd::Promote(promotion) => (Status::Failed, promotion.into_error()),
    };
    Outcome {
        status,
        reason,
        point: point.cast(),
        precision: T::PRECISION,
    }
}

fn staged(
    problem: &Problem<f64>,
    config: &Config,
    session: &mut Session,
    progress: Option<&dyn ProgressMonitor>,
) -> Outcome {
    let (end, single_point) = {
        let single = problem.cast::<f32>();
        let point = Point::initial(&single);
        phase(&single, point, config, true, session, progress)
    };

    let promotion = match end {
        PhaseEnd::Finished(status, reason) => {
            return Outcome {
                status,
                reason,
                point: single_point.cast(),
                precision: Precision::Single,
            }
        }
        PhaseEnd::Promote(promotion) => promotion,
    };
    info!(
        "switching to double precision after {} iterations: {:?}",
        session.iterations, promotion
    );
    session.counters.promotions += 1;

    let mut point: Point<f64> = single_point.cast();
    let usable = [&point.x, &point.y, &point.s_l, &point.s_u]
        .iter()
        .all(|v| all_finite(v.as_slice()));
    if usable {
        point.ensure_interior(problem);
    } else {
        warn!("single precision iterate is not finite, restarting from the initial point");
        point = Point::initial(problem);
    }

    fixed(problem, point, config, session, progress)
}

/// Creates the plugin for `problem` and runs one phase from `point`.
fn phase<T: Real>(
    problem: &Problem<T>,
    mut point: Point<T>,
    config: &Config,
    staged: bool,
    session: &mut Session,
    progress: Option<&dyn ProgressMonitor>,
) -> (PhaseEnd, Point<T>) {
    let t0 = Instant::now();
    let plugin = T::initialize_plugin(&*config.plugin, problem, &point, &config.regularization);
    session.timers.setup += t0.elapsed();

    let mut plugin = match plugin {
        Ok(plugin) => plugin,
        Err(err) => {
            warn!("{:?} plugin initialization failed: {}", T::PRECISION, err);
            let end = if staged {
                PhaseEnd::Promote(Promotion::Failure(err))
            } else {
                PhaseEnd::Finished(Status::Failed, Some(err))
            };
            return (end, point);
        }
    };

    let end = run_phase(
        problem,
        &mut point,
        plugin.as_mut(),
        config,
        staged,
        session,
        progress,
    );
    session.counters.plugin += plugin.counters();
    (end, point)
}

/// Watches the relative gap of the single precision phase.
#[derive(Debug, Clone)]
pub(crate) struct StallDetector {
    threshold: f64,
    window: usize,
    count: usize,
    last_gap: Option<f64>,
    last_ratio: f64,
}

impl StallDetector {
    pub fn new(threshold: f64, window: usize) -> Self {
        Self {
            threshold,
            window,
            count: 0,
            last_gap: None,
            last_ratio: 1.0,
        }
    }

    /// Records the gap of the latest iteration. Returns the latest gap ratio
    /// once the gap failed to shrink by `threshold` for `window` consecutive
    /// iterations. A zero window never triggers.
    pub fn update(&mut self, gap: f64) -> Option<f64> {
        if let Some(prev) = self.last_gap {
            let ratio = if prev > 0.0 { gap / prev } else { 1.0 };
            self.last_ratio = ratio;
            if 1.0 - ratio < self.threshold {
                self.count += 1;
            } else {
                self.count = 0;
            }
        }
        self.last_gap = Some(gap);
        (self.window > 0 && self.count >= self.window).then_some(self.last_ratio)
    }

    pub fn last_ratio(&self) -> f64 {
        self.last_ratio
    }
}

