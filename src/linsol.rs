use log::{debug, warn};

use crate::common::{PluginCounters, RegularizationParams};
use crate::error::SolverError;
use crate::kkt::{self, KktSystem};
use crate::ldl::LdlFactorization;
use crate::math::{all_finite, norm_inf};
use crate::point::Point;
use crate::problem::Problem;
use crate::traits::{LinearSolverPlugin, PluginFactory, Real};

/// Quasi-definite LDL' factorization of the regularized augmented system.
///
/// The fill-reducing ordering and the symbolic factor are computed once when
/// the plugin is created. Every refresh lowers the regularization towards its
/// floor, and a factorization whose pivots have the wrong signs is retried
/// with `rho` and `delta` multiplied by the growth factor.
pub struct LdlPlugin<T> {
    kkt: KktSystem<T>,
    ldl: LdlFactorization<T>,
    rho: T,
    delta: T,
    rho_min: T,
    delta_min: T,
    decrease: T,
    increase: T,
    max_attempts: usize,
    counters: PluginCounters,
}

impl<T: Real> LdlPlugin<T> {
    pub fn new(
        problem: &Problem<T>,
        point: &Point<T>,
        params: &RegularizationParams,
    ) -> Result<Self, SolverError> {
        let (rho, delta) = params.initial::<T>();
        let (rho_min, delta_min) = params.floors::<T>();

        let kkt = kkt::assemble(problem, point, rho, delta)?;
        let ldl = LdlFactorization::symbolic(kkt.matrix()).map_err(|err| {
            warn!("symbolic analysis failed: {}", err);
            SolverError::Factorization {
                attempts: 0,
                rho: rho.as_f64(),
                delta: delta.as_f64(),
            }
        })?;
        debug!(
            "K2 system: dim = {}, nnz(K) = {}, nnz(L) = {}",
            kkt.dim(),
            kkt.matrix().nnz(),
            ldl.nnz_l()
        );

        let mut plugin = Self {
            kkt,
            ldl,
            rho,
            delta,
            rho_min,
            delta_min,
            decrease: T::of(params.decrease),
            increase: T::of(params.increase),
            max_attempts: params.max_attempts,
            counters: PluginCounters::default(),
        };
        plugin.factorize(problem, point)?;
        Ok(plugin)
    }

    fn factorize(&mut self, problem: &Problem<T>, point: &Point<T>) -> Result<(), SolverError> {
        let n = self.kkt.nvar();
        for attempt in 1..=self.max_attempts {
            self.kkt
                .update_diagonal(problem, point, self.rho, self.delta)?;
            self.counters.factorizations += 1;

            match self.ldl.factor(self.kkt.matrix(), n) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(
                        "factorization attempt {} failed ({}), rho = {:e}, delta = {:e}",
                        attempt, err, self.rho, self.delta
                    );
                    if attempt < self.max_attempts {
                        self.counters.retries += 1;
                        self.rho *= self.increase;
                        self.delta *= self.increase;
                    }
                }
            }
        }
        Err(SolverError::Factorization {
            attempts: self.max_attempts,
            rho: self.rho.as_f64(),
            delta: self.delta.as_f64(),
        })
    }

    fn solve_raw(&mut self, rhs: &mut [T]) -> Result<(), SolverError> {
        if rhs.len() != self.kkt.dim() {
            return Err(SolverError::DimensionMismatch {
                what: "right-hand side",
                expected: self.kkt.dim(),
                found: rhs.len(),
            });
        }
        self.ldl.solve(rhs);
        if !all_finite(rhs) {
            return Err(SolverError::NonFiniteSolution);
        }
        Ok(())
    }
}

impl<T: Real> LinearSolverPlugin<T> for LdlPlugin<T> {
    fn refresh(&mut self, problem: &Problem<T>, point: &Point<T>) -> Result<(), SolverError> {
        self.rho = (self.rho / self.decrease).max(self.rho_min);
        self.delta = (self.delta / self.decrease).max(self.delta_min);
        self.factorize(problem, point)
    }

    fn solve_in_place(&mut self, rhs: &mut [T]) -> Result<(), SolverError> {
        self.solve_raw(rhs)?;
        self.counters.solves += 1;
        Ok(())
    }

    fn regularization(&self) -> (T, T) {
        (self.rho, self.delta)
    }

    fn counters(&self) -> PluginCounters {
        self.counters
    }

    fn system(&self) -> Option<&KktSystem<T>> {
        Some(&self.kkt)
    }
}

/// LDL' plugin followed by iterative refinement against the system without
/// regularization, which removes most of the perturbation `rho` and `delta`
/// introduce into the Newton direction.
pub struct RefinedLdlPlugin<T> {
    inner: LdlPlugin<T>,
    max_steps: usize,
    tolerance: T,
    residual: Vec<T>,
    correction: Vec<T>,
}

impl<T: Real> RefinedLdlPlugin<T> {
    pub fn new(
        problem: &Problem<T>,
        point: &Point<T>,
        params: &RegularizationParams,
        max_steps: usize,
        tolerance: f64,
    ) -> Result<Self, SolverError> {
        let inner = LdlPlugin::new(problem, point, params)?;
        let dim = inner.kkt.dim();
        Ok(Self {
            inner,
            max_steps,
            tolerance: T::of(tolerance).max(T::epsilon()),
            residual: vec![T::zero(); dim],
            correction: vec![T::zero(); dim],
        })
    }

    // residual = b - K0 x, returns its norm.
    fn residual(&mut self, b: &[T], x: &[T]) -> T {
        self.inner.kkt.mul_unregularized(x, &mut self.residual);
        for (r, &bi) in self.residual.iter_mut().zip(b) {
            *r = bi - *r;
        }
        norm_inf(&self.residual)
    }
}

impl<T: Real> LinearSolverPlugin<T> for RefinedLdlPlugin<T> {
    fn refresh(&mut self, problem: &Problem<T>, point: &Point<T>) -> Result<(), SolverError> {
        self.inner.refresh(problem, point)
    }

    fn solve_in_place(&mut self, rhs: &mut [T]) -> Result<(), SolverError> {
        let b = rhs.to_vec();
        self.inner.solve_raw(rhs)?;
        self.inner.counters.solves += 1;

        let target = self.tolerance * (T::one() + norm_inf(&b));
        let mut res_norm = self.residual(&b, rhs);
        for _ in 0..self.max_steps {
            if res_norm <= target {
                break;
            }
            self.correction.copy_from_slice(&self.residual);
            self.inner.solve_raw(&mut self.correction)?;
            for (x, &dx) in rhs.iter_mut().zip(&self.correction) {
                *x += dx;
            }
            let new_norm = self.residual(&b, rhs);
            self.inner.counters.refinement_steps += 1;
            if !(new_norm < res_norm) {
                // Not contracting: undo the last correction.
                for (x, &dx) in rhs.iter_mut().zip(&self.correction) {
                    *x -= dx;
                }
                break;
            }
            res_norm = new_norm;
        }
        Ok(())
    }

    fn regularization(&self) -> (T, T) {
        self.inner.regularization()
    }

    fn counters(&self) -> PluginCounters {
        self.inner.counters
    }

    fn system(&self) -> Option<&KktSystem<T>> {
        Some(&self.inner.kkt)
    }
}

/// Creates [`LdlPlugin`] instances.
#[derive(Debug, Clone, Default)]
pub struct LdlFactory;

impl PluginFactory for LdlFactory {
    fn name(&self) -> &str {
        "ldl"
    }

    fn single(
        &self,
        problem: &Problem<f32>,
        point: &Point<f32>,
        params: &RegularizationParams,
    ) -> Result<Box<dyn LinearSolverPlugin<f32>>, SolverError> {
        Ok(Box::new(LdlPlugin::new(problem, point, params)?))
    }

    fn double(
        &self,
        problem: &Problem<f64>,
        point: &Point<f64>,
        params: &RegularizationParams,
    ) -> Result<Box<dyn LinearSolverPlugin<f64>>, SolverError> {
        Ok(Box::new(LdlPlugin::new(problem, point, params)?))
    }
}

/// Creates [`RefinedLdlPlugin`] instances.
#[derive(Debug, Clone)]
pub struct RefinedLdlFactory {
    /// Maximum refinement steps per solve.
    pub max_steps: usize,
    /// Relative residual at which refinement stops.
    pub tolerance: f64,
}

impl Default for RefinedLdlFactory {
    fn default() -> Self {
        Self {
            max_steps: 3,
            tolerance: 1e-12,
        }
    }
}

impl PluginFactory for RefinedLdlFactory {
    fn name(&self) -> &str {
        "ldl-refined"
    }

    fn single(
        &self,
        problem: &Problem<f32>,
        point: &Point<f32>,
        params: &RegularizationParams,
    ) -> Result<Box<dyn LinearSolverPlugin<f32>>, SolverError> {
        let plugin = RefinedLdlPlugin::new(problem, point, params, self.max_steps, self.tolerance)?;
        Ok(Box::new(plugin))
    }

    fn double(
        &self,
        problem: &Problem<f64>,
        point: &Point<f64>,
        params: &RegularizationParams,
    ) -> Result<Box<dyn LinearSolverPlugin<f64>>, SolverError> {
        let plugin = RefinedLdlPlugin::new(problem, point, params, self.max_steps, self.tolerance)?;
        Ok(Box::new(plugin))
    }
}
