//! Gradient descent with automatic step size adaption.

use super::{Minimizer, OptimizationOutcome, Problem, StopReason};
use crate::plugin::{ParamSpec, ParamValues, PluginInfo, Registry};
use crate::trace::{trace_debug, trace_warn};
use crate::util::math::max_abs;
use crate::util::{VoxRegError, VoxRegResult};

const PARAMS: &[ParamSpec] = &[
    ParamSpec::int("maxiter", 1, u32::MAX as i64, Some("200"), "maximum number of iterations"),
    ParamSpec::float("min-step", 1e-300, f64::MAX, Some("0.1"), "minimal step length"),
    ParamSpec::float("max-step", 1e-300, f64::MAX, Some("2"), "maximal step length"),
    ParamSpec::float("xtola", 0.0, f64::MAX, Some("0"), "stop if the gradient max-norm falls below"),
    ParamSpec::float("ftolr", 0.0, f64::MAX, Some("1e-5"), "stop if the relative cost decrease falls below"),
];

/// Failed steps tolerated at the minimal step length.
const MAX_TRIES_AT_MIN_STEP: u32 = 5;

/// Configuration of [`GdasMinimizer`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GdasParams {
    /// Maximum number of iterations.
    pub max_iter: u32,
    /// Smallest step length (max-norm of the parameter update).
    pub min_step: f64,
    /// Largest step length.
    pub max_step: f64,
    /// Absolute gradient max-norm tolerance; 0 disables it.
    pub xtola: f64,
    /// Relative cost decrease tolerance.
    pub ftolr: f64,
}

impl Default for GdasParams {
    fn default() -> Self {
        Self {
            max_iter: 200,
            min_step: 0.1,
            max_step: 2.0,
            xtola: 0.0,
            ftolr: 1e-5,
        }
    }
}

/// Steps along the negative gradient scaled to a max-norm of `step`.
///
/// A step that halves the cost grows the step by 1.5, a failed step halves
/// it and returns to the best point. Five failures at the smallest step end
/// the run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GdasMinimizer {
    params: GdasParams,
}

impl GdasMinimizer {
    pub fn new(params: GdasParams) -> VoxRegResult<Self> {
        if params.max_step <= params.min_step {
            return Err(VoxRegError::invalid(format!(
                "gdas: max-step ({}) must be larger than min-step ({})",
                params.max_step, params.min_step
            )));
        }
        if !(params.min_step > 0.0) {
            return Err(VoxRegError::invalid("gdas: min-step must be positive"));
        }
        Ok(Self { params })
    }

    pub fn params(&self) -> &GdasParams {
        &self.params
    }
}

impl Minimizer for GdasMinimizer {
    fn name(&self) -> &'static str {
        "gdas"
    }

    fn run(&self, problem: &mut dyn Problem, x: &mut [f64]) -> VoxRegResult<OptimizationOutcome> {
        let n = problem.size();
        if x.len() != n {
            return Err(VoxRegError::invalid(format!(
                "gdas: start point has {} values, problem has {n}",
                x.len()
            )));
        }
        let p = &self.params;
        let mut best = x.to_vec();
        let mut best_gradient = vec![0.0; n];
        let mut f_best = problem.fdf(&best, &mut best_gradient)?;
        let mut gradient = vec![0.0; n];
        let mut work = vec![0.0; n];
        let mut step = (0.5 * (p.max_step - p.min_step)).clamp(p.min_step, p.max_step);
        let mut gmax = max_abs(&best_gradient);
        let mut tries = 0;
        let mut iterations = 0;

        let stop = 'run: {
            if gmax <= p.xtola {
                break 'run StopReason::GradientTolerance;
            }
            while iterations < p.max_iter {
                iterations += 1;
                let scale = step / gmax;
                for ((w, b), g) in work.iter_mut().zip(&best).zip(&best_gradient) {
                    *w = b - scale * g;
                }
                let f = problem.fdf(&work, &mut gradient)?;
                trace_debug!("gdas_step", iteration = iterations, value = f, step = step);

                if f < f_best {
                    tries = 0;
                    let relative = (f_best - f) / f_best.abs().max(f64::MIN_POSITIVE);
                    if f < 0.5 * f_best && step < p.max_step {
                        step = (step * 1.5).min(p.max_step);
                    }
                    std::mem::swap(&mut best, &mut work);
                    std::mem::swap(&mut best_gradient, &mut gradient);
                    f_best = f;
                    gmax = max_abs(&best_gradient);
                    if gmax <= p.xtola {
                        break 'run StopReason::GradientTolerance;
                    }
                    if relative < p.ftolr {
                        break 'run StopReason::RelativeCostChange;
                    }
                } else if step > p.min_step {
                    step = (step / 2.0).max(p.min_step);
                } else {
                    tries += 1;
                    if tries >= MAX_TRIES_AT_MIN_STEP {
                        break 'run StopReason::NoProgress;
                    }
                }
            }
            StopReason::MaxIterations
        };

        if !stop.is_converged() {
            trace_warn!("gdas_not_converged", iterations = iterations, value = f_best);
        }
        x.copy_from_slice(&best);
        Ok(OptimizationOutcome {
            converged: stop.is_converged(),
            iterations,
            best_params: best,
            value: f_best,
            stop,
        })
    }
}

fn create(params: &ParamValues, _registry: &Registry) -> VoxRegResult<Box<dyn Minimizer>> {
    let max_iter = u32::try_from(params.int("maxiter")?)
        .map_err(|_| VoxRegError::invalid("gdas: maxiter out of range"))?;
    Ok(Box::new(GdasMinimizer::new(GdasParams {
        max_iter,
        min_step: params.float("min-step")?,
        max_step: params.float("max-step")?,
        xtola: params.float("xtola")?,
        ftolr: params.float("ftolr")?,
    })?))
}

pub(super) fn plugin() -> PluginInfo<dyn Minimizer> {
    PluginInfo {
        name: "gdas",
        description: "gradient descent with automatic step size",
        params: PARAMS,
        create,
    }
}
