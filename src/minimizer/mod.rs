//! Gradient-based minimizers and the outcome type shared with the solvers.

mod gdas;

pub use gdas::{GdasMinimizer, GdasParams};

use crate::plugin::PluginMap;
use crate::util::VoxRegResult;

/// Why an iteration stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// Gradient max-norm fell below the absolute tolerance.
    GradientTolerance,
    /// Relative decrease of the objective fell below the tolerance.
    RelativeCostChange,
    /// Linear system residual fell below the tolerance.
    ResidualTolerance,
    /// Iteration budget used up.
    MaxIterations,
    /// Repeated failures at the smallest step.
    NoProgress,
}

impl StopReason {
    /// Returns true for the tolerance-based stops.
    pub fn is_converged(self) -> bool {
        matches!(
            self,
            StopReason::GradientTolerance
                | StopReason::RelativeCostChange
                | StopReason::ResidualTolerance
        )
    }
}

/// Result of a minimizer or iterative solver run.
///
/// Non-convergence is reported here rather than as an error; `best_params`
/// always holds the best point found.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizationOutcome {
    pub converged: bool,
    pub iterations: u32,
    pub best_params: Vec<f64>,
    /// Objective at `best_params` (squared residual for solvers).
    pub value: f64,
    pub stop: StopReason,
}

/// Differentiable objective over a flat parameter vector.
pub trait Problem {
    /// Number of parameters.
    fn size(&self) -> usize;

    /// Objective value at `x`.
    fn f(&mut self, x: &[f64]) -> VoxRegResult<f64>;

    /// Objective value at `x`; writes the gradient into `gradient`.
    fn fdf(&mut self, x: &[f64], gradient: &mut [f64]) -> VoxRegResult<f64>;
}

/// Minimizes a [`Problem`] starting from `x`; `x` receives the best point.
pub trait Minimizer: Send + Sync {
    fn name(&self) -> &'static str;

    fn run(&self, problem: &mut dyn Problem, x: &mut [f64]) -> VoxRegResult<OptimizationOutcome>;
}

pub(crate) fn register_builtin(map: &mut PluginMap<dyn Minimizer>) {
    map.register(gdas::plugin());
}
