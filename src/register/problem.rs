//! Minimization problem over the parameters of a transformation.

use crate::fullcost::CostListState;
use crate::minimizer::Problem;
use crate::trace::trace_debug;
use crate::transform::Transform;
use crate::util::VoxRegResult;

/// Evaluates a cost list at transformation parameters.
///
/// Every evaluation first writes the parameters into the transformation;
/// gradients are passed through [`Transform::smooth_gradient`].
pub struct RegistrationProblem<'a> {
    costs: &'a CostListState,
    transform: &'a mut dyn Transform,
    evaluations: usize,
    start_cost: Option<f64>,
}

impl<'a> RegistrationProblem<'a> {
    pub fn new(costs: &'a CostListState, transform: &'a mut dyn Transform) -> Self {
        Self {
            costs,
            transform,
            evaluations: 0,
            start_cost: None,
        }
    }

    /// Cost at `x`; also recorded as the reference for progress ratios.
    pub fn initial_cost(&mut self, x: &[f64]) -> VoxRegResult<f64> {
        let value = self.f(x)?;
        self.start_cost = Some(value);
        Ok(value)
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    fn record(&mut self, value: f64) {
        self.evaluations += 1;
        let start = *self.start_cost.get_or_insert(value);
        let ratio = if start != 0.0 { value / start } else { 1.0 };
        trace_debug!("cost", evaluation = self.evaluations, value = value, ratio = ratio);
    }
}

impl Problem for RegistrationProblem<'_> {
    fn size(&self) -> usize {
        self.transform.degrees_of_freedom()
    }

    fn f(&mut self, x: &[f64]) -> VoxRegResult<f64> {
        self.transform.set_parameters(x)?;
        let value = self.costs.cost_value(&*self.transform)?;
        self.record(value);
        Ok(value)
    }

    fn fdf(&mut self, x: &[f64], gradient: &mut [f64]) -> VoxRegResult<f64> {
        self.transform.set_parameters(x)?;
        let value = self.costs.evaluate(&*self.transform, gradient)?;
        self.transform.smooth_gradient(gradient)?;
        self.record(value);
        Ok(value)
    }
}
