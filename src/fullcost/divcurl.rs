//! Divergence and curl regularization.
//!
//! Spline models are penalized through a matrix over their coefficient grid
//! that is built once per size. Other models compute the penalty themselves.

use super::{not_sized, CostState, DataPool, FullCost};
use crate::divcurl::DivCurlMatrix;
use crate::image::Size2D;
use crate::plugin::{ParamSpec, ParamValues, PluginInfo, Registry};
use crate::transform::Transform;
use crate::util::{VoxRegError, VoxRegResult};

const PARAMS: &[ParamSpec] = &[
    ParamSpec::float("div", 0.0, f64::MAX, Some("1"), "divergence weight"),
    ParamSpec::float("curl", 0.0, f64::MAX, Some("1"), "curl weight"),
    ParamSpec::float("weight", 0.0, f64::MAX, Some("1"), "weight of the term"),
];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DivCurlFullCost {
    div: f64,
    curl: f64,
    weight: f64,
}

impl DivCurlFullCost {
    pub fn new(div: f64, curl: f64, weight: f64) -> VoxRegResult<Self> {
        if !(div >= 0.0 && curl >= 0.0 && weight >= 0.0) {
            return Err(VoxRegError::invalid(format!(
                "divcurl: weights must be non-negative, got div={div} curl={curl} weight={weight}"
            )));
        }
        Ok(Self { div, curl, weight })
    }
}

impl FullCost for DivCurlFullCost {
    fn name(&self) -> &'static str {
        "divcurl"
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn reinit(&self, _pool: &DataPool) -> VoxRegResult<Box<dyn CostState>> {
        Ok(Box::new(DivCurlState {
            div: self.div,
            curl: self.curl,
            sized: false,
            matrix: None,
        }))
    }
}

struct DivCurlState {
    div: f64,
    curl: f64,
    sized: bool,
    /// Cached penalty matrix while the transformation is a spline.
    matrix: Option<DivCurlMatrix>,
}

impl DivCurlState {
    /// Cached matrix and coefficients for spline transformations.
    fn spline<'t>(
        &self,
        transform: &'t dyn Transform,
    ) -> VoxRegResult<Option<(&DivCurlMatrix, &'t [f64])>> {
        if !self.sized {
            return Err(not_sized("divcurl"));
        }
        match (transform.spline_coefficients(), self.matrix.as_ref()) {
            (Some(c), Some(matrix)) if c.grid == matrix.grid() => Ok(Some((matrix, c.coeffs))),
            (Some(c), _) => Err(VoxRegError::invalid(format!(
                "divcurl: coefficient grid {}x{} does not match the sized grid",
                c.grid.width(),
                c.grid.height()
            ))),
            (None, _) => Ok(None),
        }
    }
}

impl CostState for DivCurlState {
    fn full_size(&self) -> Option<Size2D> {
        None
    }

    fn set_size(&mut self, _size: Size2D, transform: &dyn Transform) -> VoxRegResult<()> {
        match (transform.spline_coefficients(), self.matrix.as_mut()) {
            (Some(c), Some(matrix)) => {
                matrix.reset(c.grid, c.knot_spacing, c.kernel, self.div, self.curl)?
            }
            (Some(c), None) => {
                self.matrix = Some(DivCurlMatrix::new(
                    c.grid,
                    c.knot_spacing,
                    c.kernel,
                    self.div,
                    self.curl,
                )?)
            }
            (None, _) => self.matrix = None,
        }
        self.sized = true;
        Ok(())
    }

    fn value(&self, transform: &dyn Transform) -> VoxRegResult<f64> {
        match self.spline(transform)? {
            Some((matrix, coeffs)) => matrix.multiply(coeffs),
            None => transform.divcurl_cost(self.div, self.curl, None),
        }
    }

    fn evaluate(&self, transform: &dyn Transform, gradient: &mut [f64]) -> VoxRegResult<f64> {
        match self.spline(transform)? {
            Some((matrix, coeffs)) => matrix.evaluate(coeffs, gradient),
            None => transform.divcurl_cost(self.div, self.curl, Some(gradient)),
        }
    }
}

fn create(params: &ParamValues, _registry: &Registry) -> VoxRegResult<Box<dyn FullCost>> {
    Ok(Box::new(DivCurlFullCost::new(
        params.float("div")?,
        params.float("curl")?,
        params.float("weight")?,
    )?))
}

pub(super) fn plugin() -> PluginInfo<dyn FullCost> {
    PluginInfo {
        name: "divcurl",
        description: "divergence and curl penalty of the deformation",
        params: PARAMS,
        create,
    }
}
