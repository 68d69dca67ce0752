//! B-spline kernels, the interpolation prefilter and 2D interpolators.

pub mod bspline;
pub mod interpolator;
pub mod prefilter;

pub use bspline::BSplineKernel;
pub use interpolator::{Boundary, Interpolator};

use crate::plugin::{ParamSpec, ParamValues, PluginInfo, PluginMap, Registry};
use crate::util::VoxRegResult;

const BSPLINE_PARAMS: &[ParamSpec] = &[ParamSpec::int(
    "d",
    0,
    bspline::MAX_DEGREE as i64,
    Some("3"),
    "spline degree",
)];

fn create_bspline(params: &ParamValues, _registry: &Registry) -> VoxRegResult<Box<BSplineKernel>> {
    Ok(Box::new(BSplineKernel::new(params.usize("d")?)?))
}

pub(crate) fn register_builtin(map: &mut PluginMap<BSplineKernel>) {
    map.register(PluginInfo {
        name: "bspline",
        description: "centered B-spline kernel",
        params: BSPLINE_PARAMS,
        create: create_bspline,
    });
}
