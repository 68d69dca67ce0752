//! Low-level building blocks for custom registration pipelines.
//!
//! These items expose the interpolation, warping and solver primitives the
//! engine is assembled from. Most users should prefer [`NonrigidRegister`]
//! and the descriptor-driven [`Registry`].
//!
//! [`NonrigidRegister`]: crate::NonrigidRegister
//! [`Registry`]: crate::Registry

pub use crate::cost::{ImageCost, NgfCost, NgfEvaluator, PreparedReference, SsdCost};
pub use crate::image::dispatch::{
    accumulate, filter, filter2, filter_equal, filter_inplace, BinaryVisitor, EqualVisitor,
    ImageAccumulator, ImageVisitor, ImageVisitorMut,
};
pub use crate::image::pyramid::{pyramid_sizes, resample};
pub use crate::kernel::prefilter::{prefilter_2d, prefilter_line};
pub use crate::kernel::{BSplineKernel, Boundary, Interpolator};
pub use crate::parallel::{pfor, ParallelRange, TaskLog};
pub use crate::register::RegistrationProblem;
pub use crate::solver::{
    solve_cg, solve_fixed_point, Helmholtz2D, LinearOperator, SolverParams, Stencil1D,
};
pub use crate::transform::warp::{warp, warp_double, warp_with_gradient};
