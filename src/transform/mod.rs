//! Parametrized spatial transformations.
//!
//! A [`Transform`] maps pixel coordinates of its grid to coordinates in the
//! source image. All models expose their parameters as a flat vector so a
//! minimizer can drive them, and they push per-pixel forces back onto that
//! vector through [`Transform::translate`].

mod affine;
pub mod io;
mod rigid;
mod rotation;
mod spline;
mod translate;
mod vectorfield;
pub mod warp;

pub use affine::{AffineFactory, AffineTransform};
pub use rigid::{RigidFactory, RigidTransform};
pub use rotation::{RotationFactory, RotationTransform};
pub use spline::{SplineFactory, SplineTransform};
pub use translate::{TranslateFactory, TranslateTransform};
pub use vectorfield::{VectorFieldFactory, VectorFieldTransform};

use crate::image::{AttributeMap, Size2D};
use crate::kernel::BSplineKernel;
use crate::plugin::PluginMap;
use crate::util::{VoxRegError, VoxRegResult};
use nalgebra::{Matrix2, Vector2};
use std::fmt;

/// Borrowed description of a B-spline coefficient field.
#[derive(Clone, Copy, Debug)]
pub struct SplineCoefficients<'a> {
    /// Coefficient grid extent.
    pub grid: Size2D,
    /// Interleaved `(cx, cy)` per grid point, row-major.
    pub coeffs: &'a [f64],
    /// Knot spacing in pixels.
    pub knot_spacing: f64,
    /// Basis kernel.
    pub kernel: BSplineKernel,
}

/// A spatial transformation over a fixed pixel grid.
pub trait Transform: Send + Sync + fmt::Debug {
    /// Descriptor of the factory that created this transformation.
    fn creator_string(&self) -> String;

    /// Pixel grid the transformation is defined on.
    fn size(&self) -> Size2D;

    /// Number of parameters.
    fn degrees_of_freedom(&self) -> usize;

    /// Current parameter vector (`degrees_of_freedom()` entries).
    fn parameters(&self) -> Vec<f64>;

    /// Replaces the parameters; a vector of the wrong length is rejected.
    fn set_parameters(&mut self, params: &[f64]) -> VoxRegResult<()>;

    /// Maps a point of the grid into source coordinates.
    fn apply(&self, x: Vector2<f64>) -> Vector2<f64>;

    /// Jacobian of [`apply`](Self::apply) at grid point `(x, y)`.
    fn derivative_at(&self, x: usize, y: usize) -> Matrix2<f64>;

    /// Equivalent transformation on a grid of another size.
    ///
    /// With `S = diag(new / old)` the result satisfies `T'(x') ≈ S T(S⁻¹ x')`.
    fn upscale(&self, size: Size2D) -> VoxRegResult<Box<dyn Transform>>;

    /// Accumulates `gradient[p] = Σ_x force(x) · ∂T(x)/∂p` over the grid.
    ///
    /// `force` holds one vector per grid pixel; `gradient` is overwritten.
    fn translate(&self, force: &[Vector2<f64>], gradient: &mut [f64]) -> VoxRegResult<()>;

    /// Coefficient field of spline models.
    fn spline_coefficients(&self) -> Option<SplineCoefficients<'_>> {
        None
    }

    /// Discrete `div ∫|∇div u|² + curl ∫|∇curl u|²` of the displacement `u`.
    ///
    /// Linear models have no second derivatives and report zero. Spline
    /// models are penalized through their coefficient field instead. When
    /// given, `gradient` is overwritten with the derivative of the penalty.
    fn divcurl_cost(&self, _div: f64, _curl: f64, gradient: Option<&mut [f64]>) -> VoxRegResult<f64> {
        if let Some(gradient) = gradient {
            check_len("divcurl gradient", self.degrees_of_freedom(), gradient.len())?;
            gradient.fill(0.0);
        }
        Ok(0.0)
    }

    /// Preconditions a parameter-space gradient in place.
    fn smooth_gradient(&self, _gradient: &mut [f64]) -> VoxRegResult<()> {
        Ok(())
    }

    fn attributes(&self) -> &AttributeMap;

    fn attributes_mut(&mut self) -> &mut AttributeMap;

    fn clone_box(&self) -> Box<dyn Transform>;
}

impl Clone for Box<dyn Transform> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Creates identity transformations of one model for a given grid.
pub trait TransformFactory: Send + Sync {
    /// Descriptor that reproduces this factory.
    fn creator_string(&self) -> String;

    /// Identity transformation on `size`.
    fn create(&self, size: Size2D) -> VoxRegResult<Box<dyn Transform>>;
}

pub(crate) fn register_builtin(map: &mut PluginMap<dyn TransformFactory>) {
    map.register(translate::plugin());
    map.register(rigid::plugin());
    map.register(rotation::plugin());
    map.register(affine::plugin());
    map.register(spline::plugin());
    map.register(vectorfield::plugin());
}

/// Rejects parameter vectors of the wrong length.
pub(crate) fn check_len(what: &str, expected: usize, got: usize) -> VoxRegResult<()> {
    if expected != got {
        return Err(VoxRegError::invalid(format!(
            "{what}: expected {expected} values, got {got}"
        )));
    }
    Ok(())
}

/// Per-axis scale `new / old` of an upscale.
pub(crate) fn scale_factors(old: Size2D, new: Size2D) -> Vector2<f64> {
    let r = new.ratio_to(old);
    Vector2::new(r[0], r[1])
}

/// Pixel coordinates of grid point `index`.
#[inline]
pub(crate) fn grid_point(size: Size2D, index: usize) -> Vector2<f64> {
    Vector2::new((index % size.width()) as f64, (index / size.width()) as f64)
}
