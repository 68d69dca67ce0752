//! Dense per-pixel displacement field.

use super::{check_len, scale_factors, Transform, TransformFactory};
use crate::image::{AttributeMap, Size2D, TypedImage};
use crate::kernel::{BSplineKernel, Boundary, Interpolator};
use crate::plugin::{ParamSpec, ParamValues, PluginInfo, Registry};
use crate::solver::{solve_cg, Helmholtz2D, SolverParams};
use crate::trace::trace_warn;
use crate::util::VoxRegResult;
use nalgebra::{Matrix2, Vector2};

const PARAMS: &[ParamSpec] = &[
    ParamSpec::descriptor("imgkernel", Some("bspline:d=3"), "kernel interpolating the field"),
    ParamSpec::choice("imgboundary", &["mirror", "zero"], Some("mirror"), "field boundary"),
    ParamSpec::float("smooth", 0.0, 1e6, Some("0"), "gradient smoothing weight"),
];

/// Relative residual at which gradient smoothing stops.
const SMOOTH_TOLERANCE: f64 = 1e-10;
const SMOOTH_MAX_ITER: usize = 200;

/// `T(x) = x + u(x)` with one displacement per pixel; parameters are the
/// interleaved `(ux, uy)` per pixel.
#[derive(Clone, Debug)]
pub struct VectorFieldTransform {
    size: Size2D,
    field: Vec<f64>,
    kernel: BSplineKernel,
    boundary: Boundary,
    smooth: f64,
    components: [Interpolator; 2],
    attributes: AttributeMap,
}

impl VectorFieldTransform {
    /// Zero displacement on `size`.
    pub fn new(size: Size2D, kernel: BSplineKernel, boundary: Boundary, smooth: f64) -> Self {
        let field = vec![0.0; 2 * size.len()];
        let components = Self::interpolators(size, &field, kernel, boundary);
        Self {
            size,
            field,
            kernel,
            boundary,
            smooth,
            components,
            attributes: AttributeMap::new(),
        }
    }

    fn interpolators(
        size: Size2D,
        field: &[f64],
        kernel: BSplineKernel,
        boundary: Boundary,
    ) -> [Interpolator; 2] {
        let component = |c: usize| {
            let data = TypedImage::from_fn(size, |x, y| field[2 * size.index(x, y) + c]);
            Interpolator::new(&data, kernel, boundary)
        };
        [component(0), component(1)]
    }

    /// Displacement at an arbitrary position, interpolated with the field kernel.
    pub fn displacement(&self, x: Vector2<f64>) -> Vector2<f64> {
        Vector2::new(
            self.components[0].value(x.x, x.y),
            self.components[1].value(x.x, x.y),
        )
    }

    /// Raw interleaved displacement samples.
    pub fn field(&self) -> &[f64] {
        &self.field
    }
}

impl Transform for VectorFieldTransform {
    fn creator_string(&self) -> String {
        format!(
            "vf:imgkernel=[{}],imgboundary={},smooth={}",
            self.kernel.creator_string(),
            self.boundary,
            self.smooth
        )
    }

    fn size(&self) -> Size2D {
        self.size
    }

    fn degrees_of_freedom(&self) -> usize {
        self.field.len()
    }

    fn parameters(&self) -> Vec<f64> {
        self.field.clone()
    }

    fn set_parameters(&mut self, params: &[f64]) -> VoxRegResult<()> {
        check_len("vf parameters", self.field.len(), params.len())?;
        self.field.copy_from_slice(params);
        self.components = Self::interpolators(self.size, &self.field, self.kernel, self.boundary);
        Ok(())
    }

    fn apply(&self, x: Vector2<f64>) -> Vector2<f64> {
        x + self.displacement(x)
    }

    fn derivative_at(&self, x: usize, y: usize) -> Matrix2<f64> {
        let (_, gx) = self.components[0].value_and_gradient(x as f64, y as f64);
        let (_, gy) = self.components[1].value_and_gradient(x as f64, y as f64);
        Matrix2::new(1.0 + gx[0], gx[1], gy[0], 1.0 + gy[1])
    }

    fn upscale(&self, size: Size2D) -> VoxRegResult<Box<dyn Transform>> {
        let s = scale_factors(self.size, size);
        let mut field = vec![0.0; 2 * size.len()];
        for y in 0..size.height() {
            for x in 0..size.width() {
                let p = Vector2::new(x as f64 / s.x, y as f64 / s.y);
                let u = self.displacement(p).component_mul(&s);
                let i = 2 * size.index(x, y);
                field[i] = u.x;
                field[i + 1] = u.y;
            }
        }
        let mut up = VectorFieldTransform::new(size, self.kernel, self.boundary, self.smooth);
        up.set_parameters(&field)?;
        up.attributes = self.attributes.clone();
        Ok(Box::new(up))
    }

    fn translate(&self, force: &[Vector2<f64>], gradient: &mut [f64]) -> VoxRegResult<()> {
        check_len("vf force field", self.size.len(), force.len())?;
        check_len("vf gradient", self.field.len(), gradient.len())?;
        for (g, f) in gradient.chunks_exact_mut(2).zip(force) {
            g[0] = f.x;
            g[1] = f.y;
        }
        Ok(())
    }

    fn smooth_gradient(&self, gradient: &mut [f64]) -> VoxRegResult<()> {
        if self.smooth <= 0.0 {
            return Ok(());
        }
        check_len("vf gradient", self.field.len(), gradient.len())?;
        let op = Helmholtz2D::new(self.size, self.smooth);
        for c in 0..2 {
            let rhs: Vec<f64> = gradient.iter().skip(c).step_by(2).copied().collect();
            let norm2: f64 = rhs.iter().map(|v| v * v).sum();
            if norm2 == 0.0 {
                continue;
            }
            let mut solution = rhs.clone();
            let params = SolverParams {
                tolerance: SMOOTH_TOLERANCE * norm2,
                max_iter: SMOOTH_MAX_ITER,
            };
            let outcome = solve_cg(&op, &rhs, &mut solution, 0, &params)?;
            if !outcome.converged {
                trace_warn!(
                    "gradient_smoothing_not_converged",
                    component = c,
                    residual = outcome.value
                );
            }
            for (g, v) in gradient.iter_mut().skip(c).step_by(2).zip(solution) {
                *g = v;
            }
        }
        Ok(())
    }

    fn divcurl_cost(&self, div: f64, curl: f64, gradient: Option<&mut [f64]>) -> VoxRegResult<f64> {
        let mut gradient = gradient;
        if let Some(g) = gradient.as_deref_mut() {
            check_len("vf gradient", self.field.len(), g.len())?;
            g.fill(0.0);
        }
        let (w, h) = (self.size.width(), self.size.height());
        if w < 3 || h < 3 {
            return Ok(0.0);
        }
        let u = &self.field;
        let mut total = 0.0;
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                let i = self.size.index(x, y);
                let xx = [(i - 1, 1.0), (i, -2.0), (i + 1, 1.0)];
                let yy = [(i - w, 1.0), (i, -2.0), (i + w, 1.0)];
                let xy = [
                    (i + w + 1, 0.25),
                    (i - w - 1, 0.25),
                    (i - w + 1, -0.25),
                    (i + w - 1, -0.25),
                ];
                let (ux_xx, ux_xy, ux_yy) = (stencil(u, &xx, 0), stencil(u, &xy, 0), stencil(u, &yy, 0));
                let (uy_xx, uy_xy, uy_yy) = (stencil(u, &xx, 1), stencil(u, &xy, 1), stencil(u, &yy, 1));
                let grad_div = [ux_xx + uy_xy, ux_xy + uy_yy];
                let grad_curl = [uy_xx - ux_xy, uy_xy - ux_yy];
                total += div * (grad_div[0] * grad_div[0] + grad_div[1] * grad_div[1])
                    + curl * (grad_curl[0] * grad_curl[0] + grad_curl[1] * grad_curl[1]);
                if let Some(g) = gradient.as_deref_mut() {
                    let (d, c) = (2.0 * div, 2.0 * curl);
                    scatter(g, &xx, 0, d * grad_div[0]);
                    scatter(g, &xy, 0, d * grad_div[1] - c * grad_curl[0]);
                    scatter(g, &yy, 0, -c * grad_curl[1]);
                    scatter(g, &xx, 1, c * grad_curl[0]);
                    scatter(g, &xy, 1, d * grad_div[0] + c * grad_curl[1]);
                    scatter(g, &yy, 1, d * grad_div[1]);
                }
            }
        }
        Ok(total)
    }

    fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    fn attributes_mut(&mut self) -> &mut AttributeMap {
        &mut self.attributes
    }

    fn clone_box(&self) -> Box<dyn Transform> {
        Box::new(self.clone())
    }
}

/// Finite difference of component `c` of an interleaved field.
#[inline]
fn stencil(field: &[f64], taps: &[(usize, f64)], c: usize) -> f64 {
    taps.iter().map(|&(k, w)| w * field[2 * k + c]).sum()
}

/// Adjoint of [`stencil`]: spreads `s` back onto the taps.
#[inline]
fn scatter(gradient: &mut [f64], taps: &[(usize, f64)], c: usize, s: f64) {
    for &(k, w) in taps {
        gradient[2 * k + c] += w * s;
    }
}

/// Factory of zero displacement fields.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VectorFieldFactory {
    kernel: BSplineKernel,
    boundary: Boundary,
    smooth: f64,
}

impl VectorFieldFactory {
    pub fn new(kernel: BSplineKernel, boundary: Boundary, smooth: f64) -> Self {
        Self {
            kernel,
            boundary,
            smooth,
        }
    }
}

impl TransformFactory for VectorFieldFactory {
    fn creator_string(&self) -> String {
        format!(
            "vf:imgkernel=[{}],imgboundary={},smooth={}",
            self.kernel.creator_string(),
            self.boundary,
            self.smooth
        )
    }

    fn create(&self, size: Size2D) -> VoxRegResult<Box<dyn Transform>> {
        Ok(Box::new(VectorFieldTransform::new(
            size,
            self.kernel,
            self.boundary,
            self.smooth,
        )))
    }
}

fn create(params: &ParamValues, registry: &Registry) -> VoxRegResult<Box<dyn TransformFactory>> {
    let kernel = registry.produce_kernel(params.text("imgkernel")?)?;
    let boundary: Boundary = params.text("imgboundary")?.parse()?;
    Ok(Box::new(VectorFieldFactory::new(
        *kernel,
        boundary,
        params.float("smooth")?,
    )))
}

pub(super) fn plugin() -> PluginInfo<dyn TransformFactory> {
    PluginInfo {
        name: "vf",
        description: "dense displacement field, one vector per pixel",
        params: PARAMS,
        create,
    }
}
