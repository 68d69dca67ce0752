//! Free-form deformation on a B-spline coefficient grid.
//!
//! `T(x) = x + Σ_k c_k β(x / rate - k + pad)` with `pad = (d + 1) / 2`, so
//! knot `k` sits at pixel position `(k - pad) * rate`. The coefficient grid
//! extends `pad` knots beyond the image on every side.

use super::{check_len, scale_factors, SplineCoefficients, Transform, TransformFactory};
use crate::divcurl::DivCurlMatrix;
use crate::image::{AttributeMap, Size2D};
use crate::kernel::bspline::MAX_TAPS;
use crate::kernel::prefilter::prefilter_2d;
use crate::kernel::BSplineKernel;
use crate::plugin::{ParamSpec, ParamValues, PluginInfo, Registry};
use crate::util::{VoxRegError, VoxRegResult};
use nalgebra::{Matrix2, Vector2};

const PARAMS: &[ParamSpec] = &[
    ParamSpec::float("rate", 1.0, 1e6, Some("8"), "knot spacing in pixels"),
    ParamSpec::descriptor("kernel", Some("bspline:d=3"), "spline kernel, degree 2 to 5"),
];

/// Precomputed basis weights of one axis at every pixel position.
#[derive(Clone, Debug, PartialEq)]
struct AxisWeights {
    start: Vec<isize>,
    weights: Vec<[f64; MAX_TAPS]>,
}

impl AxisWeights {
    fn new(len: usize, rate: f64, pad: f64, kernel: BSplineKernel) -> Self {
        let mut start = Vec::with_capacity(len);
        let mut weights = Vec::with_capacity(len);
        for x in 0..len {
            let mut w = [0.0; MAX_TAPS];
            start.push(kernel.weights(x as f64 / rate + pad, &mut w));
            weights.push(w);
        }
        Self { start, weights }
    }
}

/// B-spline deformation with interleaved `(cx, cy)` coefficients.
#[derive(Clone, Debug, PartialEq)]
pub struct SplineTransform {
    size: Size2D,
    rate: f64,
    kernel: BSplineKernel,
    grid: Size2D,
    coeffs: Vec<f64>,
    x_weights: AxisWeights,
    y_weights: AxisWeights,
    attributes: AttributeMap,
}

impl SplineTransform {
    /// Identity deformation on `size`.
    pub fn new(size: Size2D, rate: f64, kernel: BSplineKernel) -> VoxRegResult<Self> {
        if kernel.degree() < 2 {
            return Err(VoxRegError::invalid(format!(
                "spline: kernel degree {} below 2",
                kernel.degree()
            )));
        }
        if !(rate >= 1.0) {
            return Err(VoxRegError::invalid(format!("spline: rate {rate} below 1")));
        }
        let grid = Self::grid_size(size, rate, kernel)?;
        let pad = Self::pad(kernel) as f64;
        Ok(Self {
            size,
            rate,
            kernel,
            grid,
            coeffs: vec![0.0; 2 * grid.len()],
            x_weights: AxisWeights::new(size.width(), rate, pad, kernel),
            y_weights: AxisWeights::new(size.height(), rate, pad, kernel),
            attributes: AttributeMap::new(),
        })
    }

    /// Number of extra knots on each side.
    pub fn pad(kernel: BSplineKernel) -> usize {
        (kernel.degree() + 1) / 2
    }

    /// Coefficient grid for an image grid: `ceil((n-1)/rate) + 1 + 2 pad`.
    pub fn grid_size(size: Size2D, rate: f64, kernel: BSplineKernel) -> VoxRegResult<Size2D> {
        let pad = Self::pad(kernel);
        let axis = |n: usize| ((n - 1) as f64 / rate).ceil() as usize + 1 + 2 * pad;
        Size2D::new(axis(size.width()), axis(size.height()))
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn kernel(&self) -> BSplineKernel {
        self.kernel
    }

    /// Coefficient grid extent.
    pub fn grid(&self) -> Size2D {
        self.grid
    }

    /// Displacement `u(x)` at an arbitrary position.
    pub fn displacement(&self, x: Vector2<f64>) -> Vector2<f64> {
        let pad = Self::pad(self.kernel) as f64;
        let mut wx = [0.0; MAX_TAPS];
        let mut wy = [0.0; MAX_TAPS];
        let sx = self.kernel.weights(x.x / self.rate + pad, &mut wx);
        let sy = self.kernel.weights(x.y / self.rate + pad, &mut wy);
        self.combine(sx, &wx, sy, &wy)
    }

    fn combine(&self, sx: isize, wx: &[f64; MAX_TAPS], sy: isize, wy: &[f64; MAX_TAPS]) -> Vector2<f64> {
        let taps = self.kernel.taps();
        let mut u = Vector2::zeros();
        for (j, &wyj) in wy[..taps].iter().enumerate() {
            let ky = sy + j as isize;
            if wyj == 0.0 || ky < 0 || ky as usize >= self.grid.height() {
                continue;
            }
            for (i, &wxi) in wx[..taps].iter().enumerate() {
                let kx = sx + i as isize;
                if kx < 0 || kx as usize >= self.grid.width() {
                    continue;
                }
                let k = 2 * self.grid.index(kx as usize, ky as usize);
                u.x += wyj * wxi * self.coeffs[k];
                u.y += wyj * wxi * self.coeffs[k + 1];
            }
        }
        u
    }
}

impl Transform for SplineTransform {
    fn creator_string(&self) -> String {
        format!("spline:rate={},kernel=[{}]", self.rate, self.kernel.creator_string())
    }

    fn size(&self) -> Size2D {
        self.size
    }

    fn degrees_of_freedom(&self) -> usize {
        self.coeffs.len()
    }

    fn parameters(&self) -> Vec<f64> {
        self.coeffs.clone()
    }

    fn set_parameters(&mut self, params: &[f64]) -> VoxRegResult<()> {
        check_len("spline parameters", self.coeffs.len(), params.len())?;
        self.coeffs.copy_from_slice(params);
        Ok(())
    }

    fn apply(&self, x: Vector2<f64>) -> Vector2<f64> {
        x + self.displacement(x)
    }

    fn derivative_at(&self, x: usize, y: usize) -> Matrix2<f64> {
        let pad = Self::pad(self.kernel) as f64;
        let mut wx = [0.0; MAX_TAPS];
        let mut wy = [0.0; MAX_TAPS];
        let mut dx = [0.0; MAX_TAPS];
        let mut dy = [0.0; MAX_TAPS];
        let sx = self
            .kernel
            .weights_and_derivatives(x as f64 / self.rate + pad, &mut wx, &mut dx);
        let sy = self
            .kernel
            .weights_and_derivatives(y as f64 / self.rate + pad, &mut wy, &mut dy);
        let du_dx = self.combine(sx, &dx, sy, &wy) / self.rate;
        let du_dy = self.combine(sx, &wx, sy, &dy) / self.rate;
        Matrix2::new(1.0 + du_dx.x, du_dy.x, du_dx.y, 1.0 + du_dy.y)
    }

    fn upscale(&self, size: Size2D) -> VoxRegResult<Box<dyn Transform>> {
        let s = scale_factors(self.size, size);
        let mut up = SplineTransform::new(size, self.rate, self.kernel)?;
        let pad = Self::pad(self.kernel) as f64;
        let grid = up.grid;
        let mut cx = vec![0.0; grid.len()];
        let mut cy = vec![0.0; grid.len()];
        for ky in 0..grid.height() {
            for kx in 0..grid.width() {
                let knot = Vector2::new(
                    (kx as f64 - pad) * self.rate,
                    (ky as f64 - pad) * self.rate,
                );
                let u = self.displacement(knot.component_div(&s)).component_mul(&s);
                let idx = grid.index(kx, ky);
                cx[idx] = u.x;
                cy[idx] = u.y;
            }
        }
        prefilter_2d(&mut cx, grid, self.kernel.poles());
        prefilter_2d(&mut cy, grid, self.kernel.poles());
        for (i, (vx, vy)) in cx.iter().zip(cy.iter()).enumerate() {
            up.coeffs[2 * i] = *vx;
            up.coeffs[2 * i + 1] = *vy;
        }
        up.attributes = self.attributes.clone();
        Ok(Box::new(up))
    }

    fn translate(&self, force: &[Vector2<f64>], gradient: &mut [f64]) -> VoxRegResult<()> {
        check_len("spline force field", self.size.len(), force.len())?;
        check_len("spline gradient", self.coeffs.len(), gradient.len())?;
        gradient.fill(0.0);
        let taps = self.kernel.taps();
        let mut row_acc = vec![Vector2::<f64>::zeros(); self.grid.width()];
        for y in 0..self.size.height() {
            row_acc.fill(Vector2::zeros());
            for x in 0..self.size.width() {
                let f = force[self.size.index(x, y)];
                let sx = self.x_weights.start[x];
                for (i, w) in self.x_weights.weights[x][..taps].iter().enumerate() {
                    let kx = sx + i as isize;
                    if kx >= 0 && (kx as usize) < self.grid.width() {
                        row_acc[kx as usize] += f * *w;
                    }
                }
            }
            let sy = self.y_weights.start[y];
            for (j, w) in self.y_weights.weights[y][..taps].iter().enumerate() {
                let ky = sy + j as isize;
                if ky < 0 || ky as usize >= self.grid.height() {
                    continue;
                }
                for (kx, acc) in row_acc.iter().enumerate() {
                    let k = 2 * self.grid.index(kx, ky as usize);
                    gradient[k] += w * acc.x;
                    gradient[k + 1] += w * acc.y;
                }
            }
        }
        Ok(())
    }

    fn spline_coefficients(&self) -> Option<SplineCoefficients<'_>> {
        Some(SplineCoefficients {
            grid: self.grid,
            coeffs: &self.coeffs,
            knot_spacing: self.rate,
            kernel: self.kernel,
        })
    }

    fn divcurl_cost(&self, div: f64, curl: f64, gradient: Option<&mut [f64]>) -> VoxRegResult<f64> {
        let matrix = DivCurlMatrix::new(self.grid, self.rate, self.kernel, div, curl)?;
        match gradient {
            Some(gradient) => matrix.evaluate(&self.coeffs, gradient),
            None => matrix.multiply(&self.coeffs),
        }
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

/// Factory of identity spline deformations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SplineFactory {
    rate: f64,
    kernel: BSplineKernel,
}

impl SplineFactory {
    pub fn new(rate: f64, kernel: BSplineKernel) -> VoxRegResult<Self> {
        if kernel.degree() < 2 {
            return Err(VoxRegError::invalid(format!(
                "spline: kernel degree {} not in [2, 5]",
                kernel.degree()
            )));
        }
        Ok(Self { rate, kernel })
    }
}

impl TransformFactory for SplineFactory {
    fn creator_string(&self) -> String {
        format!("spline:rate={},kernel=[{}]", self.rate, self.kernel.creator_string())
    }

    fn create(&self, size: Size2D) -> VoxRegResult<Box<dyn Transform>> {
        Ok(Box::new(SplineTransform::new(size, self.rate, self.kernel)?))
    }
}

fn create(params: &ParamValues, registry: &Registry) -> VoxRegResult<Box<dyn TransformFactory>> {
    let kernel = registry.produce_kernel(params.text("kernel")?)?;
    Ok(Box::new(SplineFactory::new(params.float("rate")?, *kernel)?))
}

pub(super) fn plugin() -> PluginInfo<dyn TransformFactory> {
    PluginInfo {
        name: "spline",
        description: "B-spline free-form deformation",
        params: PARAMS,
        create,
    }
}
