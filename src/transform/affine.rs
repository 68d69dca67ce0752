//! Affine transformation `T(x) = A x + t`.

use super::{check_len, grid_point, scale_factors, Transform, TransformFactory};
use crate::image::{AttributeMap, Size2D};
use crate::plugin::{ParamSpec, ParamValues, PluginInfo, Registry};
use crate::util::VoxRegResult;
use nalgebra::{Matrix2, Vector2};

/// Affine map with parameters `(a00, a01, tx, a10, a11, ty)`.
#[derive(Clone, Debug, PartialEq)]
pub struct AffineTransform {
    size: Size2D,
    linear: Matrix2<f64>,
    shift: Vector2<f64>,
    attributes: AttributeMap,
}

impl AffineTransform {
    pub fn new(size: Size2D, linear: Matrix2<f64>, shift: Vector2<f64>) -> Self {
        Self {
            size,
            linear,
            shift,
            attributes: AttributeMap::new(),
        }
    }

    pub fn identity(size: Size2D) -> Self {
        Self::new(size, Matrix2::identity(), Vector2::zeros())
    }
}

impl Transform for AffineTransform {
    fn creator_string(&self) -> String {
        "affine".to_string()
    }

    fn size(&self) -> Size2D {
        self.size
    }

    fn degrees_of_freedom(&self) -> usize {
        6
    }

    fn parameters(&self) -> Vec<f64> {
        let a = &self.linear;
        vec![a[(0, 0)], a[(0, 1)], self.shift.x, a[(1, 0)], a[(1, 1)], self.shift.y]
    }

    fn set_parameters(&mut self, params: &[f64]) -> VoxRegResult<()> {
        check_len("affine parameters", 6, params.len())?;
        self.linear = Matrix2::new(params[0], params[1], params[3], params[4]);
        self.shift = Vector2::new(params[2], params[5]);
        Ok(())
    }

    fn apply(&self, x: Vector2<f64>) -> Vector2<f64> {
        self.linear * x + self.shift
    }

    fn derivative_at(&self, _x: usize, _y: usize) -> Matrix2<f64> {
        self.linear
    }

    fn upscale(&self, size: Size2D) -> VoxRegResult<Box<dyn Transform>> {
        let s = scale_factors(self.size, size);
        let scale = Matrix2::from_diagonal(&s);
        let inverse = Matrix2::from_diagonal(&Vector2::new(1.0 / s.x, 1.0 / s.y));
        let mut up = AffineTransform::new(size, scale * self.linear * inverse, self.shift.component_mul(&s));
        up.attributes = self.attributes.clone();
        Ok(Box::new(up))
    }

    fn translate(&self, force: &[Vector2<f64>], gradient: &mut [f64]) -> VoxRegResult<()> {
        check_len("affine force field", self.size.len(), force.len())?;
        check_len("affine gradient", 6, gradient.len())?;
        let mut g = [0.0; 6];
        for (i, f) in force.iter().enumerate() {
            let p = grid_point(self.size, i);
            g[0] += f.x * p.x;
            g[1] += f.x * p.y;
            g[2] += f.x;
            g[3] += f.y * p.x;
            g[4] += f.y * p.y;
            g[5] += f.y;
        }
        gradient.copy_from_slice(&g);
        Ok(())
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

/// Factory of identity affine transformations.
#[derive(Clone, Copy, Debug, Default)]
pub struct AffineFactory;

impl TransformFactory for AffineFactory {
    fn creator_string(&self) -> String {
        "affine".to_string()
    }

    fn create(&self, size: Size2D) -> VoxRegResult<Box<dyn Transform>> {
        Ok(Box::new(AffineTransform::identity(size)))
    }
}

fn create(_params: &ParamValues, _registry: &Registry) -> VoxRegResult<Box<dyn TransformFactory>> {
    Ok(Box::new(AffineFactory))
}

pub(super) fn plugin() -> PluginInfo<dyn TransformFactory> {
    const PARAMS: &[ParamSpec] = &[];
    PluginInfo {
        name: "affine",
        description: "general linear map plus translation (a00, a01, tx, a10, a11, ty)",
        params: PARAMS,
        create,
    }
}
