//! Rigid motion about the grid center.

use super::{check_len, grid_point, scale_factors, Transform, TransformFactory};
use crate::image::{AttributeMap, Size2D};
use crate::plugin::{ParamSpec, ParamValues, PluginInfo, Registry};
use crate::util::VoxRegResult;
use nalgebra::{Matrix2, Vector2};

/// `T(x) = R(φ)(x - c) + c + t` with `c = (w/2, h/2)`; parameters
/// `(tx, ty, φ)`.
#[derive(Clone, Debug, PartialEq)]
pub struct RigidTransform {
    size: Size2D,
    shift: Vector2<f64>,
    angle: f64,
    attributes: AttributeMap,
}

impl RigidTransform {
    pub fn new(size: Size2D, shift: Vector2<f64>, angle: f64) -> Self {
        Self {
            size,
            shift,
            angle,
            attributes: AttributeMap::new(),
        }
    }

    fn center(size: Size2D) -> Vector2<f64> {
        Vector2::new(size.width() as f64 / 2.0, size.height() as f64 / 2.0)
    }

    fn rotation(&self) -> Matrix2<f64> {
        let (s, c) = self.angle.sin_cos();
        Matrix2::new(c, -s, s, c)
    }
}

impl Transform for RigidTransform {
    fn creator_string(&self) -> String {
        "rigid".to_string()
    }

    fn size(&self) -> Size2D {
        self.size
    }

    fn degrees_of_freedom(&self) -> usize {
        3
    }

    fn parameters(&self) -> Vec<f64> {
        vec![self.shift.x, self.shift.y, self.angle]
    }

    fn set_parameters(&mut self, params: &[f64]) -> VoxRegResult<()> {
        check_len("rigid parameters", 3, params.len())?;
        self.shift = Vector2::new(params[0], params[1]);
        self.angle = params[2];
        Ok(())
    }

    fn apply(&self, x: Vector2<f64>) -> Vector2<f64> {
        let c = Self::center(self.size);
        self.rotation() * (x - c) + c + self.shift
    }

    fn derivative_at(&self, _x: usize, _y: usize) -> Matrix2<f64> {
        self.rotation()
    }

    fn upscale(&self, size: Size2D) -> VoxRegResult<Box<dyn Transform>> {
        // Keep the angle and match S T(S⁻¹ x') at the new center.
        let s = scale_factors(self.size, size);
        let new_center = Self::center(size);
        let mapped = self.apply(new_center.component_div(&s)).component_mul(&s);
        let mut up = RigidTransform::new(size, mapped - new_center, self.angle);
        up.attributes = self.attributes.clone();
        Ok(Box::new(up))
    }

    fn translate(&self, force: &[Vector2<f64>], gradient: &mut [f64]) -> VoxRegResult<()> {
        check_len("rigid force field", self.size.len(), force.len())?;
        check_len("rigid gradient", 3, gradient.len())?;
        let c = Self::center(self.size);
        let (s, co) = self.angle.sin_cos();
        let d_rotation = Matrix2::new(-s, -co, co, -s);
        let mut g = [0.0; 3];
        for (i, f) in force.iter().enumerate() {
            let d_angle = d_rotation * (grid_point(self.size, i) - c);
            g[0] += f.x;
            g[1] += f.y;
            g[2] += f.dot(&d_angle);
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

/// Factory of identity rigid transformations.
#[derive(Clone, Copy, Debug, Default)]
pub struct RigidFactory;

impl TransformFactory for RigidFactory {
    fn creator_string(&self) -> String {
        "rigid".to_string()
    }

    fn create(&self, size: Size2D) -> VoxRegResult<Box<dyn Transform>> {
        Ok(Box::new(RigidTransform::new(size, Vector2::zeros(), 0.0)))
    }
}

fn create(_params: &ParamValues, _registry: &Registry) -> VoxRegResult<Box<dyn TransformFactory>> {
    Ok(Box::new(RigidFactory))
}

pub(super) fn plugin() -> PluginInfo<dyn TransformFactory> {
    const PARAMS: &[ParamSpec] = &[];
    PluginInfo {
        name: "rigid",
        description: "rotation about the grid center plus translation (tx, ty, phi)",
        params: PARAMS,
        create,
    }
}
