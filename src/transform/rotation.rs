//! Pure rotation about a fixed point of the grid.

use super::{check_len, grid_point, Transform, TransformFactory};
use crate::image::{AttributeMap, Size2D};
use crate::plugin::{ParamSpec, ParamValues, PluginInfo, Registry};
use crate::util::{VoxRegError, VoxRegResult};
use nalgebra::{Matrix2, Vector2};

const PARAMS: &[ParamSpec] = &[
    ParamSpec::float("cx", 0.0, 1.0, Some("0.5"), "rotation center, fraction of the width"),
    ParamSpec::float("cy", 0.0, 1.0, Some("0.5"), "rotation center, fraction of the height"),
];

/// `T(x) = R(φ)(x - c) + c` with `c = (cx · w, cy · h)`; the single
/// parameter is `φ`.
#[derive(Clone, Debug, PartialEq)]
pub struct RotationTransform {
    size: Size2D,
    relative_center: Vector2<f64>,
    angle: f64,
    attributes: AttributeMap,
}

impl RotationTransform {
    pub fn new(size: Size2D, relative_center: Vector2<f64>, angle: f64) -> Self {
        Self {
            size,
            relative_center,
            angle,
            attributes: AttributeMap::new(),
        }
    }

    /// Rotation center in pixels.
    pub fn center(&self) -> Vector2<f64> {
        Vector2::new(
            self.relative_center.x * self.size.width() as f64,
            self.relative_center.y * self.size.height() as f64,
        )
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }

    fn rotation(&self) -> Matrix2<f64> {
        let (s, c) = self.angle.sin_cos();
        Matrix2::new(c, -s, s, c)
    }
}

fn descriptor(relative_center: Vector2<f64>) -> String {
    format!("rotation:cx={},cy={}", relative_center.x, relative_center.y)
}

impl Transform for RotationTransform {
    fn creator_string(&self) -> String {
        descriptor(self.relative_center)
    }

    fn size(&self) -> Size2D {
        self.size
    }

    fn degrees_of_freedom(&self) -> usize {
        1
    }

    fn parameters(&self) -> Vec<f64> {
        vec![self.angle]
    }

    fn set_parameters(&mut self, params: &[f64]) -> VoxRegResult<()> {
        check_len("rotation parameters", 1, params.len())?;
        self.angle = params[0];
        Ok(())
    }

    fn apply(&self, x: Vector2<f64>) -> Vector2<f64> {
        let c = self.center();
        self.rotation() * (x - c) + c
    }

    fn derivative_at(&self, _x: usize, _y: usize) -> Matrix2<f64> {
        self.rotation()
    }

    fn upscale(&self, size: Size2D) -> VoxRegResult<Box<dyn Transform>> {
        // The center scales with the grid; exact for isotropic scaling.
        let mut up = RotationTransform::new(size, self.relative_center, self.angle);
        up.attributes = self.attributes.clone();
        Ok(Box::new(up))
    }

    fn translate(&self, force: &[Vector2<f64>], gradient: &mut [f64]) -> VoxRegResult<()> {
        check_len("rotation force field", self.size.len(), force.len())?;
        check_len("rotation gradient", 1, gradient.len())?;
        let c = self.center();
        let (s, co) = self.angle.sin_cos();
        let d_rotation = Matrix2::new(-s, -co, co, -s);
        gradient[0] = force
            .iter()
            .enumerate()
            .map(|(i, f)| f.dot(&(d_rotation * (grid_point(self.size, i) - c))))
            .sum();
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

/// Factory of zero-angle rotations about a relative center.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RotationFactory {
    relative_center: Vector2<f64>,
}

impl RotationFactory {
    pub fn new(cx: f64, cy: f64) -> VoxRegResult<Self> {
        if !((0.0..=1.0).contains(&cx) && (0.0..=1.0).contains(&cy)) {
            return Err(VoxRegError::invalid(format!(
                "rotation: center ({cx}, {cy}) must lie within the grid"
            )));
        }
        Ok(Self {
            relative_center: Vector2::new(cx, cy),
        })
    }
}

impl TransformFactory for RotationFactory {
    fn creator_string(&self) -> String {
        descriptor(self.relative_center)
    }

    fn create(&self, size: Size2D) -> VoxRegResult<Box<dyn Transform>> {
        Ok(Box::new(RotationTransform::new(size, self.relative_center, 0.0)))
    }
}

fn create(params: &ParamValues, _registry: &Registry) -> VoxRegResult<Box<dyn TransformFactory>> {
    Ok(Box::new(RotationFactory::new(params.float("cx")?, params.float("cy")?)?))
}

pub(super) fn plugin() -> PluginInfo<dyn TransformFactory> {
    PluginInfo {
        name: "rotation",
        description: "rotation about a fixed relative center (phi)",
        params: PARAMS,
        create,
    }
}

#[cfg(test)]
mod tests {
    use super::{RotationFactory, RotationTransform};
    use crate::image::Size2D;
    use crate::transform::{Transform, TransformFactory};
    use nalgebra::Vector2;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn quarter_turn_about_the_center() {
        let size = Size2D::new(10, 6).unwrap();
        let t = RotationTransform::new(size, Vector2::new(0.5, 0.5), FRAC_PI_2);
        assert_eq!(t.center(), Vector2::new(5.0, 3.0));
        assert!((t.apply(Vector2::new(5.0, 3.0)) - Vector2::new(5.0, 3.0)).norm() < 1e-12);
        assert!((t.apply(Vector2::new(7.0, 3.0)) - Vector2::new(5.0, 5.0)).norm() < 1e-12);

        let corner = RotationTransform::new(size, Vector2::zeros(), FRAC_PI_2);
        assert!((corner.apply(Vector2::new(2.0, 0.0)) - Vector2::new(0.0, 2.0)).norm() < 1e-12);
    }

    #[test]
    fn angle_gradient_matches_finite_differences() {
        let size = Size2D::new(9, 7).unwrap();
        let center = Vector2::new(0.3, 0.8);
        let t = RotationTransform::new(size, center, 0.4);
        let force: Vec<Vector2<f64>> = (0..size.len())
            .map(|i| Vector2::new((i % 4) as f64 - 1.5, (i % 3) as f64 * 0.7))
            .collect();
        let mut gradient = [0.0];
        t.translate(&force, &mut gradient).unwrap();

        let energy = |angle: f64| {
            let r = RotationTransform::new(size, center, angle);
            (0..size.len())
                .map(|i| {
                    let p = Vector2::new((i % 9) as f64, (i / 9) as f64);
                    force[i].dot(&r.apply(p))
                })
                .sum::<f64>()
        };
        let h = 1e-6;
        let fd = (energy(0.4 + h) - energy(0.4 - h)) / (2.0 * h);
        assert!((fd - gradient[0]).abs() < 1e-6 * fd.abs().max(1.0), "{fd} vs {}", gradient[0]);
        assert!(t.translate(&force, &mut [0.0, 0.0]).is_err());
    }

    #[test]
    fn factory_checks_the_center() {
        assert!(RotationFactory::new(1.2, 0.5).is_err());
        assert!(RotationFactory::new(0.5, -0.1).is_err());
        let factory = RotationFactory::new(0.25, 1.0).unwrap();
        assert_eq!(factory.creator_string(), "rotation:cx=0.25,cy=1");
        let t = factory.create(Size2D::new(8, 4).unwrap()).unwrap();
        assert_eq!(t.parameters(), vec![0.0]);
        assert_eq!(t.creator_string(), factory.creator_string());
    }
}
