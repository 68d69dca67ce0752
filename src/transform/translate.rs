//! Pure translation `T(x) = x + t`.

use super::{check_len, scale_factors, Transform, TransformFactory};
use crate::image::{AttributeMap, Size2D};
use crate::plugin::{ParamSpec, ParamValues, PluginInfo, Registry};
use crate::util::VoxRegResult;
use nalgebra::{Matrix2, Vector2};

/// Translation with parameters `(tx, ty)`.
#[derive(Clone, Debug, PartialEq)]
pub struct TranslateTransform {
    size: Size2D,
    shift: Vector2<f64>,
    attributes: AttributeMap,
}

impl TranslateTransform {
    pub fn new(size: Size2D, shift: Vector2<f64>) -> Self {
        Self {
            size,
            shift,
            attributes: AttributeMap::new(),
        }
    }

    pub fn shift(&self) -> Vector2<f64> {
        self.shift
    }
}

impl Transform for TranslateTransform {
    fn creator_string(&self) -> String {
        "translate".to_string()
    }

    fn size(&self) -> Size2D {
        self.size
    }

    fn degrees_of_freedom(&self) -> usize {
        2
    }

    fn parameters(&self) -> Vec<f64> {
        vec![self.shift.x, self.shift.y]
    }

    fn set_parameters(&mut self, params: &[f64]) -> VoxRegResult<()> {
        check_len("translate parameters", 2, params.len())?;
        self.shift = Vector2::new(params[0], params[1]);
        Ok(())
    }

    fn apply(&self, x: Vector2<f64>) -> Vector2<f64> {
        x + self.shift
    }

    fn derivative_at(&self, _x: usize, _y: usize) -> Matrix2<f64> {
        Matrix2::identity()
    }

    fn upscale(&self, size: Size2D) -> VoxRegResult<Box<dyn Transform>> {
        let s = scale_factors(self.size, size);
        let mut up = TranslateTransform::new(size, self.shift.component_mul(&s));
        up.attributes = self.attributes.clone();
        Ok(Box::new(up))
    }

    fn translate(&self, force: &[Vector2<f64>], gradient: &mut [f64]) -> VoxRegResult<()> {
        check_len("translate force field", self.size.len(), force.len())?;
        check_len("translate gradient", 2, gradient.len())?;
        let total = force.iter().fold(Vector2::zeros(), |acc, f| acc + f);
        gradient[0] = total.x;
        gradient[1] = total.y;
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

/// Factory of identity translations.
#[derive(Clone, Copy, Debug, Default)]
pub struct TranslateFactory;

impl TransformFactory for TranslateFactory {
    fn creator_string(&self) -> String {
        "translate".to_string()
    }

    fn create(&self, size: Size2D) -> VoxRegResult<Box<dyn Transform>> {
        Ok(Box::new(TranslateTransform::new(size, Vector2::zeros())))
    }
}

fn create(_params: &ParamValues, _registry: &Registry) -> VoxRegResult<Box<dyn TransformFactory>> {
    Ok(Box::new(TranslateFactory))
}

pub(super) fn plugin() -> PluginInfo<dyn TransformFactory> {
    const PARAMS: &[ParamSpec] = &[];
    PluginInfo {
        name: "translate",
        description: "translation (tx, ty)",
        params: PARAMS,
        create,
    }
}
