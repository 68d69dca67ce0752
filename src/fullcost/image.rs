//! Image similarity term.

use super::{not_sized, CostState, DataPool, FullCost, REFERENCE_KEY, SOURCE_KEY};
use crate::cost::{ImageCost, PreparedReference};
use crate::image::pyramid::resample;
use crate::image::{DoubleImage, Size2D};
use crate::kernel::{BSplineKernel, Boundary, Interpolator};
use crate::plugin::{ParamSpec, ParamValues, PluginInfo, Registry};
use crate::trace::trace_debug;
use crate::transform::warp::{warp_double, warp_with_gradient};
use crate::transform::Transform;
use crate::util::{VoxRegError, VoxRegResult};
use nalgebra::Vector2;
use std::sync::Arc;

const PARAMS: &[ParamSpec] = &[
    ParamSpec::text("src", Some(SOURCE_KEY), "data pool key of the moving image"),
    ParamSpec::text("ref", Some(REFERENCE_KEY), "data pool key of the fixed image"),
    ParamSpec::descriptor("cost", Some("ssd"), "image similarity measure"),
    ParamSpec::descriptor("interp", Some("bspline:d=3"), "interpolation kernel of the moving image"),
    ParamSpec::choice("boundary", &["mirror", "zero"], Some("mirror"), "moving image boundary"),
    ParamSpec::float("weight", 0.0, f64::MAX, Some("1"), "weight of the term"),
];

/// Compares the warped source with the reference.
///
/// The force at pixel `x` is `∂C/∂w(x) ∇src(T(x))`, pushed into parameter
/// space by [`Transform::translate`].
#[derive(Clone)]
pub struct ImageFullCost {
    source_key: String,
    reference_key: String,
    cost: Arc<dyn ImageCost>,
    kernel: BSplineKernel,
    boundary: Boundary,
    weight: f64,
}

impl ImageFullCost {
    pub fn new(
        cost: Arc<dyn ImageCost>,
        kernel: BSplineKernel,
        boundary: Boundary,
        weight: f64,
    ) -> VoxRegResult<Self> {
        if !(weight >= 0.0) {
            return Err(VoxRegError::invalid(format!("image: weight {weight} is negative")));
        }
        Ok(Self {
            source_key: SOURCE_KEY.to_string(),
            reference_key: REFERENCE_KEY.to_string(),
            cost,
            kernel,
            boundary,
            weight,
        })
    }

    /// Reads the images from other pool entries.
    pub fn with_keys(mut self, source: impl Into<String>, reference: impl Into<String>) -> Self {
        self.source_key = source.into();
        self.reference_key = reference.into();
        self
    }
}

impl FullCost for ImageFullCost {
    fn name(&self) -> &'static str {
        "image"
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn reinit(&self, pool: &DataPool) -> VoxRegResult<Box<dyn CostState>> {
        let source = pool.get(&self.source_key)?.to_double();
        let reference = pool.get(&self.reference_key)?.to_double();
        if source.size() != reference.size() {
            return Err(VoxRegError::invalid(format!(
                "image: source size {} differs from reference size {}",
                source.size(),
                reference.size()
            )));
        }
        Ok(Box::new(ImageCostState {
            cost: Arc::clone(&self.cost),
            kernel: self.kernel,
            boundary: self.boundary,
            source,
            reference,
            level: None,
        }))
    }
}

struct Level {
    size: Size2D,
    source: Interpolator,
    reference: PreparedReference,
}

struct ImageCostState {
    cost: Arc<dyn ImageCost>,
    kernel: BSplineKernel,
    boundary: Boundary,
    source: DoubleImage,
    reference: DoubleImage,
    level: Option<Level>,
}

impl ImageCostState {
    fn level(&self, transform: &dyn Transform) -> VoxRegResult<&Level> {
        let level = self.level.as_ref().ok_or_else(|| not_sized("image"))?;
        if transform.size() != level.size {
            return Err(VoxRegError::invalid(format!(
                "image: transformation size {} differs from level size {}",
                transform.size(),
                level.size
            )));
        }
        Ok(level)
    }
}

impl CostState for ImageCostState {
    fn full_size(&self) -> Option<Size2D> {
        Some(self.source.size())
    }

    fn set_size(&mut self, size: Size2D, transform: &dyn Transform) -> VoxRegResult<()> {
        if transform.size() != size {
            return Err(VoxRegError::invalid(format!(
                "image: transformation size {} differs from level size {size}",
                transform.size()
            )));
        }
        let source = resample(&self.source, size)?;
        let reference = resample(&self.reference, size)?;
        trace_debug!("image_cost_level", width = size.width(), height = size.height());
        self.level = Some(Level {
            size,
            source: Interpolator::new(&source, self.kernel, self.boundary),
            reference: self.cost.prepare_reference(&reference),
        });
        Ok(())
    }

    fn value(&self, transform: &dyn Transform) -> VoxRegResult<f64> {
        let level = self.level(transform)?;
        let warped = warp_double(&level.source, transform);
        self.cost.value(&warped, &level.reference)
    }

    fn evaluate(&self, transform: &dyn Transform, gradient: &mut [f64]) -> VoxRegResult<f64> {
        let level = self.level(transform)?;
        let (warped, source_gradient) = warp_with_gradient(&level.source, transform);
        let mut dcost = vec![0.0; level.size.len()];
        let value = self.cost.evaluate(&warped, &level.reference, &mut dcost)?;
        let force: Vec<Vector2<f64>> = dcost
            .iter()
            .zip(&source_gradient)
            .map(|(d, g)| g * *d)
            .collect();
        transform.translate(&force, gradient)?;
        Ok(value)
    }
}

fn create(params: &ParamValues, registry: &Registry) -> VoxRegResult<Box<dyn FullCost>> {
    let cost: Arc<dyn ImageCost> = Arc::from(registry.produce_image_cost(params.text("cost")?)?);
    let kernel = *registry.produce_kernel(params.text("interp")?)?;
    let boundary: Boundary = params.text("boundary")?.parse()?;
    let term = ImageFullCost::new(cost, kernel, boundary, params.float("weight")?)?
        .with_keys(params.text("src")?, params.text("ref")?);
    Ok(Box::new(term))
}

pub(super) fn plugin() -> PluginInfo<dyn FullCost> {
    PluginInfo {
        name: "image",
        description: "image similarity between the warped source and the reference",
        params: PARAMS,
        create,
    }
}
