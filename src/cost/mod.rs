//! Image similarity measures.
//!
//! An [`ImageCost`] compares a warped source with a reference of the same
//! size. Reference-only work (for example the normalized gradient field) is
//! done once in [`ImageCost::prepare_reference`] and handed back on every
//! evaluation, so the cost object itself stays immutable.

mod lncc;
mod ncc;
mod ngf;
mod ssd;

pub use lncc::LnccCost;
pub use ncc::NccCost;
pub use ngf::{NgfCost, NgfEvaluator};
pub use ssd::SsdCost;

use crate::image::DoubleImage;
use crate::plugin::PluginMap;
use crate::util::{VoxRegError, VoxRegResult};
use nalgebra::Vector2;

/// Reference image plus any cached derived data.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedReference {
    image: DoubleImage,
    field: Option<Vec<Vector2<f64>>>,
}

impl PreparedReference {
    pub fn new(image: DoubleImage) -> Self {
        Self { image, field: None }
    }

    pub fn with_field(image: DoubleImage, field: Vec<Vector2<f64>>) -> Self {
        Self {
            image,
            field: Some(field),
        }
    }

    pub fn image(&self) -> &DoubleImage {
        &self.image
    }

    /// Per-pixel vector field derived from the reference, if the cost uses one.
    pub fn field(&self) -> Option<&[Vector2<f64>]> {
        self.field.as_deref()
    }

    /// Rejects a warped image that does not cover the reference grid.
    pub(crate) fn check(&self, cost: &str, warped: &DoubleImage) -> VoxRegResult<()> {
        if warped.size() != self.image.size() {
            return Err(VoxRegError::invalid(format!(
                "{cost}: image size {} differs from reference size {}",
                warped.size(),
                self.image.size()
            )));
        }
        Ok(())
    }
}

/// Similarity measure between a warped source and a reference.
pub trait ImageCost: Send + Sync {
    fn name(&self) -> &'static str;

    /// Caches reference data for later evaluations.
    fn prepare_reference(&self, reference: &DoubleImage) -> PreparedReference;

    /// Cost value.
    fn value(&self, warped: &DoubleImage, reference: &PreparedReference) -> VoxRegResult<f64>;

    /// Cost value; writes `∂C/∂warped(x)` per pixel into `dcost`.
    fn evaluate(
        &self,
        warped: &DoubleImage,
        reference: &PreparedReference,
        dcost: &mut [f64],
    ) -> VoxRegResult<f64>;
}

pub(crate) fn register_builtin(map: &mut PluginMap<dyn ImageCost>) {
    map.register(ssd::plugin());
    map.register(ngf::plugin());
    map.register(ncc::plugin());
    map.register(lncc::plugin());
}

pub(crate) fn check_dcost(cost: &str, warped: &DoubleImage, dcost: &[f64]) -> VoxRegResult<()> {
    if dcost.len() != warped.size().len() {
        return Err(VoxRegError::invalid(format!(
            "{cost}: derivative buffer has {} values, image has {}",
            dcost.len(),
            warped.size().len()
        )));
    }
    Ok(())
}
