//! Sum of squared differences.

use super::{check_dcost, ImageCost, PreparedReference};
use crate::image::DoubleImage;
use crate::plugin::{ParamSpec, ParamValues, PluginInfo, Registry};
use crate::util::VoxRegResult;

/// `C = ½ Σ (w - r)² / N`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SsdCost;

impl ImageCost for SsdCost {
    fn name(&self) -> &'static str {
        "ssd"
    }

    fn prepare_reference(&self, reference: &DoubleImage) -> PreparedReference {
        PreparedReference::new(reference.clone())
    }

    fn value(&self, warped: &DoubleImage, reference: &PreparedReference) -> VoxRegResult<f64> {
        reference.check("ssd", warped)?;
        let sum: f64 = warped
            .data()
            .iter()
            .zip(reference.image().data())
            .map(|(w, r)| (w - r) * (w - r))
            .sum();
        Ok(0.5 * sum / warped.data().len() as f64)
    }

    fn evaluate(
        &self,
        warped: &DoubleImage,
        reference: &PreparedReference,
        dcost: &mut [f64],
    ) -> VoxRegResult<f64> {
        reference.check("ssd", warped)?;
        check_dcost("ssd", warped, dcost)?;
        let n = warped.data().len() as f64;
        let mut sum = 0.0;
        for ((d, w), r) in dcost.iter_mut().zip(warped.data()).zip(reference.image().data()) {
            let delta = w - r;
            sum += delta * delta;
            *d = delta / n;
        }
        Ok(0.5 * sum / n)
    }
}

fn create(_params: &ParamValues, _registry: &Registry) -> VoxRegResult<Box<dyn ImageCost>> {
    Ok(Box::new(SsdCost))
}

pub(super) fn plugin() -> PluginInfo<dyn ImageCost> {
    const PARAMS: &[ParamSpec] = &[];
    PluginInfo {
        name: "ssd",
        description: "sum of squared differences",
        params: PARAMS,
        create,
    }
}

#[cfg(test)]
mod tests {
    use super::SsdCost;
    use crate::cost::ImageCost;
    use crate::image::{Size2D, TypedImage};

    #[test]
    fn value_and_derivative() {
        let size = Size2D::new(2, 2).unwrap();
        let r = TypedImage::new(size, vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        let w = TypedImage::new(size, vec![1.0, 1.0, 0.0, 3.0]).unwrap();
        let prepared = SsdCost.prepare_reference(&r);
        let mut d = vec![0.0; 4];
        let value = SsdCost.evaluate(&w, &prepared, &mut d).unwrap();
        assert!((value - 0.625).abs() < 1e-12);
        assert_eq!(SsdCost.value(&w, &prepared).unwrap(), value);
        assert_eq!(d, vec![0.25, 0.0, -0.5, 0.0]);
    }
}
