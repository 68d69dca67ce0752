//! Range thresholding into a bit image.

use super::Filter;
use crate::image::dispatch::{self, ImageVisitor};
use crate::image::{Image, Pixel, TypedImage};
use crate::plugin::{ParamSpec, ParamValues, PluginInfo, Registry};
use crate::util::{VoxRegError, VoxRegResult};

const PARAMS: &[ParamSpec] = &[
    ParamSpec::float("min", f64::MIN, f64::MAX, Some("-1.7976931348623157e308"), "lower bound (inclusive)"),
    ParamSpec::float("max", f64::MIN, f64::MAX, Some("1.7976931348623157e308"), "upper bound (inclusive)"),
];

/// Sets a pixel where `min <= value <= max`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BinarizeFilter {
    min: f64,
    max: f64,
}

impl BinarizeFilter {
    pub fn new(min: f64, max: f64) -> VoxRegResult<Self> {
        if min > max {
            return Err(VoxRegError::invalid(format!(
                "binarize: min {min} exceeds max {max}"
            )));
        }
        Ok(Self { min, max })
    }
}

impl Filter for BinarizeFilter {
    fn name(&self) -> &'static str {
        "binarize"
    }

    fn filter(&self, image: &Image) -> VoxRegResult<Image> {
        dispatch::filter(self, image)
    }
}

impl ImageVisitor for BinarizeFilter {
    type Output = Image;

    fn visit<T: Pixel>(&self, image: &TypedImage<T>) -> VoxRegResult<Image> {
        Ok(Image::from(image.map(|v| {
            let v = v.to_f64();
            self.min <= v && v <= self.max
        })))
    }
}

fn create(params: &ParamValues, _registry: &Registry) -> VoxRegResult<Box<dyn Filter>> {
    Ok(Box::new(BinarizeFilter::new(params.float("min")?, params.float("max")?)?))
}

pub(super) fn plugin() -> PluginInfo<dyn Filter> {
    PluginInfo {
        name: "binarize",
        description: "bit image of the pixels within [min, max]",
        params: PARAMS,
        create,
    }
}
