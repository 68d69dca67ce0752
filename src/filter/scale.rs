//! Resampling onto a grid of another size.

use super::Filter;
use crate::image::dispatch::with_pixel_type;
use crate::image::pyramid::resample;
use crate::image::{Image, Size2D, TypedImage};
use crate::plugin::{ParamSpec, ParamValues, PluginInfo, Registry};
use crate::util::VoxRegResult;

const PARAMS: &[ParamSpec] = &[
    ParamSpec::int("sx", 1, 1 << 24, None, "output width"),
    ParamSpec::int("sy", 1, 1 << 24, None, "output height"),
];

/// Resamples to `sx x sy` pixels with an origin-anchored tent filter.
///
/// The pixel size is rescaled so the physical extent stays the same; the
/// output keeps the input pixel type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScaleFilter {
    size: Size2D,
}

impl ScaleFilter {
    pub fn new(size: Size2D) -> Self {
        Self { size }
    }
}

impl Filter for ScaleFilter {
    fn name(&self) -> &'static str {
        "scale"
    }

    fn filter(&self, image: &Image) -> VoxRegResult<Image> {
        let double = image.to_double();
        let scaled = resample(&double, self.size)?;
        Ok(with_pixel_type!(image.pixel_type(), T => {
            Image::from(TypedImage::<T>::from_double(&scaled))
        }))
    }
}

fn create(params: &ParamValues, _registry: &Registry) -> VoxRegResult<Box<dyn Filter>> {
    let size = Size2D::new(params.usize("sx")?, params.usize("sy")?)?;
    Ok(Box::new(ScaleFilter::new(size)))
}

pub(super) fn plugin() -> PluginInfo<dyn Filter> {
    PluginInfo {
        name: "scale",
        description: "resample to a new grid size",
        params: PARAMS,
        create,
    }
}
