//! Rectangular crop.

use super::Filter;
use crate::image::dispatch::{self, ImageVisitor};
use crate::image::{Image, Pixel, Size2D, TypedImage};
use crate::plugin::{ParamSpec, ParamValues, PluginInfo, Registry};
use crate::util::{VoxRegError, VoxRegResult};

const PARAMS: &[ParamSpec] = &[
    ParamSpec::int("x", 0, i64::MAX, Some("0"), "left column"),
    ParamSpec::int("y", 0, i64::MAX, Some("0"), "top row"),
    ParamSpec::int("w", 1, i64::MAX, None, "width"),
    ParamSpec::int("h", 1, i64::MAX, None, "height"),
];

/// Copies the sub-rectangle `[x, x+w) x [y, y+h)`, which must lie inside
/// the image. The origin moves to the first kept pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropFilter {
    x: usize,
    y: usize,
    size: Size2D,
}

impl CropFilter {
    pub fn new(x: usize, y: usize, size: Size2D) -> Self {
        Self { x, y, size }
    }
}

impl Filter for CropFilter {
    fn name(&self) -> &'static str {
        "crop"
    }

    fn filter(&self, image: &Image) -> VoxRegResult<Image> {
        dispatch::filter(self, image)
    }
}

impl ImageVisitor for CropFilter {
    type Output = Image;

    fn visit<T: Pixel>(&self, image: &TypedImage<T>) -> VoxRegResult<Image> {
        let src = image.size();
        let fits = self.x.checked_add(self.size.width()).is_some_and(|end| end <= src.width())
            && self.y.checked_add(self.size.height()).is_some_and(|end| end <= src.height());
        if !fits {
            return Err(VoxRegError::invalid(format!(
                "crop: {}+{},{} does not fit into {src}",
                self.size, self.x, self.y
            )));
        }
        let mut data = Vec::with_capacity(self.size.len());
        for y in self.y..self.y + self.size.height() {
            let start = src.index(self.x, y);
            data.extend_from_slice(&image.data()[start..start + self.size.width()]);
        }
        let mut meta = image.meta().clone();
        meta.origin = [
            meta.origin[0] + self.x as f64 * meta.pixel_size[0],
            meta.origin[1] + self.y as f64 * meta.pixel_size[1],
        ];
        Ok(Image::from(TypedImage::new(self.size, data)?.with_meta(meta)))
    }
}

fn create(params: &ParamValues, _registry: &Registry) -> VoxRegResult<Box<dyn Filter>> {
    let size = Size2D::new(params.usize("w")?, params.usize("h")?)?;
    Ok(Box::new(CropFilter::new(params.usize("x")?, params.usize("y")?, size)))
}

pub(super) fn plugin() -> PluginInfo<dyn Filter> {
    PluginInfo {
        name: "crop",
        description: "copy a sub-rectangle",
        params: PARAMS,
        create,
    }
}
