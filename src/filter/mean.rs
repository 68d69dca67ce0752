//! Box mean filter.

use super::{Filter, ROW_CHUNK};
use crate::image::dispatch::{self, ImageVisitor};
use crate::image::{Image, Pixel, TypedImage};
use crate::parallel::fill_rows;
use crate::plugin::{ParamSpec, ParamValues, PluginInfo, Registry};
use crate::util::math::SummedArea;
use crate::util::VoxRegResult;

const PARAMS: &[ParamSpec] = &[ParamSpec::int(
    "w",
    0,
    1 << 20,
    Some("1"),
    "half width of the (2w+1)x(2w+1) window",
)];

/// Mean over a `(2w+1)²` window; border windows shrink to the part inside
/// the image. The result keeps the input pixel type (rounded).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeanFilter {
    half_width: usize,
}

impl MeanFilter {
    pub fn new(half_width: usize) -> Self {
        Self { half_width }
    }
}

impl Filter for MeanFilter {
    fn name(&self) -> &'static str {
        "mean"
    }

    fn filter(&self, image: &Image) -> VoxRegResult<Image> {
        dispatch::filter(self, image)
    }
}

impl ImageVisitor for MeanFilter {
    type Output = Image;

    fn visit<T: Pixel>(&self, image: &TypedImage<T>) -> VoxRegResult<Image> {
        let size = image.size();
        let table = SummedArea::new(size, |i| image.data()[i].to_f64());
        let w = self.half_width;
        let mut out = vec![T::default(); size.len()];
        fill_rows(&mut out, size.width(), ROW_CHUNK, |y, row| {
            let y0 = y.saturating_sub(w);
            let y1 = (y + w + 1).min(size.height());
            for (x, v) in row.iter_mut().enumerate() {
                let x0 = x.saturating_sub(w);
                let x1 = (x + w + 1).min(size.width());
                let count = ((x1 - x0) * (y1 - y0)) as f64;
                *v = T::from_f64(table.sum(x0, y0, x1, y1) / count);
            }
        });
        Ok(Image::from(image.with_same_geometry(out)?))
    }
}

fn create(params: &ParamValues, _registry: &Registry) -> VoxRegResult<Box<dyn Filter>> {
    Ok(Box::new(MeanFilter::new(params.usize("w")?)))
}

pub(super) fn plugin() -> PluginInfo<dyn Filter> {
    PluginInfo {
        name: "mean",
        description: "box mean with shrinking border windows",
        params: PARAMS,
        create,
    }
}
