//! Median filter.

use super::{Filter, ROW_CHUNK};
use crate::image::dispatch::{self, ImageVisitor};
use crate::image::{Image, Pixel, TypedImage};
use crate::parallel::fill_rows;
use crate::plugin::{ParamSpec, ParamValues, PluginInfo, Registry};
use crate::util::VoxRegResult;

const PARAMS: &[ParamSpec] = &[ParamSpec::int(
    "w",
    0,
    1 << 12,
    Some("1"),
    "half width of the (2w+1)x(2w+1) window",
)];

/// Median over a `(2w+1)²` window with shrinking border windows.
///
/// An even number of samples yields the mean of the two middle values,
/// rounded into the input pixel type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MedianFilter {
    half_width: usize,
}

impl MedianFilter {
    pub fn new(half_width: usize) -> Self {
        Self { half_width }
    }
}

impl Filter for MedianFilter {
    fn name(&self) -> &'static str {
        "median"
    }

    fn filter(&self, image: &Image) -> VoxRegResult<Image> {
        dispatch::filter(self, image)
    }
}

impl ImageVisitor for MedianFilter {
    type Output = Image;

    fn visit<T: Pixel>(&self, image: &TypedImage<T>) -> VoxRegResult<Image> {
        let size = image.size();
        let w = self.half_width;
        let data = image.data();
        let mut out = vec![T::default(); size.len()];
        fill_rows(&mut out, size.width(), ROW_CHUNK, |y, row| {
            let y0 = y.saturating_sub(w);
            let y1 = (y + w + 1).min(size.height());
            let mut window = Vec::with_capacity((2 * w + 1) * (2 * w + 1));
            for (x, v) in row.iter_mut().enumerate() {
                let x0 = x.saturating_sub(w);
                let x1 = (x + w + 1).min(size.width());
                window.clear();
                for yy in y0..y1 {
                    window.extend(data[size.index(x0, yy)..size.index(x1, yy)].iter().map(|p| p.to_f64()));
                }
                *v = T::from_f64(median(&mut window));
            }
        });
        Ok(Image::from(image.with_same_geometry(out)?))
    }
}

/// Median of a non-empty sample; reorders `values`.
pub(crate) fn median(values: &mut [f64]) -> f64 {
    let n = values.len();
    let (lower, upper, _) = values.select_nth_unstable_by(n / 2, f64::total_cmp);
    let upper = *upper;
    if n % 2 == 1 {
        return upper;
    }
    let below = lower.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    0.5 * (below + upper)
}

fn create(params: &ParamValues, _registry: &Registry) -> VoxRegResult<Box<dyn Filter>> {
    Ok(Box::new(MedianFilter::new(params.usize("w")?)))
}

pub(super) fn plugin() -> PluginInfo<dyn Filter> {
    PluginInfo {
        name: "median",
        description: "window median with shrinking border windows",
        params: PARAMS,
        create,
    }
}

#[cfg(test)]
mod tests {
    use super::median;

    #[test]
    fn even_count_takes_mean_of_middle_pair() {
        assert_eq!(median(&mut [4.0, 1.0, 3.0]), 3.0);
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median(&mut [7.0]), 7.0);
    }
}
