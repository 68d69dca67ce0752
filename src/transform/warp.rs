//! Resampling of images through a transformation.
//!
//! The output grid is the transformation grid; output pixel `x` receives the
//! source interpolated at `T(x)`.

use super::Transform;
use crate::filter::ROW_CHUNK;
use crate::image::dispatch::with_pixel_type;
use crate::image::{DoubleImage, Image, Size2D, TypedImage};
use crate::kernel::{BSplineKernel, Boundary, Interpolator};
use crate::parallel::{fill_rows_with_log, TaskLog};
use crate::trace::trace_span;
use crate::util::VoxRegResult;
use nalgebra::Vector2;

#[inline]
fn inside(size: Size2D, p: Vector2<f64>) -> bool {
    p.x >= 0.0 && p.y >= 0.0 && p.x <= (size.width() - 1) as f64 && p.y <= (size.height() - 1) as f64
}

fn log_outside(log: &mut TaskLog, y: usize, outside: usize) {
    if outside > 0 {
        log.push(format!("row {y}: {outside} samples outside the source"));
    }
}

/// Warps an already prefiltered source.
pub fn warp_double(source: &Interpolator, transform: &dyn Transform) -> DoubleImage {
    warp_double_logged(source, transform).0
}

fn warp_double_logged(source: &Interpolator, transform: &dyn Transform) -> (DoubleImage, Vec<TaskLog>) {
    let size = transform.size();
    let mut data = vec![0.0; size.len()];
    let logs = fill_rows_with_log(&mut data, size.width(), ROW_CHUNK, |y, row, log| {
        let mut outside = 0;
        for (x, out) in row.iter_mut().enumerate() {
            let p = transform.apply(Vector2::new(x as f64, y as f64));
            outside += usize::from(!inside(source.size(), p));
            *out = source.value(p.x, p.y);
        }
        log_outside(log, y, outside);
    });
    (TypedImage::from_fn(size, |x, y| data[size.index(x, y)]), logs)
}

/// Warps the source and samples its gradient at the warped positions.
///
/// The gradient is the exact derivative of the interpolant, as needed by
/// the chain rule of the image cost.
pub fn warp_with_gradient(
    source: &Interpolator,
    transform: &dyn Transform,
) -> (DoubleImage, Vec<Vector2<f64>>) {
    let size = transform.size();
    let mut values = vec![[0.0; 3]; size.len()];
    fill_rows_with_log(&mut values, size.width(), ROW_CHUNK, |y, row, log| {
        let mut outside = 0;
        for (x, out) in row.iter_mut().enumerate() {
            let p = transform.apply(Vector2::new(x as f64, y as f64));
            outside += usize::from(!inside(source.size(), p));
            let (v, g) = source.value_and_gradient(p.x, p.y);
            *out = [v, g[0], g[1]];
        }
        log_outside(log, y, outside);
    });
    let warped = TypedImage::from_fn(size, |x, y| values[size.index(x, y)][0]);
    let gradient = values.iter().map(|v| Vector2::new(v[1], v[2])).collect();
    (warped, gradient)
}

/// Warps `image` with `kernel` interpolation; the result keeps the input
/// pixel type and metadata.
pub fn warp(
    image: &Image,
    transform: &dyn Transform,
    kernel: BSplineKernel,
    boundary: Boundary,
) -> VoxRegResult<Image> {
    let _span = trace_span!("warp", pixel_type = image.pixel_type().name()).entered();
    let source = Interpolator::new(&image.to_double(), kernel, boundary);
    let warped = warp_double(&source, transform).with_meta(image.meta().clone());
    Ok(with_pixel_type!(image.pixel_type(), T => {
        Image::from(TypedImage::<T>::from_double(&warped))
    }))
}
