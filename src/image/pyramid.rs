//! Multi-resolution sizing and resampling of double images.
//!
//! Resampling is origin anchored: output pixel `x'` reads input position
//! `x = x' / s` with `s = new / old` per axis. Each axis is filtered with a
//! tent kernel of radius `max(1, 1/s)` and mirrored at the borders, so
//! shrinking averages and enlarging interpolates linearly.

use crate::image::{DoubleImage, Size2D, TypedImage};
use crate::util::math::mirror_index;
use crate::util::VoxRegResult;

/// Returns the level sizes of a registration pyramid, coarse to fine.
///
/// For `shift = levels - 1 ..= 0` the size is `max(1, full >> shift)` per
/// axis. Levels whose smaller side would fall below `min_size` are skipped;
/// the full size is always kept.
pub fn pyramid_sizes(full: Size2D, levels: usize, min_size: usize) -> Vec<Size2D> {
    let levels = levels.max(1);
    let mut sizes = Vec::with_capacity(levels);
    for shift in (0..levels).rev() {
        let size = Size2D {
            width: (full.width() >> shift.min(usize::BITS as usize - 1)).max(1),
            height: (full.height() >> shift.min(usize::BITS as usize - 1)).max(1),
        };
        if shift > 0 && size.width().min(size.height()) < min_size {
            continue;
        }
        if sizes.last() != Some(&size) {
            sizes.push(size);
        }
    }
    sizes
}

/// Resamples `field` onto a `size` grid and rescales the pixel size.
pub fn resample(field: &DoubleImage, size: Size2D) -> VoxRegResult<DoubleImage> {
    let src = field.size();
    let size = Size2D::new(size.width(), size.height())?;
    if src == size {
        return Ok(field.clone());
    }
    let x_taps = axis_taps(src.width(), size.width());
    let y_taps = axis_taps(src.height(), size.height());

    // Rows first: src.height() rows of size.width() samples.
    let data = field.data();
    let mut rows = vec![0.0; size.width() * src.height()];
    for y in 0..src.height() {
        let line = &data[y * src.width()..(y + 1) * src.width()];
        let out = &mut rows[y * size.width()..(y + 1) * size.width()];
        for (x, taps) in x_taps.iter().enumerate() {
            out[x] = taps.iter().map(|&(i, w)| w * line[i]).sum();
        }
    }

    let mut out = vec![0.0; size.len()];
    for (y, taps) in y_taps.iter().enumerate() {
        for x in 0..size.width() {
            out[y * size.width() + x] = taps
                .iter()
                .map(|&(j, w)| w * rows[j * size.width() + x])
                .sum();
        }
    }

    let mut meta = field.meta().clone();
    let ratio = src.ratio_to(size);
    meta.pixel_size = [meta.pixel_size[0] * ratio[0], meta.pixel_size[1] * ratio[1]];
    Ok(TypedImage::new(size, out)?.with_meta(meta))
}

/// Normalized tent-kernel taps for every output sample of one axis.
fn axis_taps(src_len: usize, dst_len: usize) -> Vec<Vec<(usize, f64)>> {
    let scale = dst_len as f64 / src_len as f64;
    let radius = (1.0 / scale).max(1.0);
    (0..dst_len)
        .map(|i| {
            let center = i as f64 / scale;
            let lo = (center - radius).ceil() as isize;
            let hi = (center + radius).floor() as isize;
            let mut taps: Vec<(usize, f64)> = Vec::with_capacity((hi - lo + 1).max(1) as usize);
            let mut total = 0.0;
            for k in lo..=hi {
                let w = 1.0 - (k as f64 - center).abs() / radius;
                if w <= 0.0 {
                    continue;
                }
                let idx = mirror_index(k, src_len);
                match taps.iter_mut().find(|(j, _)| *j == idx) {
                    Some(tap) => tap.1 += w,
                    None => taps.push((idx, w)),
                }
                total += w;
            }
            if total > 0.0 {
                for tap in &mut taps {
                    tap.1 /= total;
                }
            } else {
                taps.push((mirror_index(center.round() as isize, src_len), 1.0));
            }
            taps
        })
        .collect()
}
