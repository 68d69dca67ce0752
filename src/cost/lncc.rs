//! Local normalized cross correlation.
//!
//! Every pixel centers a `(2w+1)²` window, clipped at the image border. The
//! cost is the mean of `1 - r²` over the windows whose variance product
//! exceeds a small threshold; the remaining windows are skipped. All window
//! moments and the derivative come from summed-area tables.

use super::ncc::{Centered, NccSums};
use super::{check_dcost, ImageCost, PreparedReference};
use crate::image::{DoubleImage, Size2D};
use crate::plugin::{ParamSpec, ParamValues, PluginInfo, Registry};
use crate::util::math::SummedArea;
use crate::util::{VoxRegError, VoxRegResult};

const PARAMS: &[ParamSpec] = &[ParamSpec::int(
    "w",
    1,
    256,
    Some("5"),
    "half width of the correlation window",
)];

/// Variance product a window needs to take part in the cost.
const MIN_VARIANCE_PRODUCT: f64 = 1e-5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LnccCost {
    half_width: usize,
}

/// Window moment tables of one image pair.
struct Moments {
    size: Size2D,
    a: SummedArea,
    b: SummedArea,
    aa: SummedArea,
    bb: SummedArea,
    ab: SummedArea,
}

impl Moments {
    fn new(warped: &[f64], reference: &[f64], size: Size2D) -> Self {
        Self {
            size,
            a: SummedArea::new(size, |i| warped[i]),
            b: SummedArea::new(size, |i| reference[i]),
            aa: SummedArea::new(size, |i| warped[i] * warped[i]),
            bb: SummedArea::new(size, |i| reference[i] * reference[i]),
            ab: SummedArea::new(size, |i| warped[i] * reference[i]),
        }
    }

    fn window(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> NccSums {
        NccSums {
            n: ((x1 - x0) * (y1 - y0)) as f64,
            a: self.a.sum(x0, y0, x1, y1),
            b: self.b.sum(x0, y0, x1, y1),
            aa: self.aa.sum(x0, y0, x1, y1),
            bb: self.bb.sum(x0, y0, x1, y1),
            ab: self.ab.sum(x0, y0, x1, y1),
        }
    }
}

impl LnccCost {
    pub fn new(half_width: usize) -> VoxRegResult<Self> {
        if half_width == 0 {
            return Err(VoxRegError::invalid("lncc: window half width must be at least 1"));
        }
        Ok(Self { half_width })
    }

    pub fn half_width(&self) -> usize {
        self.half_width
    }

    /// Clipped window `[x0, x1) x [y0, y1)` centered at `(x, y)`.
    #[inline]
    fn bounds(&self, size: Size2D, x: usize, y: usize) -> (usize, usize, usize, usize) {
        let w = self.half_width;
        (
            x.saturating_sub(w),
            y.saturating_sub(w),
            (x + w + 1).min(size.width()),
            (y + w + 1).min(size.height()),
        )
    }

    /// Visits every contributing window with its center index and moments.
    fn for_each_window(&self, moments: &Moments, mut f: impl FnMut(usize, &Centered)) {
        let size = moments.size;
        for y in 0..size.height() {
            for x in 0..size.width() {
                let (x0, y0, x1, y1) = self.bounds(size, x, y);
                let sums = moments.window(x0, y0, x1, y1);
                if sums.n < 2.0 {
                    continue;
                }
                let m = sums.centered();
                if m.var_a * m.var_b > MIN_VARIANCE_PRODUCT {
                    f(size.index(x, y), &m);
                }
            }
        }
    }
}

impl ImageCost for LnccCost {
    fn name(&self) -> &'static str {
        "lncc"
    }

    fn prepare_reference(&self, reference: &DoubleImage) -> PreparedReference {
        PreparedReference::new(reference.clone())
    }

    fn value(&self, warped: &DoubleImage, reference: &PreparedReference) -> VoxRegResult<f64> {
        reference.check("lncc", warped)?;
        let moments = Moments::new(warped.data(), reference.image().data(), warped.size());
        let (mut sum, mut count) = (0.0, 0usize);
        self.for_each_window(&moments, |_, m| {
            sum += m.cost();
            count += 1;
        });
        Ok(if count > 0 { sum / count as f64 } else { 0.0 })
    }

    fn evaluate(
        &self,
        warped: &DoubleImage,
        reference: &PreparedReference,
        dcost: &mut [f64],
    ) -> VoxRegResult<f64> {
        reference.check("lncc", warped)?;
        check_dcost("lncc", warped, dcost)?;
        let size = warped.size();
        let moments = Moments::new(warped.data(), reference.image().data(), size);

        // Per-window derivative coefficients, stored at the window center.
        let mut coeffs = vec![[0.0; 3]; size.len()];
        let (mut sum, mut count) = (0.0, 0usize);
        self.for_each_window(&moments, |i, m| {
            sum += m.cost();
            count += 1;
            let (alpha, beta, gamma) = m.derivative();
            coeffs[i] = [alpha, beta, gamma];
        });
        if count == 0 {
            dcost.fill(0.0);
            return Ok(0.0);
        }

        // A pixel lies in exactly the windows centered within `w` of it.
        let tables: Vec<SummedArea> = (0..3)
            .map(|k| SummedArea::new(size, |i| coeffs[i][k]))
            .collect();
        let scale = 1.0 / count as f64;
        let (a, b) = (warped.data(), reference.image().data());
        for y in 0..size.height() {
            for x in 0..size.width() {
                let (x0, y0, x1, y1) = self.bounds(size, x, y);
                let i = size.index(x, y);
                let [alpha, beta, gamma] = [0, 1, 2].map(|k| tables[k].sum(x0, y0, x1, y1));
                dcost[i] = scale * (alpha * a[i] + beta * b[i] + gamma);
            }
        }
        Ok(sum * scale)
    }
}

fn create(params: &ParamValues, _registry: &Registry) -> VoxRegResult<Box<dyn ImageCost>> {
    Ok(Box::new(LnccCost::new(params.usize("w")?)?))
}

pub(super) fn plugin() -> PluginInfo<dyn ImageCost> {
    PluginInfo {
        name: "lncc",
        description: "local normalized cross correlation",
        params: PARAMS,
        create,
    }
}
