//! Normalized cross correlation.
//!
//! `C = 1 - cov(w, r)² / (var(w) var(r))` over the whole image, so any
//! affine intensity relation between the images is optimal.

use super::{check_dcost, ImageCost, PreparedReference};
use crate::image::DoubleImage;
use crate::plugin::{ParamSpec, ParamValues, PluginInfo, Registry};
use crate::util::VoxRegResult;

/// Variance product below which the correlation is undefined.
const MIN_VARIANCE_PRODUCT: f64 = 1e-10;
/// Variance below which an image counts as flat.
const FLAT_VARIANCE: f64 = 1e-5;

/// Raw moments of a pair of intensity samples.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(super) struct NccSums {
    pub n: f64,
    pub a: f64,
    pub b: f64,
    pub aa: f64,
    pub bb: f64,
    pub ab: f64,
}

impl NccSums {
    #[inline]
    pub fn add(&mut self, a: f64, b: f64) {
        self.n += 1.0;
        self.a += a;
        self.b += b;
        self.aa += a * a;
        self.bb += b * b;
        self.ab += a * b;
    }

    /// Means and centered second moments.
    pub fn centered(&self) -> Centered {
        let (ma, mb) = (self.a / self.n, self.b / self.n);
        Centered {
            mean_a: ma,
            mean_b: mb,
            var_a: self.aa - self.n * ma * ma,
            var_b: self.bb - self.n * mb * mb,
            cov: self.ab - self.n * ma * mb,
        }
    }
}

/// Centered moments; the variances are not divided by the sample count.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(super) struct Centered {
    pub mean_a: f64,
    pub mean_b: f64,
    pub var_a: f64,
    pub var_b: f64,
    pub cov: f64,
}

impl Centered {
    /// `1 - r²`.
    #[inline]
    pub fn cost(&self) -> f64 {
        1.0 - self.cov * self.cov / (self.var_a * self.var_b)
    }

    /// `(α, β, γ)` with `∂(1 - r²)/∂a_i = α a_i + β b_i + γ`.
    #[inline]
    pub fn derivative(&self) -> (f64, f64, f64) {
        let k = 2.0 * self.cov / (self.var_a * self.var_b);
        let s = self.cov / self.var_a;
        (k * s, -k, k * (self.mean_b - s * self.mean_a))
    }
}

/// Global normalized cross correlation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NccCost;

impl NccCost {
    fn moments(warped: &DoubleImage, reference: &PreparedReference) -> Centered {
        let mut sums = NccSums::default();
        for (a, b) in warped.data().iter().zip(reference.image().data()) {
            sums.add(*a, *b);
        }
        sums.centered()
    }
}

/// Cost of moments that carry no correlation: zero when both images are
/// flat, the maximum otherwise.
fn degenerate_cost(m: &Centered) -> f64 {
    if m.var_a < FLAT_VARIANCE && m.var_b < FLAT_VARIANCE {
        0.0
    } else {
        1.0
    }
}

impl ImageCost for NccCost {
    fn name(&self) -> &'static str {
        "ncc"
    }

    fn prepare_reference(&self, reference: &DoubleImage) -> PreparedReference {
        PreparedReference::new(reference.clone())
    }

    fn value(&self, warped: &DoubleImage, reference: &PreparedReference) -> VoxRegResult<f64> {
        reference.check("ncc", warped)?;
        let m = Self::moments(warped, reference);
        if m.var_a * m.var_b > MIN_VARIANCE_PRODUCT {
            Ok(m.cost())
        } else {
            Ok(degenerate_cost(&m))
        }
    }

    fn evaluate(
        &self,
        warped: &DoubleImage,
        reference: &PreparedReference,
        dcost: &mut [f64],
    ) -> VoxRegResult<f64> {
        reference.check("ncc", warped)?;
        check_dcost("ncc", warped, dcost)?;
        let m = Self::moments(warped, reference);
        if !(m.var_a * m.var_b > MIN_VARIANCE_PRODUCT) {
            dcost.fill(0.0);
            return Ok(degenerate_cost(&m));
        }
        let (alpha, beta, gamma) = m.derivative();
        for ((d, a), b) in dcost.iter_mut().zip(warped.data()).zip(reference.image().data()) {
            *d = alpha * a + beta * b + gamma;
        }
        Ok(m.cost())
    }
}

fn create(_params: &ParamValues, _registry: &Registry) -> VoxRegResult<Box<dyn ImageCost>> {
    Ok(Box::new(NccCost))
}

pub(super) fn plugin() -> PluginInfo<dyn ImageCost> {
    const PARAMS: &[ParamSpec] = &[];
    PluginInfo {
        name: "ncc",
        description: "normalized cross correlation",
        params: PARAMS,
        create,
    }
}
