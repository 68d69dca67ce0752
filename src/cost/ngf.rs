//! Normalized gradient fields.
//!
//! `n(x) = ∇I(x) / sqrt(|∇I(x)|² + ε²)` with central differences on the
//! interior pixels; the border carries a zero field. The cost sums an
//! evaluator `g(n_w, n_r)` over the interior and divides by `2N`.

use super::{check_dcost, ImageCost, PreparedReference};
use crate::image::{DoubleImage, Size2D};
use crate::plugin::{ParamSpec, ParamValues, PluginInfo, Registry};
use crate::util::{VoxRegError, VoxRegResult};
use nalgebra::Vector2;
use std::fmt;
use std::str::FromStr;

const PARAMS: &[ParamSpec] = &[
    ParamSpec::choice("eval", &["cross", "dot"], Some("cross"), "pointwise evaluator"),
    ParamSpec::float("eps", 1e-12, f64::MAX, Some("0.1"), "gradient noise level"),
];

/// Pointwise comparison of two normalized gradients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NgfEvaluator {
    /// `(n_w × n_r)²`
    Cross,
    /// `-(n_w · n_r)²`
    Dot,
}

impl NgfEvaluator {
    pub fn name(self) -> &'static str {
        match self {
            NgfEvaluator::Cross => "cross",
            NgfEvaluator::Dot => "dot",
        }
    }

    /// Value and derivative with respect to `nw`.
    #[inline]
    fn eval(self, nw: Vector2<f64>, nr: Vector2<f64>) -> (f64, Vector2<f64>) {
        match self {
            NgfEvaluator::Cross => {
                let c = nw.x * nr.y - nw.y * nr.x;
                (c * c, Vector2::new(nr.y, -nr.x) * (2.0 * c))
            }
            NgfEvaluator::Dot => {
                let d = nw.dot(&nr);
                (-d * d, nr * (-2.0 * d))
            }
        }
    }
}

impl fmt::Display for NgfEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NgfEvaluator {
    type Err = VoxRegError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cross" => Ok(NgfEvaluator::Cross),
            "dot" => Ok(NgfEvaluator::Dot),
            other => Err(VoxRegError::invalid(format!("ngf: unknown evaluator '{other}'"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NgfCost {
    evaluator: NgfEvaluator,
    eps: f64,
}

impl NgfCost {
    pub fn new(evaluator: NgfEvaluator, eps: f64) -> VoxRegResult<Self> {
        if !(eps > 0.0) {
            return Err(VoxRegError::invalid(format!("ngf: eps must be positive, got {eps}")));
        }
        Ok(Self { evaluator, eps })
    }

    pub fn evaluator(&self) -> NgfEvaluator {
        self.evaluator
    }

    /// Central difference gradient at an interior pixel.
    #[inline]
    fn raw_gradient(data: &[f64], size: Size2D, x: usize, y: usize) -> Vector2<f64> {
        let i = size.index(x, y);
        let w = size.width();
        Vector2::new(0.5 * (data[i + 1] - data[i - 1]), 0.5 * (data[i + w] - data[i - w]))
    }

    fn interior(size: Size2D) -> impl Iterator<Item = (usize, usize)> {
        let (w, h) = (size.width(), size.height());
        (1..h.saturating_sub(1)).flat_map(move |y| (1..w.saturating_sub(1)).map(move |x| (x, y)))
    }

    fn normalized_field(&self, image: &DoubleImage) -> Vec<Vector2<f64>> {
        let size = image.size();
        let mut field = vec![Vector2::zeros(); size.len()];
        let eps2 = self.eps * self.eps;
        for (x, y) in Self::interior(size) {
            let v = Self::raw_gradient(image.data(), size, x, y);
            field[size.index(x, y)] = v / (v.norm_squared() + eps2).sqrt();
        }
        field
    }

    fn reference_field<'a>(&self, reference: &'a PreparedReference) -> VoxRegResult<&'a [Vector2<f64>]> {
        reference
            .field()
            .ok_or_else(|| VoxRegError::runtime("ngf: reference was not prepared by ngf"))
    }
}

impl ImageCost for NgfCost {
    fn name(&self) -> &'static str {
        "ngf"
    }

    fn prepare_reference(&self, reference: &DoubleImage) -> PreparedReference {
        PreparedReference::with_field(reference.clone(), self.normalized_field(reference))
    }

    fn value(&self, warped: &DoubleImage, reference: &PreparedReference) -> VoxRegResult<f64> {
        reference.check("ngf", warped)?;
        let nr = self.reference_field(reference)?;
        let size = warped.size();
        let eps2 = self.eps * self.eps;
        let sum: f64 = Self::interior(size)
            .map(|(x, y)| {
                let v = Self::raw_gradient(warped.data(), size, x, y);
                let nw = v / (v.norm_squared() + eps2).sqrt();
                self.evaluator.eval(nw, nr[size.index(x, y)]).0
            })
            .sum();
        Ok(0.5 * sum / size.len() as f64)
    }

    fn evaluate(
        &self,
        warped: &DoubleImage,
        reference: &PreparedReference,
        dcost: &mut [f64],
    ) -> VoxRegResult<f64> {
        reference.check("ngf", warped)?;
        check_dcost("ngf", warped, dcost)?;
        let nr = self.reference_field(reference)?;
        let size = warped.size();
        let scale = 0.5 / size.len() as f64;
        let eps2 = self.eps * self.eps;
        let w = size.width();
        dcost.fill(0.0);
        let mut sum = 0.0;
        for (x, y) in Self::interior(size) {
            let i = size.index(x, y);
            let v = Self::raw_gradient(warped.data(), size, x, y);
            let rho = (v.norm_squared() + eps2).sqrt();
            let (g, dg) = self.evaluator.eval(v / rho, nr[i]);
            sum += g;
            // Chain rule through the normalization and the central differences.
            let dv = (dg / rho - v * (v.dot(&dg) / (rho * rho * rho))) * (0.5 * scale);
            dcost[i + 1] += dv.x;
            dcost[i - 1] -= dv.x;
            dcost[i + w] += dv.y;
            dcost[i - w] -= dv.y;
        }
        Ok(scale * sum)
    }
}

fn create(params: &ParamValues, _registry: &Registry) -> VoxRegResult<Box<dyn ImageCost>> {
    let evaluator: NgfEvaluator = params.text("eval")?.parse()?;
    Ok(Box::new(NgfCost::new(evaluator, params.float("eps")?)?))
}

pub(super) fn plugin() -> PluginInfo<dyn ImageCost> {
    PluginInfo {
        name: "ngf",
        description: "normalized gradient fields",
        params: PARAMS,
        create,
    }
}

#[cfg(test)]
mod tests {
    use super::{NgfCost, NgfEvaluator};
    use crate::cost::ImageCost;
    use crate::image::{Size2D, TypedImage};

    fn blob(size: Size2D, cx: f64, cy: f64) -> TypedImage<f64> {
        TypedImage::from_fn(size, |x, y| {
            let (dx, dy) = (x as f64 - cx, y as f64 - cy);
            (-(dx * dx + dy * dy) / 6.0).exp()
        })
    }

    #[test]
    fn derivative_matches_finite_differences() {
        let size = Size2D::new(9, 8).unwrap();
        let reference = blob(size, 4.0, 3.5);
        let warped = blob(size, 4.6, 3.1);
        for evaluator in [NgfEvaluator::Cross, NgfEvaluator::Dot] {
            let cost = NgfCost::new(evaluator, 0.1).unwrap();
            let prepared = cost.prepare_reference(&reference);
            let mut d = vec![0.0; size.len()];
            let value = cost.evaluate(&warped, &prepared, &mut d).unwrap();
            assert!((value - cost.value(&warped, &prepared).unwrap()).abs() < 1e-14);
            let h = 1e-6;
            for i in [10, 21, 30, 44, 60] {
                let mut plus = warped.clone();
                plus.data_mut()[i] += h;
                let mut minus = warped.clone();
                minus.data_mut()[i] -= h;
                let fd = (cost.value(&plus, &prepared).unwrap()
                    - cost.value(&minus, &prepared).unwrap())
                    / (2.0 * h);
                assert!((fd - d[i]).abs() < 1e-7, "{evaluator} pixel {i}: {fd} vs {}", d[i]);
            }
        }
    }

    #[test]
    fn identical_images_are_optimal_for_cross() {
        let size = Size2D::new(7, 7).unwrap();
        let img = blob(size, 3.0, 3.0);
        let cost = NgfCost::new(NgfEvaluator::Cross, 0.1).unwrap();
        let prepared = cost.prepare_reference(&img);
        assert!(cost.value(&img, &prepared).unwrap().abs() < 1e-15);
        assert!(NgfCost::new(NgfEvaluator::Dot, 0.0).is_err());
    }
}
