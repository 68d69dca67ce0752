//! Centered polynomial B-spline kernels of degree 0 to 5.

use crate::util::math::{binomial, factorial};
use crate::util::{VoxRegError, VoxRegResult};

/// Largest supported spline degree.
pub const MAX_DEGREE: usize = 5;

/// Maximal number of taps (`MAX_DEGREE + 1`).
pub const MAX_TAPS: usize = MAX_DEGREE + 1;

/// Centered B-spline `β^n` of degree `n`.
///
/// Values come from the truncated power form
/// `β^n(x) = 1/n! Σ_k (-1)^k C(n+1, k) (x + (n+1)/2 - k)_+^n`, which is
/// exact for every degree and cheap enough for the few taps involved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BSplineKernel {
    degree: usize,
}

impl BSplineKernel {
    /// Creates a kernel, rejecting degrees above [`MAX_DEGREE`].
    pub fn new(degree: usize) -> VoxRegResult<Self> {
        if degree > MAX_DEGREE {
            return Err(VoxRegError::invalid(format!(
                "B-spline degree {degree} not in [0, {MAX_DEGREE}]"
            )));
        }
        Ok(Self { degree })
    }

    /// Cubic kernel.
    pub fn cubic() -> Self {
        Self { degree: 3 }
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Number of non-zero taps at a generic position.
    pub fn taps(&self) -> usize {
        self.degree + 1
    }

    /// Half width of the support, `(n + 1) / 2`.
    pub fn radius(&self) -> f64 {
        (self.degree + 1) as f64 / 2.0
    }

    /// Descriptor that recreates this kernel.
    pub fn creator_string(&self) -> String {
        format!("bspline:d={}", self.degree)
    }

    /// Kernel value `β^n(x)`.
    pub fn value(&self, x: f64) -> f64 {
        centered_bspline(self.degree, x)
    }

    /// First derivative `dβ^n/dx`.
    pub fn derivative(&self, x: f64) -> f64 {
        if self.degree == 0 {
            return 0.0;
        }
        centered_bspline(self.degree - 1, x + 0.5) - centered_bspline(self.degree - 1, x - 0.5)
    }

    /// Second derivative `d²β^n/dx²`; zero for degrees below two, where it
    /// is not a function.
    pub fn second_derivative(&self, x: f64) -> f64 {
        if self.degree < 2 {
            return 0.0;
        }
        let d = self.degree - 2;
        centered_bspline(d, x + 1.0) - 2.0 * centered_bspline(d, x) + centered_bspline(d, x - 1.0)
    }

    /// Fills `weights[j] = β(x - (start + j))` for `j < taps()` and returns
    /// `start = floor(x - (n+1)/2) + 1`.
    pub fn weights(&self, x: f64, weights: &mut [f64]) -> isize {
        let start = self.start_index(x);
        for (j, w) in weights.iter_mut().take(self.taps()).enumerate() {
            *w = self.value(x - (start + j as isize) as f64);
        }
        start
    }

    /// Like [`weights`](Self::weights) and also fills the derivatives.
    pub fn weights_and_derivatives(&self, x: f64, weights: &mut [f64], derivs: &mut [f64]) -> isize {
        let start = self.start_index(x);
        for j in 0..self.taps() {
            let d = x - (start + j as isize) as f64;
            weights[j] = self.value(d);
            derivs[j] = self.derivative(d);
        }
        start
    }

    /// First coefficient index touched at position `x`.
    pub fn start_index(&self, x: f64) -> isize {
        (x - self.radius()).floor() as isize + 1
    }

    /// Poles of the interpolation prefilter.
    pub fn poles(&self) -> &'static [f64] {
        match self.degree {
            2 => &[-0.171_572_875_253_809_9],
            3 => &[-0.267_949_192_431_122_7],
            4 => &[
                -0.361_341_225_900_220_177_092_212_841_325,
                -0.013_725_429_297_339_121_360_331_226_939,
            ],
            5 => &[
                -0.430_575_347_099_973_791_851_434_783_493,
                -0.043_096_288_203_264_653_822_712_376_822,
            ],
            _ => &[],
        }
    }
}

impl Default for BSplineKernel {
    fn default() -> Self {
        Self::cubic()
    }
}

/// `β^n(x)` via the truncated power expansion.
pub(crate) fn centered_bspline(degree: usize, x: f64) -> f64 {
    let half = (degree + 1) as f64 / 2.0;
    if x < -half || x >= half {
        return 0.0;
    }
    let mut sum = 0.0;
    for k in 0..=degree + 1 {
        let t = x + half - k as f64;
        if t < 0.0 {
            continue;
        }
        let term = t.powi(degree as i32);
        let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
        sum += sign * binomial(degree + 1, k) * term;
    }
    sum / factorial(degree)
}
