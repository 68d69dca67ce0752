//! Numerical helpers shared by kernels, solvers and minimizers.

use crate::image::Size2D;

/// Reflects an index into `[0, len)` with whole-sample mirroring
/// (`-1 -> 1`, `len -> len - 2`).
pub(crate) fn mirror_index(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let len = len as isize;
    let period = 2 * (len - 1);
    let mut i = index.rem_euclid(period);
    if i >= len {
        i = period - i;
    }
    i as usize
}

/// Inclusive prefix sums of a per-pixel quantity over `(width+1) x (height+1)`
/// entries.
pub(crate) struct SummedArea {
    stride: usize,
    sums: Vec<f64>,
}

impl SummedArea {
    /// Table of `value(i)` for every pixel index `i` of `size`.
    pub(crate) fn new(size: Size2D, value: impl Fn(usize) -> f64) -> Self {
        let stride = size.width() + 1;
        let mut sums = vec![0.0; stride * (size.height() + 1)];
        for y in 0..size.height() {
            let mut row_sum = 0.0;
            for x in 0..size.width() {
                row_sum += value(size.index(x, y));
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row_sum;
            }
        }
        Self { stride, sums }
    }

    /// Sum over `[x0, x1) x [y0, y1)`.
    pub(crate) fn sum(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> f64 {
        let s = self.stride;
        self.sums[y1 * s + x1] - self.sums[y0 * s + x1] - self.sums[y1 * s + x0] + self.sums[y0 * s + x0]
    }
}

/// Returns the largest absolute value in `values` (0 for an empty slice).
pub(crate) fn max_abs(values: &[f64]) -> f64 {
    values.iter().fold(0.0f64, |acc, v| acc.max(v.abs()))
}

/// Dot product of two equally long slices.
pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Binomial coefficient `n over k` as a float.
pub(crate) fn binomial(n: usize, k: usize) -> f64 {
    if k > n {
        return 0.0;
    }
    let k = k.min(n - k);
    let mut result = 1.0f64;
    for i in 0..k {
        result = result * (n - i) as f64 / (i + 1) as f64;
    }
    result
}

/// Factorial of a small integer as a float.
pub(crate) fn factorial(n: usize) -> f64 {
    (1..=n).fold(1.0f64, |acc, v| acc * v as f64)
}

/// Nodes and weights of the 5-point Gauss-Legendre rule on `[-1, 1]`.
pub(crate) const GAUSS_LEGENDRE_5: [(f64, f64); 5] = [
    (0.0, 0.568_888_888_888_888_9),
    (-0.538_469_310_105_683_1, 0.478_628_670_499_366_5),
    (0.538_469_310_105_683_1, 0.478_628_670_499_366_5),
    (-0.906_179_845_938_664_0, 0.236_926_885_056_189_1),
    (0.906_179_845_938_664_0, 0.236_926_885_056_189_1),
];

/// Integrates `f` over `[a, b]` with the 5-point Gauss-Legendre rule.
///
/// Exact for polynomials up to degree 9.
pub(crate) fn gauss_legendre<F: Fn(f64) -> f64>(a: f64, b: f64, f: F) -> f64 {
    let half = 0.5 * (b - a);
    let mid = 0.5 * (a + b);
    GAUSS_LEGENDRE_5
        .iter()
        .map(|&(node, weight)| weight * f(mid + half * node))
        .sum::<f64>()
        * half
}
