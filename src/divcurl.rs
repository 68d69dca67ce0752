//! Divergence and curl penalty of B-spline displacement fields.
//!
//! For `u(x) = Σ_k c_k φ_k(x)` the penalty
//! `P(c) = wd ∫ |∇ div u|² + wr ∫ |∇ curl u|²` over the whole plane is a
//! quadratic form `cᵀ M c`. Affine fields have a constant divergence and
//! curl, so they only pay for the border of the coefficient grid. `M` only
//! depends on the offset between two coefficients, so it is stored as three
//! banded tables over the `(2d+1)²` offsets of a degree `d` kernel.

use crate::image::Size2D;
use crate::kernel::BSplineKernel;
use crate::trace::trace_event;
use crate::util::math::gauss_legendre;
use crate::util::{VoxRegError, VoxRegResult};

/// Highest derivative order entering the penalty.
const ORDERS: usize = 3;

/// 1D overlap integrals `R_ab(d) = ∫ β^(a)(s) β^(b)(s - d) ds` for
/// `a, b ∈ {0, 1, 2}`, scaled by `h^(1 - a - b)` to pixel units.
#[derive(Clone, Debug, PartialEq)]
struct Overlaps {
    radius: isize,
    tables: [[Vec<f64>; ORDERS]; ORDERS],
}

impl Overlaps {
    fn new(kernel: BSplineKernel, h: f64) -> Self {
        let radius = kernel.degree() as isize;
        let support = kernel.radius();
        let basis = |order: usize, s: f64| match order {
            0 => kernel.value(s),
            1 => kernel.derivative(s),
            _ => kernel.second_derivative(s),
        };
        let integral = |a: usize, b: usize, d: isize| {
            // Integrand pieces are polynomials between half-integer breakpoints.
            let steps = (4.0 * support) as isize;
            (0..steps)
                .map(|i| {
                    let lo = -support + 0.5 * i as f64;
                    gauss_legendre(lo, lo + 0.5, |s| basis(a, s) * basis(b, s - d as f64))
                })
                .sum::<f64>()
                * h.powi(1 - a as i32 - b as i32)
        };
        let tables = std::array::from_fn(|a| {
            std::array::from_fn(|b| (-radius..=radius).map(|d| integral(a, b, d)).collect())
        });
        Self { radius, tables }
    }

    #[inline]
    fn at(&self, a: usize, b: usize, d: isize) -> f64 {
        self.tables[a][b][(d + self.radius) as usize]
    }
}

/// Banded quadratic form of the div-curl penalty on a coefficient grid.
#[derive(Clone, Debug, PartialEq)]
pub struct DivCurlMatrix {
    grid: Size2D,
    kernel: BSplineKernel,
    knot_spacing: f64,
    div_weight: f64,
    curl_weight: f64,
    radius: isize,
    pxx: Vec<f64>,
    pyy: Vec<f64>,
    q: Vec<f64>,
}

impl DivCurlMatrix {
    /// Builds the tables for a coefficient grid of `grid` knots spaced
    /// `knot_spacing` pixels apart.
    pub fn new(
        grid: Size2D,
        knot_spacing: f64,
        kernel: BSplineKernel,
        div_weight: f64,
        curl_weight: f64,
    ) -> VoxRegResult<Self> {
        let mut matrix = Self {
            grid,
            kernel,
            knot_spacing,
            div_weight,
            curl_weight,
            radius: 0,
            pxx: Vec::new(),
            pyy: Vec::new(),
            q: Vec::new(),
        };
        matrix.reset(grid, knot_spacing, kernel, div_weight, curl_weight)?;
        Ok(matrix)
    }

    /// Recomputes the tables for a new grid, kernel or weights.
    pub fn reset(
        &mut self,
        grid: Size2D,
        knot_spacing: f64,
        kernel: BSplineKernel,
        div_weight: f64,
        curl_weight: f64,
    ) -> VoxRegResult<()> {
        if !(div_weight >= 0.0) || !(curl_weight >= 0.0) {
            return Err(VoxRegError::invalid(format!(
                "divcurl: weights must be non-negative, got div={div_weight} curl={curl_weight}"
            )));
        }
        if !(knot_spacing > 0.0) {
            return Err(VoxRegError::invalid(format!(
                "divcurl: knot spacing must be positive, got {knot_spacing}"
            )));
        }
        if kernel.degree() < 2 {
            return Err(VoxRegError::invalid(format!(
                "divcurl: needs a spline of degree 2 or more, got {}",
                kernel.degree()
            )));
        }
        let o = Overlaps::new(kernel, knot_spacing);
        let radius = o.radius;
        let band = (2 * radius + 1) as usize;
        let mut pxx = vec![0.0; band * band];
        let mut pyy = vec![0.0; band * band];
        let mut q = vec![0.0; band * band];
        let (wd, wr) = (div_weight, curl_weight);
        for d2 in -radius..=radius {
            for d1 in -radius..=radius {
                let idx = ((d2 + radius) as usize) * band + (d1 + radius) as usize;
                let r = |ax: usize, bx: usize, ay: usize, by: usize| o.at(ax, bx, d1) * o.at(ay, by, d2);
                // ∇div u = (u_x,xx + u_y,xy, u_x,xy + u_y,yy)
                // ∇curl u = (u_y,xx - u_x,xy, u_y,xy - u_x,yy)
                pxx[idx] = wd * (r(2, 2, 0, 0) + r(1, 1, 1, 1)) + wr * (r(1, 1, 1, 1) + r(0, 0, 2, 2));
                pyy[idx] = wd * (r(1, 1, 1, 1) + r(0, 0, 2, 2)) + wr * (r(2, 2, 0, 0) + r(1, 1, 1, 1));
                q[idx] = 2.0 * wd * (r(2, 1, 0, 1) + r(1, 0, 1, 2))
                    - 2.0 * wr * (r(1, 2, 1, 0) + r(0, 1, 2, 1));
            }
        }
        *self = Self {
            grid,
            kernel,
            knot_spacing,
            div_weight,
            curl_weight,
            radius,
            pxx,
            pyy,
            q,
        };
        trace_event!("divcurl_reset", width = grid.width(), height = grid.height(), band = band);
        Ok(())
    }

    pub fn grid(&self) -> Size2D {
        self.grid
    }

    pub fn kernel(&self) -> BSplineKernel {
        self.kernel
    }

    pub fn knot_spacing(&self) -> f64 {
        self.knot_spacing
    }

    pub fn div_weight(&self) -> f64 {
        self.div_weight
    }

    pub fn curl_weight(&self) -> f64 {
        self.curl_weight
    }

    fn check_len(&self, what: &str, len: usize) -> VoxRegResult<()> {
        let expected = 2 * self.grid.len();
        if len != expected {
            return Err(VoxRegError::invalid(format!(
                "divcurl: {what} has {len} values, grid {} needs {expected}",
                self.grid
            )));
        }
        Ok(())
    }

    /// Visits every in-grid offset pair `(i, k = i + d)` with its table index.
    #[inline]
    fn for_each_pair<F: FnMut(usize, usize, usize, usize)>(&self, mut f: F) {
        let (w, h) = (self.grid.width() as isize, self.grid.height() as isize);
        let band = (2 * self.radius + 1) as usize;
        let r = self.radius;
        for y in 0..h {
            for x in 0..w {
                let i = (y * w + x) as usize;
                for d2 in (-r).max(-y)..=r.min(h - 1 - y) {
                    for d1 in (-r).max(-x)..=r.min(w - 1 - x) {
                        let k = ((y + d2) * w + x + d1) as usize;
                        let idx = ((d2 + r) as usize) * band + (d1 + r) as usize;
                        let mirrored = ((r - d2) as usize) * band + (r - d1) as usize;
                        f(i, k, idx, mirrored);
                    }
                }
            }
        }
    }

    /// Penalty value and its gradient `2 M c`; returns `c · gradient / 2`.
    ///
    /// `coeffs` and `gradient` hold interleaved `(cx, cy)` per knot;
    /// `gradient` is overwritten.
    pub fn evaluate(&self, coeffs: &[f64], gradient: &mut [f64]) -> VoxRegResult<f64> {
        self.check_len("coefficient field", coeffs.len())?;
        self.check_len("gradient", gradient.len())?;
        gradient.fill(0.0);
        self.for_each_pair(|i, k, idx, mirrored| {
            let (cx, cy) = (coeffs[2 * k], coeffs[2 * k + 1]);
            gradient[2 * i] += 2.0 * self.pxx[idx] * cx + self.q[idx] * cy;
            gradient[2 * i + 1] += 2.0 * self.pyy[idx] * cy + self.q[mirrored] * cx;
        });
        Ok(0.5 * coeffs.iter().zip(gradient.iter()).map(|(c, g)| c * g).sum::<f64>())
    }

    /// Penalty value `cᵀ M c` without a gradient.
    pub fn multiply(&self, coeffs: &[f64]) -> VoxRegResult<f64> {
        self.check_len("coefficient field", coeffs.len())?;
        let mut value = 0.0;
        self.for_each_pair(|i, k, idx, _| {
            let (xi, yi) = (coeffs[2 * i], coeffs[2 * i + 1]);
            let (xk, yk) = (coeffs[2 * k], coeffs[2 * k + 1]);
            value += xi * self.pxx[idx] * xk + yi * self.pyy[idx] * yk + xi * self.q[idx] * yk;
        });
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{DivCurlMatrix, Overlaps};
    use crate::image::Size2D;
    use crate::kernel::BSplineKernel;

    #[test]
    fn overlap_tables_have_expected_symmetry() {
        let o = Overlaps::new(BSplineKernel::cubic(), 1.0);
        let sum = |a: usize, b: usize| (-3..=3).map(|d| o.at(a, b, d)).sum::<f64>();
        // ∫β³β³ over the plane is 1 summed over all shifts.
        assert!((sum(0, 0) - 1.0).abs() < 1e-9);
        assert!(sum(1, 1).abs() < 1e-9);
        assert!(sum(2, 2).abs() < 1e-9);
        for d in -3..=3 {
            assert!((o.at(0, 0, d) - o.at(0, 0, -d)).abs() < 1e-12);
            assert!((o.at(2, 2, d) - o.at(2, 2, -d)).abs() < 1e-12);
            assert!((o.at(1, 0, d) + o.at(0, 1, d)).abs() < 1e-12);
            // Integration by parts moves one derivative across.
            assert!((o.at(1, 2, d) + o.at(2, 1, d)).abs() < 1e-12);
            assert!((o.at(1, 1, d) + o.at(2, 0, d)).abs() < 1e-12);
        }
        let wide = Overlaps::new(BSplineKernel::cubic(), 4.0);
        assert!((wide.at(2, 2, 1) - o.at(2, 2, 1) / 64.0).abs() < 1e-12);
    }

    /// Coefficients of `u(x) = (e x - r y, r x + e y)` on a knot grid with spacing `h`.
    fn affine(grid: Size2D, h: f64, e: f64, r: f64) -> Vec<f64> {
        (0..grid.len())
            .flat_map(|i| {
                let (x, y) = (h * (i % grid.width()) as f64, h * (i / grid.width()) as f64);
                [e * x - r * y, r * x + e * y]
            })
            .collect()
    }

    #[test]
    fn affine_fields_are_free_away_from_the_border() {
        let grid = Size2D::new(14, 12).unwrap();
        for degree in 2..=5 {
            let kernel = BSplineKernel::new(degree).unwrap();
            let m = DivCurlMatrix::new(grid, 3.0, kernel, 1.0, 0.7).unwrap();
            for (e, r) in [(0.05, 0.0), (0.0, 0.04), (-0.02, 0.03)] {
                let coeffs = affine(grid, 3.0, e, r);
                let mut gradient = vec![0.0; coeffs.len()];
                m.evaluate(&coeffs, &mut gradient).unwrap();
                let scale = gradient.iter().fold(0.0f64, |a, g| a.max(g.abs()));
                assert!(scale > 0.0, "degree {degree}: the border must cost something");
                for y in degree..grid.height() - degree {
                    for x in degree..grid.width() - degree {
                        let i = 2 * grid.index(x, y);
                        assert!(
                            gradient[i].abs() < 1e-10 * scale && gradient[i + 1].abs() < 1e-10 * scale,
                            "degree {degree} knot ({x}, {y}): {} {}",
                            gradient[i],
                            gradient[i + 1]
                        );
                    }
                }
            }
        }
    }

    fn ramp(grid: Size2D) -> Vec<f64> {
        (0..grid.len())
            .flat_map(|i| {
                let (x, y) = ((i % grid.width()) as f64, (i / grid.width()) as f64);
                [0.3 * x - 0.1 * y * y, 0.05 * x * y + 0.2]
            })
            .collect()
    }

    #[test]
    fn evaluate_matches_multiply_and_finite_differences() {
        let grid = Size2D::new(7, 6).unwrap();
        let m = DivCurlMatrix::new(grid, 4.0, BSplineKernel::cubic(), 1.0, 2.0).unwrap();
        let coeffs = ramp(grid);
        let mut gradient = vec![0.0; coeffs.len()];
        let value = m.evaluate(&coeffs, &mut gradient).unwrap();
        assert!(value > 0.0);
        assert!((value - m.multiply(&coeffs).unwrap()).abs() < 1e-9 * value);

        let eps = 1e-5;
        for i in [0, 5, 17, 40, 83] {
            let mut plus = coeffs.clone();
            plus[i] += eps;
            let mut minus = coeffs.clone();
            minus[i] -= eps;
            let fd = (m.multiply(&plus).unwrap() - m.multiply(&minus).unwrap()) / (2.0 * eps);
            assert!((fd - gradient[i]).abs() < 1e-6, "index {i}: {fd} vs {}", gradient[i]);
        }
    }

    #[test]
    fn zero_weights_give_zero_penalty() {
        let grid = Size2D::new(5, 5).unwrap();
        let m = DivCurlMatrix::new(grid, 2.0, BSplineKernel::cubic(), 0.0, 0.0).unwrap();
        let coeffs = ramp(grid);
        let mut gradient = vec![1.0; coeffs.len()];
        assert_eq!(m.evaluate(&coeffs, &mut gradient).unwrap(), 0.0);
        assert!(gradient.iter().all(|g| *g == 0.0));
    }

    #[test]
    fn rejects_bad_input() {
        let grid = Size2D::new(4, 3).unwrap();
        assert!(DivCurlMatrix::new(grid, 4.0, BSplineKernel::cubic(), -1.0, 0.0).is_err());
        assert!(DivCurlMatrix::new(grid, 0.0, BSplineKernel::cubic(), 1.0, 0.0).is_err());
        let linear = BSplineKernel::new(1).unwrap();
        assert!(DivCurlMatrix::new(grid, 4.0, linear, 1.0, 0.0).unwrap_err().is_invalid_argument());
        let m = DivCurlMatrix::new(grid, 4.0, BSplineKernel::cubic(), 1.0, 1.0).unwrap();
        assert!(m.multiply(&[0.0; 5]).unwrap_err().is_invalid_argument());
    }
}
