//! B-spline interpolation of 2D double fields.

use crate::image::{DoubleImage, Size2D};
use crate::kernel::bspline::{BSplineKernel, MAX_TAPS};
use crate::kernel::prefilter::prefilter_2d;
use crate::util::math::mirror_index;
use crate::util::{VoxRegError, VoxRegResult};
use std::fmt;
use std::str::FromStr;

/// How coefficients outside the grid are extended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Boundary {
    /// Whole-sample mirroring.
    #[default]
    Mirror,
    /// Coefficients outside the grid are zero.
    Zero,
}

impl Boundary {
    pub fn name(self) -> &'static str {
        match self {
            Boundary::Mirror => "mirror",
            Boundary::Zero => "zero",
        }
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Boundary {
    type Err = VoxRegError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mirror" => Ok(Boundary::Mirror),
            "zero" => Ok(Boundary::Zero),
            other => Err(VoxRegError::invalid(format!("unknown boundary '{other}'"))),
        }
    }
}

/// Spline interpolant of a sampled 2D field.
///
/// The interpolant passes through the samples at integer positions and is
/// evaluated with its exact gradient.
#[derive(Clone, Debug)]
pub struct Interpolator {
    kernel: BSplineKernel,
    boundary: Boundary,
    size: Size2D,
    coeffs: Vec<f64>,
}

impl Interpolator {
    /// Prefilters `field` and builds the interpolant.
    pub fn new(field: &DoubleImage, kernel: BSplineKernel, boundary: Boundary) -> Self {
        let size = field.size();
        let mut coeffs = field.data().to_vec();
        prefilter_2d(&mut coeffs, size, kernel.poles());
        Self {
            kernel,
            boundary,
            size,
            coeffs,
        }
    }

    /// Builds an interpolant from ready-made coefficients.
    pub fn from_coefficients(
        size: Size2D,
        coeffs: Vec<f64>,
        kernel: BSplineKernel,
        boundary: Boundary,
    ) -> VoxRegResult<Self> {
        if coeffs.len() != size.len() {
            return Err(VoxRegError::invalid(format!(
                "{} coefficients for a {size} grid",
                coeffs.len()
            )));
        }
        Ok(Self {
            kernel,
            boundary,
            size,
            coeffs,
        })
    }

    pub fn size(&self) -> Size2D {
        self.size
    }

    pub fn kernel(&self) -> BSplineKernel {
        self.kernel
    }

    pub fn boundary(&self) -> Boundary {
        self.boundary
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coeffs
    }

    fn coefficient(&self, x: isize, y: isize) -> f64 {
        match self.boundary {
            Boundary::Mirror => {
                let xi = mirror_index(x, self.size.width());
                let yi = mirror_index(y, self.size.height());
                self.coeffs[self.size.index(xi, yi)]
            }
            Boundary::Zero => {
                if self.size.contains(x, y) {
                    self.coeffs[self.size.index(x as usize, y as usize)]
                } else {
                    0.0
                }
            }
        }
    }

    /// Interpolated value at `(x, y)` in pixel coordinates.
    pub fn value(&self, x: f64, y: f64) -> f64 {
        let mut wx = [0.0; MAX_TAPS];
        let mut wy = [0.0; MAX_TAPS];
        let sx = self.kernel.weights(x, &mut wx);
        let sy = self.kernel.weights(y, &mut wy);
        let taps = self.kernel.taps();
        let mut sum = 0.0;
        for (j, &wyj) in wy[..taps].iter().enumerate() {
            if wyj == 0.0 {
                continue;
            }
            let mut row = 0.0;
            for (i, &wxi) in wx[..taps].iter().enumerate() {
                row += wxi * self.coefficient(sx + i as isize, sy + j as isize);
            }
            sum += wyj * row;
        }
        sum
    }

    /// Interpolated value and its exact gradient `(∂/∂x, ∂/∂y)`.
    pub fn value_and_gradient(&self, x: f64, y: f64) -> (f64, [f64; 2]) {
        let mut wx = [0.0; MAX_TAPS];
        let mut wy = [0.0; MAX_TAPS];
        let mut dx = [0.0; MAX_TAPS];
        let mut dy = [0.0; MAX_TAPS];
        let sx = self.kernel.weights_and_derivatives(x, &mut wx, &mut dx);
        let sy = self.kernel.weights_and_derivatives(y, &mut wy, &mut dy);
        let taps = self.kernel.taps();
        let mut value = 0.0;
        let mut gx = 0.0;
        let mut gy = 0.0;
        for j in 0..taps {
            let mut row_v = 0.0;
            let mut row_d = 0.0;
            for i in 0..taps {
                let c = self.coefficient(sx + i as isize, sy + j as isize);
                row_v += wx[i] * c;
                row_d += dx[i] * c;
            }
            value += wy[j] * row_v;
            gx += wy[j] * row_d;
            gy += dy[j] * row_v;
        }
        (value, [gx, gy])
    }
}

#[cfg(test)]
mod tests {
    use super::{Boundary, Interpolator};
    use crate::image::{Size2D, TypedImage};
    use crate::kernel::BSplineKernel;

    #[test]
    fn interpolant_hits_samples_and_has_exact_gradient() {
        let size = Size2D::new(12, 9).unwrap();
        let field = TypedImage::from_fn(size, |x, y| ((x * 7 + y * 3) % 5) as f64 - 0.5 * y as f64);
        for degree in 2..=5 {
            let kernel = BSplineKernel::new(degree).unwrap();
            let interp = Interpolator::new(&field, kernel, Boundary::Mirror);
            for (x, y) in [(0, 0), (5, 4), (11, 8), (3, 7)] {
                let v = interp.value(x as f64, y as f64);
                assert!((v - field.get(x, y).unwrap()).abs() < 1e-9);
            }

            let (v, g) = interp.value_and_gradient(5.3, 4.6);
            let h = 1e-6;
            let fx = (interp.value(5.3 + h, 4.6) - interp.value(5.3 - h, 4.6)) / (2.0 * h);
            let fy = (interp.value(5.3, 4.6 + h) - interp.value(5.3, 4.6 - h)) / (2.0 * h);
            assert!((v - interp.value(5.3, 4.6)).abs() < 1e-12);
            assert!((g[0] - fx).abs() < 1e-5);
            assert!((g[1] - fy).abs() < 1e-5);
        }
    }

    #[test]
    fn zero_boundary_fades_outside() {
        let size = Size2D::new(4, 4).unwrap();
        let field = TypedImage::filled(size, 1.0);
        let interp = Interpolator::new(&field, BSplineKernel::new(1).unwrap(), Boundary::Zero);
        assert!((interp.value(1.5, 1.5) - 1.0).abs() < 1e-12);
        assert_eq!(interp.value(-2.0, 1.0), 0.0);
        assert!("wrap".parse::<Boundary>().is_err());
    }
}
