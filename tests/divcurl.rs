use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use voxreg::kernel::BSplineKernel;
use voxreg::{DivCurlMatrix, Registry, Size2D};

fn random_coeffs(grid: Size2D, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..2 * grid.len()).map(|_| rng.random_range(-1.0..1.0)).collect()
}

/// Riemann sum of `wd |∇div u|² + wr |∇curl u|²` over the support of the field.
fn brute_force(grid: Size2D, h: f64, kernel: BSplineKernel, wd: f64, wr: f64, c: &[f64]) -> f64 {
    let r = kernel.radius();
    let step = h / 24.0;
    let (x0, y0) = (-r * h, -r * h);
    let nx = (((grid.width() - 1) as f64 + 2.0 * r) * h / step).ceil() as usize;
    let ny = (((grid.height() - 1) as f64 + 2.0 * r) * h / step).ceil() as usize;
    let basis = |s: f64| {
        [
            kernel.value(s),
            kernel.derivative(s) / h,
            kernel.second_derivative(s) / (h * h),
        ]
    };
    let mut total = 0.0;
    for j in 0..ny {
        let y = y0 + (j as f64 + 0.5) * step;
        for i in 0..nx {
            let x = x0 + (i as f64 + 0.5) * step;
            // Second derivatives [xx, xy, yy] of both components.
            let (mut ux, mut uy) = ([0.0; 3], [0.0; 3]);
            for ky in 0..grid.height() {
                let by = basis(y / h - ky as f64);
                if by.iter().all(|v| *v == 0.0) {
                    continue;
                }
                for kx in 0..grid.width() {
                    let bx = basis(x / h - kx as f64);
                    let k = 2 * grid.index(kx, ky);
                    let d = [bx[2] * by[0], bx[1] * by[1], bx[0] * by[2]];
                    for n in 0..3 {
                        ux[n] += c[k] * d[n];
                        uy[n] += c[k + 1] * d[n];
                    }
                }
            }
            let grad_div = [ux[0] + uy[1], ux[1] + uy[2]];
            let grad_curl = [uy[0] - ux[1], uy[1] - ux[2]];
            let gd = grad_div[0] * grad_div[0] + grad_div[1] * grad_div[1];
            let gc = grad_curl[0] * grad_curl[0] + grad_curl[1] * grad_curl[1];
            total += (wd * gd + wr * gc) * step * step;
        }
    }
    total
}

#[test]
fn penalty_matches_direct_integration() {
    let grid = Size2D::new(4, 3).unwrap();
    let coeffs = random_coeffs(grid, 8);
    for (h, wd, wr) in [(1.0, 1.0, 0.0), (2.0, 0.0, 1.0), (3.0, 0.7, 1.9)] {
        let m = DivCurlMatrix::new(grid, h, BSplineKernel::cubic(), wd, wr).unwrap();
        let exact = m.multiply(&coeffs).unwrap();
        let approx = brute_force(grid, h, BSplineKernel::cubic(), wd, wr, &coeffs);
        assert!(
            (exact - approx).abs() < 2e-3 * exact.abs(),
            "h={h} wd={wd} wr={wr}: {exact} vs {approx}"
        );
    }
}

#[test]
fn penalty_is_linear_in_the_weights() {
    let grid = Size2D::new(6, 5).unwrap();
    let coeffs = random_coeffs(grid, 1);
    for degree in 2..=5 {
        let kernel = BSplineKernel::new(degree).unwrap();
        let div = DivCurlMatrix::new(grid, 3.0, kernel, 1.0, 0.0).unwrap();
        let curl = DivCurlMatrix::new(grid, 3.0, kernel, 0.0, 1.0).unwrap();
        let both = DivCurlMatrix::new(grid, 3.0, kernel, 2.5, 0.4).unwrap();
        let pd = div.multiply(&coeffs).unwrap();
        let pc = curl.multiply(&coeffs).unwrap();
        let pb = both.multiply(&coeffs).unwrap();
        assert!(pd > 0.0 && pc > 0.0, "degree {degree}");
        assert!((pb - (2.5 * pd + 0.4 * pc)).abs() < 1e-10 * pb, "degree {degree}");
    }
}

#[test]
fn evaluate_returns_half_the_gradient_product() {
    let grid = Size2D::new(9, 7).unwrap();
    let m = DivCurlMatrix::new(grid, 5.0, BSplineKernel::new(4).unwrap(), 0.3, 1.2).unwrap();
    for seed in 0..4 {
        let coeffs = random_coeffs(grid, seed);
        let mut gradient = vec![f64::NAN; coeffs.len()];
        let value = m.evaluate(&coeffs, &mut gradient).unwrap();
        let dot: f64 = coeffs.iter().zip(&gradient).map(|(c, g)| c * g).sum();
        assert!((value - 0.5 * dot).abs() < 1e-12 * value.abs().max(1.0));
        assert!((value - m.multiply(&coeffs).unwrap()).abs() < 1e-10 * value.abs().max(1.0));
        assert!(value >= 0.0);
    }
}

#[test]
fn reset_rebuilds_for_a_new_grid() {
    let small = Size2D::new(4, 4).unwrap();
    let large = Size2D::new(8, 7).unwrap();
    let mut m = DivCurlMatrix::new(small, 4.0, BSplineKernel::cubic(), 1.0, 1.0).unwrap();
    let coeffs = random_coeffs(large, 3);
    assert!(m.multiply(&coeffs).unwrap_err().is_invalid_argument());

    m.reset(large, 2.0, BSplineKernel::new(2).unwrap(), 0.5, 3.0).unwrap();
    assert_eq!(m.grid(), large);
    assert_eq!(m.knot_spacing(), 2.0);
    assert_eq!(m.kernel().degree(), 2);
    assert_eq!((m.div_weight(), m.curl_weight()), (0.5, 3.0));
    let fresh = DivCurlMatrix::new(large, 2.0, BSplineKernel::new(2).unwrap(), 0.5, 3.0).unwrap();
    assert_eq!(m.multiply(&coeffs).unwrap(), fresh.multiply(&coeffs).unwrap());
    assert!(m.reset(large, -1.0, BSplineKernel::cubic(), 1.0, 1.0).is_err());
}

#[test]
fn zero_weights_vanish() {
    let grid = Size2D::new(5, 6).unwrap();
    let m = DivCurlMatrix::new(grid, 4.0, BSplineKernel::cubic(), 0.0, 0.0).unwrap();
    let coeffs = random_coeffs(grid, 11);
    let mut gradient = vec![7.0; coeffs.len()];
    assert_eq!(m.evaluate(&coeffs, &mut gradient).unwrap(), 0.0);
    assert!(gradient.iter().all(|&g| g == 0.0));
}

fn dense_field(size: Size2D, u: impl Fn(f64, f64) -> [f64; 2]) -> Vec<f64> {
    (0..size.len())
        .flat_map(|i| u((i % size.width()) as f64, (i / size.width()) as f64))
        .collect()
}

#[test]
fn dense_fields_pay_only_for_second_derivatives() {
    let registry = Registry::with_defaults();
    let size = Size2D::new(12, 10).unwrap();
    let interior = (10 * 8) as f64;
    let mut vf = registry.produce_transform("vf").unwrap().create(size).unwrap();

    let expansion = dense_field(size, |x, y| [0.1 * x - 0.3 * y + 2.0, 0.05 * x + 0.1 * y - 1.0]);
    vf.set_parameters(&expansion).unwrap();
    let mut g = vec![1.0; expansion.len()];
    assert!(vf.divcurl_cost(1.0, 1.0, Some(&mut g)).unwrap() < 1e-20);
    assert!(g.iter().all(|v| v.abs() < 1e-10));

    // u = (x², 0): ∇div = (2, 0) and curl is constant.
    vf.set_parameters(&dense_field(size, |x, _| [x * x, 0.0])).unwrap();
    assert!((vf.divcurl_cost(1.0, 0.0, None).unwrap() - 4.0 * interior).abs() < 1e-9);
    assert!(vf.divcurl_cost(0.0, 1.0, None).unwrap().abs() < 1e-9);

    // u = (0, x²): ∇curl = (2, 0) and div is constant.
    vf.set_parameters(&dense_field(size, |x, _| [0.0, x * x])).unwrap();
    assert!(vf.divcurl_cost(1.0, 0.0, None).unwrap().abs() < 1e-9);
    assert!((vf.divcurl_cost(0.0, 2.5, None).unwrap() - 10.0 * interior).abs() < 1e-9);

    let narrow = registry.produce_transform("vf").unwrap().create(Size2D::new(2, 9).unwrap()).unwrap();
    assert_eq!(narrow.divcurl_cost(1.0, 1.0, None).unwrap(), 0.0);
    let mut short = vec![0.0; 3];
    assert!(vf.divcurl_cost(1.0, 1.0, Some(&mut short)).unwrap_err().is_invalid_argument());
}

#[test]
fn linear_models_have_no_divcurl_penalty() {
    let registry = Registry::with_defaults();
    let size = Size2D::new(9, 8).unwrap();
    for model in ["translate", "rigid", "rotation", "affine"] {
        let mut t = registry.produce_transform(model).unwrap().create(size).unwrap();
        let params: Vec<f64> = t.parameters().iter().map(|p| p + 0.3).collect();
        t.set_parameters(&params).unwrap();
        let mut g = vec![f64::NAN; t.degrees_of_freedom()];
        assert_eq!(t.divcurl_cost(2.0, 3.0, Some(&mut g)).unwrap(), 0.0, "{model}");
        assert!(g.iter().all(|&v| v == 0.0), "{model}");
    }
}

#[test]
fn spline_penalty_matches_its_matrix() {
    let registry = Registry::with_defaults();
    let size = Size2D::new(20, 15).unwrap();
    let mut t = registry.produce_transform("spline:rate=5").unwrap().create(size).unwrap();
    let c = t.spline_coefficients().unwrap();
    let (grid, h, kernel) = (c.grid, c.knot_spacing, c.kernel);
    let coeffs = random_coeffs(grid, 17);
    t.set_parameters(&coeffs).unwrap();
    let m = DivCurlMatrix::new(grid, h, kernel, 0.4, 1.1).unwrap();
    let mut expected = vec![0.0; coeffs.len()];
    let value = m.evaluate(&coeffs, &mut expected).unwrap();
    let mut g = vec![0.0; coeffs.len()];
    assert_eq!(t.divcurl_cost(0.4, 1.1, Some(&mut g)).unwrap(), value);
    assert_eq!(g, expected);
}
