use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use voxreg::lowlevel::{warp_double, BSplineKernel, Boundary, Interpolator};
use voxreg::transform::SplineTransform;
use voxreg::{
    DivCurlMatrix, FilterChain, Image, NonrigidRegister, Registry, RegistrationConfig, Size2D,
    Transform, TypedImage,
};

fn make_image(size: Size2D) -> TypedImage<u8> {
    TypedImage::from_fn(size, |x, y| (((x * 13) ^ (y * 7) ^ (x * y)) & 0xFF) as u8)
}

fn blob(size: Size2D, cx: f64, cy: f64) -> Image {
    Image::from(TypedImage::from_fn(size, |x, y| {
        let (dx, dy) = (x as f64 - cx, y as f64 - cy);
        (200.0 * (-(dx * dx + dy * dy) / 80.0).exp()) as u8
    }))
}

fn bench_filters(c: &mut Criterion) {
    let registry = Registry::with_defaults();
    let image = Image::from(make_image(Size2D::new(256, 256).unwrap()));
    let mean = FilterChain::parse(&registry, "mean:w=3").unwrap();
    let median = FilterChain::parse(&registry, "median:w=2").unwrap();

    c.bench_function("mean_w3_256", |b| {
        b.iter(|| black_box(mean.run(&image).unwrap()));
    });
    c.bench_function("median_w2_256", |b| {
        b.iter(|| black_box(median.run(&image).unwrap()));
    });
}

fn bench_warp(c: &mut Criterion) {
    let size = Size2D::new(256, 256).unwrap();
    let source = make_image(size).to_double();
    let interp = Interpolator::new(&source, BSplineKernel::cubic(), Boundary::Mirror);
    let mut transform = SplineTransform::new(size, 16.0, BSplineKernel::cubic()).unwrap();
    let params: Vec<f64> = (0..transform.degrees_of_freedom())
        .map(|i| ((i * 37) % 11) as f64 * 0.1 - 0.5)
        .collect();
    transform.set_parameters(&params).unwrap();

    c.bench_function("warp_spline_256", |b| {
        b.iter(|| black_box(warp_double(&interp, &transform)));
    });
}

fn bench_divcurl(c: &mut Criterion) {
    let grid = Size2D::new(40, 40).unwrap();
    let matrix = DivCurlMatrix::new(grid, 8.0, BSplineKernel::cubic(), 1.0, 1.0).unwrap();
    let coeffs: Vec<f64> = (0..2 * grid.len()).map(|i| ((i * 17) % 13) as f64 * 0.01).collect();
    let mut gradient = vec![0.0; coeffs.len()];

    c.bench_function("divcurl_evaluate_40x40", |b| {
        b.iter(|| black_box(matrix.evaluate(&coeffs, &mut gradient).unwrap()));
    });
}

fn bench_register(c: &mut Criterion) {
    let registry = Registry::with_defaults();
    let size = Size2D::new(64, 64).unwrap();
    let reference = blob(size, 32.0, 32.0);
    let source = blob(size, 35.0, 30.0);
    let config = RegistrationConfig {
        transform: "spline:rate=8".to_string(),
        minimizer: "gdas:maxiter=40".to_string(),
        levels: 2,
        ..RegistrationConfig::default()
    };

    c.bench_function("register_spline_64", |b| {
        b.iter(|| {
            let mut engine = NonrigidRegister::new(&registry, config.clone()).unwrap();
            black_box(engine.run(&source, &reference).unwrap())
        });
    });
}

criterion_group!(benches, bench_filters, bench_warp, bench_divcurl, bench_register);
criterion_main!(benches);
