use nalgebra::Vector2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use voxreg::{load_transform, read_transform_file, save_transform, write_transform_file};
use voxreg::{Registry, Size2D, Transform};

const MODELS: &[&str] = &[
    "translate",
    "rigid",
    "rotation",
    "rotation:cx=0.2,cy=0.9",
    "affine",
    "spline:rate=4",
    "spline:rate=5,kernel=[bspline:d=2]",
    "vf",
    "vf:smooth=0.5",
];

fn randomized(registry: &Registry, descriptor: &str, size: Size2D, rng: &mut StdRng) -> Box<dyn Transform> {
    let mut t = registry.produce_transform(descriptor).unwrap().create(size).unwrap();
    let params: Vec<f64> = (0..t.degrees_of_freedom())
        .map(|_| rng.random_range(-0.3..0.3))
        .collect();
    t.set_parameters(&params).unwrap();
    t
}

fn sample_points(size: Size2D) -> Vec<Vector2<f64>> {
    let (w, h) = (size.width() as f64, size.height() as f64);
    vec![
        Vector2::new(0.0, 0.0),
        Vector2::new(w * 0.5, h * 0.5),
        Vector2::new(w * 0.3 + 0.25, h * 0.7 - 0.5),
        Vector2::new(w - 1.0, h - 1.0),
    ]
}

#[test]
fn every_model_survives_a_text_round_trip() {
    let registry = Registry::with_defaults();
    let mut rng = StdRng::seed_from_u64(17);
    let size = Size2D::new(21, 15).unwrap();
    for &descriptor in MODELS {
        let t = randomized(&registry, descriptor, size, &mut rng);
        let text = save_transform(t.as_ref()).unwrap();
        let back = load_transform(&registry, &text).unwrap();
        assert_eq!(back.creator_string(), t.creator_string(), "{descriptor}");
        assert_eq!(back.size(), size);
        assert_eq!(back.parameters(), t.parameters(), "{descriptor}");
        for p in sample_points(size) {
            assert_eq!(back.apply(p), t.apply(p), "{descriptor} at {p:?}");
        }
    }
}

#[test]
fn transformation_files_round_trip() {
    let registry = Registry::with_defaults();
    let mut rng = StdRng::seed_from_u64(3);
    let dir = std::env::temp_dir().join(format!("voxreg-transform-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("spline.json");

    let mut t = randomized(&registry, "spline:rate=4", Size2D::new(16, 16).unwrap(), &mut rng);
    t.attributes_mut().set("iterations", 12i64);
    write_transform_file(&path, t.as_ref()).unwrap();
    let back = read_transform_file(&registry, &path).unwrap();
    assert_eq!(back.parameters(), t.parameters());
    assert_eq!(back.attributes().get_double("iterations"), Some(12.0));

    let missing = dir.join("missing.json");
    let err = read_transform_file(&registry, &missing).unwrap_err();
    assert!(!err.is_invalid_argument());
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn identity_maps_every_point_to_itself() {
    let registry = Registry::with_defaults();
    let size = Size2D::new(12, 9).unwrap();
    for &descriptor in MODELS {
        let mut t = registry.produce_transform(descriptor).unwrap().create(size).unwrap();
        let identity = t.parameters();
        t.set_parameters(&identity).unwrap();
        assert_eq!(t.parameters(), identity, "{descriptor}");
        for y in 0..size.height() {
            for x in 0..size.width() {
                let p = Vector2::new(x as f64 + 0.25, y as f64 - 0.5);
                assert!((t.apply(p) - p).norm() < 1e-12, "{descriptor} at {p:?}");
            }
        }
        let j = t.derivative_at(3, 4);
        assert!((j - nalgebra::Matrix2::identity()).norm() < 1e-12, "{descriptor}");
    }
}

#[test]
fn wrong_parameter_count_is_rejected() {
    let registry = Registry::with_defaults();
    let size = Size2D::new(8, 8).unwrap();
    for &descriptor in MODELS {
        let mut t = registry.produce_transform(descriptor).unwrap().create(size).unwrap();
        let n = t.degrees_of_freedom();
        let err = t.set_parameters(&vec![0.0; n + 1]).unwrap_err();
        assert!(err.is_invalid_argument(), "{descriptor}");
    }
}

#[test]
fn parametric_upscale_commutes_with_scaling() {
    let registry = Registry::with_defaults();
    let coarse = Size2D::new(20, 16).unwrap();
    let fine = Size2D::new(40, 32).unwrap();
    let mut rng = StdRng::seed_from_u64(5);
    for descriptor in ["translate", "rigid", "rotation", "rotation:cx=0.1,cy=0.7", "affine"] {
        let t = randomized(&registry, descriptor, coarse, &mut rng);
        let up = t.upscale(fine).unwrap();
        assert_eq!(up.size(), fine);
        for p in sample_points(fine) {
            let expected = t.apply(p / 2.0) * 2.0;
            assert!((up.apply(p) - expected).norm() < 1e-9, "{descriptor} at {p:?}");
        }
    }
}

#[test]
fn field_upscale_keeps_constant_displacements() {
    let registry = Registry::with_defaults();
    let coarse = Size2D::new(17, 13).unwrap();
    let fine = Size2D::new(34, 26).unwrap();
    // Spline knots beyond the coarse grid lose part of their support, so
    // only the middle of the grid is compared tightly for that model.
    for (descriptor, points, tolerance) in [
        ("vf", sample_points(fine), 1e-9),
        ("spline:rate=4", vec![Vector2::new(17.0, 13.0), Vector2::new(10.0, 8.0)], 5e-2),
    ] {
        let mut t = registry.produce_transform(descriptor).unwrap().create(coarse).unwrap();
        let params: Vec<f64> = (0..t.degrees_of_freedom())
            .map(|i| if i % 2 == 0 { 1.0 } else { -0.5 })
            .collect();
        t.set_parameters(&params).unwrap();
        let up = t.upscale(fine).unwrap();
        assert!(up.degrees_of_freedom() > t.degrees_of_freedom());
        for p in points {
            let u = up.apply(p) - p;
            assert!((u - Vector2::new(2.0, -1.0)).norm() < tolerance, "{descriptor} at {p:?}: {u:?}");
        }
    }
}
