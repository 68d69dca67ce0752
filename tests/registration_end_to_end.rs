use std::cell::RefCell;
use std::rc::Rc;
use voxreg::kernel::{BSplineKernel, Boundary};
use voxreg::transform::warp::warp;
use voxreg::{
    Image, NonrigidRegister, Registry, RegistrationConfig, Size2D, StepSink, TypedImage, VoxRegResult,
};

const PRECISE_GDAS: &str = "gdas:min-step=0.001,max-step=1,ftolr=1e-9,maxiter=400";

fn blob(size: Size2D, cx: f64, cy: f64) -> Image {
    Image::from(TypedImage::from_fn(size, |x, y| {
        let (dx, dy) = (x as f64 - cx, y as f64 - cy);
        (200.0 * (-(dx * dx + dy * dy) / 32.0).exp()).round() as u8
    }))
}

fn ssd(a: &Image, b: &Image) -> f64 {
    a.to_double()
        .data()
        .iter()
        .zip(b.to_double().data())
        .map(|(x, y)| (x - y) * (x - y))
        .sum()
}

#[derive(Clone, Default)]
struct Recorder {
    steps: Rc<RefCell<Vec<(usize, Size2D, Size2D)>>>,
}

impl StepSink for Recorder {
    fn save_step(&mut self, level: usize, size: Size2D, image: &Image) -> VoxRegResult<()> {
        self.steps.borrow_mut().push((level, size, image.size()));
        Ok(())
    }
}

#[test]
fn recovers_a_translation_coarse_to_fine() {
    let registry = Registry::with_defaults();
    let size = Size2D::new(48, 40).unwrap();
    let reference = blob(size, 22.0, 20.0);
    let source = blob(size, 23.5, 19.0);
    let config = RegistrationConfig {
        costs: vec!["image:cost=ssd".to_string()],
        transform: "translate".to_string(),
        minimizer: PRECISE_GDAS.to_string(),
        levels: 2,
        ..RegistrationConfig::default()
    };
    let recorder = Recorder::default();
    let mut engine = NonrigidRegister::new(&registry, config)
        .unwrap()
        .with_step_sink(Box::new(recorder.clone()));
    let outcome = engine.run(&source, &reference).unwrap();

    assert_eq!(outcome.levels.len(), 2);
    assert_eq!(outcome.levels[0].size, Size2D::new(24, 20).unwrap());
    assert_eq!(outcome.levels[1].size, size);
    for report in &outcome.levels {
        assert_eq!(report.parameters, 2);
        assert!(report.final_cost <= report.initial_cost);
    }
    let shift = outcome.transform.parameters();
    assert!((shift[0] - 1.5).abs() < 0.15, "shift {shift:?}");
    assert!((shift[1] + 1.0).abs() < 0.15, "shift {shift:?}");

    let steps = recorder.steps.borrow();
    assert_eq!(steps.len(), 2);
    for (i, (level, level_size, image_size)) in steps.iter().enumerate() {
        assert_eq!(*level, i);
        assert_eq!(level_size, image_size);
    }
}

#[test]
fn spline_registration_with_regularizer_reduces_the_mismatch() {
    let registry = Registry::with_defaults();
    let size = Size2D::new(40, 40).unwrap();
    let reference = blob(size, 19.0, 20.0);
    let source = blob(size, 20.5, 19.0);
    let config = RegistrationConfig {
        costs: vec!["image:cost=ssd+divcurl:div=1,curl=1,weight=0.001".to_string()],
        transform: "spline:rate=8".to_string(),
        minimizer: "gdas:min-step=0.01,max-step=1".to_string(),
        refinement: Some("gdas:min-step=0.001,max-step=0.1".to_string()),
        levels: 2,
        ..RegistrationConfig::default()
    };
    let mut engine = NonrigidRegister::new(&registry, config).unwrap();
    let outcome = engine.run(&source, &reference).unwrap();
    assert_eq!(outcome.levels.len(), 2);
    for report in &outcome.levels {
        assert!(report.final_cost <= report.initial_cost);
    }
    assert!(outcome.transform.spline_coefficients().is_some());

    let deformed = warp(&source, outcome.transform.as_ref(), BSplineKernel::cubic(), Boundary::Mirror).unwrap();
    assert_eq!(deformed.pixel_type(), source.pixel_type());
    assert!(ssd(&deformed, &reference) < 0.5 * ssd(&source, &reference));
}

#[test]
fn several_cost_entries_are_combined() {
    let registry = Registry::with_defaults();
    let size = Size2D::new(32, 32).unwrap();
    let reference = blob(size, 16.0, 16.0);
    let source = blob(size, 17.0, 16.0);
    let config = RegistrationConfig {
        costs: vec!["image:cost=ssd".to_string(), "image:cost=ngf,weight=0.1".to_string()],
        transform: "affine".to_string(),
        levels: 1,
        ..RegistrationConfig::default()
    };
    let mut engine = NonrigidRegister::new(&registry, config).unwrap();
    assert_eq!(engine.config().costs.len(), 2);
    let outcome = engine.run(&source, &reference).unwrap();
    assert_eq!(outcome.levels.len(), 1);
    assert_eq!(outcome.levels[0].parameters, 6);
    assert!(outcome.levels[0].final_cost <= outcome.levels[0].initial_cost);
}

#[test]
fn mismatched_images_are_rejected() {
    let registry = Registry::with_defaults();
    let mut engine = NonrigidRegister::new(&registry, RegistrationConfig::default()).unwrap();
    let a = blob(Size2D::new(16, 16).unwrap(), 8.0, 8.0);
    let b = blob(Size2D::new(16, 12).unwrap(), 8.0, 6.0);
    assert!(engine.run(&a, &b).unwrap_err().is_invalid_argument());
}

#[test]
fn configuration_round_trips_through_json() {
    let config = RegistrationConfig {
        refinement: Some("gdas:min-step=0.001".to_string()),
        ..RegistrationConfig::default()
    };
    let text = serde_json::to_string(&config).unwrap();
    let back: RegistrationConfig = serde_json::from_str(&text).unwrap();
    assert_eq!(back, config);
    let partial: RegistrationConfig = serde_json::from_str(r#"{"levels": 1}"#).unwrap();
    assert_eq!(partial.levels, 1);
    assert_eq!(partial.transform, RegistrationConfig::default().transform);
}
