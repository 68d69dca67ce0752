use voxreg::minimizer::{GdasMinimizer, GdasParams, Problem};
use voxreg::{Minimizer, Registry, StopReason, VoxRegResult};

/// `Σ s_i (x_i - c_i)²`
struct Bowl {
    center: Vec<f64>,
    scales: Vec<f64>,
    calls: usize,
}

impl Bowl {
    fn new(center: Vec<f64>, scales: Vec<f64>) -> Self {
        Self {
            center,
            scales,
            calls: 0,
        }
    }
}

impl Problem for Bowl {
    fn size(&self) -> usize {
        self.center.len()
    }

    fn f(&mut self, x: &[f64]) -> VoxRegResult<f64> {
        self.calls += 1;
        Ok(x.iter()
            .zip(&self.center)
            .zip(&self.scales)
            .map(|((x, c), s)| s * (x - c) * (x - c))
            .sum())
    }

    fn fdf(&mut self, x: &[f64], gradient: &mut [f64]) -> VoxRegResult<f64> {
        for (i, g) in gradient.iter_mut().enumerate() {
            *g = 2.0 * self.scales[i] * (x[i] - self.center[i]);
        }
        self.f(x)
    }
}

#[test]
fn gdas_walks_into_a_bowl() {
    let registry = Registry::with_defaults();
    let minimizer = registry
        .produce_minimizer("gdas:min-step=1e-4,max-step=1,ftolr=1e-12,maxiter=2000")
        .unwrap();
    assert_eq!(minimizer.name(), "gdas");
    let mut bowl = Bowl::new(vec![3.0, -2.0, 0.5], vec![1.0, 2.0, 0.5]);
    let mut x = vec![0.0; 3];
    let outcome = minimizer.run(&mut bowl, &mut x).unwrap();
    assert_eq!(outcome.best_params, x);
    for (xi, ci) in x.iter().zip(&bowl.center) {
        assert!((xi - ci).abs() < 1e-2, "{x:?}");
    }
    assert!(outcome.value < 1e-4);
    assert!(outcome.iterations > 0);
    assert!(bowl.calls > outcome.iterations as usize);
}

#[test]
fn default_gdas_stops_on_small_relative_change() {
    let registry = Registry::with_defaults();
    let minimizer = registry.produce_minimizer("gdas").unwrap();
    let mut bowl = Bowl::new(vec![1.0, 1.0], vec![1.0, 1.0]);
    let mut x = vec![-4.0, 6.0];
    let start = bowl.f(&x).unwrap();
    let outcome = minimizer.run(&mut bowl, &mut x).unwrap();
    assert!(outcome.value < start);
    assert!(outcome.iterations <= 200);
    // The smallest step is 0.1, so the run may end without reaching the tolerance.
    assert!(matches!(
        outcome.stop,
        StopReason::RelativeCostChange | StopReason::NoProgress | StopReason::GradientTolerance
    ));
    assert_eq!(outcome.converged, outcome.stop.is_converged());
}

#[test]
fn starting_at_the_minimum_meets_the_gradient_tolerance() {
    let minimizer = GdasMinimizer::new(GdasParams {
        xtola: 1e-9,
        ..GdasParams::default()
    })
    .unwrap();
    let mut bowl = Bowl::new(vec![2.0, 2.0], vec![1.0, 3.0]);
    let mut x = vec![2.0, 2.0];
    let outcome = minimizer.run(&mut bowl, &mut x).unwrap();
    assert!(outcome.converged);
    assert_eq!(outcome.stop, StopReason::GradientTolerance);
    assert_eq!(outcome.iterations, 0);
    assert_eq!(x, vec![2.0, 2.0]);
}

#[test]
fn iteration_budget_is_reported() {
    let minimizer = GdasMinimizer::new(GdasParams {
        max_iter: 3,
        min_step: 1e-3,
        max_step: 0.01,
        ftolr: 0.0,
        xtola: 0.0,
    })
    .unwrap();
    let mut bowl = Bowl::new(vec![10.0], vec![1.0]);
    let mut x = vec![0.0];
    let outcome = minimizer.run(&mut bowl, &mut x).unwrap();
    assert!(!outcome.converged);
    assert_eq!(outcome.stop, StopReason::MaxIterations);
    assert_eq!(outcome.iterations, 3);
    assert!(x[0] > 0.0 && x[0] < 0.1);
}

#[test]
fn invalid_settings_are_rejected() {
    let registry = Registry::with_defaults();
    assert!(registry.produce_minimizer("gdas:min-step=2,max-step=1").is_err());
    assert!(registry.produce_minimizer("gdas:maxiter=0").is_err());
    assert!(GdasMinimizer::new(GdasParams {
        min_step: 0.5,
        max_step: 0.5,
        ..GdasParams::default()
    })
    .is_err());

    let minimizer = GdasMinimizer::new(GdasParams::default()).unwrap();
    let mut bowl = Bowl::new(vec![0.0, 0.0], vec![1.0, 1.0]);
    let mut x = vec![1.0];
    assert!(minimizer.run(&mut bowl, &mut x).unwrap_err().is_invalid_argument());
}
