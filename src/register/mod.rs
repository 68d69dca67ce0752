//! Multi-resolution non-rigid registration.
//!
//! [`NonrigidRegister`] estimates the transformation `T` that maps every
//! reference pixel `x` to the source position `T(x)` so that the warped
//! source matches the reference under a list of weighted cost terms. The
//! problem is solved coarse to fine: the transformation found on one
//! pyramid level is upscaled and refined on the next.

mod problem;

pub use problem::RegistrationProblem;

use crate::filter::{Filter, ScaleFilter};
use crate::fullcost::{DataPool, FullCostList, REFERENCE_KEY, SOURCE_KEY};
use crate::image::pyramid::pyramid_sizes;
use crate::image::{Image, Size2D};
use crate::kernel::{BSplineKernel, Boundary};
use crate::minimizer::{Minimizer, OptimizationOutcome};
use crate::plugin::Registry;
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::transform::warp::warp;
use crate::transform::{Transform, TransformFactory};
use crate::util::{VoxRegError, VoxRegResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Configuration of a registration run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Full-cost descriptors; each entry may itself be an `a+b` chain.
    pub costs: Vec<String>,
    /// Transformation model descriptor.
    pub transform: String,
    /// Minimizer descriptor.
    pub minimizer: String,
    /// Optional second minimizer run after the first on every level.
    pub refinement: Option<String>,
    /// Number of pyramid levels (>= 1).
    pub levels: usize,
    /// Levels whose smaller side is below this are skipped.
    pub min_size: usize,
    /// Jointly rescale both images to mean 0 and standard deviation 1.
    pub normalize: bool,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            costs: vec!["image:cost=ssd".to_string()],
            transform: "spline:rate=8".to_string(),
            minimizer: "gdas".to_string(),
            refinement: None,
            levels: 3,
            min_size: 4,
            normalize: true,
        }
    }
}

/// Receiver of intermediate results, called once per finished level.
pub trait StepSink {
    /// `image` is the source deformed by the transformation of `level`.
    fn save_step(&mut self, level: usize, size: Size2D, image: &Image) -> VoxRegResult<()>;
}

/// Optimization summary of one pyramid level.
#[derive(Clone, Debug, PartialEq)]
pub struct LevelReport {
    pub size: Size2D,
    pub parameters: usize,
    /// Weighted cost before optimization.
    pub initial_cost: f64,
    /// Weighted cost at the accepted parameters.
    pub final_cost: f64,
    pub outcome: OptimizationOutcome,
}

/// Result of [`NonrigidRegister::run`].
#[derive(Debug)]
pub struct RegistrationOutcome {
    pub transform: Box<dyn Transform>,
    /// One entry per level, coarse to fine; empty when the images were
    /// already aligned.
    pub levels: Vec<LevelReport>,
}

/// Coarse-to-fine registration driver.
pub struct NonrigidRegister<'r> {
    registry: &'r Registry,
    config: RegistrationConfig,
    costs: FullCostList,
    factory: Box<dyn TransformFactory>,
    minimizer: Box<dyn Minimizer>,
    refinement: Option<Box<dyn Minimizer>>,
    sink: Option<Box<dyn StepSink + 'r>>,
}

impl<'r> NonrigidRegister<'r> {
    /// Produces every configured plugin; configuration errors surface here.
    pub fn new(registry: &'r Registry, config: RegistrationConfig) -> VoxRegResult<Self> {
        if config.levels == 0 {
            return Err(VoxRegError::invalid("registration needs at least one level"));
        }
        if config.costs.is_empty() {
            return Err(VoxRegError::invalid("registration needs at least one cost term"));
        }
        let mut costs = FullCostList::new();
        for chain in &config.costs {
            costs.append(FullCostList::parse(registry, chain)?);
        }
        let factory = registry.produce_transform(&config.transform)?;
        let minimizer = registry.produce_minimizer(&config.minimizer)?;
        let refinement = config
            .refinement
            .as_deref()
            .map(|d| registry.produce_minimizer(d))
            .transpose()?;
        Ok(Self {
            registry,
            config,
            costs,
            factory,
            minimizer,
            refinement,
            sink: None,
        })
    }

    /// Installs a receiver for the deformed source after every level.
    pub fn with_step_sink(mut self, sink: Box<dyn StepSink + 'r>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    /// Registers `source` to `reference`; both must have the same size.
    pub fn run(&mut self, source: &Image, reference: &Image) -> VoxRegResult<RegistrationOutcome> {
        if source.size() != reference.size() {
            return Err(VoxRegError::invalid(format!(
                "source size {} differs from reference size {}",
                source.size(),
                reference.size()
            )));
        }
        let _span = trace_span!("register", width = source.size().width(), height = source.size().height())
            .entered();

        let (source, reference) = if self.config.normalize {
            match joint_normalization(self.registry, source, reference)? {
                Some(filter) => (filter.filter(source)?, filter.filter(reference)?),
                None => {
                    trace_event!("constant_images");
                    return Ok(RegistrationOutcome {
                        transform: self.factory.create(source.size())?,
                        levels: Vec::new(),
                    });
                }
            }
        } else {
            (source.clone(), reference.clone())
        };

        let mut pool = DataPool::new();
        pool.insert(SOURCE_KEY, Arc::new(source.clone()));
        pool.insert(REFERENCE_KEY, Arc::new(reference));
        let mut state = self.costs.reinit(&pool)?;
        let full = state.full_size()?;

        let sizes = pyramid_sizes(full, self.config.levels, self.config.min_size);
        let mut transform: Option<Box<dyn Transform>> = None;
        let mut levels = Vec::with_capacity(sizes.len());
        for (level, &size) in sizes.iter().enumerate() {
            let _level_span = trace_span!("level", level = level, width = size.width(), height = size.height())
                .entered();
            let mut current = match transform.take() {
                Some(t) => t.upscale(size)?,
                None => self.factory.create(size)?,
            };
            state.set_size(size, current.as_ref())?;

            let mut x = current.parameters();
            let (initial_cost, mut outcome) = {
                let mut problem = RegistrationProblem::new(&state, current.as_mut());
                let initial = problem.initial_cost(&x)?;
                let outcome = self.minimizer.run(&mut problem, &mut x)?;
                (initial, outcome)
            };
            if let Some(refinement) = &self.refinement {
                let mut problem = RegistrationProblem::new(&state, current.as_mut());
                let refined = refinement.run(&mut problem, &mut x)?;
                outcome = OptimizationOutcome {
                    iterations: outcome.iterations + refined.iterations,
                    ..refined
                };
            }
            if !outcome.converged {
                trace_warn!(
                    "level_not_converged",
                    level = level,
                    iterations = outcome.iterations,
                    value = outcome.value
                );
            }
            current.set_parameters(&x)?;
            let final_cost = state.cost_value(current.as_ref())?;
            trace_event!(
                "level_done",
                level = level,
                initial = initial_cost,
                final_cost = final_cost,
                iterations = outcome.iterations
            );

            if let Some(sink) = self.sink.as_mut() {
                let scaled = ScaleFilter::new(size).filter(&source)?;
                let deformed = warp(&scaled, current.as_ref(), BSplineKernel::cubic(), Boundary::Mirror)?;
                sink.save_step(level, size, &deformed)?;
            }

            levels.push(LevelReport {
                size,
                parameters: current.degrees_of_freedom(),
                initial_cost,
                final_cost,
                outcome,
            });
            transform = Some(current);
        }

        let transform = match transform {
            Some(t) => t,
            None => self.factory.create(full)?,
        };
        Ok(RegistrationOutcome { transform, levels })
    }
}

/// Builds the `convert` filter that maps both images jointly to mean 0 and
/// standard deviation 1; `None` if both are one constant value.
fn joint_normalization(
    registry: &Registry,
    source: &Image,
    reference: &Image,
) -> VoxRegResult<Option<Box<dyn Filter>>> {
    let a = source.to_double();
    let b = reference.to_double();
    let n = (a.data().len() + b.data().len()) as f64;
    let (mut sum, mut sum2) = (0.0, 0.0);
    for v in a.data().iter().chain(b.data()) {
        sum += v;
        sum2 += v * v;
    }
    let mean = sum / n;
    let variance = ((sum2 - sum * sum / n) / (n - 1.0)).max(0.0);
    let sigma = variance.sqrt();
    if !(sigma > 0.0) {
        return Ok(None);
    }
    let descriptor = format!(
        "convert:repn=double,map=linear,a={},b={}",
        1.0 / sigma,
        -mean / sigma
    );
    Ok(Some(registry.produce_filter(&descriptor)?))
}
