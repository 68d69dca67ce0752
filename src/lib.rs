//! voxreg is a 2D image registration toolbox built around a plugin registry.
//!
//! Images of any of eleven pixel types flow through descriptor-configured
//! filters, cost terms, transformation models and minimizers. The
//! [`NonrigidRegister`] engine combines them into a coarse-to-fine
//! registration. Parallel loops use `rayon` when the `rayon` feature is
//! enabled; image files are read and written with the `image-io` feature.

pub mod cost;
pub mod divcurl;
pub mod filter;
pub mod fullcost;
pub mod image;
pub mod kernel;
pub mod lowlevel;
pub mod minimizer;
pub mod parallel;
pub mod plugin;
pub mod register;
pub mod solver;
pub(crate) mod trace;
pub mod transform;
pub mod util;

pub use divcurl::DivCurlMatrix;
pub use filter::{run_chain, Filter, FilterChain};
pub use fullcost::{CostListState, DataPool, FullCost, FullCostList};
pub use image::{Image, ImageMeta, PixelType, SharedImage, Size2D, TypedImage};
pub use minimizer::{Minimizer, OptimizationOutcome, StopReason};
pub use plugin::{PluginCategory, Registry};
pub use register::{
    LevelReport, NonrigidRegister, RegistrationConfig, RegistrationOutcome, StepSink,
};
pub use transform::io::{load_transform, read_transform_file, save_transform, write_transform_file};
pub use transform::{Transform, TransformFactory};
pub use util::{VoxRegError, VoxRegResult};
