//! Weighted cost terms of a registration problem.
//!
//! A [`FullCost`] is the configured product of a descriptor. Calling
//! [`FullCost::reinit`] with the [`DataPool`] of a run yields a
//! [`CostState`] that owns every cache of the term (level images, prepared
//! references, regularization matrices). The engine drives the state with
//! the current transformation; the product itself is never mutated.

mod divcurl;
mod image;
mod list;

pub use self::divcurl::DivCurlFullCost;
pub use self::image::ImageFullCost;
pub use list::{CostListState, FullCostList};

use crate::image::{Size2D, SharedImage};
use crate::plugin::PluginMap;
use crate::transform::Transform;
use crate::util::{VoxRegError, VoxRegResult};
use std::collections::HashMap;

/// Key of the source image the engine stores for a run.
pub const SOURCE_KEY: &str = "src.@";
/// Key of the reference image the engine stores for a run.
pub const REFERENCE_KEY: &str = "ref.@";

/// Named image store shared between the engine and the cost terms.
#[derive(Clone, Debug, Default)]
pub struct DataPool {
    images: HashMap<String, SharedImage>,
}

impl DataPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `image` under `key`, returning the previous entry.
    pub fn insert(&mut self, key: impl Into<String>, image: SharedImage) -> Option<SharedImage> {
        self.images.insert(key.into(), image)
    }

    /// Looks up `key`; a missing entry is a run-time error.
    pub fn get(&self, key: &str) -> VoxRegResult<SharedImage> {
        self.images
            .get(key)
            .cloned()
            .ok_or_else(|| VoxRegError::runtime(format!("data pool has no entry '{key}'")))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.images.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<SharedImage> {
        self.images.remove(key)
    }

    pub fn clear(&mut self) {
        self.images.clear();
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// A configured, weighted cost term.
pub trait FullCost: Send + Sync {
    fn name(&self) -> &'static str;

    /// Non-negative weight of the term in a [`FullCostList`].
    fn weight(&self) -> f64;

    /// Reads the data of a run and returns the caches of this term.
    fn reinit(&self, pool: &DataPool) -> VoxRegResult<Box<dyn CostState>>;
}

/// Per-run state of one cost term.
pub trait CostState {
    /// Grid size the term requires at full resolution; `None` when the term
    /// has no opinion.
    fn full_size(&self) -> Option<Size2D>;

    /// Prepares the term for a pyramid level of `size`.
    fn set_size(&mut self, size: Size2D, transform: &dyn Transform) -> VoxRegResult<()>;

    /// Unweighted value.
    fn value(&self, transform: &dyn Transform) -> VoxRegResult<f64>;

    /// Unweighted value; overwrites `gradient` with the derivative in
    /// parameter space.
    fn evaluate(&self, transform: &dyn Transform, gradient: &mut [f64]) -> VoxRegResult<f64>;
}

pub(crate) fn register_builtin(map: &mut PluginMap<dyn FullCost>) {
    map.register(image::plugin());
    map.register(divcurl::plugin());
}

/// Rejects states used before `set_size`.
pub(crate) fn not_sized(term: &str) -> VoxRegError {
    VoxRegError::runtime(format!("{term}: cost evaluated before set_size"))
}
