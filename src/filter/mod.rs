//! Image filters and filter chains.
//!
//! A [`Filter`] maps one image to a new image. Filters are produced from
//! descriptors by the registry and composed into a [`FilterChain`] that
//! feeds each filter the output of the previous one.

mod binarize;
mod convert;
mod crop;
mod mean;
mod median;
mod scale;

pub use binarize::BinarizeFilter;
pub use convert::{ConvertFilter, ValueMap};
pub use crop::CropFilter;
pub use mean::MeanFilter;
pub use median::MedianFilter;
pub use scale::ScaleFilter;

use crate::image::Image;
use crate::plugin::{split_chain, PluginMap, Registry};
use crate::trace::{trace_event, trace_span};
use crate::util::VoxRegResult;
use std::collections::VecDeque;

/// Rows per parallel task in the row-partitioned filters.
pub(crate) const ROW_CHUNK: usize = 16;

/// Image-to-image operation.
pub trait Filter: Send + Sync {
    /// Plugin name of the filter.
    fn name(&self) -> &'static str;

    /// Applies the filter; the input is left untouched.
    fn filter(&self, image: &Image) -> VoxRegResult<Image>;
}

/// Ordered sequence of filters.
#[derive(Default)]
pub struct FilterChain {
    filters: VecDeque<Box<dyn Filter>>,
}

impl FilterChain {
    /// Creates an empty chain (running it returns a copy of the input).
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a chain from one descriptor per filter.
    ///
    /// Either every descriptor yields a filter or the chain is not built.
    pub fn from_descriptors<S: AsRef<str>>(registry: &Registry, descriptors: &[S]) -> VoxRegResult<Self> {
        let mut filters = VecDeque::with_capacity(descriptors.len());
        for descriptor in descriptors {
            filters.push_back(registry.produce_filter(descriptor.as_ref())?);
        }
        Ok(Self { filters })
    }

    /// Builds a chain from a `a+b+c` descriptor chain.
    pub fn parse(registry: &Registry, chain: &str) -> VoxRegResult<Self> {
        Self::from_descriptors(registry, &split_chain(chain)?)
    }

    /// Prepends a filter.
    pub fn push_front(&mut self, filter: Box<dyn Filter>) {
        self.filters.push_front(filter);
    }

    /// Appends a filter.
    pub fn push_back(&mut self, filter: Box<dyn Filter>) {
        self.filters.push_back(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Names of the filters in application order.
    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Runs every filter in order.
    pub fn run(&self, image: &Image) -> VoxRegResult<Image> {
        let _span = trace_span!("filter_chain", filters = self.filters.len()).entered();
        let mut current = image.clone();
        for filter in &self.filters {
            current = filter.filter(&current)?;
            trace_event!("filter_applied", filter = filter.name());
        }
        Ok(current)
    }
}

/// Runs a chain given as text on `image`.
pub fn run_chain(registry: &Registry, chain: &str, image: &Image) -> VoxRegResult<Image> {
    FilterChain::parse(registry, chain)?.run(image)
}

pub(crate) fn register_builtin(map: &mut PluginMap<dyn Filter>) {
    map.register(mean::plugin());
    map.register(median::plugin());
    map.register(binarize::plugin());
    map.register(convert::plugin());
    map.register(scale::plugin());
    map.register(crop::plugin());
}
