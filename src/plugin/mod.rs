//! Plugin registry: named, parameterized factories per category.
//!
//! Every product (filter, cost, transformation, minimizer, kernel) is
//! created from a descriptor string such as `spline:rate=8,kernel=[bspline:d=3]`.
//! The descriptor is parsed, validated against the plugin's declared
//! [`ParamSpec`] list, and only then handed to the plugin's `create`
//! function. The registry is an explicit value; there is no global state.

pub mod descriptor;
pub mod param;

pub use descriptor::{split_chain, Descriptor};
pub use param::{ParamKind, ParamSpec, ParamValue, ParamValues};

use crate::cost::ImageCost;
use crate::filter::Filter;
use crate::fullcost::FullCost;
use crate::kernel::BSplineKernel;
use crate::minimizer::Minimizer;
use crate::transform::TransformFactory;
use crate::util::{VoxRegError, VoxRegResult};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::str::FromStr;

/// Plugin categories known to the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PluginCategory {
    Filter,
    ImageCost,
    FullCost,
    Transform,
    Minimizer,
    Kernel,
}

impl PluginCategory {
    pub const ALL: [PluginCategory; 6] = [
        PluginCategory::Filter,
        PluginCategory::ImageCost,
        PluginCategory::FullCost,
        PluginCategory::Transform,
        PluginCategory::Minimizer,
        PluginCategory::Kernel,
    ];

    /// Name used on the command line and in error messages.
    pub fn name(self) -> &'static str {
        match self {
            PluginCategory::Filter => "filter",
            PluginCategory::ImageCost => "cost",
            PluginCategory::FullCost => "fullcost",
            PluginCategory::Transform => "transform",
            PluginCategory::Minimizer => "minimizer",
            PluginCategory::Kernel => "kernel",
        }
    }
}

impl FromStr for PluginCategory {
    type Err = VoxRegError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PluginCategory::ALL
            .iter()
            .copied()
            .find(|c| c.name() == s)
            .ok_or_else(|| VoxRegError::invalid(format!("unknown plugin category '{s}'")))
    }
}

/// Factory function of a plugin; receives validated parameters and the
/// registry for nested products.
pub type Creator<P> = fn(&ParamValues, &Registry) -> VoxRegResult<Box<P>>;

/// A registered plugin.
pub struct PluginInfo<P: ?Sized> {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
    pub create: Creator<P>,
}

/// Name-indexed plugins of one category.
pub struct PluginMap<P: ?Sized> {
    category: PluginCategory,
    plugins: BTreeMap<&'static str, PluginInfo<P>>,
}

impl<P: ?Sized> PluginMap<P> {
    fn new(category: PluginCategory) -> Self {
        Self {
            category,
            plugins: BTreeMap::new(),
        }
    }

    /// Registers a plugin, returning the one it replaces.
    pub fn register(&mut self, info: PluginInfo<P>) -> Option<PluginInfo<P>> {
        self.plugins.insert(info.name, info)
    }

    /// Returns the plugin registered under `name`.
    pub fn get(&self, name: &str) -> Option<&PluginInfo<P>> {
        self.plugins.get(name)
    }

    /// Registered plugin names in sorted order.
    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.keys().copied().collect()
    }

    /// Parses, validates and creates a product from one descriptor.
    pub fn produce(&self, registry: &Registry, descriptor: &str) -> VoxRegResult<Box<P>> {
        let members = split_chain(descriptor)?;
        if members.len() != 1 {
            return Err(VoxRegError::invalid(format!(
                "expected a single {} descriptor, got '{descriptor}'",
                self.category.name()
            )));
        }
        let parsed = Descriptor::parse(&members[0])?;
        let info = self
            .get(parsed.name())
            .ok_or_else(|| VoxRegError::UnknownPlugin {
                category: self.category.name(),
                name: parsed.name().to_string(),
            })?;
        let values = ParamValues::resolve(info.params, &parsed)?;
        (info.create)(&values, registry)
    }

    /// Human-readable listing of names, descriptions and parameters.
    pub fn help(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} plugins:", self.category.name());
        for info in self.plugins.values() {
            let _ = writeln!(out, "  {:<10} {}", info.name, info.description);
            for spec in info.params {
                let default = match spec.default {
                    Some(d) => format!("default {d}"),
                    None => "required".to_string(),
                };
                let _ = writeln!(
                    out,
                    "      {:<10} {} ({}; {})",
                    spec.name, spec.help, spec.kind, default
                );
            }
        }
        out
    }
}

/// All plugin categories of one configuration.
pub struct Registry {
    filters: PluginMap<dyn Filter>,
    image_costs: PluginMap<dyn ImageCost>,
    full_costs: PluginMap<dyn FullCost>,
    transforms: PluginMap<dyn TransformFactory>,
    minimizers: PluginMap<dyn Minimizer>,
    kernels: PluginMap<BSplineKernel>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Registry {
    /// Creates a registry without any plugin.
    pub fn new() -> Self {
        Self {
            filters: PluginMap::new(PluginCategory::Filter),
            image_costs: PluginMap::new(PluginCategory::ImageCost),
            full_costs: PluginMap::new(PluginCategory::FullCost),
            transforms: PluginMap::new(PluginCategory::Transform),
            minimizers: PluginMap::new(PluginCategory::Minimizer),
            kernels: PluginMap::new(PluginCategory::Kernel),
        }
    }

    /// Creates a registry holding every built-in plugin.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        crate::filter::register_builtin(&mut registry.filters);
        crate::cost::register_builtin(&mut registry.image_costs);
        crate::fullcost::register_builtin(&mut registry.full_costs);
        crate::transform::register_builtin(&mut registry.transforms);
        crate::minimizer::register_builtin(&mut registry.minimizers);
        crate::kernel::register_builtin(&mut registry.kernels);
        registry
    }

    pub fn filters(&self) -> &PluginMap<dyn Filter> {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut PluginMap<dyn Filter> {
        &mut self.filters
    }

    pub fn image_costs(&self) -> &PluginMap<dyn ImageCost> {
        &self.image_costs
    }

    pub fn image_costs_mut(&mut self) -> &mut PluginMap<dyn ImageCost> {
        &mut self.image_costs
    }

    pub fn full_costs(&self) -> &PluginMap<dyn FullCost> {
        &self.full_costs
    }

    pub fn full_costs_mut(&mut self) -> &mut PluginMap<dyn FullCost> {
        &mut self.full_costs
    }

    pub fn transforms(&self) -> &PluginMap<dyn TransformFactory> {
        &self.transforms
    }

    pub fn transforms_mut(&mut self) -> &mut PluginMap<dyn TransformFactory> {
        &mut self.transforms
    }

    pub fn minimizers(&self) -> &PluginMap<dyn Minimizer> {
        &self.minimizers
    }

    pub fn minimizers_mut(&mut self) -> &mut PluginMap<dyn Minimizer> {
        &mut self.minimizers
    }

    pub fn kernels(&self) -> &PluginMap<BSplineKernel> {
        &self.kernels
    }

    pub fn kernels_mut(&mut self) -> &mut PluginMap<BSplineKernel> {
        &mut self.kernels
    }

    pub fn produce_filter(&self, descriptor: &str) -> VoxRegResult<Box<dyn Filter>> {
        self.filters.produce(self, descriptor)
    }

    pub fn produce_image_cost(&self, descriptor: &str) -> VoxRegResult<Box<dyn ImageCost>> {
        self.image_costs.produce(self, descriptor)
    }

    pub fn produce_full_cost(&self, descriptor: &str) -> VoxRegResult<Box<dyn FullCost>> {
        self.full_costs.produce(self, descriptor)
    }

    pub fn produce_transform(&self, descriptor: &str) -> VoxRegResult<Box<dyn TransformFactory>> {
        self.transforms.produce(self, descriptor)
    }

    pub fn produce_minimizer(&self, descriptor: &str) -> VoxRegResult<Box<dyn Minimizer>> {
        self.minimizers.produce(self, descriptor)
    }

    pub fn produce_kernel(&self, descriptor: &str) -> VoxRegResult<Box<BSplineKernel>> {
        self.kernels.produce(self, descriptor)
    }

    /// Plugin listing of one category.
    pub fn help(&self, category: PluginCategory) -> String {
        match category {
            PluginCategory::Filter => self.filters.help(),
            PluginCategory::ImageCost => self.image_costs.help(),
            PluginCategory::FullCost => self.full_costs.help(),
            PluginCategory::Transform => self.transforms.help(),
            PluginCategory::Minimizer => self.minimizers.help(),
            PluginCategory::Kernel => self.kernels.help(),
        }
    }
}
