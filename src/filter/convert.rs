//! Pixel type conversion with an optional intensity mapping.

use super::Filter;
use crate::image::{Image, PixelType};
use crate::plugin::{ParamSpec, ParamValues, PluginInfo, Registry};
use crate::util::VoxRegResult;

const PARAMS: &[ParamSpec] = &[
    ParamSpec::choice(
        "repn",
        &[
            "bit", "sbyte", "ubyte", "sshort", "ushort", "sint", "uint", "slong", "ulong", "float",
            "double",
        ],
        Some("ubyte"),
        "output pixel type",
    ),
    ParamSpec::choice("map", &["copy", "linear", "range"], Some("copy"), "intensity mapping"),
    ParamSpec::float("a", f64::MIN, f64::MAX, Some("1"), "linear gain"),
    ParamSpec::float("b", f64::MIN, f64::MAX, Some("0"), "linear offset"),
];

/// How values are mapped before they are narrowed into the output type.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ValueMap {
    /// `v -> v`.
    Copy,
    /// `v -> a * v + b`.
    Linear { a: f64, b: f64 },
    /// Input `[min, max]` onto the output range; float outputs use `[0, 1]`.
    Range,
}

/// Converts to another pixel type; values saturate in the output type.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConvertFilter {
    target: PixelType,
    map: ValueMap,
}

impl ConvertFilter {
    pub fn new(target: PixelType, map: ValueMap) -> Self {
        Self { target, map }
    }

    pub fn target(&self) -> PixelType {
        self.target
    }

    pub fn value_map(&self) -> ValueMap {
        self.map
    }
}

impl Filter for ConvertFilter {
    fn name(&self) -> &'static str {
        "convert"
    }

    fn filter(&self, image: &Image) -> VoxRegResult<Image> {
        match self.map {
            ValueMap::Copy => Ok(image.convert_to(self.target)),
            ValueMap::Linear { a, b } => Ok(image.map_values(self.target, |v| a * v + b)),
            ValueMap::Range => {
                let (lo, hi) = image.value_range();
                let (out_lo, out_hi) = if self.target.is_float() {
                    (0.0, 1.0)
                } else {
                    self.target.value_range()
                };
                let span = hi - lo;
                if span <= 0.0 {
                    return Ok(image.map_values(self.target, |_| out_lo));
                }
                let gain = (out_hi - out_lo) / span;
                Ok(image.map_values(self.target, |v| out_lo + gain * (v - lo)))
            }
        }
    }
}

fn create(params: &ParamValues, _registry: &Registry) -> VoxRegResult<Box<dyn Filter>> {
    let target: PixelType = params.text("repn")?.parse()?;
    let map = match params.text("map")? {
        "linear" => ValueMap::Linear {
            a: params.float("a")?,
            b: params.float("b")?,
        },
        "range" => ValueMap::Range,
        _ => ValueMap::Copy,
    };
    Ok(Box::new(ConvertFilter::new(target, map)))
}

pub(super) fn plugin() -> PluginInfo<dyn Filter> {
    PluginInfo {
        name: "convert",
        description: "pixel type conversion with copy, linear or range mapping",
        params: PARAMS,
        create,
    }
}
