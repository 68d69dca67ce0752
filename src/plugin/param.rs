//! Declared parameter schemas and validated parameter values.

use crate::plugin::descriptor::Descriptor;
use crate::util::{VoxRegError, VoxRegResult};
use std::collections::BTreeMap;
use std::fmt;

/// Value domain of one parameter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParamKind {
    /// Integer in `[min, max]`.
    Int { min: i64, max: i64 },
    /// Finite float in `[min, max]`.
    Float { min: f64, max: f64 },
    /// `true|false|1|0|yes|no|on|off`.
    Bool,
    /// Free text.
    Text,
    /// One of a fixed list of words.
    Choice(&'static [&'static str]),
    /// Nested descriptor (or chain), produced by the consuming plugin.
    Descriptor,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKind::Int { min, max } => write!(f, "int in [{min}, {max}]"),
            ParamKind::Float { min, max } => write!(f, "float in [{min}, {max}]"),
            ParamKind::Bool => f.write_str("bool"),
            ParamKind::Text => f.write_str("text"),
            ParamKind::Choice(words) => write!(f, "one of {}", words.join("|")),
            ParamKind::Descriptor => f.write_str("descriptor"),
        }
    }
}

/// Declared parameter: name, domain, default and help line.
///
/// A parameter without a default is required.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub default: Option<&'static str>,
    pub help: &'static str,
}

impl ParamSpec {
    pub const fn int(
        name: &'static str,
        min: i64,
        max: i64,
        default: Option<&'static str>,
        help: &'static str,
    ) -> Self {
        Self {
            name,
            kind: ParamKind::Int { min, max },
            default,
            help,
        }
    }

    pub const fn float(
        name: &'static str,
        min: f64,
        max: f64,
        default: Option<&'static str>,
        help: &'static str,
    ) -> Self {
        Self {
            name,
            kind: ParamKind::Float { min, max },
            default,
            help,
        }
    }

    pub const fn boolean(name: &'static str, default: Option<&'static str>, help: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Bool,
            default,
            help,
        }
    }

    pub const fn text(name: &'static str, default: Option<&'static str>, help: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Text,
            default,
            help,
        }
    }

    pub const fn choice(
        name: &'static str,
        words: &'static [&'static str],
        default: Option<&'static str>,
        help: &'static str,
    ) -> Self {
        Self {
            name,
            kind: ParamKind::Choice(words),
            default,
            help,
        }
    }

    pub const fn descriptor(
        name: &'static str,
        default: Option<&'static str>,
        help: &'static str,
    ) -> Self {
        Self {
            name,
            kind: ParamKind::Descriptor,
            default,
            help,
        }
    }

    fn parse(&self, plugin: &str, raw: &str) -> VoxRegResult<ParamValue> {
        let bad = |what: String| {
            VoxRegError::invalid(format!("{plugin}: parameter '{}' {what}", self.name))
        };
        match self.kind {
            ParamKind::Int { min, max } => {
                let v: i64 = raw
                    .parse()
                    .map_err(|_| bad(format!("expects an integer, got '{raw}'")))?;
                if v < min || v > max {
                    return Err(bad(format!("= {v} outside [{min}, {max}]")));
                }
                Ok(ParamValue::Int(v))
            }
            ParamKind::Float { min, max } => {
                let v: f64 = raw
                    .parse()
                    .map_err(|_| bad(format!("expects a number, got '{raw}'")))?;
                if !v.is_finite() || v < min || v > max {
                    return Err(bad(format!("= {v} outside [{min}, {max}]")));
                }
                Ok(ParamValue::Float(v))
            }
            ParamKind::Bool => match raw {
                "1" | "true" | "yes" | "on" => Ok(ParamValue::Bool(true)),
                "0" | "false" | "no" | "off" => Ok(ParamValue::Bool(false)),
                _ => Err(bad(format!("expects a boolean, got '{raw}'"))),
            },
            ParamKind::Text | ParamKind::Descriptor => Ok(ParamValue::Text(raw.to_string())),
            ParamKind::Choice(words) => {
                if words.contains(&raw) {
                    Ok(ParamValue::Text(raw.to_string()))
                } else {
                    Err(bad(format!("expects one of {}, got '{raw}'", words.join("|"))))
                }
            }
        }
    }
}

/// One validated parameter value.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

/// Validated parameter set handed to a plugin's `create` function.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamValues {
    plugin: String,
    values: BTreeMap<&'static str, ParamValue>,
}

impl ParamValues {
    /// Validates `descriptor` against `schema`.
    ///
    /// Unknown, duplicate, unparsable, out-of-range and missing required
    /// parameters all fail with `InvalidArgument`.
    pub fn resolve(schema: &[ParamSpec], descriptor: &Descriptor) -> VoxRegResult<Self> {
        let plugin = descriptor.name();
        let mut values = BTreeMap::new();
        for (key, raw) in descriptor.params() {
            let spec = schema.iter().find(|s| s.name == key).ok_or_else(|| {
                VoxRegError::invalid(format!("{plugin}: unknown parameter '{key}'"))
            })?;
            if values.contains_key(spec.name) {
                return Err(VoxRegError::invalid(format!(
                    "{plugin}: parameter '{key}' given more than once"
                )));
            }
            values.insert(spec.name, spec.parse(plugin, raw)?);
        }
        for spec in schema {
            if values.contains_key(spec.name) {
                continue;
            }
            match spec.default {
                Some(raw) => {
                    values.insert(spec.name, spec.parse(plugin, raw)?);
                }
                None => {
                    return Err(VoxRegError::invalid(format!(
                        "{plugin}: missing required parameter '{}'",
                        spec.name
                    )))
                }
            }
        }
        Ok(Self {
            plugin: plugin.to_string(),
            values,
        })
    }

    /// Name of the plugin these values belong to.
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    fn lookup(&self, name: &str) -> VoxRegResult<&ParamValue> {
        self.values.get(name).ok_or_else(|| {
            VoxRegError::invalid(format!("{}: no parameter '{name}'", self.plugin))
        })
    }

    fn wrong_kind(&self, name: &str, kind: &str) -> VoxRegError {
        VoxRegError::invalid(format!("{}: parameter '{name}' is not {kind}", self.plugin))
    }

    pub fn int(&self, name: &str) -> VoxRegResult<i64> {
        match self.lookup(name)? {
            ParamValue::Int(v) => Ok(*v),
            _ => Err(self.wrong_kind(name, "an integer")),
        }
    }

    /// Integer parameter as `usize`; schemas give such parameters `min >= 0`.
    pub fn usize(&self, name: &str) -> VoxRegResult<usize> {
        let v = self.int(name)?;
        usize::try_from(v).map_err(|_| self.wrong_kind(name, "a non-negative integer"))
    }

    pub fn float(&self, name: &str) -> VoxRegResult<f64> {
        match self.lookup(name)? {
            ParamValue::Float(v) => Ok(*v),
            ParamValue::Int(v) => Ok(*v as f64),
            _ => Err(self.wrong_kind(name, "a number")),
        }
    }

    pub fn boolean(&self, name: &str) -> VoxRegResult<bool> {
        match self.lookup(name)? {
            ParamValue::Bool(v) => Ok(*v),
            _ => Err(self.wrong_kind(name, "a boolean")),
        }
    }

    pub fn text(&self, name: &str) -> VoxRegResult<&str> {
        match self.lookup(name)? {
            ParamValue::Text(v) => Ok(v.as_str()),
            _ => Err(self.wrong_kind(name, "text")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ParamSpec, ParamValues};
    use crate::plugin::descriptor::Descriptor;
    use crate::util::VoxRegError;

    const SCHEMA: &[ParamSpec] = &[
        ParamSpec::int("w", 0, 100, Some("1"), "half window"),
        ParamSpec::float("eps", 0.0, f64::MAX, Some("0.1"), "noise level"),
        ParamSpec::choice("eval", &["cross", "dot"], Some("cross"), "evaluator"),
        ParamSpec::text("src", None, "pool key"),
    ];

    fn resolve(text: &str) -> Result<ParamValues, VoxRegError> {
        ParamValues::resolve(SCHEMA, &Descriptor::parse(text)?)
    }

    #[test]
    fn defaults_fill_missing_optional_parameters() {
        let values = resolve("demo:src=a.@,w=3").unwrap();
        assert_eq!(values.int("w").unwrap(), 3);
        assert_eq!(values.usize("w").unwrap(), 3);
        assert_eq!(values.float("eps").unwrap(), 0.1);
        assert_eq!(values.text("eval").unwrap(), "cross");
        assert_eq!(values.text("src").unwrap(), "a.@");
    }

    #[test]
    fn schema_violations_fail_before_creation() {
        assert_eq!(
            resolve("demo:w=2").unwrap_err(),
            VoxRegError::invalid("demo: missing required parameter 'src'")
        );
        assert_eq!(
            resolve("demo:src=a,q=1").unwrap_err(),
            VoxRegError::invalid("demo: unknown parameter 'q'")
        );
        assert!(resolve("demo:src=a,w=1,w=2").is_err());
        assert!(resolve("demo:src=a,w=-1").is_err());
        assert!(resolve("demo:src=a,w=two").is_err());
        assert!(resolve("demo:src=a,eps=nan").is_err());
        assert!(resolve("demo:src=a,eval=sum").is_err());
    }
}
