//! Descriptor string grammar.
//!
//! ```text
//! chain      := descriptor ("+" descriptor)*
//! descriptor := name (":" param ("," param)*)?
//! param      := key "=" value
//! value      := text | "[" chain "]"
//! ```
//!
//! Brackets nest; the outermost pair around a value is stripped. `+` only
//! separates chain members at bracket depth zero and when followed by a
//! letter, so exponents such as `1e+3` stay intact.

use crate::util::{VoxRegError, VoxRegResult};
use std::fmt;

/// One parsed `name:key=value,...` descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Descriptor {
    name: String,
    params: Vec<(String, String)>,
}

impl Descriptor {
    /// Parses a single descriptor.
    pub fn parse(text: &str) -> VoxRegResult<Self> {
        let text = text.trim();
        check_balanced(text)?;
        let (name, rest) = match find_top_level(text, ':') {
            Some(pos) => (&text[..pos], Some(&text[pos + 1..])),
            None => (text, None),
        };
        let name = name.trim();
        if !is_identifier(name) {
            return Err(VoxRegError::invalid(format!(
                "malformed descriptor '{text}': bad plugin name '{name}'"
            )));
        }

        let mut params = Vec::new();
        if let Some(rest) = rest {
            for item in split_top_level(rest, ',') {
                let item = item.trim();
                let eq = find_top_level(item, '=').ok_or_else(|| {
                    VoxRegError::invalid(format!(
                        "malformed descriptor '{text}': expected key=value, got '{item}'"
                    ))
                })?;
                let key = item[..eq].trim();
                let value = strip_brackets(item[eq + 1..].trim());
                if !is_identifier(key) {
                    return Err(VoxRegError::invalid(format!(
                        "malformed descriptor '{text}': bad key '{key}'"
                    )));
                }
                if value.is_empty() {
                    return Err(VoxRegError::invalid(format!(
                        "malformed descriptor '{text}': missing value for '{key}'"
                    )));
                }
                params.push((key.to_string(), value.to_string()));
            }
        }

        Ok(Self {
            name: name.to_string(),
            params,
        })
    }

    /// Plugin name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameters in the order they were written.
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Returns the raw value of `key` (first occurrence).
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (i, (key, value)) in self.params.iter().enumerate() {
            f.write_str(if i == 0 { ":" } else { "," })?;
            if value.contains([':', ',', '=', '+', '[']) {
                write!(f, "{key}=[{value}]")?;
            } else {
                write!(f, "{key}={value}")?;
            }
        }
        Ok(())
    }
}

/// Splits a `a+b+c` chain into its member descriptors.
///
/// Every `+` outside brackets separates two members, except the sign of a
/// number: an exponent sign (`1e+2`) or a sign right after `=`. Members are
/// trimmed and must not be empty.
pub fn split_chain(text: &str) -> VoxRegResult<Vec<String>> {
    let text = text.trim();
    check_balanced(text)?;
    if text.is_empty() {
        return Err(VoxRegError::invalid("empty descriptor chain"));
    }
    let bytes = text.as_bytes();
    let mut members = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'[' => depth += 1,
            b']' => depth = depth.saturating_sub(1),
            b'+' if depth == 0 && !is_number_sign(bytes, i) => {
                members.push(text[start..i].trim().to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    members.push(text[start..].trim().to_string());
    if members.iter().any(|m| m.is_empty()) {
        return Err(VoxRegError::invalid(format!(
            "malformed descriptor chain '{text}': empty member"
        )));
    }
    Ok(members)
}

/// True if the `+` at `i` belongs to a number rather than joining members.
fn is_number_sign(bytes: &[u8], i: usize) -> bool {
    match i.checked_sub(1).map(|p| bytes[p]) {
        Some(b'=') => true,
        Some(b'e' | b'E') => i
            .checked_sub(2)
            .is_some_and(|p| bytes[p].is_ascii_digit() || bytes[p] == b'.'),
        _ => false,
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' || c == '@')
}

fn check_balanced(text: &str) -> VoxRegResult<()> {
    let mut depth = 0i64;
    for c in text.chars() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth < 0 {
                    break;
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(VoxRegError::invalid(format!(
            "unbalanced brackets in descriptor '{text}'"
        )));
    }
    Ok(())
}

fn find_top_level(text: &str, needle: char) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            c if c == needle && depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn strip_brackets(value: &str) -> &str {
    if value.starts_with('[') && value.ends_with(']') {
        let inner = &value[1..value.len() - 1];
        // Only strip when the outer pair encloses the whole value: `[a]+[b]`
        // must stay as it is.
        let mut depth = 0i64;
        for c in inner.chars() {
            match c {
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth < 0 {
                        return value;
                    }
                }
                _ => {}
            }
        }
        return inner.trim();
    }
    value
}

#[cfg(test)]
mod tests {
    use super::{split_chain, Descriptor};

    #[test]
    fn nested_values_lose_their_outer_brackets() {
        let d = Descriptor::parse("spline:rate=4,kernel=[bspline:d=3]").unwrap();
        assert_eq!(d.name(), "spline");
        assert_eq!(d.get("rate"), Some("4"));
        assert_eq!(d.get("kernel"), Some("bspline:d=3"));
        assert_eq!(d.to_string(), "spline:rate=4,kernel=[bspline:d=3]");
    }

    #[test]
    fn chain_splits_only_at_top_level() {
        let parts = split_chain("mean:w=1+binarize:min=1e+2,max=[a+b]").unwrap();
        assert_eq!(parts, vec!["mean:w=1", "binarize:min=1e+2,max=[a+b]"]);
        assert!(split_chain("mean:w=1+").is_err());
        assert!(split_chain("+mean:w=1").is_err());
        assert!(split_chain("mean:w=1 + + binarize").is_err());
        assert!(split_chain("").is_err());
        assert_eq!(
            split_chain("convert:a=+2.5E+1 + crop:w=3").unwrap(),
            vec!["convert:a=+2.5E+1", "crop:w=3"]
        );
        assert_eq!(split_chain(" ssd+ ngf ").unwrap(), vec!["ssd", "ngf"]);
    }

    #[test]
    fn malformed_descriptors_are_rejected() {
        assert!(Descriptor::parse("mean:w").is_err());
        assert!(Descriptor::parse("mean:w=").is_err());
        assert!(Descriptor::parse("spline:kernel=[bspline:d=3").is_err());
        assert!(Descriptor::parse(":w=1").is_err());
        assert!(Descriptor::parse("9lives").is_err());
        assert_eq!(Descriptor::parse("gdas").unwrap().params().len(), 0);
    }
}
