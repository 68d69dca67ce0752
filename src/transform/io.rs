//! JSON persistence of transformations.
//!
//! A transformation is stored as the descriptor of its factory, its grid
//! size, the parameter vector and its attributes. Loading re-creates the
//! factory through a [`Registry`], so any registered model can be restored.

use super::Transform;
use crate::image::{AttributeMap, Size2D};
use crate::plugin::Registry;
use crate::util::fs::{io_error, write_string_atomic};
use crate::util::{VoxRegError, VoxRegResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// On-disk form of a transformation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformDocument {
    pub creator: String,
    pub size: Size2D,
    pub parameters: Vec<f64>,
    #[serde(default)]
    pub attributes: AttributeMap,
}

impl TransformDocument {
    pub fn from_transform(transform: &dyn Transform) -> Self {
        Self {
            creator: transform.creator_string(),
            size: transform.size(),
            parameters: transform.parameters(),
            attributes: transform.attributes().clone(),
        }
    }

    /// Re-creates the transformation with the factory named in `creator`.
    pub fn instantiate(&self, registry: &Registry) -> VoxRegResult<Box<dyn Transform>> {
        let factory = registry.produce_transform(&self.creator)?;
        let mut transform = factory.create(self.size)?;
        transform.set_parameters(&self.parameters)?;
        *transform.attributes_mut() = self.attributes.clone();
        Ok(transform)
    }
}

/// Serializes a transformation to pretty-printed JSON.
pub fn save_transform(transform: &dyn Transform) -> VoxRegResult<String> {
    serde_json::to_string_pretty(&TransformDocument::from_transform(transform))
        .map_err(|err| VoxRegError::runtime(format!("serialize transformation: {err}")))
}

/// Restores a transformation saved by [`save_transform`].
pub fn load_transform(registry: &Registry, text: &str) -> VoxRegResult<Box<dyn Transform>> {
    let document: TransformDocument = serde_json::from_str(text)
        .map_err(|err| VoxRegError::invalid(format!("malformed transformation file: {err}")))?;
    document.instantiate(registry)
}

/// Writes a transformation file; an existing file is only replaced once the
/// new one is complete.
pub fn write_transform_file(path: &Path, transform: &dyn Transform) -> VoxRegResult<()> {
    let text = save_transform(transform)?;
    write_string_atomic(path, &text)
}

pub fn read_transform_file(registry: &Registry, path: &Path) -> VoxRegResult<Box<dyn Transform>> {
    let text = std::fs::read_to_string(path).map_err(|err| io_error(path, &err))?;
    load_transform(registry, &text)
}

#[cfg(test)]
mod tests {
    use super::{load_transform, save_transform};
    use crate::image::Size2D;
    use crate::plugin::Registry;

    #[test]
    fn document_keeps_creator_and_attributes() {
        let registry = Registry::with_defaults();
        let factory = registry.produce_transform("rigid").unwrap();
        let mut t = factory.create(Size2D::new(20, 10).unwrap()).unwrap();
        t.set_parameters(&[1.5, -0.25, 0.1]).unwrap();
        t.attributes_mut().set("subject", "a7");

        let text = save_transform(t.as_ref()).unwrap();
        assert!(text.contains("\"creator\": \"rigid\""));
        let back = load_transform(&registry, &text).unwrap();
        assert_eq!(back.parameters(), t.parameters());
        assert_eq!(back.attributes(), t.attributes());
        assert_eq!(back.size(), t.size());
    }

    #[test]
    fn malformed_documents_are_rejected() {
        let registry = Registry::with_defaults();
        assert!(load_transform(&registry, "{").unwrap_err().is_invalid_argument());
        let wrong_len = r#"{"creator":"translate","size":{"width":4,"height":4},"parameters":[1.0]}"#;
        assert!(load_transform(&registry, wrong_len).unwrap_err().is_invalid_argument());
        let zero = r#"{"creator":"translate","size":{"width":0,"height":4},"parameters":[0.0,0.0]}"#;
        assert!(load_transform(&registry, zero).unwrap_err().is_invalid_argument());
    }
}
