//! Layered feature sources

use crate::error::{Error, Result};
use crate::vector::{Feature, Layer};

/// Capability interface over a layered vector input.
///
/// The gridding engine only depends on this trait; concrete readers
/// (in-memory, CSV, ...) produce an implementation.
pub trait FeatureSource {
    /// Names of all layers, in source order
    fn layer_names(&self) -> Vec<String>;

    /// Attribute field names of a layer
    fn schema(&self, layer: &str) -> Result<Vec<String>>;

    /// Iterate the features of a layer
    fn features<'a>(&'a self, layer: &str) -> Result<Box<dyn Iterator<Item = &'a Feature> + 'a>>;

    /// Resolve a user-supplied layer name to the source's spelling.
    ///
    /// Exact matches win over case-insensitive ones.
    fn resolve_layer(&self, name: &str) -> Result<String> {
        let names = self.layer_names();
        names
            .iter()
            .find(|n| n.as_str() == name)
            .or_else(|| names.iter().find(|n| n.eq_ignore_ascii_case(name)))
            .cloned()
            .ok_or_else(|| Error::LayerNotFound(name.to_string()))
    }
}

/// In-memory feature source
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    layers: Vec<Layer>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-layer source
    pub fn from_layer(layer: Layer) -> Self {
        Self {
            layers: vec![layer],
        }
    }

    /// Add a layer, replacing any layer with the same name
    pub fn add_layer(&mut self, layer: Layer) {
        match self.layers.iter_mut().find(|l| l.name() == layer.name()) {
            Some(existing) => *existing = layer,
            None => self.layers.push(layer),
        }
    }

    /// Builder form of [`MemorySource::add_layer`]
    pub fn with_layer(mut self, layer: Layer) -> Self {
        self.add_layer(layer);
        self
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name() == name)
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn require(&self, name: &str) -> Result<&Layer> {
        self.layer(name)
            .ok_or_else(|| Error::LayerNotFound(name.to_string()))
    }
}

impl FeatureSource for MemorySource {
    fn layer_names(&self) -> Vec<String> {
        self.layers.iter().map(|l| l.name().to_string()).collect()
    }

    fn schema(&self, layer: &str) -> Result<Vec<String>> {
        Ok(self.require(layer)?.fields().to_vec())
    }

    fn features<'a>(&'a self, layer: &str) -> Result<Box<dyn Iterator<Item = &'a Feature> + 'a>> {
        Ok(Box::new(self.require(layer)?.features().iter()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> MemorySource {
        let mut layer = Layer::new("Points").with_field("val");
        layer.push(Feature::point_z(0.0, 0.0, 1.0));
        layer.push(Feature::point_z(1.0, 0.0, 2.0));
        MemorySource::from_layer(layer).with_layer(Layer::new("empty"))
    }

    #[test]
    fn test_layers_and_schema() {
        let src = source();
        assert_eq!(src.layer_names(), vec!["Points", "empty"]);
        assert_eq!(src.schema("Points").unwrap(), vec!["val"]);
        assert_eq!(src.features("Points").unwrap().count(), 2);
        assert_eq!(src.features("empty").unwrap().count(), 0);
    }

    #[test]
    fn test_resolve_layer() {
        let src = source();
        assert_eq!(src.resolve_layer("points").unwrap(), "Points");
        let err = src.resolve_layer("invalid").unwrap_err();
        assert_eq!(err.to_string(), "Unable to find layer \"invalid\"");
    }

    #[test]
    fn test_add_layer_replaces_same_name() {
        let mut src = source();
        src.add_layer(Layer::new("Points"));
        assert_eq!(src.layer_count(), 2);
        assert!(src.layer("Points").unwrap().is_empty());
    }
}
