//! Vector features: the input collaborator of the gridding engine
//!
//! - [`Feature`]: geometry, optional per-vertex Z and attributes
//! - [`Layer`]: named schema plus features
//! - [`FeatureSource`]: capability interface over layered inputs
//! - [`filter`]: attribute filter expressions (`where`)
//! - [`sql`]: `SELECT ... FROM layer [WHERE ...]` statements

pub mod filter;
mod source;
pub mod sql;

pub use filter::Expr;
pub use source::{FeatureSource, MemorySource};
pub use sql::SelectStatement;

use geo_types::{Coord, Geometry, LineString, MultiPoint, Point, Polygon};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    /// Numeric reading of the value.
    ///
    /// Strings are parsed as numbers; nulls, booleans and unparsable strings
    /// yield `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(v) => Some(*v as f64),
            AttributeValue::Float(v) => Some(*v),
            AttributeValue::String(s) => s.trim().parse().ok(),
            AttributeValue::Null | AttributeValue::Bool(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// Infer a value from text: empty is null, then integer, float, string.
    pub fn parse_text(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            AttributeValue::Null
        } else if let Ok(v) = trimmed.parse::<i64>() {
            AttributeValue::Int(v)
        } else if let Ok(v) = trimmed.parse::<f64>() {
            AttributeValue::Float(v)
        } else {
            AttributeValue::String(text.to_string())
        }
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

/// One vertex of a feature's geometry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
    /// Z ordinate, if the feature carries one
    pub z: Option<f64>,
}

/// A geographic feature with geometry and attributes.
///
/// `geo_types` geometries are 2D, so Z ordinates are kept alongside in
/// `z_values`: one entry per vertex in the order [`Feature::vertices`]
/// emits them.
#[derive(Debug, Clone, Default)]
pub struct Feature {
    /// Feature geometry
    pub geometry: Option<Geometry<f64>>,
    /// Per-vertex Z ordinates
    pub z_values: Option<Vec<f64>>,
    /// Feature attributes
    pub properties: HashMap<String, AttributeValue>,
    /// Optional feature ID
    pub id: Option<String>,
}

impl Feature {
    /// Create a new 2D feature
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry: Some(geometry),
            ..Default::default()
        }
    }

    /// Create a feature with Z ordinates for each vertex
    pub fn with_z(geometry: Geometry<f64>, z_values: Vec<f64>) -> Self {
        Self {
            geometry: Some(geometry),
            z_values: Some(z_values),
            ..Default::default()
        }
    }

    /// 3D point feature
    pub fn point_z(x: f64, y: f64, z: f64) -> Self {
        Self::with_z(Point::new(x, y).into(), vec![z])
    }

    /// 3D multipoint feature
    pub fn multipoint_z(points: &[(f64, f64, f64)]) -> Self {
        let geometry = MultiPoint::from(
            points
                .iter()
                .map(|&(x, y, _)| Point::new(x, y))
                .collect::<Vec<_>>(),
        );
        let z = points.iter().map(|&(_, _, z)| z).collect();
        Self::with_z(geometry.into(), z)
    }

    /// Create a feature with no geometry
    pub fn empty() -> Self {
        Self::default()
    }

    /// Set an attribute
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Builder form of [`Feature::set_property`]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set_property(key, value);
        self
    }

    /// Get an attribute
    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }

    /// Every vertex of the geometry, with its Z ordinate when present.
    ///
    /// Points, line vertices and polygon ring vertices are all emitted; the
    /// closing vertex of a closed ring is skipped. Multi-geometries and
    /// collections are walked depth-first in member order.
    pub fn vertices(&self) -> Vec<Vertex> {
        let mut walker = VertexWalker {
            z: self.z_values.as_deref(),
            cursor: 0,
            out: Vec::new(),
        };
        if let Some(geometry) = &self.geometry {
            walker.geometry(geometry);
        }
        walker.out
    }
}

struct VertexWalker<'a> {
    z: Option<&'a [f64]>,
    cursor: usize,
    out: Vec<Vertex>,
}

impl VertexWalker<'_> {
    fn emit(&mut self, c: Coord<f64>) {
        let z = self.z.and_then(|z| z.get(self.cursor).copied());
        self.cursor += 1;
        self.out.push(Vertex { x: c.x, y: c.y, z });
    }

    fn ring(&mut self, ring: &LineString<f64>) {
        let n = if ring.is_closed() && ring.0.len() > 1 {
            ring.0.len() - 1
        } else {
            ring.0.len()
        };
        for c in &ring.0[..n] {
            self.emit(*c);
        }
    }

    fn polygon(&mut self, poly: &Polygon<f64>) {
        self.ring(poly.exterior());
        poly.interiors().iter().for_each(|r| self.ring(r));
    }

    fn geometry(&mut self, geometry: &Geometry<f64>) {
        match geometry {
            Geometry::Point(p) => self.emit(p.0),
            Geometry::Line(l) => {
                self.emit(l.start);
                self.emit(l.end);
            }
            Geometry::LineString(ls) => ls.0.iter().for_each(|c| self.emit(*c)),
            Geometry::Polygon(poly) => self.polygon(poly),
            Geometry::MultiPoint(mp) => mp.0.iter().for_each(|p| self.emit(p.0)),
            Geometry::MultiLineString(mls) => mls
                .0
                .iter()
                .for_each(|ls| ls.0.iter().for_each(|c| self.emit(*c))),
            Geometry::MultiPolygon(mp) => mp.0.iter().for_each(|poly| self.polygon(poly)),
            Geometry::GeometryCollection(gc) => gc.0.iter().for_each(|g| self.geometry(g)),
            Geometry::Rect(r) => self.polygon(&r.to_polygon()),
            Geometry::Triangle(t) => self.polygon(&t.to_polygon()),
        }
    }
}

/// Collection of features
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self { features: Vec::new() }
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }
}

impl FromIterator<Feature> for FeatureCollection {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        Self {
            features: iter.into_iter().collect(),
        }
    }
}

/// A named set of features sharing one attribute schema
#[derive(Debug, Clone)]
pub struct Layer {
    name: String,
    fields: Vec<String>,
    features: FeatureCollection,
}

impl Layer {
    /// Create an empty layer with no attribute fields
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            features: FeatureCollection::new(),
        }
    }

    /// Declare an attribute field. Declaring an existing field is a no-op.
    pub fn add_field(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.has_field(&name) {
            self.fields.push(name);
        }
    }

    /// Builder form of [`Layer::add_field`]
    pub fn with_field(mut self, name: impl Into<String>) -> Self {
        self.add_field(name);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field names in declaration order
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Case-insensitive lookup of a field, returning its declared spelling
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn features(&self) -> &FeatureCollection {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{polygon, GeometryCollection, LineString};

    #[test]
    fn test_point_z_vertex() {
        let f = Feature::point_z(1.0, 2.0, 3.0);
        assert_eq!(
            f.vertices(),
            vec![Vertex {
                x: 1.0,
                y: 2.0,
                z: Some(3.0)
            }]
        );
    }

    #[test]
    fn test_2d_vertices_have_no_z() {
        let f = Feature::new(Point::new(0.0, 0.0).into());
        assert_eq!(f.vertices()[0].z, None);
        assert!(Feature::empty().vertices().is_empty());
    }

    #[test]
    fn test_polygon_skips_closing_vertex() {
        let poly = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)];
        let f = Feature::with_z(poly.into(), vec![1.0, 2.0, 3.0]);
        let v = f.vertices();
        assert_eq!(v.len(), 3);
        assert_eq!(v.iter().map(|v| v.z.unwrap()).collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_collection_walk_order() {
        let gc = GeometryCollection::from(vec![
            Geometry::Point(Point::new(5.0, 5.0)),
            Geometry::LineString(LineString::from(vec![(0.0, 0.0), (1.0, 1.0)])),
        ]);
        let f = Feature::with_z(Geometry::GeometryCollection(gc), vec![10.0, 20.0, 30.0]);
        let xs: Vec<_> = f.vertices().iter().map(|v| (v.x, v.z)).collect();
        assert_eq!(xs, vec![(5.0, Some(10.0)), (0.0, Some(20.0)), (1.0, Some(30.0))]);
    }

    #[test]
    fn test_attribute_parsing() {
        assert_eq!(AttributeValue::parse_text(""), AttributeValue::Null);
        assert_eq!(AttributeValue::parse_text("12"), AttributeValue::Int(12));
        assert_eq!(AttributeValue::parse_text("1.5"), AttributeValue::Float(1.5));
        assert_eq!(AttributeValue::String("2.5".into()).as_f64(), Some(2.5));
        assert_eq!(AttributeValue::String("abc".into()).as_f64(), None);
    }

    #[test]
    fn test_layer_field_lookup_is_case_insensitive() {
        let layer = Layer::new("pts").with_field("Elev");
        assert_eq!(layer.field("elev"), Some("Elev"));
        assert!(!layer.has_field("depth"));
    }
}
