//! Feature source to sample points
//!
//! Selection is checked in full (layers, SQL statement, attribute filter,
//! value field) before any feature is read, so configuration errors never
//! leave partial work behind.

use geo::Intersects;
use geo_types::{MultiPolygon, Point, Rect};
use scattergrid_core::vector::{Expr, Feature, FeatureSource, SelectStatement};
use scattergrid_core::{Error, Result};
use tracing::debug;

use super::SamplePoint;

/// Which features and which value to grid
#[derive(Debug, Clone)]
pub struct PointSelection {
    /// Layers to read; empty means every layer. Ignored when `sql` is set.
    pub layers: Vec<String>,
    /// `SELECT <*|fields> FROM layer [WHERE expr]`
    pub sql: Option<String>,
    /// Attribute filter applied to every selected layer
    pub where_clause: Option<String>,
    /// Attribute holding the value; the geometry's Z when unset
    pub z_field: Option<String>,
    /// Added to every value
    pub z_increase: f64,
    /// Applied after `z_increase`
    pub z_multiply: f64,
    /// Keep only vertices inside this rectangle
    pub spatial_filter: Option<Rect<f64>>,
    /// Keep only vertices inside these polygons (boundary inclusive)
    pub clip: Option<MultiPolygon<f64>>,
}

impl Default for PointSelection {
    fn default() -> Self {
        Self {
            layers: Vec::new(),
            sql: None,
            where_clause: None,
            z_field: None,
            z_increase: 0.0,
            z_multiply: 1.0,
            spatial_filter: None,
            clip: None,
        }
    }
}

/// One layer to read, with everything resolved against its schema
struct LayerPlan {
    layer: String,
    filters: Vec<Expr>,
    z_field: Option<String>,
}

fn resolve_field(schema: &[String], name: &str) -> Result<String> {
    schema
        .iter()
        .find(|f| f.eq_ignore_ascii_case(name))
        .cloned()
        .ok_or_else(|| Error::FieldNotFound(name.to_string()))
}

fn plan(source: &dyn FeatureSource, selection: &PointSelection) -> Result<Vec<LayerPlan>> {
    let where_expr = selection
        .where_clause
        .as_deref()
        .map(Expr::parse)
        .transpose()?;

    if let Some(sql) = &selection.sql {
        let statement = SelectStatement::parse(sql)?;
        let layer = source.resolve_layer(&statement.layer)?;
        let schema = source.schema(&layer)?;
        let statement = statement.bind(&schema)?;

        let z_field = match &selection.z_field {
            Some(name) => {
                let field = resolve_field(&schema, name)?;
                if !statement.selects_all() && !statement.fields.contains(&field) {
                    return Err(Error::FieldNotFound(name.clone()));
                }
                Some(field)
            }
            None => None,
        };

        let mut filters: Vec<Expr> = statement.filter.into_iter().collect();
        if let Some(expr) = where_expr {
            filters.push(expr.bind(&schema)?);
        }
        return Ok(vec![LayerPlan {
            layer,
            filters,
            z_field,
        }]);
    }

    let layers = if selection.layers.is_empty() {
        source.layer_names()
    } else {
        selection
            .layers
            .iter()
            .map(|name| source.resolve_layer(name))
            .collect::<Result<Vec<_>>>()?
    };

    layers
        .into_iter()
        .map(|layer| {
            let schema = source.schema(&layer)?;
            let filters = where_expr
                .clone()
                .map(|e| e.bind(&schema))
                .transpose()?
                .into_iter()
                .collect();
            let z_field = selection
                .z_field
                .as_deref()
                .map(|name| resolve_field(&schema, name))
                .transpose()?;
            Ok(LayerPlan {
                layer,
                filters,
                z_field,
            })
        })
        .collect()
}

/// Tallies for the debug log
#[derive(Debug, Default)]
struct Tally {
    features: usize,
    filtered: usize,
    dropped: usize,
    outside: usize,
}

/// Extract sample points from a feature source.
///
/// Without a `z_field` each vertex's Z is its value and vertices without Z
/// are dropped. With a `z_field` every vertex of a feature gets the
/// attribute's value; null, non-numeric and non-finite values are dropped.
/// Vertices with a non-finite X or Y are dropped as well.
pub fn collect_points(
    source: &dyn FeatureSource,
    selection: &PointSelection,
) -> Result<Vec<SamplePoint>> {
    let plans = plan(source, selection)?;

    let mut points = Vec::new();
    let mut tally = Tally::default();

    for plan in &plans {
        for feature in source.features(&plan.layer)? {
            tally.features += 1;
            if !plan.filters.iter().all(|f| f.matches(feature)) {
                tally.filtered += 1;
                continue;
            }
            extract(feature, plan, selection, &mut points, &mut tally);
        }
    }

    debug!(
        "Collected {} points from {} features in {} layer(s); {} features filtered, {} vertices with a non-finite coordinate or value, {} outside the spatial filter",
        points.len(),
        tally.features,
        plans.len(),
        tally.filtered,
        tally.dropped,
        tally.outside
    );
    Ok(points)
}

fn extract(
    feature: &Feature,
    plan: &LayerPlan,
    selection: &PointSelection,
    out: &mut Vec<SamplePoint>,
    tally: &mut Tally,
) {
    let attribute = plan
        .z_field
        .as_deref()
        .map(|field| feature.get_property(field).and_then(|v| v.as_f64()));

    for vertex in feature.vertices() {
        if !(vertex.x.is_finite() && vertex.y.is_finite()) {
            tally.dropped += 1;
            continue;
        }
        if !inside(selection, vertex.x, vertex.y) {
            tally.outside += 1;
            continue;
        }
        let raw = match attribute {
            Some(value) => value,
            None => vertex.z,
        };
        match raw.map(|v| (v + selection.z_increase) * selection.z_multiply) {
            Some(value) if value.is_finite() => {
                out.push(SamplePoint::new(vertex.x, vertex.y, value))
            }
            _ => tally.dropped += 1,
        }
    }
}

fn inside(selection: &PointSelection, x: f64, y: f64) -> bool {
    if let Some(rect) = &selection.spatial_filter {
        if x < rect.min().x || x > rect.max().x || y < rect.min().y || y > rect.max().y {
            return false;
        }
    }
    match &selection.clip {
        Some(clip) => clip.intersects(&Point::new(x, y)),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{coord, polygon, LineString, Polygon};
    use scattergrid_core::vector::Layer;
    use scattergrid_core::MemorySource;

    fn source() -> MemorySource {
        let mut points = Layer::new("points").with_field("val").with_field("kind");
        points.push(
            Feature::point_z(0.0, 0.0, 1.0)
                .with_property("val", 10.0)
                .with_property("kind", "a"),
        );
        points.push(
            Feature::point_z(1.0, 0.0, 2.0)
                .with_property("val", "20")
                .with_property("kind", "b"),
        );
        points.push(Feature::point_z(2.0, 0.0, f64::NAN).with_property("kind", "a"));

        let mut lines = Layer::new("lines").with_field("val");
        lines.push(
            Feature::new(LineString::from(vec![(0.0, 1.0), (1.0, 1.0), (2.0, 1.0)]).into())
                .with_property("val", 5.0),
        );

        MemorySource::from_layer(points).with_layer(lines)
    }

    #[test]
    fn test_z_from_geometry() {
        let pts = collect_points(&source(), &PointSelection::default()).unwrap();
        // NaN Z and the 2D line are dropped
        assert_eq!(
            pts,
            vec![SamplePoint::new(0.0, 0.0, 1.0), SamplePoint::new(1.0, 0.0, 2.0)]
        );
    }

    #[test]
    fn test_non_finite_coordinates_are_dropped() {
        let mut layer = Layer::new("points");
        layer.push(Feature::point_z(0.0, 0.0, 1.0));
        layer.push(Feature::point_z(f64::NAN, 0.5, 100.0));
        layer.push(Feature::point_z(0.5, f64::INFINITY, 100.0));
        layer.push(Feature::point_z(1.0, 1.0, 3.0));
        let source = MemorySource::from_layer(layer);

        let pts = collect_points(&source, &PointSelection::default()).unwrap();
        assert_eq!(
            pts,
            vec![SamplePoint::new(0.0, 0.0, 1.0), SamplePoint::new(1.0, 1.0, 3.0)]
        );
    }

    #[test]
    fn test_z_from_field_covers_every_vertex() {
        let selection = PointSelection {
            z_field: Some("VAL".into()),
            ..Default::default()
        };
        let pts = collect_points(&source(), &selection).unwrap();
        let values: Vec<f64> = pts.iter().map(|p| p.value).collect();
        // Null field on the third point is skipped, string "20" is numeric
        assert_eq!(values, vec![10.0, 20.0, 5.0, 5.0, 5.0]);
    }

    #[test]
    fn test_value_transform() {
        let selection = PointSelection {
            layers: vec!["points".into()],
            z_increase: 1.0,
            z_multiply: 10.0,
            ..Default::default()
        };
        let pts = collect_points(&source(), &selection).unwrap();
        assert_eq!(pts[0].value, 20.0);
        assert_eq!(pts[1].value, 30.0);
    }

    #[test]
    fn test_where_and_sql() {
        let selection = PointSelection {
            where_clause: Some("kind = 'a'".into()),
            layers: vec!["points".into()],
            ..Default::default()
        };
        assert_eq!(collect_points(&source(), &selection).unwrap().len(), 1);

        let selection = PointSelection {
            sql: Some("SELECT val FROM points WHERE val > 15".into()),
            z_field: Some("val".into()),
            ..Default::default()
        };
        let pts = collect_points(&source(), &selection).unwrap();
        assert_eq!(pts, vec![SamplePoint::new(1.0, 0.0, 20.0)]);

        // Field not in the SELECT list
        let selection = PointSelection {
            sql: Some("SELECT kind FROM points".into()),
            z_field: Some("val".into()),
            ..Default::default()
        };
        assert!(matches!(
            collect_points(&source(), &selection),
            Err(Error::FieldNotFound(_))
        ));
    }

    #[test]
    fn test_configuration_errors() {
        let err = collect_points(
            &source(),
            &PointSelection {
                layers: vec!["invalid".into()],
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Unable to find layer \"invalid\"");

        let err = collect_points(
            &source(),
            &PointSelection {
                where_clause: Some("invalid".into()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "\"invalid\" not recognised as an available field");

        let err = collect_points(
            &source(),
            &PointSelection {
                sql: Some("invalid".into()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(err.to_string().starts_with("SQL Expression Parsing Error"));

        let err = collect_points(
            &source(),
            &PointSelection {
                z_field: Some("missing".into()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::FieldNotFound(ref f) if f == "missing"));
    }

    #[test]
    fn test_spatial_filter_and_clip() {
        let selection = PointSelection {
            z_field: Some("val".into()),
            spatial_filter: Some(Rect::new(coord! { x: 0.5, y: -1.0 }, coord! { x: 2.0, y: 2.0 })),
            ..Default::default()
        };
        let pts = collect_points(&source(), &selection).unwrap();
        assert_eq!(pts.len(), 3);
        assert!(pts.iter().all(|p| p.x >= 0.5));

        let square: Polygon<f64> = polygon![
            (x: -0.5, y: -0.5),
            (x: 1.0, y: -0.5),
            (x: 1.0, y: 0.5),
            (x: -0.5, y: 0.5),
        ];
        let selection = PointSelection {
            clip: Some(MultiPolygon(vec![square])),
            ..Default::default()
        };
        let pts = collect_points(&source(), &selection).unwrap();
        // (1, 0) is on the boundary and kept
        assert_eq!(pts.len(), 2);
    }
}
