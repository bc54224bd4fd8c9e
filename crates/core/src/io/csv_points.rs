//! Delimited-text point input

use crate::error::{Error, Result};
use crate::vector::{AttributeValue, Feature, Layer, MemorySource};
use csv::{ReaderBuilder, StringRecord};
use geo_types::Point;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// How to interpret the columns of a delimited file
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// Column holding X (case-insensitive)
    pub x_column: String,
    /// Column holding Y (case-insensitive)
    pub y_column: String,
    /// Column holding Z. A missing column yields 2D points.
    pub z_column: Option<String>,
    pub delimiter: u8,
    /// Layer name; defaults to the file stem
    pub layer_name: Option<String>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            x_column: "x".to_string(),
            y_column: "y".to_string(),
            z_column: Some("z".to_string()),
            delimiter: b',',
            layer_name: None,
        }
    }
}

/// Read a headed delimited file into a single-layer source.
///
/// Each row becomes a point feature. Columns other than X/Y/Z become
/// attribute fields with values inferred by [`AttributeValue::parse_text`].
/// Rows with an empty X or Y produce a feature without geometry.
pub fn read_csv_points<P: AsRef<Path>>(path: P, options: &CsvOptions) -> Result<MemorySource> {
    let path = path.as_ref();
    let layer_name = options.layer_name.clone().unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "points".to_string())
    });
    let file = std::fs::File::open(path)?;
    read_csv_from_reader(file, &layer_name, options)
}

/// Same as [`read_csv_points`] over any reader
pub fn read_csv_from_reader<R: Read>(
    reader: R,
    layer_name: &str,
    options: &CsvOptions,
) -> Result<MemorySource> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(options.delimiter)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let find = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));

    let x_idx = find(&options.x_column).ok_or_else(|| Error::FieldNotFound(options.x_column.clone()))?;
    let y_idx = find(&options.y_column).ok_or_else(|| Error::FieldNotFound(options.y_column.clone()))?;
    let z_idx = options.z_column.as_deref().and_then(find);

    let mut layer = Layer::new(layer_name);
    let attribute_columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != x_idx && *i != y_idx && Some(*i) != z_idx)
        .map(|(i, h)| (i, h.to_string()))
        .collect();
    for (_, name) in &attribute_columns {
        layer.add_field(name.clone());
    }

    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let mut feature = point_feature(&record, x_idx, y_idx, z_idx, row + 2)?;
        for (i, name) in &attribute_columns {
            let value = record
                .get(*i)
                .map_or(AttributeValue::Null, AttributeValue::parse_text);
            feature.set_property(name.clone(), value);
        }
        layer.push(feature);
    }

    debug!(
        "Read {} rows into layer '{}' ({} attribute fields)",
        layer.len(),
        layer_name,
        attribute_columns.len()
    );

    Ok(MemorySource::from_layer(layer))
}

fn point_feature(
    record: &StringRecord,
    x_idx: usize,
    y_idx: usize,
    z_idx: Option<usize>,
    line: usize,
) -> Result<Feature> {
    let coord = |idx: usize, name: &str| -> Result<Option<f64>> {
        match record.get(idx).unwrap_or("") {
            "" => Ok(None),
            text => text.parse::<f64>().map(Some).map_err(|_| {
                Error::invalid_parameter(name, text, format!("not a number on line {}", line))
            }),
        }
    };

    let (Some(x), Some(y)) = (coord(x_idx, "x")?, coord(y_idx, "y")?) else {
        return Ok(Feature::empty());
    };
    let z = match z_idx {
        Some(idx) => coord(idx, "z")?,
        None => None,
    };

    Ok(match z {
        Some(z) => Feature::point_z(x, y, z),
        None => Feature::new(Point::new(x, y).into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{FeatureSource, Vertex};

    const DATA: &str = "X,Y,Z,name,depth\n\
                        0,0,10,a,1.5\n\
                        1,2,,b,\n\
                        ,,5,c,3\n";

    #[test]
    fn test_read_points_and_attributes() {
        let src = read_csv_from_reader(DATA.as_bytes(), "pts", &CsvOptions::default()).unwrap();
        assert_eq!(src.layer_names(), vec!["pts"]);
        assert_eq!(src.schema("pts").unwrap(), vec!["name", "depth"]);

        let features: Vec<_> = src.features("pts").unwrap().collect();
        assert_eq!(features.len(), 3);
        assert_eq!(
            features[0].vertices(),
            vec![Vertex {
                x: 0.0,
                y: 0.0,
                z: Some(10.0)
            }]
        );
        assert_eq!(features[1].vertices()[0].z, None);
        assert!(features[2].geometry.is_none());
        assert_eq!(features[0].get_property("depth"), Some(&AttributeValue::Float(1.5)));
        assert_eq!(features[1].get_property("depth"), Some(&AttributeValue::Null));
    }

    #[test]
    fn test_missing_coordinate_column() {
        let options = CsvOptions {
            x_column: "lon".into(),
            ..Default::default()
        };
        let err = read_csv_from_reader(DATA.as_bytes(), "pts", &options).unwrap_err();
        assert!(matches!(err, Error::FieldNotFound(ref f) if f == "lon"));
    }

    #[test]
    fn test_bad_number() {
        let err = read_csv_from_reader("x,y\nfoo,1\n".as_bytes(), "pts", &CsvOptions::default())
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_read_from_file_uses_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wells.csv");
        std::fs::write(&path, "x;y;elev\n1;1;4\n").unwrap();
        let options = CsvOptions {
            z_column: None,
            delimiter: b';',
            ..Default::default()
        };
        let src = read_csv_points(&path, &options).unwrap();
        assert_eq!(src.layer_names(), vec!["wells"]);
        assert_eq!(src.schema("wells").unwrap(), vec!["elev"]);
    }
}
