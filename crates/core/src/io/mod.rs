//! I/O for gridding inputs and outputs
//!
//! - GeoTIFF output (and reading back) for every output pixel type
//! - Delimited-text point input

mod csv_points;
mod geotiff;

pub use csv_points::{read_csv_from_reader, read_csv_points, CsvOptions};
pub use geotiff::{read_geotiff, read_geotiff_from_buffer, write_geotiff, write_geotiff_to_buffer};
