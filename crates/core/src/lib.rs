//! # scattergrid core
//!
//! Core types and I/O shared by the scattergrid gridding engine.
//!
//! This crate provides:
//! - `Raster<T>`: generic georeferenced grid, plus the runtime-typed `AnyRaster`
//! - `GeoTransform`: affine transformation for georeferencing
//! - `Feature`, `Layer`, `FeatureSource`: the vector input collaborator
//! - Attribute filter expressions and `SELECT` statements over layers
//! - GeoTIFF output and CSV point input

pub mod error;
pub mod io;
pub mod raster;
pub mod vector;

pub use error::{Error, Result};
pub use raster::{AnyRaster, DataType, GeoTransform, Raster, RasterElement};
pub use vector::{AttributeValue, Feature, FeatureSource, Layer, MemorySource};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::raster::{AnyRaster, DataType, GeoTransform, Raster, RasterElement};
    pub use crate::vector::{AttributeValue, Feature, FeatureSource, Layer, MemorySource};
}
