//! Runtime-selected output pixel types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster};

/// Pixel type of an output raster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataType {
    Byte,
    Int8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    Float32,
    #[default]
    Float64,
}

impl DataType {
    pub const ALL: [DataType; 8] = [
        DataType::Byte,
        DataType::Int8,
        DataType::UInt16,
        DataType::Int16,
        DataType::UInt32,
        DataType::Int32,
        DataType::Float32,
        DataType::Float64,
    ];

    /// Canonical name, as accepted by [`DataType::from_str`]
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Byte => "Byte",
            DataType::Int8 => "Int8",
            DataType::UInt16 => "UInt16",
            DataType::Int16 => "Int16",
            DataType::UInt32 => "UInt32",
            DataType::Int32 => "Int32",
            DataType::Float32 => "Float32",
            DataType::Float64 => "Float64",
        }
    }

    /// Size of one cell in bytes
    pub fn size_bytes(&self) -> usize {
        match self {
            DataType::Byte | DataType::Int8 => 1,
            DataType::UInt16 | DataType::Int16 => 2,
            DataType::UInt32 | DataType::Int32 | DataType::Float32 => 4,
            DataType::Float64 => 8,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let dtype = match s.to_ascii_lowercase().as_str() {
            "byte" | "uint8" | "u8" => DataType::Byte,
            "int8" | "i8" => DataType::Int8,
            "uint16" | "u16" => DataType::UInt16,
            "int16" | "i16" => DataType::Int16,
            "uint32" | "u32" => DataType::UInt32,
            "int32" | "i32" => DataType::Int32,
            "float32" | "f32" => DataType::Float32,
            "float64" | "f64" => DataType::Float64,
            _ => return Err(Error::UnsupportedDataType(s.to_string())),
        };
        Ok(dtype)
    }
}

/// A raster whose cell type is only known at runtime
#[derive(Debug, Clone)]
pub enum AnyRaster {
    Byte(Raster<u8>),
    Int8(Raster<i8>),
    UInt16(Raster<u16>),
    Int16(Raster<i16>),
    UInt32(Raster<u32>),
    Int32(Raster<i32>),
    Float32(Raster<f32>),
    Float64(Raster<f64>),
}

macro_rules! dispatch {
    ($self:expr, $r:ident => $body:expr) => {
        match $self {
            AnyRaster::Byte($r) => $body,
            AnyRaster::Int8($r) => $body,
            AnyRaster::UInt16($r) => $body,
            AnyRaster::Int16($r) => $body,
            AnyRaster::UInt32($r) => $body,
            AnyRaster::Int32($r) => $body,
            AnyRaster::Float32($r) => $body,
            AnyRaster::Float64($r) => $body,
        }
    };
}

impl AnyRaster {
    /// Convert an `f64` raster to `dtype` (round-to-nearest, saturating).
    pub fn from_f64(raster: Raster<f64>, dtype: DataType) -> Self {
        match dtype {
            DataType::Byte => AnyRaster::Byte(raster.cast()),
            DataType::Int8 => AnyRaster::Int8(raster.cast()),
            DataType::UInt16 => AnyRaster::UInt16(raster.cast()),
            DataType::Int16 => AnyRaster::Int16(raster.cast()),
            DataType::UInt32 => AnyRaster::UInt32(raster.cast()),
            DataType::Int32 => AnyRaster::Int32(raster.cast()),
            DataType::Float32 => AnyRaster::Float32(raster.cast()),
            DataType::Float64 => AnyRaster::Float64(raster),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            AnyRaster::Byte(_) => DataType::Byte,
            AnyRaster::Int8(_) => DataType::Int8,
            AnyRaster::UInt16(_) => DataType::UInt16,
            AnyRaster::Int16(_) => DataType::Int16,
            AnyRaster::UInt32(_) => DataType::UInt32,
            AnyRaster::Int32(_) => DataType::Int32,
            AnyRaster::Float32(_) => DataType::Float32,
            AnyRaster::Float64(_) => DataType::Float64,
        }
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        dispatch!(self, r => r.shape())
    }

    pub fn transform(&self) -> &GeoTransform {
        dispatch!(self, r => r.transform())
    }

    /// No-data value widened to `f64`
    pub fn nodata(&self) -> Option<f64> {
        dispatch!(self, r => r.nodata().and_then(|v| num_traits::cast(v)))
    }

    /// Value at (row, col) widened to `f64`
    pub fn get_f64(&self, row: usize, col: usize) -> Result<f64> {
        dispatch!(self, r => {
            let v = r.get(row, col)?;
            num_traits::cast(v).ok_or_else(|| Error::Other("value not representable as f64".into()))
        })
    }

    /// All cells in row-major order widened to `f64`
    pub fn to_f64_vec(&self) -> Vec<f64> {
        dispatch!(self, r => r
            .data()
            .iter()
            .map(|&v| num_traits::cast(v).unwrap_or(f64::NAN))
            .collect())
    }
}
