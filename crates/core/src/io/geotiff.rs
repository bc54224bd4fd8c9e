//! Native GeoTIFF reading/writing
//!
//! Uses the `tiff` crate. Every pixel type of [`AnyRaster`] is written as a single-band,
//! uncompressed image with the GeoTIFF georeferencing tags and, when the
//! raster has one, the GDAL no-data tag.

use crate::error::{Error, Result};
use crate::raster::{AnyRaster, GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::{
    ColorType, Gray16, Gray32, Gray32Float, Gray64Float, Gray8, GrayI16, GrayI32, GrayI8,
};
use tiff::encoder::{TiffEncoder, TiffValue};
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

fn tiff_error(context: &'static str) -> impl Fn(tiff::TiffError) -> Error {
    move |e| Error::Other(format!("{}: {}", context, e))
}

/// Write a raster to a GeoTIFF file
pub fn write_geotiff<P: AsRef<Path>>(raster: &AnyRaster, path: P) -> Result<()> {
    let file = File::create(path.as_ref())?;
    encode_geotiff(raster, file)
}

/// Write a raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer(raster: &AnyRaster) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf))?;
    Ok(buf)
}

fn encode_geotiff<W: Write + Seek>(raster: &AnyRaster, writer: W) -> Result<()> {
    let mut encoder = TiffEncoder::new(writer).map_err(tiff_error("TIFF encoder error"))?;
    match raster {
        AnyRaster::Byte(r) => encode_band::<Gray8, _>(&mut encoder, r),
        AnyRaster::Int8(r) => encode_band::<GrayI8, _>(&mut encoder, r),
        AnyRaster::UInt16(r) => encode_band::<Gray16, _>(&mut encoder, r),
        AnyRaster::Int16(r) => encode_band::<GrayI16, _>(&mut encoder, r),
        AnyRaster::UInt32(r) => encode_band::<Gray32, _>(&mut encoder, r),
        AnyRaster::Int32(r) => encode_band::<GrayI32, _>(&mut encoder, r),
        AnyRaster::Float32(r) => encode_band::<Gray32Float, _>(&mut encoder, r),
        AnyRaster::Float64(r) => encode_band::<Gray64Float, _>(&mut encoder, r),
    }
}

fn encode_band<C, W>(encoder: &mut TiffEncoder<W>, raster: &Raster<C::Inner>) -> Result<()>
where
    C: ColorType,
    C::Inner: RasterElement,
    [C::Inner]: TiffValue,
    W: Write + Seek,
{
    let (rows, cols) = raster.shape();
    let data: Vec<C::Inner> = raster.data().iter().copied().collect();

    let mut image = encoder
        .new_image::<C>(cols as u32, rows as u32)
        .map_err(tiff_error("Cannot create TIFF image"))?;

    let gt = raster.transform();
    if gt.is_north_up() {
        let scale = [gt.pixel_width, -gt.pixel_height, 0.0];
        image
            .encoder()
            .write_tag(tag(MODEL_PIXEL_SCALE), &scale[..])
            .map_err(tiff_error("Cannot write scale tag"))?;

        let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
        image
            .encoder()
            .write_tag(tag(MODEL_TIEPOINT), &tiepoint[..])
            .map_err(tiff_error("Cannot write tiepoint tag"))?;
    } else {
        // Row-major 4x4 model transformation
        let matrix = [
            gt.pixel_width, gt.row_rotation, 0.0, gt.origin_x,
            gt.col_rotation, gt.pixel_height, 0.0, gt.origin_y,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        image
            .encoder()
            .write_tag(tag(MODEL_TRANSFORMATION), &matrix[..])
            .map_err(tiff_error("Cannot write transformation tag"))?;
    }

    // GTModelTypeGeoKey = Projected, GTRasterTypeGeoKey = PixelIsArea
    let geokeys: [u16; 12] = [1, 1, 0, 2, 1024, 0, 1, 1, 1025, 0, 1, 1];
    image
        .encoder()
        .write_tag(tag(GEO_KEY_DIRECTORY), &geokeys[..])
        .map_err(tiff_error("Cannot write geokey tag"))?;

    if let Some(nodata) = raster.nodata().and_then(RasterElement::to_f64) {
        image
            .encoder()
            .write_tag(tag(GDAL_NODATA), format_nodata(nodata).as_str())
            .map_err(tiff_error("Cannot write nodata tag"))?;
    }

    image
        .write_data(&data)
        .map_err(tiff_error("Cannot write image data"))?;

    Ok(())
}

fn format_nodata(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        format!("{}", value)
    }
}

/// Read a single-band GeoTIFF with the pixel type it was stored as
pub fn read_geotiff<P: AsRef<Path>>(path: P) -> Result<AnyRaster> {
    let file = File::open(path.as_ref())?;
    decode_geotiff(file)
}

/// Read a GeoTIFF from an in-memory buffer
pub fn read_geotiff_from_buffer(data: &[u8]) -> Result<AnyRaster> {
    decode_geotiff(Cursor::new(data))
}

fn decode_geotiff<R: Read + Seek>(reader: R) -> Result<AnyRaster> {
    let mut decoder = Decoder::new(reader).map_err(tiff_error("TIFF decode error"))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(tiff_error("Cannot read dimensions"))?;
    let (rows, cols) = (height as usize, width as usize);

    let transform = read_geotransform(&mut decoder).unwrap_or_default();
    let nodata = decoder
        .get_tag_ascii_string(tag(GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim_end_matches('\0').trim().parse::<f64>().ok());

    let result = decoder
        .read_image()
        .map_err(tiff_error("Cannot read image data"))?;

    fn build<T: RasterElement>(
        data: Vec<T>,
        rows: usize,
        cols: usize,
        transform: GeoTransform,
        nodata: Option<f64>,
    ) -> Result<Raster<T>> {
        let mut raster = Raster::from_vec(data, rows, cols)?;
        raster.set_transform(transform);
        raster.set_nodata(nodata.map(T::from_f64_saturating));
        Ok(raster)
    }

    let raster = match result {
        DecodingResult::U8(buf) => AnyRaster::Byte(build(buf, rows, cols, transform, nodata)?),
        DecodingResult::I8(buf) => AnyRaster::Int8(build(buf, rows, cols, transform, nodata)?),
        DecodingResult::U16(buf) => AnyRaster::UInt16(build(buf, rows, cols, transform, nodata)?),
        DecodingResult::I16(buf) => AnyRaster::Int16(build(buf, rows, cols, transform, nodata)?),
        DecodingResult::U32(buf) => AnyRaster::UInt32(build(buf, rows, cols, transform, nodata)?),
        DecodingResult::I32(buf) => AnyRaster::Int32(build(buf, rows, cols, transform, nodata)?),
        DecodingResult::F32(buf) => AnyRaster::Float32(build(buf, rows, cols, transform, nodata)?),
        DecodingResult::F64(buf) => AnyRaster::Float64(build(buf, rows, cols, transform, nodata)?),
        _ => {
            return Err(Error::UnsupportedDataType(
                "Unsupported TIFF pixel format".to_string(),
            ))
        }
    };

    Ok(raster)
}

fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<GeoTransform> {
    if let Ok(m) = decoder.get_tag_f64_vec(tag(MODEL_TRANSFORMATION)) {
        if m.len() >= 8 {
            return Ok(GeoTransform::from_gdal([m[3], m[0], m[1], m[7], m[4], m[5]]));
        }
    }

    let scale = decoder
        .get_tag_f64_vec(tag(MODEL_PIXEL_SCALE))
        .map_err(|_| Error::Other("No pixel scale tag".into()))?;
    let tiepoint = decoder
        .get_tag_f64_vec(tag(MODEL_TIEPOINT))
        .map_err(|_| Error::Other("No tiepoint tag".into()))?;

    if scale.len() >= 2 && tiepoint.len() >= 6 {
        // tiepoint: [I, J, K, X, Y, Z]
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        return Ok(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
    }

    Err(Error::Other("Cannot determine geotransform".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::DataType;
    use approx::assert_relative_eq;

    fn sample(nodata: Option<f64>) -> Raster<f64> {
        let mut raster = Raster::from_vec(vec![1.0, 2.5, -3.0, 400.0, 0.0, 7.0], 2, 3).unwrap();
        raster.set_transform(GeoTransform::new(100.0, 50.0, 0.5, -0.25));
        raster.set_nodata(nodata);
        raster
    }

    #[test]
    fn test_roundtrip_every_type() {
        for dtype in DataType::ALL {
            let typed = AnyRaster::from_f64(sample(Some(0.0)), dtype);
            let buf = write_geotiff_to_buffer(&typed).unwrap();
            let back = read_geotiff_from_buffer(&buf).unwrap();

            assert_eq!(back.data_type(), dtype, "{}", dtype);
            assert_eq!(back.shape(), (2, 3));
            assert_eq!(back.to_f64_vec(), typed.to_f64_vec(), "{}", dtype);
            assert_eq!(back.nodata(), Some(0.0));

            let gt = back.transform();
            assert_relative_eq!(gt.origin_x, 100.0);
            assert_relative_eq!(gt.origin_y, 50.0);
            assert_relative_eq!(gt.pixel_width, 0.5);
            assert_relative_eq!(gt.pixel_height, -0.25);
        }
    }

    #[test]
    fn test_nodata_tag_only_when_set() {
        let buf = write_geotiff_to_buffer(&AnyRaster::Float64(sample(None))).unwrap();
        assert_eq!(read_geotiff_from_buffer(&buf).unwrap().nodata(), None);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tif");
        write_geotiff(&AnyRaster::from_f64(sample(None), DataType::Int16), &path).unwrap();
        let back = read_geotiff(&path).unwrap();
        assert_eq!(back.data_type(), DataType::Int16);
        assert_eq!(back.get_f64(1, 0).unwrap(), 400.0);
    }
}
