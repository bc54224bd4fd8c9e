//! Affine geotransformation for rasters

use geo_types::{coord, Rect};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Affine transformation coefficients for georeferencing rasters.
///
/// Converts between pixel coordinates (col, row) and world coordinates (x, y):
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// For north-up grids, `row_rotation` and `col_rotation` are 0,
/// and `pixel_height` is negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Pixel width (cell size in X direction)
    pub pixel_width: f64,
    /// Pixel height (cell size in Y direction, usually negative)
    pub pixel_height: f64,
    /// Rotation term applied to the row index for X
    pub row_rotation: f64,
    /// Rotation term applied to the column index for Y
    pub col_rotation: f64,
}

impl GeoTransform {
    /// Create a new GeoTransform with no rotation
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// North-up transform covering `extent` with `cols` x `rows` cells.
    ///
    /// Row 0 is the northern edge (`extent.max().y`).
    pub fn from_extent(extent: Rect<f64>, cols: usize, rows: usize) -> Result<Self> {
        if cols == 0 || rows == 0 {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        let width = extent.width();
        let height = extent.height();
        if !(width.is_finite() && height.is_finite()) {
            return Err(Error::invalid_parameter(
                "output_bounds",
                format!("{:?}", extent),
                "extent must be finite",
            ));
        }

        Ok(Self::new(
            extent.min().x,
            extent.max().y,
            width / cols as f64,
            -height / rows as f64,
        ))
    }

    /// Create from GDAL-style array [origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height]
    pub fn from_gdal(coeffs: [f64; 6]) -> Self {
        Self {
            origin_x: coeffs[0],
            pixel_width: coeffs[1],
            row_rotation: coeffs[2],
            origin_y: coeffs[3],
            col_rotation: coeffs[4],
            pixel_height: coeffs[5],
        }
    }

    /// World coordinates of the centre of pixel (col, row). This is the
    /// location a grid node is sampled at.
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.apply(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// World coordinates of the top-left corner of pixel (col, row)
    pub fn pixel_to_geo_corner(&self, col: usize, row: usize) -> (f64, f64) {
        self.apply(col as f64, row as f64)
    }

    fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.origin_x + col * self.pixel_width + row * self.row_rotation;
        let y = self.origin_y + col * self.col_rotation + row * self.pixel_height;
        (x, y)
    }

    /// Convert world coordinates to fractional pixel coordinates.
    ///
    /// Returns NaN for a degenerate transform.
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let det = self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation;

        if det.abs() < 1e-300 {
            return (f64::NAN, f64::NAN);
        }

        let dx = x - self.origin_x;
        let dy = y - self.origin_y;

        let col = (self.pixel_height * dx - self.row_rotation * dy) / det;
        let row = (-self.col_rotation * dx + self.pixel_width * dy) / det;

        (col, row)
    }

    /// Check if this is a north-up grid (no rotation)
    pub fn is_north_up(&self) -> bool {
        self.row_rotation == 0.0 && self.col_rotation == 0.0 && self.pixel_height < 0.0
    }

    /// Bounding box of a raster of the given dimensions
    pub fn bounds(&self, width: usize, height: usize) -> Rect<f64> {
        let corners = [
            self.pixel_to_geo_corner(0, 0),
            self.pixel_to_geo_corner(width, 0),
            self.pixel_to_geo_corner(0, height),
            self.pixel_to_geo_corner(width, height),
        ];

        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for (x, y) in corners {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }

        Rect::new(coord! { x: min_x, y: min_y }, coord! { x: max_x, y: max_y })
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pixel_to_geo_roundtrip() {
        let gt = GeoTransform::new(100.0, 200.0, 10.0, -10.0);

        let (x, y) = gt.pixel_to_geo(5, 10);
        let (col, row) = gt.geo_to_pixel(x, y);

        assert_relative_eq!(col, 5.5, epsilon = 1e-10);
        assert_relative_eq!(row, 10.5, epsilon = 1e-10);
    }

    #[test]
    fn test_from_extent_centres() {
        let extent = Rect::new(coord! { x: -0.5, y: -0.5 }, coord! { x: 0.5, y: 0.5 });
        let gt = GeoTransform::from_extent(extent, 1, 1).unwrap();
        let (x, y) = gt.pixel_to_geo(0, 0);
        assert_relative_eq!(x, 0.0);
        assert_relative_eq!(y, 0.0);

        let extent = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 4.0, y: 2.0 });
        let gt = GeoTransform::from_extent(extent, 4, 2).unwrap();
        assert!(gt.is_north_up());
        assert_eq!(gt.pixel_to_geo(0, 0), (0.5, 1.5));
        assert_eq!(gt.pixel_to_geo(3, 1), (3.5, 0.5));
    }

    #[test]
    fn test_from_extent_rejects_empty_grid() {
        let extent = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 1.0, y: 1.0 });
        assert!(GeoTransform::from_extent(extent, 0, 3).is_err());
    }

    #[test]
    fn test_bounds() {
        let gt = GeoTransform::new(0.0, 100.0, 1.0, -1.0);
        let bounds = gt.bounds(100, 50);

        assert_relative_eq!(bounds.min().x, 0.0);
        assert_relative_eq!(bounds.min().y, 50.0);
        assert_relative_eq!(bounds.max().x, 100.0);
        assert_relative_eq!(bounds.max().y, 100.0);
    }
}
