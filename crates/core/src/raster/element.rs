//! Raster element trait for generic cell values

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// Trait for types that can be stored in a raster cell.
///
/// Gridding always computes in `f64`; the conversion to the cell type happens
/// once per cell through [`RasterElement::from_f64_saturating`].
pub trait RasterElement:
    Copy + Clone + Debug + PartialOrd + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// Minimum value representable by this type
    fn min_value() -> Self;

    /// Maximum value representable by this type
    fn max_value() -> Self;

    /// Check if this value represents no-data
    fn is_nodata(&self, nodata: Option<Self>) -> bool;

    /// Whether this type is a floating point type
    fn is_float() -> bool;

    /// Convert an `f64` to this type, rounding to nearest and clamping to the
    /// type's range. NaN becomes zero for integer types.
    fn from_f64_saturating(value: f64) -> Self;

    /// Convert self to f64
    fn to_f64(self) -> Option<f64> {
        NumCast::from(self)
    }
}

macro_rules! impl_raster_element_int {
    ($t:ty) => {
        impl RasterElement for $t {
            fn min_value() -> Self {
                <$t>::MIN
            }

            fn max_value() -> Self {
                <$t>::MAX
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                nodata.map_or(false, |nd| *self == nd)
            }

            fn is_float() -> bool {
                false
            }

            fn from_f64_saturating(value: f64) -> Self {
                if value.is_nan() {
                    return 0;
                }
                let rounded = value.round();
                if rounded <= <$t>::MIN as f64 {
                    <$t>::MIN
                } else if rounded >= <$t>::MAX as f64 {
                    <$t>::MAX
                } else {
                    rounded as $t
                }
            }
        }
    };
}

impl_raster_element_int!(i8);
impl_raster_element_int!(i16);
impl_raster_element_int!(i32);
impl_raster_element_int!(u8);
impl_raster_element_int!(u16);
impl_raster_element_int!(u32);

impl RasterElement for f32 {
    fn min_value() -> Self {
        f32::MIN
    }

    fn max_value() -> Self {
        f32::MAX
    }

    fn is_nodata(&self, nodata: Option<Self>) -> bool {
        if self.is_nan() {
            return true;
        }
        nodata.map_or(false, |nd| *self == nd)
    }

    fn is_float() -> bool {
        true
    }

    fn from_f64_saturating(value: f64) -> Self {
        if value.is_finite() {
            value.clamp(f32::MIN as f64, f32::MAX as f64) as f32
        } else {
            value as f32
        }
    }
}

impl RasterElement for f64 {
    fn min_value() -> Self {
        f64::MIN
    }

    fn max_value() -> Self {
        f64::MAX
    }

    fn is_nodata(&self, nodata: Option<Self>) -> bool {
        if self.is_nan() {
            return true;
        }
        nodata.map_or(false, |nd| *self == nd)
    }

    fn is_float() -> bool {
        true
    }

    fn from_f64_saturating(value: f64) -> Self {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_rounding_and_saturation() {
        assert_eq!(u8::from_f64_saturating(2.5), 3);
        assert_eq!(u8::from_f64_saturating(2.49), 2);
        assert_eq!(u8::from_f64_saturating(-4.0), 0);
        assert_eq!(u8::from_f64_saturating(1e9), 255);
        assert_eq!(i16::from_f64_saturating(-40000.0), i16::MIN);
        assert_eq!(i16::from_f64_saturating(-1.5), -2);
        assert_eq!(u32::from_f64_saturating(f64::NAN), 0);
    }

    #[test]
    fn test_float_saturation() {
        assert_eq!(f32::from_f64_saturating(1e300), f32::MAX);
        assert_eq!(f32::from_f64_saturating(-1e300), f32::MIN);
        assert!(f32::from_f64_saturating(f64::NAN).is_nan());
        assert_eq!(f32::from_f64_saturating(0.1), 0.1f32);
    }

    #[test]
    fn test_nodata_checks() {
        assert!(0u8.is_nodata(Some(0)));
        assert!(!0u8.is_nodata(None));
        assert!(f64::NAN.is_nodata(None));
        assert!(5.0f64.is_nodata(Some(5.0)));
    }
}
