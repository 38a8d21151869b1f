//! Cell value trait for generic raster grids

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// Trait for types that can be stored in a raster cell.
///
/// Grids hold either measurement values (`f32`/`f64`) or categorical class
/// codes (integer types). The trait carries the no-data conventions and the
/// `f64` conversions the matrix assembly needs.
pub trait CellValue:
    Copy + Clone + Debug + PartialOrd + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// Default no-data sentinel for this type
    fn default_nodata() -> Self;

    /// Check if this value represents no-data
    fn is_nodata(&self, nodata: Option<Self>) -> bool;

    /// Convert to f64 for matrix assembly
    fn to_f64(self) -> Option<f64> {
        NumCast::from(self)
    }

    /// Convert back from f64 during result write-back
    fn from_f64(value: f64) -> Option<Self> {
        NumCast::from(value)
    }
}

macro_rules! impl_cell_value_int {
    ($t:ty) => {
        impl CellValue for $t {
            fn default_nodata() -> Self {
                <$t>::MIN
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                match nodata {
                    Some(nd) => *self == nd,
                    None => false,
                }
            }
        }
    };
}

macro_rules! impl_cell_value_float {
    ($t:ty) => {
        impl CellValue for $t {
            fn default_nodata() -> Self {
                <$t>::NAN
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                if self.is_nan() {
                    return true;
                }
                match nodata {
                    Some(nd) => (self - nd).abs() < <$t>::EPSILON * 100.0,
                    None => false,
                }
            }
        }
    };
}

impl_cell_value_int!(i16);
impl_cell_value_int!(i32);
impl_cell_value_int!(i64);
impl_cell_value_int!(u8);
impl_cell_value_int!(u16);
impl_cell_value_float!(f32);
impl_cell_value_float!(f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_nan_is_nodata() {
        assert!(f64::NAN.is_nodata(None));
        assert!(!1.0_f64.is_nodata(None));
        assert!((-9999.0_f64).is_nodata(Some(-9999.0)));
    }

    #[test]
    fn test_int_nodata_sentinel() {
        assert_eq!(i32::default_nodata(), i32::MIN);
        assert!(i32::MIN.is_nodata(Some(i32::MIN)));
        assert!(!0_i32.is_nodata(Some(i32::MIN)));
    }

    #[test]
    fn test_roundtrip_f64() {
        assert_eq!(7_i32.to_f64(), Some(7.0));
        assert_eq!(i32::from_f64(7.4), Some(7_i32));
    }
}
