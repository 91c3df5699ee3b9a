//! Cell value trait

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// Types a raster cell can hold.
///
/// The pipeline computes in `f64`; byte and integer cells appear for masks
/// and for categorical sources decoded from GeoTIFF. Conversion to `f64`
/// comes from `num_traits::ToPrimitive` through `NumCast`.
pub trait RasterElement:
    Copy + Clone + Debug + PartialOrd + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// Fallback sentinel when a file carries none
    fn default_nodata() -> Self;

    /// Whether `self` is the sentinel (NaN always counts for floats)
    fn is_nodata(&self, nodata: Option<Self>) -> bool;

    fn is_float() -> bool;
}

macro_rules! impl_integer_cell {
    ($($t:ty),*) => {$(
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                <$t>::MAX
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                nodata.is_some_and(|nd| *self == nd)
            }

            fn is_float() -> bool {
                false
            }
        }
    )*};
}

macro_rules! impl_float_cell {
    ($($t:ty),*) => {$(
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                <$t>::NAN
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                if self.is_nan() {
                    return true;
                }
                match nodata {
                    Some(nd) if nd.is_nan() => false,
                    Some(nd) => *self == nd,
                    None => false,
                }
            }

            fn is_float() -> bool {
                true
            }
        }
    )*};
}

impl_integer_cell!(u8, u16, i16, i32, u32);
impl_float_cell!(f32, f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_sentinel_is_exact() {
        assert!((-9999.0_f64).is_nodata(Some(-9999.0)));
        assert!(!(-9998.999_f64).is_nodata(Some(-9999.0)));
        assert!(f64::NAN.is_nodata(None));
    }

    #[test]
    fn integer_sentinel() {
        assert!(255_u8.is_nodata(Some(255)));
        assert!(!0_u8.is_nodata(Some(255)));
        assert!(!0_u8.is_nodata(None));
    }
}
