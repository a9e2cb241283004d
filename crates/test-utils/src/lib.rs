//! Shared test helpers for the datacube workspace.
//!
//! - locating optional sample files (ERA5-Land GRIB, real flood tiles)
//! - synthetic grids whose values identify their cell and day
//! - GeoTIFF tiles laid out like the flood archive
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```

pub mod fixtures;
pub mod generators;
pub mod paths;

pub use fixtures::*;
pub use generators::*;
pub use paths::*;

/// Returns the path of a sample file, or skips the test when it is absent.
///
/// ```ignore
/// let path = require_test_file!("tp_era5land_20220301.grib");
/// ```
#[macro_export]
macro_rules! require_test_file {
    ($name:expr) => {{
        match $crate::find_test_file($name) {
            Some(path) => path,
            None => {
                eprintln!(
                    "SKIPPED: Test file '{}' not found. Download test data or set TEST_DATA_DIR.",
                    $name
                );
                return;
            }
        }
    }};
}

/// Element-wise approximate equality of two float slices. NaN matches NaN,
/// so no-data cells compare equal to no-data cells.
///
/// ```ignore
/// assert_slice_approx_eq!(&[1.0, f32::NAN], &[1.0001, f32::NAN], 0.001);
/// ```
#[macro_export]
macro_rules! assert_slice_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left = $left;
        let right = $right;
        assert_eq!(left.len(), right.len(), "slice lengths differ");
        for (i, (l, r)) in left.iter().zip(right.iter()).enumerate() {
            let (l, r) = (*l as f64, *r as f64);
            if l.is_nan() && r.is_nan() {
                continue;
            }
            if l.is_nan() != r.is_nan() || (l - r).abs() > $epsilon as f64 {
                panic!(
                    "assertion failed: slices differ at index {}\n  left: `{:?}`,\n right: `{:?}`",
                    i, l, r
                );
            }
        }
    }};
}
