//! Moving labelled arrays onto another reference system.
//!
//! The last two dimensions of an array are its rows and columns; their
//! coordinates must be regularly spaced pixel centres. Every plane along
//! the leading dimensions is warped on its own.

use geo_common::CrsCode;
use mosaic::{GeoRaster, GeoTransform, Warp};

use crate::array::{Coord, DataArray};
use crate::error::{CubeError, Result};

/// The single plane of a two-dimensional array as a north-up raster.
pub fn to_raster(array: &DataArray) -> Result<GeoRaster> {
    if array.dims.len() != 2 {
        return Err(CubeError::config(format!(
            "expected a (y, x) array, got dimensions {:?}",
            array.dims
        )));
    }
    let lattice = Lattice::of(array)?;
    lattice.raster(&array.values, array.provenance.crs)
}

/// Warp every plane of `array` and relabel its spatial dimensions `y`, `x`.
///
/// Leading dimensions and their coordinates are kept; provenance records
/// the new reference system.
pub fn reproject(array: &DataArray, warp: &Warp) -> Result<DataArray> {
    if array.dims.len() < 2 {
        return Err(CubeError::config(format!(
            "cannot reproject an array with dimensions {:?}",
            array.dims
        )));
    }
    let lattice = Lattice::of(array)?;
    let plane = lattice.width * lattice.height;

    let mut values = Vec::new();
    let mut target: Option<GeoRaster> = None;
    for chunk in array.values.chunks(plane.max(1)) {
        let warped = warp.apply(&lattice.raster(chunk, array.provenance.crs)?)?;
        values.extend_from_slice(&warped.values);
        target = Some(warped);
    }
    let target = target.ok_or_else(|| CubeError::config("cannot reproject an empty array"))?;

    let lead = array.dims.len() - 2;
    let mut dims: Vec<&str> = array.dims[..lead].iter().map(String::as_str).collect();
    dims.extend(["y", "x"]);
    let mut coords = array.coords[..lead].to_vec();
    coords.push(Coord::Values(target.y_coords()));
    coords.push(Coord::Values(target.x_coords()));

    let mut provenance = array.provenance.clone();
    provenance.crs = warp.crs;
    DataArray::new(array.name.clone(), &dims, coords, values, provenance)
        .ok_or_else(|| CubeError::task("reprojected array has an inconsistent shape"))
}

/// Pixel lattice described by the last two coordinates of an array.
struct Lattice {
    width: usize,
    height: usize,
    transform: GeoTransform,
    /// Rows run south to north and must be flipped into a north-up raster.
    flip: bool,
}

impl Lattice {
    fn of(array: &DataArray) -> Result<Self> {
        let n = array.coords.len();
        let (Coord::Values(y), Coord::Values(x)) = (&array.coords[n - 2], &array.coords[n - 1]) else {
            return Err(CubeError::config("spatial coordinates must be numeric"));
        };
        if x.len() < 2 || y.len() < 2 {
            return Err(CubeError::config(format!(
                "a {}x{} plane has no pixel size",
                x.len(),
                y.len()
            )));
        }

        let dx = x[1] - x[0];
        let dy = y[1] - y[0];
        if dx <= 0.0 || dy == 0.0 {
            return Err(CubeError::config(format!(
                "spatial coordinates are not monotonic (steps {dx}, {dy})"
            )));
        }
        let flip = dy > 0.0;
        let top = if flip { y[y.len() - 1] } else { y[0] };
        Ok(Self {
            width: x.len(),
            height: y.len(),
            transform: GeoTransform::new(x[0] - dx / 2.0, top + dy.abs() / 2.0, dx, -dy.abs()),
            flip,
        })
    }

    fn raster(&self, plane: &[f32], crs: CrsCode) -> Result<GeoRaster> {
        let values = if self.flip {
            plane
                .chunks(self.width)
                .rev()
                .flatten()
                .copied()
                .collect()
        } else {
            plane.to_vec()
        };
        Ok(GeoRaster::new(values, self.width, self.height, self.transform, crs)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::Provenance;
    use chrono::NaiveDate;
    use geo_common::{descriptor, Extent, Resampling};

    fn rain(latitudes: Vec<f64>, values: Vec<f32>) -> DataArray {
        let days = vec![
            NaiveDate::from_ymd_opt(2022, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2022, 3, 2).unwrap(),
        ];
        let prov = Provenance::for_dataset(
            descriptor("copernicus/predicted_rainfall").unwrap(),
            CrsCode::Epsg4326,
        );
        DataArray::new(
            "tp",
            &["time", "latitude", "longitude"],
            vec![
                Coord::Days(days),
                Coord::Values(latitudes),
                Coord::Values(vec![10.0, 11.0, 12.0]),
            ],
            values,
            prov,
        )
        .unwrap()
    }

    #[test]
    fn test_identity_grid_keeps_planes() {
        let values: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let array = rain(vec![48.0, 47.0], values.clone());
        let out = reproject(&array, &Warp::to(CrsCode::Epsg4326).resolution(1.0)).unwrap();
        assert_eq!(out.dims, vec!["time", "y", "x"]);
        assert_eq!(out.shape(), vec![2, 2, 3]);
        assert_eq!(out.values, values);
        assert_eq!(out.coord("x"), Some(&Coord::Values(vec![10.0, 11.0, 12.0])));
        assert_eq!(out.days().map(<[NaiveDate]>::len), Some(2));
    }

    #[test]
    fn test_south_to_north_rows_are_flipped() {
        let values: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let array = rain(vec![47.0, 48.0], values);
        let out = reproject(&array, &Warp::to(CrsCode::Epsg4326).resolution(1.0)).unwrap();
        assert_eq!(out.coord("y"), Some(&Coord::Values(vec![48.0, 47.0])));
        // The northern row (index 1 in the input) comes first
        assert_eq!(out.get(&[0, 0, 0]), Some(3.0));
        assert_eq!(out.get(&[1, 1, 2]), Some(8.0));
    }

    #[test]
    fn test_mercator_target() {
        let array = rain(vec![48.0, 47.0], vec![1.0; 12]);
        let warp = Warp::to(CrsCode::Epsg3857)
            .resolution(5_000.0)
            .resampling(Resampling::Bilinear);
        let out = reproject(&array, &warp).unwrap();
        assert_eq!(out.provenance.crs, CrsCode::Epsg3857);
        let shape = out.shape();
        assert_eq!(shape[0], 2);
        assert!(shape[1] > 2 && shape[2] > 3);
        assert_eq!(out.value_range(), Some((1.0, 1.0)));

        let Some(Coord::Values(x)) = out.coord("x") else { panic!("x coordinate missing") };
        assert_eq!(x[1] - x[0], 5_000.0);
        let extent = Extent::new(x[0], 0.0, x[x.len() - 1], 1.0, CrsCode::Epsg3857)
            .transform_to(CrsCode::Epsg4326)
            .unwrap();
        assert!(extent.min_x < 10.0 && extent.max_x > 12.0);
    }

    #[test]
    fn test_single_row_has_no_pixel_size() {
        let prov = Provenance::for_dataset(descriptor("gfm/floods").unwrap(), CrsCode::Epsg4326);
        let array = DataArray::new(
            "flood",
            &["y", "x"],
            vec![Coord::Values(vec![1.0]), Coord::Values(vec![0.0, 1.0])],
            vec![0.0, 1.0],
            prov,
        )
        .unwrap();
        assert!(matches!(to_raster(&array), Err(CubeError::Config(_))));
    }

    #[test]
    fn test_to_raster_requires_two_dimensions() {
        let array = rain(vec![48.0, 47.0], vec![0.0; 12]);
        assert!(to_raster(&array).is_err());
    }
}
