//! Moving rasters between reference systems and resolutions.
//!
//! A [`Warp`] describes the target: reference system, pixel size, the
//! interpolation, and optionally an area to keep. Every target pixel centre
//! is taken back into the source system and sampled there, so the output
//! has no holes whatever the distortion between the two systems.

use geo_common::{CrsCode, Extent, Resampling};
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::assemble::Mosaic;
use crate::error::{MosaicError, Result};
use crate::tile::GeoTransform;

/// Largest raster a warp may produce, in pixels.
pub const MAX_WARP_PIXELS: usize = 1 << 28;

/// Tolerance in pixel units when fitting whole pixels into an envelope.
const SNAP_EPS: f64 = 1e-6;

/// A north-up single-band raster; no-data is NaN.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoRaster {
    #[serde(skip)]
    pub values: Vec<f32>,
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub crs: CrsCode,
}

impl GeoRaster {
    pub fn new(
        values: Vec<f32>,
        width: usize,
        height: usize,
        transform: GeoTransform,
        crs: CrsCode,
    ) -> Result<Self> {
        if values.len() != width * height {
            return Err(MosaicError::raster(format!(
                "{} values for a {width}x{height} raster",
                values.len()
            )));
        }
        if transform.pixel_width <= 0.0 || transform.pixel_height >= 0.0 {
            return Err(MosaicError::raster("only north-up rasters are supported"));
        }
        Ok(Self {
            values,
            width,
            height,
            transform,
            crs,
        })
    }

    pub fn get(&self, col: usize, row: usize) -> Option<f32> {
        (col < self.width && row < self.height).then(|| self.values[row * self.width + col])
    }

    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|v| !v.is_nan()).count()
    }

    pub fn extent(&self) -> Extent {
        let (min_x, min_y, max_x, max_y) = self.transform.bounds(self.width, self.height);
        Extent::new(min_x, min_y, max_x, max_y, self.crs)
    }

    /// Map x of every column centre.
    pub fn x_coords(&self) -> Vec<f64> {
        (0..self.width)
            .map(|c| self.transform.pixel_center(c, 0).0)
            .collect()
    }

    /// Map y of every row centre.
    pub fn y_coords(&self) -> Vec<f64> {
        (0..self.height)
            .map(|r| self.transform.pixel_center(0, r).1)
            .collect()
    }

    /// Average `factor` x `factor` blocks, starting at the upper-left pixel.
    ///
    /// Blocks cut by the right or bottom edge average the pixels they hold.
    /// NaN pixels are left out of a block's mean; a block without valid
    /// pixels is NaN.
    pub fn coarsen_mean(&self, factor: usize) -> Result<GeoRaster> {
        if factor == 0 {
            return Err(MosaicError::raster("coarsening factor must be at least 1"));
        }
        if factor == 1 {
            return Ok(self.clone());
        }

        let width = self.width.div_ceil(factor);
        let height = self.height.div_ceil(factor);
        let mut values = vec![f32::NAN; width * height];
        values
            .par_chunks_mut(width.max(1))
            .enumerate()
            .for_each(|(r, out)| {
                let rows = r * factor..((r + 1) * factor).min(self.height);
                for (c, v) in out.iter_mut().enumerate() {
                    let cols = c * factor..((c + 1) * factor).min(self.width);
                    let (mut sum, mut n) = (0.0f64, 0u32);
                    for row in rows.clone() {
                        let line = &self.values[row * self.width..(row + 1) * self.width];
                        for &x in &line[cols.clone()] {
                            if !x.is_nan() {
                                sum += x as f64;
                                n += 1;
                            }
                        }
                    }
                    if n > 0 {
                        *v = (sum / n as f64) as f32;
                    }
                }
            });

        let transform = GeoTransform::new(
            self.transform.origin_x,
            self.transform.origin_y,
            self.transform.pixel_width * factor as f64,
            self.transform.pixel_height * factor as f64,
        );
        GeoRaster::new(values, width, height, transform, self.crs)
    }

    /// Value at map coordinates `(x, y)` of this raster's system.
    fn sample(&self, x: f64, y: f64, resampling: Resampling) -> f32 {
        let fx = (x - self.transform.origin_x) / self.transform.pixel_width;
        let fy = (y - self.transform.origin_y) / self.transform.pixel_height;
        if !(0.0..self.width as f64).contains(&fx) || !(0.0..self.height as f64).contains(&fy) {
            return f32::NAN;
        }
        match resampling {
            Resampling::Nearest => self.values[fy as usize * self.width + fx as usize],
            Resampling::Bilinear => self.bilinear(fx - 0.5, fy - 0.5),
        }
    }

    /// Bilinear interpolation between pixel centres at fractional pixel
    /// `(i, j)`. NaN neighbours are left out and the remaining weights
    /// renormalized.
    fn bilinear(&self, i: f64, j: f64) -> f32 {
        let i = i.clamp(0.0, (self.width - 1) as f64);
        let j = j.clamp(0.0, (self.height - 1) as f64);
        let (x0, y0) = (i.floor() as usize, j.floor() as usize);
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let (dx, dy) = (i - x0 as f64, j - y0 as f64);

        let (mut sum, mut weight) = (0.0f64, 0.0f64);
        for (col, row, w) in [
            (x0, y0, (1.0 - dx) * (1.0 - dy)),
            (x1, y0, dx * (1.0 - dy)),
            (x0, y1, (1.0 - dx) * dy),
            (x1, y1, dx * dy),
        ] {
            let v = self.values[row * self.width + col];
            if w > 0.0 && !v.is_nan() {
                sum += v as f64 * w;
                weight += w;
            }
        }
        if weight > 0.0 {
            (sum / weight) as f32
        } else {
            f32::NAN
        }
    }
}

impl Mosaic {
    /// The assembled pixels as a raster.
    pub fn raster(&self) -> GeoRaster {
        GeoRaster {
            values: self.values.clone(),
            width: self.width,
            height: self.height,
            transform: self.transform,
            crs: self.crs,
        }
    }
}

/// Target of a reprojection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Warp {
    pub crs: CrsCode,
    /// Square pixel size in target units; derived from the source when unset.
    pub resolution: Option<f64>,
    pub resampling: Resampling,
    /// Area to keep, in any reference system.
    pub within: Option<Extent>,
}

impl Warp {
    /// Nearest-neighbour warp into `crs` at a resolution close to the source's.
    pub fn to(crs: CrsCode) -> Self {
        Self {
            crs,
            resolution: None,
            resampling: Resampling::Nearest,
            within: None,
        }
    }

    pub fn resolution(mut self, resolution: f64) -> Self {
        self.resolution = Some(resolution);
        self
    }

    pub fn resampling(mut self, resampling: Resampling) -> Self {
        self.resampling = resampling;
        self
    }

    pub fn within(mut self, extent: Extent) -> Self {
        self.within = Some(extent);
        self
    }

    /// Output lattice for `source`: the envelope of the source footprint in
    /// the target system (cut to `within` when set), anchored at its
    /// upper-left corner and widened to whole pixels.
    ///
    /// Without an explicit resolution the source pixel count is kept along
    /// the more finely sampled axis.
    pub fn target_grid(&self, source: &GeoRaster) -> Result<(GeoTransform, usize, usize)> {
        let mut bounds = source.extent().transform_to(self.crs)?;
        if let Some(within) = self.within {
            let within = within.transform_to(self.crs)?;
            bounds = bounds.intersection(&within).ok_or_else(|| {
                MosaicError::projection(format!(
                    "raster {:?} does not reach {:?}",
                    bounds.to_tuple(),
                    within.to_tuple()
                ))
            })?;
        }

        let resolution = match self.resolution {
            Some(r) => r,
            None => (bounds.width() / source.width as f64).min(bounds.height() / source.height as f64),
        };
        if !resolution.is_finite() || resolution <= 0.0 {
            return Err(MosaicError::projection(format!(
                "cannot warp {:?} at resolution {resolution}",
                bounds.to_tuple()
            )));
        }

        let width = (bounds.width() / resolution - SNAP_EPS).ceil().max(0.0) as usize;
        let height = (bounds.height() / resolution - SNAP_EPS).ceil().max(0.0) as usize;
        if width == 0 || height == 0 {
            return Err(MosaicError::projection(format!(
                "warp of {:?} leaves no pixels",
                bounds.to_tuple()
            )));
        }
        if width.saturating_mul(height) > MAX_WARP_PIXELS {
            return Err(MosaicError::raster(format!(
                "warp to {width}x{height} pixels at {resolution} exceeds the {MAX_WARP_PIXELS} pixel limit"
            )));
        }

        Ok((
            GeoTransform::new(bounds.min_x, bounds.max_y, resolution, -resolution),
            width,
            height,
        ))
    }

    /// Resample `source` onto the target lattice.
    ///
    /// Target pixels whose centre has no position in the source system, or
    /// falls outside the source raster, are NaN.
    pub fn apply(&self, source: &GeoRaster) -> Result<GeoRaster> {
        let (transform, width, height) = self.target_grid(source)?;
        if source.crs == self.crs && transform == source.transform && (width, height) == (source.width, source.height) {
            return Ok(source.clone());
        }

        let from = self.crs.projection();
        let to = source.crs.projection();
        let mut values = vec![f32::NAN; width * height];
        values
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(r, row)| {
                for (c, v) in row.iter_mut().enumerate() {
                    let (x, y) = transform.pixel_center(c, r);
                    if let Ok((sx, sy)) = from.transform(&to, x, y) {
                        *v = source.sample(sx, sy, self.resampling);
                    }
                }
            });

        debug!(
            from = %source.crs,
            to = %self.crs,
            width,
            height,
            resampling = self.resampling.as_str(),
            "Warped raster"
        );
        GeoRaster::new(values, width, height, transform, self.crs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use projection::Equi7Subgrid;

    /// 4x3 degree raster at 1 degree, value = 10 * row + col.
    fn degrees() -> GeoRaster {
        let values = (0..12).map(|k| (10 * (k / 4) + k % 4) as f32).collect();
        GeoRaster::new(values, 4, 3, GeoTransform::new(10.0, 50.0, 1.0, -1.0), CrsCode::Epsg4326).unwrap()
    }

    #[test]
    fn test_rejects_inconsistent_shape() {
        let transform = GeoTransform::new(0.0, 0.0, 1.0, -1.0);
        assert!(GeoRaster::new(vec![0.0; 5], 2, 3, transform, CrsCode::Epsg4326).is_err());
        let south_up = GeoTransform::new(0.0, 0.0, 1.0, 1.0);
        assert!(GeoRaster::new(vec![0.0; 6], 2, 3, south_up, CrsCode::Epsg4326).is_err());
    }

    #[test]
    fn test_coarsen_mean_with_partial_blocks() {
        let raster = degrees();
        let coarse = raster.coarsen_mean(2).unwrap();
        assert_eq!((coarse.width, coarse.height), (2, 2));
        assert_eq!(coarse.transform, GeoTransform::new(10.0, 50.0, 2.0, -2.0));
        // (0 + 1 + 10 + 11) / 4
        assert_eq!(coarse.get(0, 0), Some(5.5));
        // Bottom row holds a single source row: (22 + 23) / 2
        assert_eq!(coarse.get(1, 1), Some(22.5));
    }

    #[test]
    fn test_coarsen_mean_skips_no_data() {
        let transform = GeoTransform::new(0.0, 2.0, 1.0, -1.0);
        let raster = GeoRaster::new(vec![1.0, f32::NAN, 3.0, f32::NAN], 2, 2, transform, CrsCode::Epsg4326).unwrap();
        assert_eq!(raster.coarsen_mean(2).unwrap().values, vec![2.0]);

        let empty = GeoRaster::new(vec![f32::NAN; 4], 2, 2, transform, CrsCode::Epsg4326).unwrap();
        assert!(empty.coarsen_mean(2).unwrap().values[0].is_nan());
        assert!(raster.coarsen_mean(0).is_err());
    }

    #[test]
    fn test_same_grid_is_identity() {
        let raster = degrees();
        let out = Warp::to(CrsCode::Epsg4326).resolution(1.0).apply(&raster).unwrap();
        assert_eq!(out, raster);
    }

    #[test]
    fn test_finer_resolution_nearest() {
        let raster = degrees();
        let out = Warp::to(CrsCode::Epsg4326).resolution(0.5).apply(&raster).unwrap();
        assert_eq!((out.width, out.height), (8, 6));
        assert_eq!(out.get(0, 0), Some(0.0));
        assert_eq!(out.get(1, 1), Some(0.0));
        assert_eq!(out.get(2, 0), Some(1.0));
        assert_eq!(out.get(7, 5), Some(23.0));
    }

    #[test]
    fn test_bilinear_between_centres() {
        let raster = degrees();
        let out = Warp::to(CrsCode::Epsg4326)
            .resolution(0.5)
            .resampling(Resampling::Bilinear)
            .apply(&raster)
            .unwrap();
        // Centre (11.25, 49.25) sits a quarter pixel left of and below the
        // centre of source pixel (1, 0).
        let v = out.get(2, 1).unwrap();
        assert!((v - (0.75 + 0.25 * 10.0)).abs() < 1e-4, "{v}");
        // Edge pixels clamp to the outermost centres
        assert_eq!(out.get(0, 0), Some(0.0));
    }

    #[test]
    fn test_bilinear_ignores_no_data_neighbours() {
        let transform = GeoTransform::new(0.0, 1.0, 1.0, -1.0);
        let raster = GeoRaster::new(vec![4.0, f32::NAN], 2, 1, transform, CrsCode::Epsg4326).unwrap();
        assert_eq!(raster.bilinear(0.5, 0.0), 4.0);
    }

    #[test]
    fn test_geographic_to_mercator_at_fixed_resolution() {
        let raster = degrees();
        let out = Warp::to(CrsCode::Epsg3857)
            .resolution(10_000.0)
            .resampling(Resampling::Bilinear)
            .apply(&raster)
            .unwrap();
        assert_eq!(out.crs, CrsCode::Epsg3857);
        assert_eq!(out.transform.pixel_width, 10_000.0);

        // Covers the source: 4 degrees of longitude at the equator scale
        // is about 445 km.
        assert!(out.width >= 45);
        let extent = out.extent().transform_to(CrsCode::Epsg4326).unwrap();
        assert!(extent.min_x <= 10.0 + 1e-9 && extent.max_x >= 14.0);
        assert!(extent.min_y <= 47.0 && extent.max_y >= 50.0 - 1e-9);

        // The centre keeps the source value range
        let (lo, hi) = out
            .values
            .iter()
            .filter(|v| !v.is_nan())
            .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        assert!(lo >= 0.0 && hi <= 23.0);
        assert!(out.valid_count() > out.width * out.height / 2);
    }

    #[test]
    fn test_within_cuts_the_output() {
        let raster = degrees();
        let out = Warp::to(CrsCode::Epsg4326)
            .resolution(1.0)
            .within(Extent::geographic(11.0, 48.0, 13.0, 50.0))
            .apply(&raster)
            .unwrap();
        assert_eq!((out.width, out.height), (2, 2));
        assert_eq!(out.get(0, 0), Some(1.0));
        assert_eq!(out.get(1, 1), Some(12.0));

        let outside = Warp::to(CrsCode::Epsg4326).within(Extent::geographic(-5.0, 0.0, -4.0, 1.0));
        assert!(outside.apply(&raster).is_err());
    }

    #[test]
    fn test_equi7_round_trip_keeps_values() {
        let eu = CrsCode::Equi7(Equi7Subgrid::Eu);
        let (x, y) = eu.projection().from_geographic(16.0, 48.0).unwrap();
        let (x, y) = ((x / 1000.0).floor() * 1000.0, (y / 1000.0).floor() * 1000.0);
        let values = (0..100).map(|k| k as f32).collect();
        let raster = GeoRaster::new(values, 10, 10, GeoTransform::new(x, y + 10_000.0, 1000.0, -1000.0), eu).unwrap();

        let geographic = Warp::to(CrsCode::Epsg4326).resolution(0.001).apply(&raster).unwrap();
        let back = Warp::to(eu).resolution(1000.0).within(raster.extent()).apply(&geographic).unwrap();
        assert_eq!((back.width, back.height), (10, 10));
        // Interior pixels survive the round trip
        assert_eq!(back.get(5, 5), Some(55.0));
    }

    #[test]
    fn test_oversized_warp_is_refused() {
        let raster = degrees();
        let err = Warp::to(CrsCode::Epsg3857).resolution(0.01).apply(&raster).unwrap_err();
        assert!(matches!(err, MosaicError::Raster(_)));
    }
}
