//! Tile identity and footprint geometry.
//!
//! Equi7 names encode the whole footprint: the grid name carries the
//! continent and pixel sampling (`EU020M`), the tile name the lower-left
//! corner in 100 km units and the tile size (`E054N012T3` is a 300 km tile
//! whose corner sits at 5 400 000 m east, 1 200 000 m north).

use std::fmt;

use geo_common::{CrsCode, Extent};
use projection::Equi7Subgrid;
use serde::Serialize;

use crate::error::{MosaicError, Result};

/// `(grid name, tile name)`; unique within a mosaic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TileId {
    pub grid_name: String,
    pub tile_name: String,
}

impl TileId {
    pub fn new(grid_name: impl Into<String>, tile_name: impl Into<String>) -> Self {
        Self {
            grid_name: grid_name.into(),
            tile_name: tile_name.into(),
        }
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.grid_name, self.tile_name)
    }
}

/// Affine transform of a north-up raster.
///
/// `pixel_height` is negative: rows run from north to south.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Map coordinates of the centre of pixel `(col, row)`.
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y + (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Pixel containing `(x, y)`, which may lie outside the raster.
    pub fn pixel_of(&self, x: f64, y: f64) -> (i64, i64) {
        (
            ((x - self.origin_x) / self.pixel_width).floor() as i64,
            ((y - self.origin_y) / self.pixel_height).floor() as i64,
        )
    }

    /// `(min_x, min_y, max_x, max_y)` of a `width` x `height` raster.
    pub fn bounds(&self, width: usize, height: usize) -> (f64, f64, f64, f64) {
        let x1 = self.origin_x + width as f64 * self.pixel_width;
        let y1 = self.origin_y + height as f64 * self.pixel_height;
        (
            self.origin_x.min(x1),
            self.origin_y.min(y1),
            self.origin_x.max(x1),
            self.origin_y.max(y1),
        )
    }
}

/// Where a tile lies: reference system, pixel shape and transform.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileFootprint {
    pub id: TileId,
    pub crs: CrsCode,
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
}

impl TileFootprint {
    pub fn extent(&self) -> Extent {
        let (min_x, min_y, max_x, max_y) = self.transform.bounds(self.width, self.height);
        Extent::new(min_x, min_y, max_x, max_y, self.crs)
    }

    /// Footprint of an Equi7 tile, derived from its grid and tile names.
    pub fn from_equi7(grid_name: &str, tile_name: &str) -> Result<Self> {
        let grid = Equi7GridName::parse(grid_name)?;
        let tile = Equi7TileName::parse(tile_name)?;

        let size_m = tile.size_m();
        if size_m % grid.sampling_m != 0 {
            return Err(MosaicError::InvalidTileName(format!(
                "{tile_name}: {size_m} m is not a multiple of {} m sampling",
                grid.sampling_m
            )));
        }
        let pixels = (size_m / grid.sampling_m) as usize;
        let sampling = grid.sampling_m as f64;

        Ok(Self {
            id: TileId::new(grid_name, tile_name),
            crs: CrsCode::Equi7(grid.subgrid),
            width: pixels,
            height: pixels,
            transform: GeoTransform::new(
                tile.easting_m() as f64,
                (tile.northing_m() + size_m) as f64,
                sampling,
                -sampling,
            ),
        })
    }
}

/// Parsed Equi7 grid name such as `EU020M`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Equi7GridName {
    pub subgrid: Equi7Subgrid,
    /// Pixel size in meters.
    pub sampling_m: u64,
}

impl Equi7GridName {
    pub fn parse(name: &str) -> Result<Self> {
        let invalid = || MosaicError::InvalidTileName(format!("bad Equi7 grid name: {name}"));

        if name.len() < 4 || !name.is_ascii() {
            return Err(invalid());
        }
        let (code, rest) = name.split_at(2);
        let subgrid = Equi7Subgrid::from_code(code).ok_or_else(invalid)?;
        let sampling_m = rest
            .strip_suffix('M')
            .and_then(|digits| digits.parse::<u64>().ok())
            .filter(|m| *m > 0)
            .ok_or_else(invalid)?;

        Ok(Self { subgrid, sampling_m })
    }
}

/// Parsed Equi7 tile name such as `E054N012T3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Equi7TileName {
    /// Lower-left easting in 100 km units.
    pub east: u64,
    /// Lower-left northing in 100 km units.
    pub north: u64,
    /// Tile edge in 100 km units (1, 3 or 6).
    pub size: u64,
}

impl Equi7TileName {
    pub fn parse(name: &str) -> Result<Self> {
        let invalid = || MosaicError::InvalidTileName(format!("bad Equi7 tile name: {name}"));

        if name.len() != 10 || !name.is_ascii() {
            return Err(invalid());
        }
        let digits = |s: &str| s.parse::<u64>().ok();
        let east = name.strip_prefix('E').and_then(|_| digits(&name[1..4]));
        let north = (&name[4..5] == "N").then(|| digits(&name[5..8])).flatten();
        let size = (&name[8..9] == "T").then(|| digits(&name[9..10])).flatten();

        match (east, north, size) {
            (Some(east), Some(north), Some(size)) if matches!(size, 1 | 3 | 6) => {
                Ok(Self { east, north, size })
            }
            _ => Err(invalid()),
        }
    }

    pub fn easting_m(&self) -> u64 {
        self.east * 100_000
    }

    pub fn northing_m(&self) -> u64 {
        self.north * 100_000
    }

    pub fn size_m(&self) -> u64 {
        self.size * 100_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flood_tile_footprint() {
        let fp = TileFootprint::from_equi7("EU020M", "E054N012T3").unwrap();
        assert_eq!(fp.crs, CrsCode::Equi7(Equi7Subgrid::Eu));
        assert_eq!((fp.width, fp.height), (15000, 15000));
        assert_eq!(
            fp.extent().to_tuple(),
            (5_400_000.0, 1_200_000.0, 5_700_000.0, 1_500_000.0)
        );
    }

    #[test]
    fn test_coarse_sampling() {
        let fp = TileFootprint::from_equi7("AF500M", "E030N006T1").unwrap();
        assert_eq!(fp.crs, CrsCode::Equi7(Equi7Subgrid::Af));
        assert_eq!(fp.width, 200);
        assert_eq!(fp.transform.origin_y, 700_000.0);
    }

    #[test]
    fn test_bad_names() {
        assert!(Equi7GridName::parse("XX020M").is_err());
        assert!(Equi7GridName::parse("EU020").is_err());
        assert!(Equi7GridName::parse("EU000M").is_err());
        assert!(Equi7TileName::parse("E054N012T2").is_err());
        assert!(Equi7TileName::parse("W054N012T3").is_err());
        assert!(Equi7TileName::parse("E054N012").is_err());
        // 100 km is not a whole number of 300 m pixels.
        assert!(TileFootprint::from_equi7("EU300M", "E054N012T1").is_err());
    }

    #[test]
    fn test_pixel_lookup() {
        let t = GeoTransform::new(100.0, 50.0, 10.0, -10.0);
        assert_eq!(t.pixel_center(0, 0), (105.0, 45.0));
        assert_eq!(t.pixel_of(105.0, 45.0), (0, 0));
        assert_eq!(t.pixel_of(99.0, 51.0), (-1, -1));
        assert_eq!(t.bounds(3, 2), (100.0, 30.0, 130.0, 50.0));
    }

    #[test]
    fn test_tile_id_ordering() {
        let a = TileId::new("EU020M", "E054N012T3");
        let b = TileId::new("EU020M", "E057N012T3");
        assert!(a < b);
        assert_eq!(a.to_string(), "EU020M_E054N012T3");
    }
}
