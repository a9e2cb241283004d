//! On-disk fixtures: GeoTIFF tiles and yeoda-named mosaic trees.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tiff::TiffResult;

/// GeoTIFF model pixel scale tag.
pub const TAG_PIXEL_SCALE: u16 = 33550;
/// GeoTIFF model tiepoint tag.
pub const TAG_TIEPOINT: u16 = 33922;
/// GDAL no-data tag (ASCII).
pub const TAG_GDAL_NODATA: u16 = 42113;

/// Georeferencing of a north-up raster.
#[derive(Debug, Clone, Copy)]
pub struct TileGeometry {
    pub width: u32,
    pub height: u32,
    /// Upper-left corner in map units.
    pub upper_left: (f64, f64),
    /// Square pixel size in map units.
    pub pixel_size: f64,
}

impl TileGeometry {
    pub fn new(width: u32, height: u32, upper_left: (f64, f64), pixel_size: f64) -> Self {
        Self {
            width,
            height,
            upper_left,
            pixel_size,
        }
    }

    /// `(min_x, min_y, max_x, max_y)` of the raster footprint.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let (x0, y0) = self.upper_left;
        (
            x0,
            y0 - self.height as f64 * self.pixel_size,
            x0 + self.width as f64 * self.pixel_size,
            y0,
        )
    }
}

/// Write a single-band float GeoTIFF.
pub fn write_geotiff_tile(
    path: &Path,
    geometry: &TileGeometry,
    data: &[f32],
    nodata: Option<f32>,
) -> TiffResult<()> {
    write_geotiff_tile_striped(path, geometry, data, nodata, None)
}

/// Write a single-band float GeoTIFF with `rows_per_strip` rows in each
/// strip (encoder default when `None`).
pub fn write_geotiff_tile_striped(
    path: &Path,
    geometry: &TileGeometry,
    data: &[f32],
    nodata: Option<f32>,
    rows_per_strip: Option<u32>,
) -> TiffResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut encoder = TiffEncoder::new(BufWriter::new(File::create(path)?))?;
    let mut image = encoder.new_image::<colortype::Gray32Float>(geometry.width, geometry.height)?;
    if let Some(rows) = rows_per_strip {
        image.rows_per_strip(rows)?;
    }
    write_geo_tags(image.encoder(), geometry, nodata.map(|v| v.to_string()))?;
    image.write_data(data)
}

/// Write a single-band byte GeoTIFF, the native layout of flood masks.
pub fn write_geotiff_tile_u8(
    path: &Path,
    geometry: &TileGeometry,
    data: &[u8],
    nodata: Option<u8>,
) -> TiffResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut encoder = TiffEncoder::new(BufWriter::new(File::create(path)?))?;
    let mut image = encoder.new_image::<colortype::Gray8>(geometry.width, geometry.height)?;
    write_geo_tags(image.encoder(), geometry, nodata.map(|v| v.to_string()))?;
    image.write_data(data)
}

fn write_geo_tags<W: std::io::Write + std::io::Seek, K: tiff::encoder::TiffKind>(
    dir: &mut tiff::encoder::DirectoryEncoder<'_, W, K>,
    geometry: &TileGeometry,
    nodata: Option<String>,
) -> TiffResult<()> {
    let (x0, y0) = geometry.upper_left;
    dir.write_tag(
        Tag::from_u16_exhaustive(TAG_PIXEL_SCALE),
        &[geometry.pixel_size, geometry.pixel_size, 0.0][..],
    )?;
    dir.write_tag(Tag::from_u16_exhaustive(TAG_TIEPOINT), &[0.0, 0.0, 0.0, x0, y0, 0.0][..])?;
    if let Some(nodata) = nodata {
        dir.write_tag(Tag::from_u16_exhaustive(TAG_GDAL_NODATA), nodata.as_str())?;
    }
    Ok(())
}

/// Yeoda file name for a flood observation.
///
/// Fields: `var_datetime1_datetime2_band_extra_tile_grid_version_sensor`.
pub fn yeoda_flood_name(day: NaiveDate, tile: &str, grid: &str, version: &str) -> String {
    format!(
        "ENSEMBLEFLOOD_{}T053000__VV__{tile}_{grid}_{version}_S1.tif",
        day.format("%Y%m%d")
    )
}

/// Path of a flood tile inside a mosaic tree rooted at `root`:
/// `<root>/<version>/EQUI7_<grid>/<tile>/<yeoda name>`.
pub fn flood_tile_path(root: &Path, day: NaiveDate, tile: &str, grid: &str, version: &str) -> PathBuf {
    root.join(version)
        .join(format!("EQUI7_{grid}"))
        .join(tile)
        .join(yeoda_flood_name(day, tile, grid, version))
}

/// Path of a terrain tile inside a DEM tree rooted at `root`:
/// `<root>/V01R01/EQUI7_<grid>/<tile>/DEM_____<tile>_<grid>_V01R01_COPDEM.tif`.
///
/// The acquisition time field is empty; the layer does not change over time.
pub fn dem_tile_path(root: &Path, tile: &str, grid: &str) -> PathBuf {
    root.join("V01R01")
        .join(format!("EQUI7_{grid}"))
        .join(tile)
        .join(format!("DEM_____{tile}_{grid}_V01R01_COPDEM.tif"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiff::decoder::{Decoder, DecodingResult};

    #[test]
    fn test_geotiff_roundtrip_tags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.tif");
        let geometry = TileGeometry::new(3, 2, (100.0, 50.0), 10.0);
        write_geotiff_tile(&path, &geometry, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], Some(-9999.0)).unwrap();

        let mut decoder = Decoder::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(decoder.dimensions().unwrap(), (3, 2));
        let tie = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(TAG_TIEPOINT)).unwrap();
        assert_eq!(&tie[3..5], &[100.0, 50.0]);
        let nodata = decoder.get_tag_ascii_string(Tag::from_u16_exhaustive(TAG_GDAL_NODATA)).unwrap();
        assert_eq!(nodata.trim_end_matches('\0'), "-9999");
        match decoder.read_image().unwrap() {
            DecodingResult::F32(data) => assert_eq!(data[5], 6.0),
            other => panic!("unexpected sample type: {:?}", std::mem::discriminant(&other)),
        }
    }

    #[test]
    fn test_flood_tile_path() {
        let day = NaiveDate::from_ymd_opt(2022, 3, 1).unwrap();
        let path = flood_tile_path(Path::new("/data"), day, "E054N012T3", "EU020M", "V0M2R3");
        assert_eq!(
            path,
            PathBuf::from(
                "/data/V0M2R3/EQUI7_EU020M/E054N012T3/ENSEMBLEFLOOD_20220301T053000__VV__E054N012T3_EU020M_V0M2R3_S1.tif"
            )
        );
    }

    #[test]
    fn test_bounds() {
        let geometry = TileGeometry::new(10, 5, (0.0, 100.0), 2.0);
        assert_eq!(geometry.bounds(), (0.0, 90.0, 20.0, 100.0));
    }
}
