//! Integration test: dataset lookup and mosaic requests through the registry.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use datacube::{restructure_dem, restructure_flood, Coord, CubeConfig, CubeError, Discover, DEM_NODATA};
use fetcher::{FetchError, RawSlice, RemoteFetcher};
use geo_common::{CrsCode, DatasetDescriptor, Extent, Reduction};
use grid_store::{read_raster_store, GridStoreConfig};
use mosaic::read_band;
use projection::Equi7Subgrid;
use test_utils::{
    dem_tile_path, flood_tile_path, write_geotiff_tile, write_geotiff_tile_u8, TileGeometry,
};

const GRID: &str = "EU020M";
const TILE: &str = "E054N012T3";
const NODATA: u8 = 255;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 3, d).unwrap()
}

/// Never reached by mosaic requests.
struct NoFetcher;

#[async_trait]
impl RemoteFetcher for NoFetcher {
    async fn fetch_day(&self, _dataset: &DatasetDescriptor, d: NaiveDate) -> fetcher::Result<RawSlice> {
        Err(FetchError::Unavailable { day: d })
    }
}

/// A coarse 100 x 100 raster covering the whole 300 km tile.
fn write_flood_tile(root: &Path, d: NaiveDate, version: &str, value: u8) {
    let geometry = TileGeometry::new(100, 100, (5_400_000.0, 1_500_000.0), 3_000.0);
    let path = flood_tile_path(root, d, TILE, GRID, version);
    write_geotiff_tile_u8(&path, &geometry, &vec![value; 100 * 100], Some(NODATA)).unwrap();
}

/// 100 x 100 terrain pixels at 20 m in the tile's upper-left corner; the
/// height of a pixel is its column index.
fn write_dem_tile(root: &Path) {
    let geometry = TileGeometry::new(100, 100, (5_400_000.0, 1_500_000.0), 20.0);
    let heights: Vec<f32> = (0..100 * 100).map(|k| (k % 100) as f32).collect();
    write_geotiff_tile(&dem_tile_path(root, TILE, GRID), &geometry, &heights, Some(-9999.0)).unwrap();
}

fn discover(cache: &Path, floods: &Path) -> Discover {
    discover_with_dem(cache, floods, &cache.join("dem"))
}

fn discover_with_dem(cache: &Path, floods: &Path, dem: &Path) -> Discover {
    let config = CubeConfig::default()
        .with_cache_root(cache)
        .with_flood_root(floods)
        .with_dem_root(dem);
    Discover::from_config(&config, Arc::new(NoFetcher)).unwrap()
}

fn tile_extent() -> Extent {
    Extent::new(
        5_400_000.0,
        1_200_000.0,
        5_700_000.0,
        1_500_000.0,
        CrsCode::Equi7(Equi7Subgrid::Eu),
    )
}

#[tokio::test]
async fn test_registry_lists_known_datasets() {
    let dir = tempfile::tempdir().unwrap();
    let discover = discover(&dir.path().join("cache"), &dir.path().join("floods"));

    let ids: Vec<&str> = discover.datasets().collect();
    assert_eq!(
        ids,
        vec![
            "copernicus/dem",
            "copernicus/predicted_rainfall",
            "copernicus/soil_moisture",
            "gfm/floods"
        ]
    );
    assert!(discover.time_grid("copernicus/soil_moisture").is_ok());
    assert!(matches!(
        discover.time_grid("gfm/floods").err(),
        Some(CubeError::Config(_))
    ));
    // Nothing is created before the first request.
    assert!(!dir.path().join("cache").exists());
}

#[tokio::test]
async fn test_unknown_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let discover = discover(dir.path(), dir.path());

    let err = discover
        .get("nasa/unknown", &tile_extent(), day(1), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CubeError::UnknownDataset(id) if id == "nasa/unknown"));
}

#[tokio::test]
async fn test_flood_request_uses_filtered_archive() {
    let dir = tempfile::tempdir().unwrap();
    let floods = dir.path().join("floods");
    write_flood_tile(&floods, day(1), "V0M2R3", 1);
    // Another product version is not part of the archive view.
    write_flood_tile(&floods, day(1), "V0M2R2", 7);

    let discover = discover(&dir.path().join("cache"), &floods);
    let array = discover
        .get("gfm/floods", &tile_extent(), day(1), None)
        .await
        .unwrap();

    assert_eq!(array.dims, vec!["y", "x"]);
    assert_eq!(array.shape(), vec![100, 100]);
    assert_eq!(array.valid_count(), 100 * 100);
    assert_eq!(array.value_range(), Some((1.0, 1.0)));
    assert_eq!(array.provenance.tiles, vec![format!("{GRID}_{TILE}")]);
    assert_eq!(array.provenance.crs, CrsCode::Equi7(Equi7Subgrid::Eu));
    assert!(array.provenance.skipped_files.is_empty());
}

#[tokio::test]
async fn test_flood_request_without_tiles() {
    let dir = tempfile::tempdir().unwrap();
    let floods = dir.path().join("floods");
    write_flood_tile(&floods, day(1), "V0M2R3", 1);
    let discover = discover(&dir.path().join("cache"), &floods);

    let err = discover
        .get("gfm/floods", &tile_extent(), day(5), None)
        .await
        .unwrap_err();
    assert!(err.is_no_tiles());
}

fn dem_extent() -> Extent {
    Extent::new(
        5_400_000.0,
        1_498_000.0,
        5_402_000.0,
        1_500_000.0,
        CrsCode::Equi7(Equi7Subgrid::Eu),
    )
}

#[tokio::test]
async fn test_dem_request_is_averaged_to_served_resolution() {
    let dir = tempfile::tempdir().unwrap();
    let dem = dir.path().join("COPDEM");
    write_dem_tile(&dem);
    let discover = discover_with_dem(&dir.path().join("cache"), &dir.path().join("floods"), &dem);

    // Any day selects the time-invariant layer.
    let array = discover
        .get("copernicus/dem", &dem_extent(), day(17), None)
        .await
        .unwrap();

    assert_eq!(array.provenance.reduction, Reduction::Mean);
    assert_eq!(array.provenance.crs, CrsCode::Equi7(Equi7Subgrid::Eu));
    // 2 km at 500 m after averaging 25 x 25 blocks
    assert_eq!(array.shape(), vec![4, 4]);
    let Some(Coord::Values(x)) = array.coord("x") else { panic!("x coordinate missing") };
    assert_eq!(x[1] - x[0], 500.0);
    // Block j holds columns 25j..25j+24
    for (col, expected) in [12.0, 37.0, 62.0, 87.0].into_iter().enumerate() {
        assert_eq!(array.get(&[2, col]), Some(expected));
    }
}

#[tokio::test]
async fn test_dem_request_in_geographic_extent() {
    let dir = tempfile::tempdir().unwrap();
    let dem = dir.path().join("COPDEM");
    write_dem_tile(&dem);
    let discover = discover_with_dem(&dir.path().join("cache"), &dir.path().join("floods"), &dem);

    let query = dem_extent().transform_to(CrsCode::Epsg4326).unwrap();
    let array = discover.get("copernicus/dem", &query, day(1), None).await.unwrap();

    assert_eq!(array.provenance.crs, CrsCode::Epsg4326);
    assert!(array.valid_count() > 0);
    let (low, high) = array.value_range().unwrap();
    assert!(low >= 0.0 && high <= 99.0);
}

#[tokio::test]
async fn test_restructure_dem_writes_int16_raster() {
    let dir = tempfile::tempdir().unwrap();
    let dem = dir.path().join("COPDEM");
    write_dem_tile(&dem);
    let discover = discover_with_dem(&dir.path().join("cache"), &dir.path().join("floods"), &dem);

    let out = dir.path().join("products/dem.tif");
    restructure_dem(&discover, &dem_extent(), &out).await.unwrap();

    let band = read_band(&out).unwrap();
    assert_eq!((band.width, band.height), (4, 4));
    assert_eq!(band.header.epsg, Some(27704));
    assert_eq!(band.header.nodata, Some(DEM_NODATA as f32));
    assert_eq!(band.get(3, 0), Some(87.0));
}

#[tokio::test]
async fn test_restructure_flood_into_geographic_store() {
    let dir = tempfile::tempdir().unwrap();
    let floods = dir.path().join("floods");
    write_flood_tile(&floods, day(1), "V0M2R3", 1);
    let discover = discover(&dir.path().join("cache"), &floods);

    let area = Extent::new(
        5_450_000.0,
        1_300_000.0,
        5_650_000.0,
        1_450_000.0,
        CrsCode::Equi7(Equi7Subgrid::Eu),
    )
    .transform_to(CrsCode::Epsg4326)
    .unwrap();
    let out = dir.path().join("flood.zarr");
    let array = restructure_flood(&discover, &area, day(1), None, &out, &GridStoreConfig::default())
        .await
        .unwrap();
    assert_eq!(array.provenance.crs, CrsCode::Epsg4326);
    assert_eq!(array.dims, vec!["y", "x"]);

    let stored = read_raster_store(&out).unwrap();
    assert_eq!(stored.crs, "EPSG:4326");
    assert_eq!(stored.values.len(), stored.y.len() * stored.x.len());
    assert!(stored.values.iter().any(|v| *v == 1.0));
    assert!(stored.values.iter().all(|v| v.is_nan() || *v == 1.0));
    // A second run refuses to overwrite the product
    assert!(restructure_flood(&discover, &area, day(1), None, &out, &GridStoreConfig::default())
        .await
        .is_err());
}
