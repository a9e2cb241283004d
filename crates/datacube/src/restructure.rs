//! Products written out of the cube for downstream models.
//!
//! - **Flood**: the maximum flood mosaic over an area and period,
//!   reprojected into the area's reference system and kept as a chunked
//!   Zarr raster.
//! - **DEM**: terrain averaged to its served resolution, in the area's
//!   reference system, as an int16 GeoTIFF.

use std::path::Path;

use chrono::NaiveDate;
use geo_common::{Extent, Resampling};
use grid_store::{write_raster_store, GridStoreConfig, RasterData, VariableSpec, RASTER_CHUNK};
use mosaic::{write_geotiff_i16, Warp};
use tracing::{info, instrument};

use crate::array::{Coord, DataArray};
use crate::discover::Discover;
use crate::error::{CubeError, Result};
use crate::reproject::{reproject, to_raster};

pub const FLOOD_DATASET: &str = "gfm/floods";
pub const DEM_DATASET: &str = "copernicus/dem";

/// Chunk edge of persisted flood mosaics.
pub const FLOOD_CHUNK: usize = RASTER_CHUNK;

/// No-data value of written terrain rasters.
pub const DEM_NODATA: i16 = -9999;

/// Store a `(y, x)` array as a new Zarr raster at `root`.
pub fn persist_array(
    array: &DataArray,
    root: &Path,
    chunk: usize,
    config: &GridStoreConfig,
) -> Result<()> {
    let (Some(Coord::Values(y)), Some(Coord::Values(x)), 2) =
        (array.coords.first(), array.coords.get(1), array.dims.len())
    else {
        return Err(CubeError::config(format!(
            "only (y, x) arrays can be persisted, got dimensions {:?}",
            array.dims
        )));
    };
    let raster = RasterData {
        variable: VariableSpec::new(
            array.name.clone(),
            array.provenance.units.clone(),
            array.provenance.reduction,
        ),
        crs: array.provenance.crs.to_string(),
        y: y.clone(),
        x: x.clone(),
        values: array.values.clone(),
    };
    write_raster_store(root, &raster, chunk, config)?;
    Ok(())
}

/// Write a `(y, x)` array as an int16 GeoTIFF, NaN becoming `nodata`.
pub fn write_geotiff(array: &DataArray, path: &Path, nodata: i16) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            CubeError::config(format!("cannot create {}: {e}", parent.display()))
        })?;
    }
    write_geotiff_i16(path, &to_raster(array)?, nodata)?;
    Ok(())
}

/// Assemble the flood mosaic over `extent`, move it into the extent's
/// reference system and persist it at `out`.
#[instrument(skip(discover, config), fields(extent = ?extent.to_tuple(), out = %out.display()))]
pub async fn restructure_flood(
    discover: &Discover,
    extent: &Extent,
    start: NaiveDate,
    end: Option<NaiveDate>,
    out: &Path,
    config: &GridStoreConfig,
) -> Result<DataArray> {
    let flood = discover.get(FLOOD_DATASET, extent, start, end).await?;
    let warp = Warp::to(extent.crs)
        .resampling(Resampling::Nearest)
        .within(*extent);

    let out_path = out.to_path_buf();
    let config = config.clone();
    let array = tokio::task::spawn_blocking(move || {
        let array = reproject(&flood, &warp)?;
        persist_array(&array, &out_path, FLOOD_CHUNK, &config)?;
        Ok::<_, CubeError>(array)
    })
    .await
    .map_err(CubeError::task)??;

    info!(
        shape = ?array.shape(),
        flooded = array.values.iter().filter(|v| **v > 0.0).count(),
        tiles = array.provenance.tiles.len(),
        "Persisted flood mosaic"
    );
    Ok(array)
}

/// Write the terrain over `extent` to `out` as an int16 GeoTIFF with
/// [`DEM_NODATA`] for missing cells.
#[instrument(skip(discover), fields(extent = ?extent.to_tuple(), out = %out.display()))]
pub async fn restructure_dem(discover: &Discover, extent: &Extent, out: &Path) -> Result<DataArray> {
    // Terrain has no time axis; any day selects every tile.
    let dem = discover.get(DEM_DATASET, extent, NaiveDate::default(), None).await?;

    let out_path = out.to_path_buf();
    let dem = tokio::task::spawn_blocking(move || {
        write_geotiff(&dem, &out_path, DEM_NODATA)?;
        Ok::<_, CubeError>(dem)
    })
    .await
    .map_err(CubeError::task)??;

    info!(shape = ?dem.shape(), crs = %dem.provenance.crs, "Wrote terrain raster");
    Ok(dem)
}
