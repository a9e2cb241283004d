//! Zarr V3 stores holding one georeferenced `(y, x)` raster.
//!
//! Used for products restructured out of the datacube, such as a flood
//! mosaic over an area of interest. The group carries the variable
//! description and reference system; `y` and `x` hold pixel-centre
//! coordinates.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zarrs::array::{Array, DataType, FillValue};
use zarrs::group::{Group, GroupBuilder};
use zarrs_filesystem::FilesystemStore;

use crate::config::GridStoreConfig;
use crate::error::{GridStoreError, Result};
use crate::store::{
    build_array, compression_codec, dims_attr, node_path, retrieve_elements, store_elements,
    GridStore, VariableSpec,
};

/// Chunk edge of restructured products.
pub const RASTER_CHUNK: usize = 1000;

const RASTER_ATTR: &str = "raster";

/// A `(y, x)` raster with its coordinates; no-data is NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterData {
    pub variable: VariableSpec,
    /// Reference system identifier, e.g. "EPSG:3857".
    pub crs: String,
    pub y: Vec<f64>,
    pub x: Vec<f64>,
    /// Row-major values, `y.len() * x.len()` of them.
    pub values: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RasterMetadata {
    variable: VariableSpec,
    crs: String,
    chunk: usize,
}

/// Write `raster` into a new store at `root`, chunked `chunk` x `chunk`.
pub fn write_raster_store(
    root: &Path,
    raster: &RasterData,
    chunk: usize,
    config: &GridStoreConfig,
) -> Result<()> {
    let (ny, nx) = (raster.y.len(), raster.x.len());
    if ny == 0 || nx == 0 || raster.values.len() != ny * nx {
        return Err(GridStoreError::region_mismatch(
            &raster.variable.name,
            format!("{ny}x{nx} values"),
            format!("{} values", raster.values.len()),
        ));
    }
    if chunk == 0 {
        return Err(GridStoreError::Config("raster chunk must be at least 1".into()));
    }
    config.validate().map_err(GridStoreError::Config)?;
    if GridStore::exists(root) {
        return Err(GridStoreError::invalid_metadata(format!(
            "store already exists at {}",
            root.display()
        )));
    }

    std::fs::create_dir_all(root)?;
    let storage = Arc::new(FilesystemStore::new(root).map_err(GridStoreError::storage)?);

    let metadata = RasterMetadata {
        variable: raster.variable.clone(),
        crs: raster.crs.clone(),
        chunk,
    };
    let mut group = GroupBuilder::new()
        .build(storage.clone(), "/")
        .map_err(GridStoreError::zarr)?;
    group
        .attributes_mut()
        .insert(RASTER_ATTR.to_string(), serde_json::to_value(&metadata)?);
    group
        .attributes_mut()
        .insert("crs".to_string(), serde_json::json!(raster.crs));
    group.store_metadata().map_err(GridStoreError::storage)?;

    let mut attrs = dims_attr(&["y", "x"]);
    attrs.insert("long_name".to_string(), serde_json::json!(raster.variable.long_name));
    attrs.insert("units".to_string(), serde_json::json!(raster.variable.units));
    attrs.insert("grid_mapping".to_string(), serde_json::json!(raster.crs));
    let array = build_array(
        &storage,
        &raster.variable.name,
        vec![ny as u64, nx as u64],
        vec![chunk.min(ny) as u64, chunk.min(nx) as u64],
        DataType::Float32,
        FillValue::from(f32::NAN),
        attrs,
        compression_codec(config, 4)?,
    )?;
    store_elements(&array, &[0, 0], &[ny, nx], &raster.values)?;

    for (name, coords) in [("y", &raster.y), ("x", &raster.x)] {
        let coord = build_array(
            &storage,
            name,
            vec![coords.len() as u64],
            vec![coords.len() as u64],
            DataType::Float64,
            FillValue::from(f64::NAN),
            dims_attr(&[name]),
            None,
        )?;
        store_elements(&coord, &[0], &[coords.len()], coords)?;
    }

    info!(
        root = %root.display(),
        variable = %raster.variable.name,
        shape = ?[ny, nx],
        chunk,
        crs = %raster.crs,
        "Wrote raster store"
    );
    Ok(())
}

/// Read back a store written by [`write_raster_store`].
pub fn read_raster_store(root: &Path) -> Result<RasterData> {
    let (storage, metadata) = open_raster(root)?;
    let open = |name: &str| {
        Array::open(storage.clone(), &node_path(name))
            .map_err(|e| GridStoreError::invalid_metadata(format!("{name}: {e}")))
    };
    let y_array = open("y")?;
    let x_array = open("x")?;
    let (ny, nx) = (y_array.shape()[0] as usize, x_array.shape()[0] as usize);
    let y: Vec<f64> = retrieve_elements(&y_array, &[0], &[ny])?;
    let x: Vec<f64> = retrieve_elements(&x_array, &[0], &[nx])?;
    let values = retrieve_elements(&open(&metadata.variable.name)?, &[0, 0], &[ny, nx])?;

    debug!(root = %root.display(), shape = ?[ny, nx], "Read raster store");
    Ok(RasterData {
        variable: metadata.variable,
        crs: metadata.crs,
        y,
        x,
        values,
    })
}

/// Chunk edge recorded when the store at `root` was written.
pub fn raster_store_chunk(root: &Path) -> Result<usize> {
    Ok(open_raster(root)?.1.chunk)
}

fn open_raster(root: &Path) -> Result<(Arc<FilesystemStore>, RasterMetadata)> {
    if !GridStore::exists(root) {
        return Err(GridStoreError::invalid_metadata(format!(
            "no raster store at {}",
            root.display()
        )));
    }
    let storage = Arc::new(FilesystemStore::new(root).map_err(GridStoreError::storage)?);
    let group = Group::open(storage.clone(), "/").map_err(GridStoreError::zarr)?;
    let metadata = serde_json::from_value(
        group
            .attributes()
            .get(RASTER_ATTR)
            .cloned()
            .ok_or_else(|| GridStoreError::invalid_metadata("missing raster attribute"))?,
    )?;
    Ok((storage, metadata))
}
