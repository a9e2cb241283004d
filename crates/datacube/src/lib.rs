//! Dataset access for the datacube.
//!
//! Every dataset is served through one call,
//! `get(dataset, extent, start, end) -> DataArray`, whatever its storage:
//!
//! - **Time grids** (rainfall, soil moisture) live in a local grid store.
//!   A request first runs [`CacheUpdater::ensure_covered`] so only days
//!   without a coverage flag are fetched, then reads the requested cells.
//! - **Mosaics** (flood extent, terrain) are assembled per request from a
//!   tiled archive by the `mosaic` crate. Terrain is averaged to 500 m and
//!   delivered in the reference system of the request.
//!
//! Arrays can be moved onto another reference system with [`reproject`],
//! and [`restructure`] writes flood and terrain products to disk.
//!
//! ```ignore
//! use datacube::{CubeConfig, Discover};
//!
//! let discover = Discover::from_config(&CubeConfig::from_env(), fetcher)?;
//! let rain = discover
//!     .get("copernicus/predicted_rainfall", &extent, start, Some(end))
//!     .await?;
//! println!("{:?}", rain.summary());
//! ```

pub mod accumulate;
pub mod array;
pub mod config;
pub mod discover;
pub mod error;
pub mod reproject;
pub mod restructure;
pub mod source;
pub mod tiled;
pub mod timegrid;
pub mod updater;

pub use accumulate::{RainAccumulator, ACCUMULATION_CRS, ACCUMULATION_RESOLUTION_M, M_TO_MM};
pub use array::{ArraySummary, Coord, DataArray, Provenance};
pub use config::CubeConfig;
pub use discover::Discover;
pub use error::{CubeError, Result, UpdateFailure};
pub use reproject::{reproject, to_raster};
pub use restructure::{
    persist_array, restructure_dem, restructure_flood, write_geotiff, DEM_NODATA, FLOOD_CHUNK,
};
pub use source::DataSource;
pub use tiled::MosaicSource;
pub use timegrid::TimeGridSource;
pub use updater::{CacheUpdater, UpdateReport};
