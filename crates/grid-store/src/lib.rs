//! Incremental daily grid store on Zarr V3.
//!
//! This crate owns the on-disk layout of time-indexed datasets: a fixed
//! global `(time, latitude, longitude)` grid allocated once and filled one
//! day at a time, plus a per-day `covered` flag array recording which days
//! hold committed data. Single rasters restructured out of the cube are
//! kept in plain `(y, x)` stores, see [`raster`].
//!
//! # Architecture
//!
//! ```text
//! provider slice (native grid, sub-daily steps)
//!      │
//!      ▼
//! Normalizer::normalize ─► reduce steps (sum / mean), resample to store axes
//!      │
//!      ▼
//! GridStore::write_region(variable, StoreRegion::time_slice(day), values)
//!      │
//!      ▼
//! CoverageTracker::mark_covered(day)
//!      │
//!      ▼
//! GridStore::read(variable, Selector) ─► uncovered days masked as NaN
//! ```
//!
//! # Example
//!
//! ```ignore
//! use grid_store::{CoverageTracker, GridAxes, GridStore, GridStoreConfig, StoreLayout};
//!
//! let layout = StoreLayout::for_dataset(descriptor, GridAxes::default_daily_global());
//! let store = Arc::new(GridStore::open_or_create("cache/rain.zarr", layout, &config)?);
//! let tracker = CoverageTracker::new(store.clone());
//!
//! for day in tracker.missing(range)? {
//!     // fetch, normalize, write_region, mark_covered
//! }
//! ```

pub mod area;
pub mod axis;
pub mod config;
pub mod coverage;
pub mod error;
pub mod normalize;
pub mod raster;
pub mod region;
pub mod store;
pub mod types;

pub use axis::{GridAxes, SpatialAxis, TimeAxis};
pub use config::{GridStoreConfig, ZarrCompression};
pub use coverage::CoverageTracker;
pub use error::{GridStoreError, Result};
pub use normalize::{reduce_steps, Normalizer, Resampling};
pub use raster::{
    raster_store_chunk, read_raster_store, write_raster_store, RasterData, RASTER_CHUNK,
};
pub use region::{Dim, StoreRegion};
pub use store::{GridStore, Selector, StoreLayout, VariableSpec, AREA, COVERED};
pub use types::{GridArray, GridSlice};
