//! Common types and utilities shared across the datacube crates.

pub mod crs;
pub mod dataset;
pub mod error;
pub mod extent;
pub mod grid;
pub mod resampling;
pub mod time;

pub use crs::CrsCode;
pub use dataset::{
    descriptor, DatasetDescriptor, DatasetKind, ReferenceSystem, Reduction, Resolution, DATASETS,
    ERA5_LAND_GRID,
};
pub use error::{GeoError, GeoResult};
pub use extent::Extent;
pub use grid::GridSpec;
pub use resampling::Resampling;
pub use time::{parse_day, DayRange};
