//! Error types shared by the datacube crates.

use thiserror::Error;

/// Result type alias using GeoError.
pub type GeoResult<T> = Result<T, GeoError>;

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("Invalid extent: {0}")]
    InvalidExtent(String),

    #[error("Invalid CRS: {0}")]
    InvalidCrs(String),

    #[error("Projection error: {0}")]
    Projection(#[from] projection::ProjectionError),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),
}
