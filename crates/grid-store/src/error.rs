//! Error types for grid store operations.

use thiserror::Error;

/// Errors that can occur while creating, writing or reading a grid store.
#[derive(Error, Debug)]
pub enum GridStoreError {
    /// Values passed to a region write disagree with the region's shape,
    /// or the region does not span the full extent of a non-updated axis.
    #[error("region mismatch on '{variable}': expected {expected}, got {actual}")]
    RegionMismatch {
        variable: String,
        expected: String,
        actual: String,
    },

    /// A coordinate or index lies outside the store's axis.
    #[error("{axis} selection {requested} is outside the axis ({len} entries)")]
    OutsideAxis {
        axis: &'static str,
        requested: String,
        len: usize,
    },

    /// Zarr format error.
    #[error("Zarr format error: {0}")]
    Zarr(String),

    /// Storage/IO error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid or missing store metadata.
    #[error("invalid store metadata: {0}")]
    InvalidMetadata(String),

    /// The store has no variable with this name.
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    /// Normalization of a provider slice onto the store grid failed.
    #[error("transform error: {0}")]
    Transform(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl GridStoreError {
    pub fn region_mismatch(
        variable: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::RegionMismatch {
            variable: variable.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn outside_axis(axis: &'static str, requested: impl Into<String>, len: usize) -> Self {
        Self::OutsideAxis {
            axis,
            requested: requested.into(),
            len,
        }
    }

    /// Create a Zarr error.
    pub fn zarr(msg: impl ToString) -> Self {
        Self::Zarr(msg.to_string())
    }

    /// Create a Storage error.
    pub fn storage(msg: impl ToString) -> Self {
        Self::Storage(msg.to_string())
    }

    pub fn invalid_metadata(msg: impl Into<String>) -> Self {
        Self::InvalidMetadata(msg.into())
    }

    pub fn transform(msg: impl Into<String>) -> Self {
        Self::Transform(msg.into())
    }
}

impl From<std::io::Error> for GridStoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for GridStoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidMetadata(err.to_string())
    }
}

/// Result type for grid store operations.
pub type Result<T> = std::result::Result<T, GridStoreError>;
