//! Error types for dataset access.

use chrono::NaiveDate;
use fetcher::FetchError;
use geo_common::GeoError;
use grid_store::GridStoreError;
use mosaic::{AssemblyError, MosaicError};
use serde::Serialize;
use thiserror::Error;

/// Result type alias using CubeError.
pub type Result<T> = std::result::Result<T, CubeError>;

#[derive(Debug, Error)]
pub enum CubeError {
    /// A write did not fit the region it was meant for. The store layout
    /// and the writer disagree, so no further day can be trusted.
    #[error("Region mismatch: {0}")]
    RegionMismatch(String),

    /// Strict reads refuse to return days that are not cached.
    #[error("Cache does not cover {} requested day(s), first missing {}", .missing.len(), first_day(.missing))]
    IncompleteCoverage { missing: Vec<NaiveDate> },

    /// No tile matches the requested extent and time range.
    #[error("No tiles found: {0}")]
    NoTilesFound(String),

    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    #[error("Store error: {0}")]
    Store(GridStoreError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("{0}")]
    Assembly(AssemblyError),

    #[error("Mosaic error: {0}")]
    Mosaic(#[from] MosaicError),

    #[error("{0}")]
    Geo(GeoError),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A blocking worker panicked or was cancelled.
    #[error("Task failed: {0}")]
    Task(String),
}

fn first_day(days: &[NaiveDate]) -> String {
    days.first()
        .map(|d| d.to_string())
        .unwrap_or_else(|| "-".to_string())
}

impl CubeError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn task(err: impl std::fmt::Display) -> Self {
        Self::Task(err.to_string())
    }

    /// Whether the request simply matched no data.
    pub fn is_no_tiles(&self) -> bool {
        matches!(self, Self::NoTilesFound(_))
    }
}

impl From<GridStoreError> for CubeError {
    fn from(err: GridStoreError) -> Self {
        match err {
            GridStoreError::RegionMismatch { .. } => Self::RegionMismatch(err.to_string()),
            other => Self::Store(other),
        }
    }
}

impl From<AssemblyError> for CubeError {
    fn from(err: AssemblyError) -> Self {
        if err.is_no_tiles() {
            Self::NoTilesFound(err.source.to_string())
        } else {
            Self::Assembly(err)
        }
    }
}

impl From<GeoError> for CubeError {
    fn from(err: GeoError) -> Self {
        match err {
            GeoError::UnknownDataset(id) => Self::UnknownDataset(id),
            other => Self::Geo(other),
        }
    }
}

/// Why a single day could not be brought into the cache.
///
/// Failures are per day: the rest of the batch is unaffected and the day
/// stays uncovered, so a later update tries it again.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpdateFailure {
    /// The provider has not published the day yet.
    FetchUnavailable { day: NaiveDate },
    /// The request to the provider failed.
    Fetch { day: NaiveDate, message: String },
    /// The provider slice could not be normalized onto the store grid.
    TransformError { day: NaiveDate, message: String },
    /// Writing the day or its coverage flag failed.
    Store { day: NaiveDate, message: String },
}

impl UpdateFailure {
    pub fn day(&self) -> NaiveDate {
        match self {
            Self::FetchUnavailable { day }
            | Self::Fetch { day, .. }
            | Self::TransformError { day, .. }
            | Self::Store { day, .. } => *day,
        }
    }

    pub fn from_fetch(day: NaiveDate, err: &FetchError) -> Self {
        match err {
            FetchError::Unavailable { .. } => Self::FetchUnavailable { day },
            FetchError::Decode(msg) => Self::TransformError {
                day,
                message: msg.clone(),
            },
            other => Self::Fetch {
                day,
                message: other.to_string(),
            },
        }
    }
}

impl std::fmt::Display for UpdateFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FetchUnavailable { day } => write!(f, "{day}: not available yet"),
            Self::Fetch { day, message } => write!(f, "{day}: fetch failed: {message}"),
            Self::TransformError { day, message } => write!(f, "{day}: transform failed: {message}"),
            Self::Store { day, message } => write!(f, "{day}: store write failed: {message}"),
        }
    }
}
