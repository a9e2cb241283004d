//! Error types for mosaic indexing and assembly.

use std::fmt;

use chrono::NaiveDate;
use geo_common::GeoError;
use thiserror::Error;

use crate::assemble::Stage;

/// Result type alias using MosaicError.
pub type Result<T> = std::result::Result<T, MosaicError>;

#[derive(Debug, Error)]
pub enum MosaicError {
    /// Nothing in the index matches the requested extent and days.
    #[error("No tiles found for {extent} between {start} and {end}")]
    NoTilesFound {
        extent: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("Invalid tile name: {0}")]
    InvalidTileName(String),

    #[error("Raster error: {0}")]
    Raster(String),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("Projection error: {0}")]
    Projection(String),

    #[error("Invalid filter pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MosaicError {
    pub fn raster(msg: impl Into<String>) -> Self {
        Self::Raster(msg.into())
    }

    pub fn projection(msg: impl Into<String>) -> Self {
        Self::Projection(msg.into())
    }

    pub fn is_no_tiles(&self) -> bool {
        matches!(self, Self::NoTilesFound { .. })
    }
}

impl From<GeoError> for MosaicError {
    fn from(err: GeoError) -> Self {
        Self::Projection(err.to_string())
    }
}

impl From<walkdir::Error> for MosaicError {
    fn from(err: walkdir::Error) -> Self {
        Self::Io(err.into())
    }
}

/// Failure of one assembly request, tagged with the stage it was trying to reach.
#[derive(Debug)]
pub struct AssemblyError {
    pub stage: Stage,
    pub source: MosaicError,
}

impl AssemblyError {
    pub fn new(stage: Stage, source: MosaicError) -> Self {
        Self { stage, source }
    }

    pub fn is_no_tiles(&self) -> bool {
        self.source.is_no_tiles()
    }
}

impl fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mosaic assembly failed at {}: {}", self.stage, self.source)
    }
}

impl std::error::Error for AssemblyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
