//! Point transformations between the supported projections.

use thiserror::Error;

use crate::aeqd::AzimuthalEquidistant;
use crate::mercator::WebMercator;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("point ({x}, {y}) cannot be unprojected")]
    Unprojectable { x: f64, y: f64 },

    #[error("point (lon {lon}, lat {lat}) cannot be projected")]
    Unrepresentable { lon: f64, lat: f64 },
}

/// A concrete projection between geographic degrees and planar coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Longitude/latitude in degrees, no projection.
    Geographic,
    WebMercator,
    Aeqd(AzimuthalEquidistant),
}

impl Projection {
    /// Convert planar coordinates of this projection to (lon, lat) degrees.
    pub fn to_geographic(&self, x: f64, y: f64) -> Result<(f64, f64), ProjectionError> {
        match self {
            Self::Geographic => Ok((x, y)),
            Self::WebMercator => Ok(WebMercator.inverse(x, y)),
            Self::Aeqd(p) => p.inverse(x, y).ok_or(ProjectionError::Unprojectable { x, y }),
        }
    }

    /// Convert (lon, lat) degrees to planar coordinates of this projection.
    pub fn from_geographic(&self, lon: f64, lat: f64) -> Result<(f64, f64), ProjectionError> {
        match self {
            Self::Geographic => Ok((lon, lat)),
            Self::WebMercator => Ok(WebMercator.forward(lon, lat)),
            Self::Aeqd(p) => p
                .forward(lon, lat)
                .ok_or(ProjectionError::Unrepresentable { lon, lat }),
        }
    }

    /// Transform a point from this projection into `target`.
    pub fn transform(&self, target: &Projection, x: f64, y: f64) -> Result<(f64, f64), ProjectionError> {
        if self == target {
            return Ok((x, y));
        }
        let (lon, lat) = self.to_geographic(x, y)?;
        target.from_geographic(lon, lat)
    }
}
