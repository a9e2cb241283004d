//! Coordinate Reference System codes.

use std::fmt;
use std::str::FromStr;

use projection::{Equi7Subgrid, Projection};
use serde::{Deserialize, Serialize};

use crate::error::GeoError;

/// Reference systems the datacube understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrsCode {
    /// WGS84 Geographic (lon/lat in degrees)
    Epsg4326,
    /// Web Mercator (meters)
    Epsg3857,
    /// Equi7 continental subgrid (AEQD, meters)
    Equi7(Equi7Subgrid),
}

impl CrsCode {
    /// Parse a CRS identifier.
    ///
    /// Accepts formats like:
    /// - "EPSG:4326", "epsg:4326", "CRS:84"
    /// - "EPSG:3857", "EPSG:900913"
    /// - "EPSG:27704" or "EQUI7:EU" for the Equi7 subgrids
    pub fn parse(s: &str) -> Result<Self, GeoError> {
        let normalized = s.trim().to_uppercase();

        match normalized.as_str() {
            "EPSG:4326" | "CRS:84" | "WGS84" => return Ok(CrsCode::Epsg4326),
            "EPSG:3857" | "EPSG:900913" => return Ok(CrsCode::Epsg3857),
            _ => {}
        }

        if let Some(code) = normalized.strip_prefix("EQUI7:") {
            return Equi7Subgrid::from_code(code)
                .map(CrsCode::Equi7)
                .ok_or_else(|| GeoError::InvalidCrs(s.to_string()));
        }

        normalized
            .strip_prefix("EPSG:")
            .and_then(|code| code.parse::<u32>().ok())
            .and_then(Equi7Subgrid::from_epsg)
            .map(CrsCode::Equi7)
            .ok_or_else(|| GeoError::InvalidCrs(s.to_string()))
    }

    /// Check if this is a geographic (lon/lat) CRS.
    pub fn is_geographic(&self) -> bool {
        matches!(self, CrsCode::Epsg4326)
    }

    /// Projection used to move points in and out of this CRS.
    pub fn projection(&self) -> Projection {
        match self {
            CrsCode::Epsg4326 => Projection::Geographic,
            CrsCode::Epsg3857 => Projection::WebMercator,
            CrsCode::Equi7(subgrid) => Projection::Aeqd(subgrid.projection()),
        }
    }
}

impl Default for CrsCode {
    fn default() -> Self {
        CrsCode::Epsg4326
    }
}

impl FromStr for CrsCode {
    type Err = GeoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CrsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrsCode::Epsg4326 => write!(f, "EPSG:4326"),
            CrsCode::Epsg3857 => write!(f, "EPSG:3857"),
            CrsCode::Equi7(subgrid) => write!(f, "EPSG:{}", subgrid.epsg()),
        }
    }
}
