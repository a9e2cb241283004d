//! Bounding extents tagged with their reference system.

use serde::{Deserialize, Serialize};

use crate::crs::CrsCode;
use crate::error::{GeoError, GeoResult};

/// Number of points sampled along each edge when reprojecting an extent.
const EDGE_SAMPLES: usize = 25;

/// A bounding box plus the reference system its coordinates are expressed in.
///
/// For geographic CRS (EPSG:4326) coordinates are degrees, `x` is longitude.
/// For projected CRS (EPSG:3857, Equi7) coordinates are meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub crs: CrsCode,
}

impl Extent {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64, crs: CrsCode) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
            crs,
        }
    }

    /// Geographic extent in EPSG:4326.
    pub fn geographic(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self::new(min_lon, min_lat, max_lon, max_lat, CrsCode::Epsg4326)
    }

    /// The whole globe in EPSG:4326.
    pub fn global() -> Self {
        Self::geographic(-180.0, -90.0, 180.0, 90.0)
    }

    /// Parse a command line extent: "min_x,min_y,max_x,max_y[,CRS]".
    ///
    /// The CRS defaults to EPSG:4326 when omitted.
    pub fn from_arg_str(s: &str) -> GeoResult<Self> {
        let tokens: Vec<&str> = s.split(',').map(str::trim).collect();
        if tokens.len() != 4 && tokens.len() != 5 {
            return Err(GeoError::InvalidExtent(format!(
                "{s}. Expected 'min_x,min_y,max_x,max_y[,CRS]'"
            )));
        }

        let mut coords = [0.0f64; 4];
        for (slot, token) in coords.iter_mut().zip(&tokens) {
            *slot = token
                .parse()
                .map_err(|_| GeoError::InvalidExtent(format!("invalid number '{token}'")))?;
        }

        let crs = match tokens.get(4) {
            Some(code) => CrsCode::parse(code)?,
            None => CrsCode::Epsg4326,
        };

        let extent = Self::new(coords[0], coords[1], coords[2], coords[3], crs);
        extent.validate()?;
        Ok(extent)
    }

    /// Reject extents with non-finite coordinates or min > max.
    pub fn validate(&self) -> GeoResult<()> {
        let finite = [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(GeoError::InvalidExtent(format!("non-finite coordinates in {self:?}")));
        }
        if self.min_x > self.max_x || self.min_y > self.max_y {
            return Err(GeoError::InvalidExtent(format!(
                "min exceeds max in ({}, {}, {}, {})",
                self.min_x, self.min_y, self.max_x, self.max_y
            )));
        }
        Ok(())
    }

    pub fn to_tuple(&self) -> (f64, f64, f64, f64) {
        (self.min_x, self.min_y, self.max_x, self.max_y)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Check if this extent intersects another in the same CRS.
    ///
    /// Extents that only share an edge or a corner count as intersecting.
    pub fn intersects(&self, other: &Extent) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Compute the intersection of two extents in the same CRS.
    pub fn intersection(&self, other: &Extent) -> Option<Extent> {
        if !self.intersects(other) {
            return None;
        }

        Some(Extent::new(
            self.min_x.max(other.min_x),
            self.min_y.max(other.min_y),
            self.max_x.min(other.max_x),
            self.max_y.min(other.max_y),
            self.crs,
        ))
    }

    /// Smallest extent covering both.
    pub fn union(&self, other: &Extent) -> Extent {
        Extent::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
            self.crs,
        )
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Reproject to another CRS, producing the envelope of the transformed outline.
    ///
    /// Each edge is densified before transforming so curved edges in the
    /// target system are enclosed by the envelope.
    pub fn transform_to(&self, target: CrsCode) -> GeoResult<Extent> {
        if self.crs == target {
            return Ok(*self);
        }

        let source = self.crs.projection();
        let dest = target.projection();

        let mut envelope: Option<(f64, f64, f64, f64)> = None;
        for (x, y) in self.outline(EDGE_SAMPLES) {
            let (tx, ty) = source.transform(&dest, x, y)?;
            envelope = Some(match envelope {
                None => (tx, ty, tx, ty),
                Some((a, b, c, d)) => (a.min(tx), b.min(ty), c.max(tx), d.max(ty)),
            });
        }

        let (min_x, min_y, max_x, max_y) = envelope
            .ok_or_else(|| GeoError::InvalidExtent(format!("empty outline for {self:?}")))?;
        Ok(Extent::new(min_x, min_y, max_x, max_y, target))
    }

    /// Points along the boundary, `samples` per edge, counter-clockwise from the lower-left corner.
    pub fn outline(&self, samples: usize) -> Vec<(f64, f64)> {
        let n = samples.max(1);
        let mut points = Vec::with_capacity(4 * n);
        for i in 0..n {
            let t = i as f64 / n as f64;
            points.push((self.min_x + t * self.width(), self.min_y));
        }
        for i in 0..n {
            let t = i as f64 / n as f64;
            points.push((self.max_x, self.min_y + t * self.height()));
        }
        for i in 0..n {
            let t = i as f64 / n as f64;
            points.push((self.max_x - t * self.width(), self.max_y));
        }
        for i in 0..n {
            let t = i as f64 / n as f64;
            points.push((self.min_x, self.max_y - t * self.height()));
        }
        points
    }
}
