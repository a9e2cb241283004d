//! Regular grid specifications.

use serde::{Deserialize, Serialize};

use crate::extent::Extent;

/// Specification of a regular lon/lat grid stored row-major.
///
/// Row `j` sits at `first_y + j * dy` (a negative `dy` means north-to-south
/// rows) and column `i` at `first_x + i * dx`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    /// Number of points in X (longitude) direction
    pub nx: usize,
    /// Number of points in Y (latitude) direction
    pub ny: usize,
    /// Grid step in X direction (degrees)
    pub dx: f64,
    /// Grid step in Y direction (degrees)
    pub dy: f64,
    /// First grid point longitude
    pub first_x: f64,
    /// First grid point latitude
    pub first_y: f64,
}

impl GridSpec {
    pub const fn new(nx: usize, ny: usize, dx: f64, dy: f64, first_x: f64, first_y: f64) -> Self {
        Self {
            nx,
            ny,
            dx,
            dy,
            first_x,
            first_y,
        }
    }

    /// Extent spanned by the grid point centres.
    pub fn extent(&self) -> Extent {
        let last_x = self.first_x + (self.nx.saturating_sub(1)) as f64 * self.dx;
        let last_y = self.first_y + (self.ny.saturating_sub(1)) as f64 * self.dy;

        Extent::geographic(
            self.first_x.min(last_x),
            self.first_y.min(last_y),
            self.first_x.max(last_x),
            self.first_y.max(last_y),
        )
    }

    /// Whether the grid wraps around the globe in longitude.
    pub fn is_global_lon(&self) -> bool {
        (self.nx as f64 * self.dx.abs() - 360.0).abs() < self.dx.abs() * 0.5
    }

    /// Fractional grid position of a coordinate, wrapping longitude on global grids.
    ///
    /// Returns `None` when the point falls outside the grid.
    pub fn fractional_index(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        let global = self.is_global_lon();
        let mut i = (lon - self.first_x) / self.dx;
        if global {
            i = i.rem_euclid(self.nx as f64);
        }
        let j = (lat - self.first_y) / self.dy;

        let in_x = global || (i >= -0.5 && i < self.nx as f64 - 0.5);
        let in_y = j >= -0.5 && j < self.ny as f64 - 0.5;
        if !in_x || !in_y {
            return None;
        }
        Some((i, j))
    }

    /// Nearest grid index for a coordinate.
    pub fn coord_to_index(&self, lon: f64, lat: f64) -> Option<(usize, usize)> {
        let (i, j) = self.fractional_index(lon, lat)?;
        let mut col = i.round() as usize;
        if col >= self.nx {
            // Only reachable on wrapping grids, where the last half cell rolls over.
            col = 0;
        }
        let row = (j.round() as usize).min(self.ny - 1);
        Some((col, row))
    }

    /// Total number of grid points.
    pub fn len(&self) -> usize {
        self.nx * self.ny
    }

    pub fn is_empty(&self) -> bool {
        self.nx == 0 || self.ny == 0
    }
}
