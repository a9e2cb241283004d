//! Coordinate reference system transformations.
//!
//! Implements the handful of map projections the datacube needs from
//! scratch: the Equi7 azimuthal-equidistant continental subgrids used by
//! the flood mosaics, spherical Web Mercator, and plain geographic
//! longitude/latitude.

pub mod aeqd;
pub mod mercator;
pub mod transform;

pub use aeqd::{AzimuthalEquidistant, Equi7Subgrid};
pub use mercator::WebMercator;
pub use transform::{Projection, ProjectionError};

/// Mean Earth radius in meters used by the spherical projections.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;
