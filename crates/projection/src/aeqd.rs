//! Azimuthal Equidistant projection (spherical form).
//!
//! The Equi7 grid splits the globe into seven continental subgrids, each an
//! AEQD projection centred on the continent with a large false origin so all
//! tile coordinates stay positive. Distances from the projection centre are
//! preserved, which keeps pixel areas close to constant within a subgrid.
//!
//! The spherical formulas are used; against the ellipsoidal definition the
//! positional error stays below a few hundred meters inside a subgrid's
//! zone, far under one 300 km tile.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::EARTH_RADIUS_M;

/// Spherical azimuthal-equidistant projection parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AzimuthalEquidistant {
    /// Latitude of the projection centre in radians
    pub lat0: f64,
    /// Longitude of the projection centre in radians
    pub lon0: f64,
    /// False easting (meters)
    pub false_easting: f64,
    /// False northing (meters)
    pub false_northing: f64,
    /// Sphere radius (meters)
    pub radius: f64,
}

impl AzimuthalEquidistant {
    /// Create a projection from a centre given in degrees and a false origin in meters.
    pub fn new(lat0_deg: f64, lon0_deg: f64, false_easting: f64, false_northing: f64) -> Self {
        Self {
            lat0: lat0_deg.to_radians(),
            lon0: lon0_deg.to_radians(),
            false_easting,
            false_northing,
            radius: EARTH_RADIUS_M,
        }
    }

    /// Project geographic coordinates (degrees) to projected meters.
    ///
    /// Returns `None` for the antipode of the centre, where the projection is undefined.
    pub fn forward(&self, lon_deg: f64, lat_deg: f64) -> Option<(f64, f64)> {
        let lat = lat_deg.to_radians();
        let dlon = lon_deg.to_radians() - self.lon0;

        let cos_c = (self.lat0.sin() * lat.sin() + self.lat0.cos() * lat.cos() * dlon.cos())
            .clamp(-1.0, 1.0);
        let c = cos_c.acos();
        if (PI - c).abs() < 1e-12 {
            return None;
        }

        let k = if c.abs() < 1e-12 { 1.0 } else { c / c.sin() };
        let x = self.radius * k * lat.cos() * dlon.sin();
        let y = self.radius
            * k
            * (self.lat0.cos() * lat.sin() - self.lat0.sin() * lat.cos() * dlon.cos());

        Some((x + self.false_easting, y + self.false_northing))
    }

    /// Unproject meters back to geographic coordinates (lon, lat) in degrees.
    ///
    /// Returns `None` for points farther from the centre than half the
    /// sphere's circumference.
    pub fn inverse(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let dx = x - self.false_easting;
        let dy = y - self.false_northing;
        let rho = (dx * dx + dy * dy).sqrt();

        if rho < 1e-9 {
            return Some((self.lon0.to_degrees(), self.lat0.to_degrees()));
        }

        let c = rho / self.radius;
        if c > PI {
            return None;
        }

        let lat = (c.cos() * self.lat0.sin() + dy * c.sin() * self.lat0.cos() / rho)
            .clamp(-1.0, 1.0)
            .asin();
        let lon = self.lon0
            + (dx * c.sin()).atan2(rho * self.lat0.cos() * c.cos() - dy * self.lat0.sin() * c.sin());

        Some((normalize_lon(lon.to_degrees()), lat.to_degrees()))
    }
}

/// Wrap a longitude in degrees into `[-180, 180)`.
pub fn normalize_lon(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

/// The seven continental Equi7 subgrids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Equi7Subgrid {
    Af,
    An,
    As,
    Eu,
    Na,
    Oc,
    Sa,
}

impl Equi7Subgrid {
    pub const ALL: [Equi7Subgrid; 7] = [
        Self::Af,
        Self::An,
        Self::As,
        Self::Eu,
        Self::Na,
        Self::Oc,
        Self::Sa,
    ];

    /// Parse the two-letter continent code used in Equi7 grid names.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "AF" => Some(Self::Af),
            "AN" => Some(Self::An),
            "AS" => Some(Self::As),
            "EU" => Some(Self::Eu),
            "NA" => Some(Self::Na),
            "OC" => Some(Self::Oc),
            "SA" => Some(Self::Sa),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Af => "AF",
            Self::An => "AN",
            Self::As => "AS",
            Self::Eu => "EU",
            Self::Na => "NA",
            Self::Oc => "OC",
            Self::Sa => "SA",
        }
    }

    /// EPSG code registered for this subgrid.
    pub fn epsg(&self) -> u32 {
        match self {
            Self::Af => 27701,
            Self::An => 27702,
            Self::As => 27703,
            Self::Eu => 27704,
            Self::Na => 27705,
            Self::Oc => 27706,
            Self::Sa => 27707,
        }
    }

    pub fn from_epsg(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.epsg() == code)
    }

    /// Projection parameters of the subgrid.
    pub fn projection(&self) -> AzimuthalEquidistant {
        match self {
            Self::Af => AzimuthalEquidistant::new(8.5, 21.5, 5_621_452.019_98, 5_990_638.422_98),
            Self::An => AzimuthalEquidistant::new(-90.0, 0.0, 3_714_266.977_19, 3_402_016.506_25),
            Self::As => AzimuthalEquidistant::new(47.0, 94.0, 4_340_913.848_08, 4_812_712.923_47),
            Self::Eu => AzimuthalEquidistant::new(53.0, 24.0, 5_837_287.819_77, 2_121_415.696_17),
            Self::Na => AzimuthalEquidistant::new(52.0, -97.5, 8_264_722.176_86, 4_867_518.353_23),
            Self::Oc => AzimuthalEquidistant::new(-19.5, 131.5, 6_988_408.535_6, 7_654_884.537_33),
            Self::Sa => AzimuthalEquidistant::new(-14.0, -60.5, 7_257_179.235_59, 5_592_024.446_05),
        }
    }
}
