//! Spherical Web Mercator (EPSG:3857).

use std::f64::consts::PI;

/// Semi-major axis of WGS84, used as the sphere radius by EPSG:3857.
const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Latitude limit beyond which Web Mercator is clipped.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WebMercator;

impl WebMercator {
    /// Project lon/lat degrees to meters. Latitudes are clamped to the Mercator limit.
    pub fn forward(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        let lat = lat_deg.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
        let x = WEB_MERCATOR_RADIUS * lon_deg.to_radians();
        let y = WEB_MERCATOR_RADIUS * (PI / 4.0 + lat / 2.0).tan().ln();
        (x, y)
    }

    /// Unproject meters to lon/lat degrees.
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let lon = (x / WEB_MERCATOR_RADIUS).to_degrees();
        let lat = (2.0 * (y / WEB_MERCATOR_RADIUS).exp().atan() - PI / 2.0).to_degrees();
        (lon, lat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin() {
        let (x, y) = WebMercator.forward(0.0, 0.0);
        assert!(x.abs() < 1e-9);
        assert!(y.abs() < 1e-9);
    }

    #[test]
    fn test_roundtrip() {
        let (x, y) = WebMercator.forward(13.4, 52.5);
        let (lon, lat) = WebMercator.inverse(x, y);
        assert!((lon - 13.4).abs() < 1e-9);
        assert!((lat - 52.5).abs() < 1e-9);
    }

    #[test]
    fn test_antimeridian_x() {
        let (x, _) = WebMercator.forward(180.0, 0.0);
        assert!((x - 20_037_508.342_789_244).abs() < 1e-3);
    }
}
