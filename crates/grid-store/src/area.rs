//! Surface area of grid boxes on a spherical Earth.

use projection::EARTH_RADIUS_M;

/// Great-circle distance in metres between two points given in degrees.
pub fn haversine_distance(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> f64 {
    let (lat1, lon1) = (lat_a.to_radians(), lon_a.to_radians());
    let (lat2, lon2) = (lat_b.to_radians(), lon_b.to_radians());

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Area in m² of the box of edge `resolution` degrees centred on (lat, lon).
///
/// The box is treated as a planar quadrilateral whose sides and diagonals
/// are great-circle distances (Bretschneider's formula).
pub fn grid_box_area(lat: f64, lon: f64, resolution: f64) -> f64 {
    let h = resolution / 2.0;
    let corners = [
        (lat - h, lon - h),
        (lat + h, lon - h),
        (lat + h, lon + h),
        (lat - h, lon + h),
    ];
    let dist = |a: usize, b: usize| {
        haversine_distance(corners[a].0, corners[a].1, corners[b].0, corners[b].1)
    };

    let sides = [dist(0, 1), dist(1, 2), dist(2, 3), dist(3, 0)];
    let (diag1, diag2) = (dist(0, 2), dist(1, 3));

    let s = sides.iter().sum::<f64>() / 2.0;
    let product: f64 = sides.iter().map(|side| s - side).product();
    let opposite = sides[0] * sides[2] + sides[1] * sides[3];
    let diagonals = diag1 * diag2;
    (product - 0.25 * (opposite + diagonals) * (opposite - diagonals))
        .max(0.0)
        .sqrt()
}

/// Area of every box of a regular lat/lon grid, row-major `(latitude, longitude)`.
///
/// Area only varies with latitude, so each row is computed once.
pub fn grid_box_areas(latitudes: &[f64], longitudes: &[f64], resolution: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(latitudes.len() * longitudes.len());
    for &lat in latitudes {
        let area = grid_box_area(lat, 0.0, resolution);
        out.extend(std::iter::repeat(area).take(longitudes.len()));
    }
    out
}
