//! Tests for Extent parsing, intersection and reprojection.

use geo_common::{CrsCode, Extent, GeoError};
use projection::Equi7Subgrid;

// ============================================================================
// Parsing
// ============================================================================

#[test]
fn test_parse_integer_extent() {
    let extent = Extent::from_arg_str("0,0,100,100").unwrap();
    assert_eq!(extent.to_tuple(), (0.0, 0.0, 100.0, 100.0));
}

#[test]
fn test_parse_equi7_extent() {
    let extent = Extent::from_arg_str("5400000,1200000,5700000,1500000,EQUI7:EU").unwrap();
    assert_eq!(extent.crs, CrsCode::Equi7(Equi7Subgrid::Eu));
}

#[test]
fn test_parse_rejects_wrong_arity() {
    assert!(matches!(
        Extent::from_arg_str("1,2,3"),
        Err(GeoError::InvalidExtent(_))
    ));
}

#[test]
fn test_parse_rejects_bad_number() {
    assert!(matches!(
        Extent::from_arg_str("1,north,3,4"),
        Err(GeoError::InvalidExtent(_))
    ));
}

#[test]
fn test_parse_rejects_inverted_extent() {
    assert!(Extent::from_arg_str("10,10,5,5").is_err());
}

#[test]
fn test_parse_rejects_unknown_crs() {
    assert!(matches!(
        Extent::from_arg_str("0,0,1,1,EPSG:31287"),
        Err(GeoError::InvalidCrs(_))
    ));
}

// ============================================================================
// Geometry
// ============================================================================

#[test]
fn test_corner_touch_intersects() {
    let a = Extent::geographic(0.0, 0.0, 1.0, 1.0);
    let b = Extent::geographic(1.0, 1.0, 2.0, 2.0);
    assert!(a.intersects(&b));
    assert_eq!(a.intersection(&b).unwrap().to_tuple(), (1.0, 1.0, 1.0, 1.0));
}

#[test]
fn test_disjoint_does_not_intersect() {
    let a = Extent::geographic(0.0, 0.0, 1.0, 1.0);
    let b = Extent::geographic(1.0001, 0.0, 2.0, 1.0);
    assert!(!a.intersects(&b));
    assert!(a.intersection(&b).is_none());
}

#[test]
fn test_union() {
    let a = Extent::geographic(0.0, 0.0, 1.0, 1.0);
    let b = Extent::geographic(3.0, -2.0, 4.0, 0.5);
    assert_eq!(a.union(&b).to_tuple(), (0.0, -2.0, 4.0, 1.0));
}

// ============================================================================
// Reprojection
// ============================================================================

#[test]
fn test_transform_to_same_crs_is_identity() {
    let extent = Extent::geographic(10.0, 45.0, 12.0, 47.0);
    assert_eq!(extent.transform_to(CrsCode::Epsg4326).unwrap(), extent);
}

#[test]
fn test_transform_roundtrip_encloses_original() {
    let extent = Extent::geographic(14.0, 46.0, 17.0, 49.0);
    let eu = extent
        .transform_to(CrsCode::Equi7(Equi7Subgrid::Eu))
        .unwrap();
    assert!(eu.min_x < eu.max_x);
    assert!(eu.min_y < eu.max_y);

    let back = eu.transform_to(CrsCode::Epsg4326).unwrap();
    assert!(back.min_x <= extent.min_x + 1e-6);
    assert!(back.min_y <= extent.min_y + 1e-6);
    assert!(back.max_x >= extent.max_x - 1e-6);
    assert!(back.max_y >= extent.max_y - 1e-6);
}

#[test]
fn test_transform_to_web_mercator() {
    let extent = Extent::geographic(-1.0, -1.0, 1.0, 1.0);
    let merc = extent.transform_to(CrsCode::Epsg3857).unwrap();
    assert!((merc.max_x - 111_319.490_793).abs() < 1.0);
    assert!((merc.min_x + 111_319.490_793).abs() < 1.0);
}
