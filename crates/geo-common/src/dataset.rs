//! Declarative dataset descriptors.
//!
//! Every dataset the datacube serves is described once here: its native
//! resolution, how sub-daily samples or overlapping tiles are reduced, and
//! the reference system its data lives in. Call sites look a descriptor up
//! by identifier instead of inferring these properties from names.

use serde::{Deserialize, Serialize};

use crate::crs::CrsCode;
use crate::error::{GeoError, GeoResult};
use crate::grid::GridSpec;

/// How several values for the same cell are combined into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reduction {
    /// Accumulation-style variables (e.g. precipitation).
    Sum,
    /// State-style variables (e.g. soil moisture).
    Mean,
    /// Presence-style variables (e.g. flood extent); any valid observation wins.
    Max,
}

impl Reduction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Max => "max",
        }
    }

    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sum" => Some(Self::Sum),
            "mean" | "avg" => Some(Self::Mean),
            "max" => Some(Self::Max),
            _ => None,
        }
    }

    /// Reduce a set of samples, ignoring no-data (NaN).
    ///
    /// Returns NaN when no sample carries data.
    pub fn apply(&self, values: impl IntoIterator<Item = f32>) -> f32 {
        let mut count = 0usize;
        let mut acc = match self {
            Self::Max => f32::NEG_INFINITY,
            _ => 0.0,
        };

        for v in values.into_iter().filter(|v| !v.is_nan()) {
            count += 1;
            match self {
                Self::Sum | Self::Mean => acc += v,
                Self::Max => acc = acc.max(v),
            }
        }

        match (self, count) {
            (_, 0) => f32::NAN,
            (Self::Mean, n) => acc / n as f32,
            _ => acc,
        }
    }
}

impl std::fmt::Display for Reduction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Nominal spatial resolution of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "value", rename_all = "lowercase")]
pub enum Resolution {
    Degrees(f64),
    Meters(f64),
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Degrees(v) => write!(f, "{v}deg"),
            Self::Meters(v) => write!(f, "{v}m"),
        }
    }
}

/// Where the data of a dataset is georeferenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceSystem {
    /// One reference system for the whole dataset.
    Fixed(CrsCode),
    /// Per-tile Equi7 continental subgrid.
    Equi7,
}

/// Storage/access pattern of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatasetKind {
    /// Daily slices cached into a (time, latitude, longitude) grid store.
    TimeGrid,
    /// Spatially tiled files selected and merged per request.
    Mosaic,
}

/// Static properties of a servable dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DatasetDescriptor {
    /// Identifier used by callers, e.g. "copernicus/predicted_rainfall".
    pub id: &'static str,
    /// Variable name inside the store or tile files.
    pub variable: &'static str,
    pub long_name: &'static str,
    pub units: &'static str,
    /// Provenance tag attached to every returned array.
    pub source: &'static str,
    /// Remote product the daily slices are requested from (time grids only).
    pub provider_product: Option<&'static str>,
    /// Variable name in the remote provider's request schema.
    pub provider_variable: Option<&'static str>,
    pub native_resolution: Resolution,
    /// Grid the provider delivers daily slices on (time grids only).
    pub native_grid: Option<GridSpec>,
    pub reduction: Reduction,
    pub reference_system: ReferenceSystem,
    pub kind: DatasetKind,
    /// Whether the store carries a static grid-box area variable.
    pub with_area: bool,
    /// Resolution a mosaic is block-averaged to before it is returned.
    pub served_resolution: Option<Resolution>,
    /// Whether the data is one layer with no acquisition time.
    pub time_invariant: bool,
}

impl DatasetDescriptor {
    /// Block size turning the native resolution into the served one, when
    /// both are in the same unit and the served one is coarser.
    pub fn coarsening_factor(&self) -> Option<usize> {
        let ratio = match (self.native_resolution, self.served_resolution?) {
            (Resolution::Meters(native), Resolution::Meters(served)) => served / native,
            (Resolution::Degrees(native), Resolution::Degrees(served)) => served / native,
            _ => return None,
        };
        let factor = ratio.round();
        (factor >= 2.0).then_some(factor as usize)
    }
}

/// ERA5-Land grid as delivered for a whole-globe area request: 0.1 degree,
/// longitudes -180..179.9, latitudes 90..-90.
///
/// Decoded files carry their own grid definition; this is the shape a
/// daily slice is expected to have.
pub const ERA5_LAND_GRID: GridSpec = GridSpec::new(3600, 1801, 0.1, -0.1, -180.0, 90.0);

/// All datasets the datacube knows how to serve.
pub const DATASETS: &[DatasetDescriptor] = &[
    DatasetDescriptor {
        id: "copernicus/predicted_rainfall",
        variable: "tp",
        long_name: "Total precipitation",
        units: "m",
        source: "ECMWF ERA5-Land via Copernicus Climate Data Store",
        provider_product: Some("reanalysis-era5-land"),
        provider_variable: Some("total_precipitation"),
        native_resolution: Resolution::Degrees(0.1),
        native_grid: Some(ERA5_LAND_GRID),
        reduction: Reduction::Sum,
        reference_system: ReferenceSystem::Fixed(CrsCode::Epsg4326),
        kind: DatasetKind::TimeGrid,
        with_area: true,
        served_resolution: None,
        time_invariant: false,
    },
    DatasetDescriptor {
        id: "copernicus/soil_moisture",
        variable: "swvl1",
        long_name: "Volumetric soil water layer 1",
        units: "m3 m-3",
        source: "ECMWF ERA5-Land via Copernicus Climate Data Store",
        provider_product: Some("reanalysis-era5-land"),
        provider_variable: Some("swvl1"),
        native_resolution: Resolution::Degrees(0.1),
        native_grid: Some(ERA5_LAND_GRID),
        reduction: Reduction::Mean,
        reference_system: ReferenceSystem::Fixed(CrsCode::Epsg4326),
        kind: DatasetKind::TimeGrid,
        with_area: false,
        served_resolution: None,
        time_invariant: false,
    },
    DatasetDescriptor {
        id: "gfm/floods",
        variable: "flood",
        long_name: "Observed flood extent",
        units: "1",
        source: "GloFAS Global Flood Monitoring (Sentinel-1)",
        provider_product: None,
        provider_variable: None,
        native_resolution: Resolution::Meters(20.0),
        native_grid: None,
        reduction: Reduction::Max,
        reference_system: ReferenceSystem::Equi7,
        kind: DatasetKind::Mosaic,
        with_area: false,
        served_resolution: None,
        time_invariant: false,
    },
    DatasetDescriptor {
        id: "copernicus/dem",
        variable: "DEM",
        long_name: "Terrain elevation",
        units: "m",
        source: "Copernicus DEM GLO-30 on the Equi7 grid",
        provider_product: None,
        provider_variable: None,
        native_resolution: Resolution::Meters(20.0),
        native_grid: None,
        reduction: Reduction::Mean,
        reference_system: ReferenceSystem::Equi7,
        kind: DatasetKind::Mosaic,
        with_area: false,
        served_resolution: Some(Resolution::Meters(500.0)),
        time_invariant: true,
    },
];

/// Look up a dataset descriptor by identifier.
pub fn descriptor(id: &str) -> GeoResult<&'static DatasetDescriptor> {
    DATASETS
        .iter()
        .find(|d| d.id == id)
        .ok_or_else(|| GeoError::UnknownDataset(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_lookup() {
        let rain = descriptor("copernicus/predicted_rainfall").unwrap();
        assert_eq!(rain.reduction, Reduction::Sum);
        assert_eq!(rain.kind, DatasetKind::TimeGrid);

        let soil = descriptor("copernicus/soil_moisture").unwrap();
        assert_eq!(soil.reduction, Reduction::Mean);

        let flood = descriptor("gfm/floods").unwrap();
        assert_eq!(flood.kind, DatasetKind::Mosaic);
        assert_eq!(flood.reduction, Reduction::Max);
        assert_eq!(flood.coarsening_factor(), None);

        let dem = descriptor("copernicus/dem").unwrap();
        assert_eq!(dem.kind, DatasetKind::Mosaic);
        assert_eq!(dem.reduction, Reduction::Mean);
        assert!(dem.time_invariant);
        assert_eq!(dem.coarsening_factor(), Some(25));
    }

    #[test]
    fn test_unknown_dataset() {
        let err = descriptor("nasa/landsat").unwrap_err();
        assert!(matches!(err, GeoError::UnknownDataset(id) if id == "nasa/landsat"));
    }

    #[test]
    fn test_reduction_ignores_nodata() {
        let values = [1.0, f32::NAN, 3.0];
        assert_eq!(Reduction::Sum.apply(values), 4.0);
        assert_eq!(Reduction::Mean.apply(values), 2.0);
        assert_eq!(Reduction::Max.apply(values), 3.0);
        assert!(Reduction::Sum.apply([f32::NAN, f32::NAN]).is_nan());
        assert!(Reduction::Max.apply(std::iter::empty()).is_nan());
    }

    #[test]
    fn test_reduction_from_str() {
        assert_eq!(Reduction::from_str("SUM"), Some(Reduction::Sum));
        assert_eq!(Reduction::from_str("avg"), Some(Reduction::Mean));
        assert_eq!(Reduction::from_str("median"), None);
    }
}
