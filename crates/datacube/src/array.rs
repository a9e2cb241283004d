//! Labelled arrays returned to callers.

use chrono::NaiveDate;
use geo_common::{CrsCode, DatasetDescriptor, Reduction, Resolution};
use serde::Serialize;

/// Values along one dimension.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Coord {
    Days(Vec<NaiveDate>),
    Values(Vec<f64>),
}

impl Coord {
    pub fn len(&self) -> usize {
        match self {
            Self::Days(d) => d.len(),
            Self::Values(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where the values came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Provenance {
    pub dataset: String,
    pub source: String,
    pub native_resolution: Resolution,
    pub crs: CrsCode,
    pub units: String,
    pub reduction: Reduction,
    /// Tiles merged into the array (mosaic datasets only).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tiles: Vec<String>,
    /// Requested days without cached data; their values are no-data.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_days: Vec<NaiveDate>,
    /// Files skipped while assembling (mosaic datasets only).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_files: Vec<String>,
}

impl Provenance {
    pub fn for_dataset(descriptor: &DatasetDescriptor, crs: CrsCode) -> Self {
        Self {
            dataset: descriptor.id.to_string(),
            source: descriptor.source.to_string(),
            native_resolution: descriptor.native_resolution,
            crs,
            units: descriptor.units.to_string(),
            reduction: descriptor.reduction,
            tiles: Vec::new(),
            missing_days: Vec::new(),
            skipped_files: Vec::new(),
        }
    }
}

/// Dense row-major array with named dimensions and coordinates.
///
/// No-data cells hold NaN.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataArray {
    pub name: String,
    pub dims: Vec<String>,
    pub coords: Vec<Coord>,
    #[serde(skip)]
    pub values: Vec<f32>,
    pub provenance: Provenance,
}

impl DataArray {
    /// Build an array, checking every dimension has a coordinate and the
    /// values fill the shape exactly.
    pub fn new(
        name: impl Into<String>,
        dims: &[&str],
        coords: Vec<Coord>,
        values: Vec<f32>,
        provenance: Provenance,
    ) -> Option<Self> {
        if dims.len() != coords.len() {
            return None;
        }
        let len: usize = coords.iter().map(Coord::len).product();
        if len != values.len() {
            return None;
        }
        Some(Self {
            name: name.into(),
            dims: dims.iter().map(|d| d.to_string()).collect(),
            coords,
            values,
            provenance,
        })
    }

    pub fn shape(&self) -> Vec<usize> {
        self.coords.iter().map(Coord::len).collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn coord(&self, dim: &str) -> Option<&Coord> {
        self.dims
            .iter()
            .position(|d| d == dim)
            .and_then(|i| self.coords.get(i))
    }

    /// Days along the `time` dimension, if there is one.
    pub fn days(&self) -> Option<&[NaiveDate]> {
        match self.coord("time")? {
            Coord::Days(days) => Some(days),
            Coord::Values(_) => None,
        }
    }

    pub fn get(&self, index: &[usize]) -> Option<f32> {
        let shape = self.shape();
        if index.len() != shape.len() {
            return None;
        }
        let mut flat = 0;
        for (&i, &n) in index.iter().zip(&shape) {
            if i >= n {
                return None;
            }
            flat = flat * n + i;
        }
        self.values.get(flat).copied()
    }

    /// Count of cells carrying data.
    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|v| !v.is_nan()).count()
    }

    /// Minimum and maximum over valid cells.
    pub fn value_range(&self) -> Option<(f32, f32)> {
        self.values
            .iter()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Serializable description without the values.
    pub fn summary(&self) -> ArraySummary {
        ArraySummary {
            name: self.name.clone(),
            dims: self.dims.clone(),
            shape: self.shape(),
            valid_cells: self.valid_count(),
            value_range: self.value_range(),
            provenance: self.provenance.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArraySummary {
    pub name: String,
    pub dims: Vec<String>,
    pub shape: Vec<usize>,
    pub valid_cells: usize,
    pub value_range: Option<(f32, f32)>,
    pub provenance: Provenance,
}
