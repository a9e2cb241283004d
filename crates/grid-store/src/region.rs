//! Contiguous hyper-rectangles inside a store.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::axis::GridAxes;
use crate::error::{GridStoreError, Result};

/// Store dimension, in on-disk order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dim {
    Time,
    Latitude,
    Longitude,
}

impl Dim {
    pub const ALL: [Dim; 3] = [Dim::Time, Dim::Latitude, Dim::Longitude];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Latitude => "latitude",
            Self::Longitude => "longitude",
        }
    }
}

/// Index ranges (half-open) along every store dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRegion {
    pub time: Range<usize>,
    pub latitude: Range<usize>,
    pub longitude: Range<usize>,
}

impl StoreRegion {
    pub fn new(time: Range<usize>, latitude: Range<usize>, longitude: Range<usize>) -> Self {
        Self {
            time,
            latitude,
            longitude,
        }
    }

    /// Single time step spanning the full spatial extent of `axes`.
    pub fn time_slice(index: usize, axes: &GridAxes) -> Self {
        Self::new(index..index + 1, 0..axes.latitude.len, 0..axes.longitude.len)
    }

    pub fn range(&self, dim: Dim) -> &Range<usize> {
        match dim {
            Dim::Time => &self.time,
            Dim::Latitude => &self.latitude,
            Dim::Longitude => &self.longitude,
        }
    }

    /// `(dim, start, end)` triples in on-disk order.
    pub fn bounds(&self) -> [(Dim, usize, usize); 3] {
        Dim::ALL.map(|dim| {
            let r = self.range(dim);
            (dim, r.start, r.end)
        })
    }

    pub fn shape(&self) -> [usize; 3] {
        [self.time.len(), self.latitude.len(), self.longitude.len()]
    }

    pub fn num_elements(&self) -> usize {
        self.shape().iter().product()
    }

    /// Check the region lies inside the store and spans every spatial axis fully.
    ///
    /// Daily writes always update a whole time step; a partial spatial
    /// region would leave a half-written slice behind a set coverage flag.
    pub fn check_writable(&self, variable: &str, axes: &GridAxes) -> Result<()> {
        let shape = axes.shape();
        for ((dim, start, end), len) in self.bounds().into_iter().zip(shape) {
            if start >= end || end > len {
                return Err(GridStoreError::region_mismatch(
                    variable,
                    format!("{} range within 0..{len}", dim.as_str()),
                    format!("{start}..{end}"),
                ));
            }
        }

        for dim in [Dim::Latitude, Dim::Longitude] {
            let r = self.range(dim);
            let len = shape[dim as usize];
            if r.start != 0 || r.end != len {
                return Err(GridStoreError::region_mismatch(
                    variable,
                    format!("full {} extent 0..{len}", dim.as_str()),
                    format!("{}..{}", r.start, r.end),
                ));
            }
        }

        Ok(())
    }
}
