//! Retrieval of daily provider slices for time-indexed datasets.
//!
//! A [`RemoteFetcher`] returns one calendar day of one variable as it comes
//! from the provider: on the provider's native grid, with every sub-daily
//! step kept separate. Resampling onto the store grid and reducing the
//! steps to a daily value is the caller's job.
//!
//! [`CdsFetcher`] talks to the Copernicus Climate Data Store and keeps a
//! staging directory of downloaded GRIB files; a staged day is decoded
//! again instead of being requested a second time.

pub mod cds;
pub mod config;
pub mod decode;
pub mod error;
pub mod request;

use async_trait::async_trait;
use chrono::NaiveDate;
use geo_common::{DatasetDescriptor, GridSpec};

pub use cds::{CdsFetcher, JobState};
pub use config::{CdsConfig, DEFAULT_CDS_URL};
pub use decode::{decode_steps, grid_from_corners, DecodedSteps};
pub use error::{FetchError, Result};
pub use request::{staged_file_name, DayRequest, TimeStep, GLOBAL_AREA};

/// One day of one variable in provider layout.
#[derive(Debug, Clone)]
pub struct RawSlice {
    pub day: NaiveDate,
    pub variable: String,
    pub units: String,
    /// Grid every step is laid out on (row-major, `ny` rows of `nx`).
    pub grid: GridSpec,
    /// Sub-daily steps in provider order.
    pub steps: Vec<Vec<f32>>,
}

impl RawSlice {
    pub fn num_steps(&self) -> usize {
        self.steps.len()
    }

    /// Whether every step matches the grid size.
    pub fn is_consistent(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(|s| s.len() == self.grid.len())
    }
}

/// Source of daily slices for a dataset.
///
/// Implementations must not retry [`FetchError::Unavailable`]; the decision
/// to try again later belongs to the caller.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch_day(&self, dataset: &DatasetDescriptor, day: NaiveDate) -> Result<RawSlice>;
}
