//! The access protocol every dataset adapter implements.

use async_trait::async_trait;
use chrono::NaiveDate;
use geo_common::{DatasetDescriptor, Extent};

use crate::array::DataArray;
use crate::error::Result;

/// A servable dataset.
///
/// `get` returns the data inside `extent` for the inclusive day range
/// `[start, end]`; when `end` is omitted only `start` is returned.
#[async_trait]
pub trait DataSource: Send + Sync {
    fn descriptor(&self) -> &'static DatasetDescriptor;

    async fn get(
        &self,
        extent: &Extent,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<DataArray>;
}
