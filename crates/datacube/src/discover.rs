//! Registry mapping dataset identifiers to their adapters.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use fetcher::RemoteFetcher;
use geo_common::{DatasetDescriptor, DatasetKind, Extent, DATASETS};
use mosaic::{dem_filters, flood_filters};
use tracing::debug;

use crate::array::DataArray;
use crate::config::CubeConfig;
use crate::error::{CubeError, Result};
use crate::source::DataSource;
use crate::tiled::MosaicSource;
use crate::timegrid::TimeGridSource;

/// Single entry point: `get(dataset, extent, start, end)`.
#[derive(Default)]
pub struct Discover {
    sources: BTreeMap<&'static str, Arc<dyn DataSource>>,
    time_grids: BTreeMap<&'static str, Arc<TimeGridSource>>,
}

impl Discover {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry serving every known dataset with the given settings.
    ///
    /// Time grids cache under `config.cache_root` and fetch through
    /// `fetcher`; flood mosaics read from `config.flood_root` and terrain
    /// from `config.dem_root`. Nothing is opened or scanned until a dataset
    /// is first requested.
    pub fn from_config(config: &CubeConfig, fetcher: Arc<dyn RemoteFetcher>) -> Result<Self> {
        config.validate()?;
        let mut discover = Self::new();
        for dataset in DATASETS {
            match dataset.kind {
                DatasetKind::TimeGrid => {
                    let source = TimeGridSource::new(dataset, config.store_path(dataset.id), fetcher.clone())
                        .configured(config);
                    discover.register_time_grid(Arc::new(source));
                }
                DatasetKind::Mosaic => {
                    discover.register(Arc::new(mosaic_source(dataset, config)?));
                }
            }
        }
        Ok(discover)
    }

    /// Register a source under its descriptor's id, replacing any previous one.
    pub fn register(&mut self, source: Arc<dyn DataSource>) {
        let id = source.descriptor().id;
        debug!(dataset = id, "Registered data source");
        self.time_grids.remove(id);
        self.sources.insert(id, source);
    }

    /// Register a time grid; it is also reachable through [`Discover::time_grid`].
    pub fn register_time_grid(&mut self, source: Arc<TimeGridSource>) {
        let id = source.descriptor().id;
        self.register(source.clone());
        self.time_grids.insert(id, source);
    }

    pub fn datasets(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.sources.keys().copied()
    }

    pub fn source(&self, dataset: &str) -> Result<Arc<dyn DataSource>> {
        self.sources
            .get(dataset)
            .cloned()
            .ok_or_else(|| CubeError::UnknownDataset(dataset.to_string()))
    }

    /// The cached time grid behind `dataset`, for updates without a read.
    pub fn time_grid(&self, dataset: &str) -> Result<Arc<TimeGridSource>> {
        if let Some(source) = self.time_grids.get(dataset) {
            return Ok(source.clone());
        }
        if self.sources.contains_key(dataset) {
            return Err(CubeError::config(format!(
                "dataset {dataset} is not a cached time grid"
            )));
        }
        Err(CubeError::UnknownDataset(dataset.to_string()))
    }

    pub async fn get(
        &self,
        dataset: &str,
        extent: &Extent,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<DataArray> {
        self.source(dataset)?.get(extent, start, end).await
    }
}

/// Archive location and path filters of a tiled dataset.
fn mosaic_source(dataset: &'static DatasetDescriptor, config: &CubeConfig) -> Result<MosaicSource> {
    match dataset.id {
        "gfm/floods" => Ok(MosaicSource::new(dataset, &config.flood_root, flood_filters()?)),
        "copernicus/dem" => {
            Ok(MosaicSource::new(dataset, &config.dem_root, dem_filters()?).in_query_crs())
        }
        other => Err(CubeError::config(format!("no tile archive configured for {other}"))),
    }
}
