//! Daily datasets cached in a grid store.
//!
//! A request first brings the requested days into the store (fetching only
//! the uncovered ones), then reads the cells inside the request from it.
//! The store is opened, or created, on first use.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use fetcher::RemoteFetcher;
use geo_common::{CrsCode, DatasetDescriptor, DayRange, Extent};
use grid_store::{GridAxes, GridStore, GridStoreConfig, GridStoreError, Resampling, Selector, StoreLayout};
use tokio::sync::OnceCell;
use tracing::{info, instrument, warn};

use crate::array::{Coord, DataArray, Provenance};
use crate::config::CubeConfig;
use crate::error::{CubeError, Result};
use crate::source::DataSource;
use crate::updater::{CacheUpdater, UpdateReport};

/// Adapter for a time-grid dataset backed by a remote fetcher.
pub struct TimeGridSource {
    dataset: &'static DatasetDescriptor,
    store_path: PathBuf,
    axes: GridAxes,
    store_config: GridStoreConfig,
    fetcher: Arc<dyn RemoteFetcher>,
    resampling: Resampling,
    max_concurrent: usize,
    strict: bool,
    updater: OnceCell<CacheUpdater>,
}

impl TimeGridSource {
    /// Source on the default daily global grid.
    pub fn new(
        dataset: &'static DatasetDescriptor,
        store_path: impl Into<PathBuf>,
        fetcher: Arc<dyn RemoteFetcher>,
    ) -> Self {
        Self {
            dataset,
            store_path: store_path.into(),
            axes: GridAxes::default_daily_global(),
            store_config: GridStoreConfig::default(),
            fetcher,
            resampling: Resampling::Nearest,
            max_concurrent: 4,
            strict: false,
            updater: OnceCell::new(),
        }
    }

    /// Apply the shared settings of `config`.
    pub fn configured(mut self, config: &CubeConfig) -> Self {
        self.store_config = config.store.clone();
        self.resampling = config.resampling;
        self.max_concurrent = config.max_concurrent_days;
        self.strict = config.strict;
        self
    }

    pub fn with_axes(mut self, axes: GridAxes) -> Self {
        self.axes = axes;
        self
    }

    pub fn with_store_config(mut self, config: GridStoreConfig) -> Self {
        self.store_config = config;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// The updater over this dataset's store, opening the store on first call.
    pub async fn updater(&self) -> Result<&CacheUpdater> {
        self.updater
            .get_or_try_init(|| async {
                let path = self.store_path.clone();
                let layout = StoreLayout::for_dataset(self.dataset, self.axes);
                let config = self.store_config.clone();
                let store = tokio::task::spawn_blocking(move || {
                    GridStore::open_or_create(&path, layout, &config)
                })
                .await
                .map_err(CubeError::task)??;

                info!(dataset = self.dataset.id, path = %self.store_path.display(), "Opened grid store");
                Ok::<_, CubeError>(
                    CacheUpdater::new(self.dataset, Arc::new(store), self.fetcher.clone())
                        .with_resampling(self.resampling)
                        .with_max_concurrent(self.max_concurrent),
                )
            })
            .await
    }

    /// Bring `range` into the store without reading anything back.
    pub async fn update(&self, range: DayRange) -> Result<UpdateReport> {
        self.updater().await?.ensure_covered(range).await
    }

    /// Like [`DataSource::get`], also returning what the cache update did.
    #[instrument(skip(self, extent), fields(dataset = self.dataset.id, extent = ?extent.to_tuple()))]
    pub async fn get_with_report(
        &self,
        extent: &Extent,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<(DataArray, UpdateReport)> {
        extent.validate()?;
        let range = DayRange::from_query(start, end);
        if range.is_empty() {
            return Err(CubeError::config(format!(
                "end {} is before start {}",
                range.end, range.start
            )));
        }

        let updater = self.updater().await?;
        let axes = *updater.store().axes();
        if axes.time.range_for(range).is_none() {
            return Err(GridStoreError::outside_axis(
                "time",
                format!("{}..={}", range.start, range.end),
                axes.time.len,
            )
            .into());
        }

        let query = extent.transform_to(CrsCode::Epsg4326)?;
        let (min_lon, min_lat, max_lon, max_lat) = query.to_tuple();
        let (latitude, longitude) = axes
            .spatial_ranges(min_lon, min_lat, max_lon, max_lat)
            .ok_or_else(|| {
                GridStoreError::outside_axis(
                    "latitude/longitude",
                    format!("{:?}", query.to_tuple()),
                    axes.latitude.len * axes.longitude.len,
                )
            })?;

        let report = updater.ensure_covered(range).await?;

        let store = updater.store().clone();
        let variable = self.dataset.variable;
        let selector = Selector::all()
            .with_time(range)
            .with_latitude(latitude)
            .with_longitude(longitude);
        let slice = tokio::task::spawn_blocking(move || store.read(variable, &selector))
            .await
            .map_err(CubeError::task)??;

        let missing = slice.missing_days();
        if !missing.is_empty() {
            if self.strict {
                return Err(CubeError::IncompleteCoverage { missing });
            }
            warn!(days = missing.len(), "Returning uncovered days as no-data");
        }

        let mut provenance = Provenance::for_dataset(self.dataset, CrsCode::Epsg4326);
        provenance.missing_days = missing;
        let array = DataArray::new(
            variable,
            &["time", "latitude", "longitude"],
            vec![
                Coord::Days(slice.days),
                Coord::Values(slice.latitudes),
                Coord::Values(slice.longitudes),
            ],
            slice.values.data,
            provenance,
        )
        .ok_or_else(|| CubeError::task("store read returned an inconsistent slice"))?;

        Ok((array, report))
    }
}

#[async_trait]
impl DataSource for TimeGridSource {
    fn descriptor(&self) -> &'static DatasetDescriptor {
        self.dataset
    }

    async fn get(
        &self,
        extent: &Extent,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<DataArray> {
        let (array, _) = self.get_with_report(extent, start, end).await?;
        Ok(array)
    }
}
