//! Datasets served from a tiled mosaic archive.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use geo_common::{DatasetDescriptor, Extent, Resampling};
use mosaic::{
    GeoRaster, MosaicAssembler, MosaicIndex, NamingRule, PathFilter, StaticYeodaNaming, Warp,
    YeodaNaming,
};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::array::{Coord, DataArray, Provenance};
use crate::error::{CubeError, Result};
use crate::source::DataSource;

/// Adapter assembling mosaics on request.
///
/// The archive is scanned once, on the first request. Datasets served
/// coarser than their native resolution are block-averaged after
/// assembly; sources built with [`MosaicSource::in_query_crs`] are then
/// warped into the reference system of the request.
pub struct MosaicSource {
    dataset: &'static DatasetDescriptor,
    root: PathBuf,
    filters: Vec<PathFilter>,
    in_query_crs: bool,
    assembler: OnceCell<MosaicAssembler>,
}

impl MosaicSource {
    pub fn new(dataset: &'static DatasetDescriptor, root: impl Into<PathBuf>, filters: Vec<PathFilter>) -> Self {
        Self {
            dataset,
            root: root.into(),
            filters,
            in_query_crs: false,
            assembler: OnceCell::new(),
        }
    }

    /// Deliver arrays in the reference system of the requested extent
    /// instead of the tiles' own.
    pub fn in_query_crs(mut self) -> Self {
        self.in_query_crs = true;
        self
    }

    /// Source over an index that is already built.
    pub fn with_index(dataset: &'static DatasetDescriptor, index: Arc<MosaicIndex>) -> Self {
        let root = index.root().to_path_buf();
        Self {
            dataset,
            root,
            filters: Vec::new(),
            in_query_crs: false,
            assembler: OnceCell::new_with(Some(
                MosaicAssembler::new(index).with_reduction(dataset.reduction),
            )),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn assembler(&self) -> Result<&MosaicAssembler> {
        self.assembler
            .get_or_try_init(|| async {
                let root = self.root.clone();
                let filters = self.filters.clone();
                let time_invariant = self.dataset.time_invariant;
                let index = tokio::task::spawn_blocking(move || {
                    let naming: &dyn NamingRule = if time_invariant {
                        &StaticYeodaNaming
                    } else {
                        &YeodaNaming
                    };
                    MosaicIndex::build(&root, naming, &filters)
                })
                .await
                .map_err(CubeError::task)??;

                info!(
                    dataset = self.dataset.id,
                    root = %self.root.display(),
                    files = index.len(),
                    "Indexed mosaic archive"
                );
                Ok::<_, CubeError>(
                    MosaicAssembler::new(Arc::new(index)).with_reduction(self.dataset.reduction),
                )
            })
            .await
    }
}

#[async_trait]
impl DataSource for MosaicSource {
    fn descriptor(&self) -> &'static DatasetDescriptor {
        self.dataset
    }

    #[instrument(skip(self, extent), fields(dataset = self.dataset.id, extent = ?extent.to_tuple()))]
    async fn get(
        &self,
        extent: &Extent,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<DataArray> {
        let assembler = self.assembler().await?.clone();
        let query = *extent;
        let coarsen = self.dataset.coarsening_factor();
        let warp = self
            .in_query_crs
            .then(|| Warp::to(query.crs).resampling(Resampling::Nearest).within(query));
        let (mosaic, raster) = tokio::task::spawn_blocking(move || {
            let mut mosaic = assembler.assemble(&query, start, end)?;
            let values = std::mem::take(&mut mosaic.values);
            let raster = GeoRaster::new(values, mosaic.width, mosaic.height, mosaic.transform, mosaic.crs)?;
            let raster = match coarsen {
                Some(factor) => raster.coarsen_mean(factor)?,
                None => raster,
            };
            let raster = match warp {
                Some(warp) => warp.apply(&raster)?,
                None => raster,
            };
            Ok::<_, CubeError>((mosaic, raster))
        })
        .await
        .map_err(CubeError::task)??;

        if coarsen.is_some() || warp.is_some() {
            debug!(
                coarsen = ?coarsen,
                crs = %raster.crs,
                width = raster.width,
                height = raster.height,
                "Post-processed mosaic"
            );
        }

        for failure in &mosaic.failures {
            warn!(
                path = %failure.path.display(),
                stage = %failure.stage,
                error = %failure.error,
                "Skipped tile file"
            );
        }

        let mut provenance = Provenance::for_dataset(self.dataset, raster.crs);
        provenance.tiles = mosaic.tiles.iter().map(|t| t.to_string()).collect();
        provenance.skipped_files = mosaic
            .failures
            .iter()
            .map(|f| f.path.display().to_string())
            .collect();

        let coords = vec![
            Coord::Values(raster.y_coords()),
            Coord::Values(raster.x_coords()),
        ];
        DataArray::new(self.dataset.variable, &["y", "x"], coords, raster.values, provenance)
            .ok_or_else(|| CubeError::task("assembled mosaic has an inconsistent shape"))
    }
}
