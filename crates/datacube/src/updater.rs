//! Bringing a time range of a daily dataset into its grid store.
//!
//! The store's coverage flags decide what is fetched: only days without a
//! flag are requested, and a day's flag is set only after its values are
//! written. Every day is an independent unit (fetch, normalize, write one
//! full time slice, mark covered), so days run concurrently and finish in
//! any order. A failed day is reported and stays uncovered; nothing already
//! committed is rolled back.

use std::sync::Arc;

use chrono::NaiveDate;
use fetcher::{RawSlice, RemoteFetcher};
use futures::stream::{self, StreamExt};
use geo_common::{DatasetDescriptor, DayRange};
use grid_store::{CoverageTracker, GridStore, GridStoreError, Normalizer, Resampling, StoreRegion};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::{CubeError, Result, UpdateFailure};

/// Outcome of one [`CacheUpdater::ensure_covered`] call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateReport {
    /// Days that lacked coverage when the update started.
    pub requested: Vec<NaiveDate>,
    /// Days written and marked covered by this update, ascending.
    pub committed: Vec<NaiveDate>,
    /// Days that could not be brought in, ascending.
    pub failures: Vec<UpdateFailure>,
}

impl UpdateReport {
    /// Whether every requested day was committed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Whether the range was already fully cached.
    pub fn was_noop(&self) -> bool {
        self.requested.is_empty()
    }
}

enum DayOutcome {
    Committed(NaiveDate),
    Failed(UpdateFailure),
}

/// Fills missing days of one dataset's grid store from a remote fetcher.
#[derive(Clone)]
pub struct CacheUpdater {
    dataset: &'static DatasetDescriptor,
    store: Arc<GridStore>,
    tracker: CoverageTracker,
    fetcher: Arc<dyn RemoteFetcher>,
    normalizer: Normalizer,
    max_concurrent: usize,
}

impl std::fmt::Debug for CacheUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheUpdater")
            .field("dataset", &self.dataset.id)
            .field("store", &self.store.root())
            .field("max_concurrent", &self.max_concurrent)
            .finish()
    }
}

impl CacheUpdater {
    pub fn new(
        dataset: &'static DatasetDescriptor,
        store: Arc<GridStore>,
        fetcher: Arc<dyn RemoteFetcher>,
    ) -> Self {
        let normalizer = Normalizer::new(store.axes(), Resampling::Nearest);
        Self {
            dataset,
            tracker: CoverageTracker::new(store.clone()),
            store,
            fetcher,
            normalizer,
            max_concurrent: 4,
        }
    }

    pub fn with_resampling(mut self, resampling: Resampling) -> Self {
        self.normalizer = Normalizer::new(self.store.axes(), resampling);
        self
    }

    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n.max(1);
        self
    }

    pub fn dataset(&self) -> &'static DatasetDescriptor {
        self.dataset
    }

    pub fn store(&self) -> &Arc<GridStore> {
        &self.store
    }

    pub fn tracker(&self) -> &CoverageTracker {
        &self.tracker
    }

    /// Make every day of `range` that lies on the store's time axis covered.
    ///
    /// Covered days are never fetched again. Per-day failures are collected
    /// in the report; a region mismatch aborts the whole update because it
    /// means the store and the normalizer disagree on the grid.
    #[instrument(skip(self), fields(dataset = self.dataset.id, start = %range.start, end = %range.end))]
    pub async fn ensure_covered(&self, range: DayRange) -> Result<UpdateReport> {
        let tracker = self.tracker.clone();
        let requested = tokio::task::spawn_blocking(move || tracker.missing(range))
            .await
            .map_err(CubeError::task)??;

        let mut report = UpdateReport {
            requested: requested.clone(),
            ..UpdateReport::default()
        };
        if requested.is_empty() {
            debug!("Range already covered");
            return Ok(report);
        }
        info!(days = requested.len(), "Updating cache");

        let mut outcomes = stream::iter(requested)
            .map(|day| self.update_day(day))
            .buffer_unordered(self.max_concurrent);

        while let Some(outcome) = outcomes.next().await {
            match outcome? {
                DayOutcome::Committed(day) => report.committed.push(day),
                DayOutcome::Failed(failure) => {
                    warn!(%failure, "Day not cached");
                    report.failures.push(failure);
                }
            }
        }

        report.committed.sort();
        report.failures.sort_by_key(UpdateFailure::day);
        info!(
            committed = report.committed.len(),
            failed = report.failures.len(),
            "Cache update complete"
        );
        Ok(report)
    }

    /// Fetch, normalize and commit one day.
    ///
    /// Only a region mismatch or a lost worker surfaces as `Err`.
    async fn update_day(&self, day: NaiveDate) -> Result<DayOutcome> {
        let slice = match self.fetcher.fetch_day(self.dataset, day).await {
            Ok(slice) => slice,
            Err(e) => return Ok(DayOutcome::Failed(UpdateFailure::from_fetch(day, &e))),
        };

        let store = self.store.clone();
        let tracker = self.tracker.clone();
        let normalizer = self.normalizer.clone();
        let dataset = self.dataset;
        tokio::task::spawn_blocking(move || {
            commit_day(&store, &tracker, &normalizer, dataset, day, &slice)
        })
        .await
        .map_err(CubeError::task)?
    }
}

fn commit_day(
    store: &GridStore,
    tracker: &CoverageTracker,
    normalizer: &Normalizer,
    dataset: &DatasetDescriptor,
    day: NaiveDate,
    slice: &RawSlice,
) -> Result<DayOutcome> {
    let values = match normalizer.normalize(&slice.grid, &slice.steps, dataset.reduction) {
        Ok(values) => values,
        Err(e) => {
            return Ok(DayOutcome::Failed(UpdateFailure::TransformError {
                day,
                message: e.to_string(),
            }))
        }
    };

    let Some(index) = store.axes().time.index_of(day) else {
        return Ok(DayOutcome::Failed(UpdateFailure::Store {
            day,
            message: "day is outside the store's time axis".to_string(),
        }));
    };
    let region = StoreRegion::time_slice(index, store.axes());

    match store.write_region(dataset.variable, &region, &values) {
        Ok(()) => {}
        Err(e @ GridStoreError::RegionMismatch { .. }) => return Err(e.into()),
        Err(e) => {
            return Ok(DayOutcome::Failed(UpdateFailure::Store {
                day,
                message: e.to_string(),
            }))
        }
    }

    if let Err(e) = tracker.mark_covered(day) {
        return Ok(DayOutcome::Failed(UpdateFailure::Store {
            day,
            message: format!("values written but coverage flag not set: {e}"),
        }));
    }

    debug!(%day, valid = values.valid_count(), "Committed day");
    Ok(DayOutcome::Committed(day))
}
